mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use live_overlay::pipeline::{DetectionScheduler, SchedulerConfig};
use live_overlay::{TaggedResult, VideoSourceRef};

use common::{ScriptedInference, StaticSource};

fn scheduler(
    inference: &Arc<ScriptedInference>,
    interval_ms: u64,
) -> DetectionScheduler<ScriptedInference> {
    DetectionScheduler::new(
        Arc::clone(inference),
        SchedulerConfig {
            sample_interval: Duration::from_millis(interval_ms),
            inference_timeout: Duration::from_secs(5),
        },
    )
}

#[derive(Clone, Default)]
struct Collected(Arc<Mutex<Vec<TaggedResult>>>);

impl Collected {
    fn sink(&self) -> impl Fn(TaggedResult) + Send + Sync + 'static {
        let results = Arc::clone(&self.0);
        move |tagged| results.lock().unwrap().push(tagged)
    }

    fn ticks(&self) -> Vec<(u64, u64)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|t| (t.generation, t.tick))
            .collect()
    }
}

fn playing() -> VideoSourceRef {
    StaticSource::playing()
}

#[tokio::test(start_paused = true)]
async fn samples_on_a_fixed_cadence() {
    let inference = Arc::new(ScriptedInference::new(Duration::ZERO));
    let mut scheduler = scheduler(&inference, 400);
    let results = Collected::default();

    scheduler.start(7, playing(), results.sink());
    assert!(scheduler.is_running());
    assert_eq!(scheduler.generation(), Some(7));

    tokio::time::sleep(Duration::from_millis(1_700)).await;
    assert_eq!(results.ticks(), vec![(7, 1), (7, 2), (7, 3), (7, 4)]);
    assert_eq!(inference.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn slow_inference_skips_ticks_instead_of_queueing() {
    let inference = Arc::new(ScriptedInference::new(Duration::from_millis(1_200)));
    let mut scheduler = scheduler(&inference, 500);
    let results = Collected::default();

    scheduler.start(1, playing(), results.sink());
    // Ticks at 0.5s and 2.0s issue; 1.0, 1.5, 2.5, 3.0 find one in flight.
    tokio::time::sleep(Duration::from_millis(3_100)).await;

    let stats = scheduler.stats();
    assert_eq!(inference.calls(), 2);
    assert_eq!(stats.ticks, 6);
    assert_eq!(stats.inferences_issued, 2);
    assert_eq!(stats.skipped_in_flight, 4);
    assert_eq!(results.ticks(), vec![(1, 1)]);
}

#[tokio::test(start_paused = true)]
async fn stop_suppresses_a_result_still_in_flight() {
    let inference = Arc::new(ScriptedInference::new(Duration::from_millis(1_000)));
    let mut scheduler = scheduler(&inference, 500);
    let results = Collected::default();

    scheduler.start(1, playing(), results.sink());
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(inference.calls(), 1);

    scheduler.stop();
    assert!(!scheduler.is_running());
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let stats = scheduler.stats();
    assert!(results.ticks().is_empty());
    assert_eq!(stats.suppressed, 1);
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.ticks, 1);
    assert_eq!(inference.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_tick_does_not_stop_the_loop() {
    let inference = Arc::new(ScriptedInference::new(Duration::ZERO).failing_on(&[2]));
    let mut scheduler = scheduler(&inference, 500);
    let results = Collected::default();

    scheduler.start(3, playing(), results.sink());
    tokio::time::sleep(Duration::from_millis(2_100)).await;

    assert_eq!(results.ticks(), vec![(3, 1), (3, 3), (3, 4)]);
    assert_eq!(scheduler.stats().failures, 1);
    assert!(scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn slow_inference_is_bounded_by_the_timeout() {
    let inference = Arc::new(ScriptedInference::new(Duration::from_secs(3)));
    let mut scheduler = DetectionScheduler::new(
        Arc::clone(&inference),
        SchedulerConfig {
            sample_interval: Duration::from_millis(400),
            inference_timeout: Duration::from_secs(1),
        },
    );
    let results = Collected::default();

    scheduler.start(1, playing(), results.sink());
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let stats = scheduler.stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.skipped_in_flight, 2);
    assert!(results.ticks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn restart_begins_a_fresh_cadence_for_the_new_generation() {
    let inference = Arc::new(ScriptedInference::new(Duration::ZERO));
    let mut scheduler = scheduler(&inference, 500);
    let results = Collected::default();

    scheduler.start(1, playing(), results.sink());
    tokio::time::sleep(Duration::from_millis(600)).await;
    scheduler.stop();

    scheduler.start(2, playing(), results.sink());
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(results.ticks(), vec![(1, 1), (2, 1)]);
    assert_eq!(scheduler.generation(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn ticks_without_a_frame_are_skipped() {
    let inference = Arc::new(ScriptedInference::new(Duration::ZERO));
    let mut scheduler = scheduler(&inference, 500);
    let results = Collected::default();
    let source = StaticSource::stalled();

    scheduler.start(1, source.clone(), results.sink());
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let stats = scheduler.stats();
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.skipped_no_frame, 2);
    assert_eq!(inference.calls(), 0);
    assert_eq!(source.captured(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_scheduler_stops_sampling() {
    let inference = Arc::new(ScriptedInference::new(Duration::ZERO));
    let results = Collected::default();
    {
        let mut scheduler = scheduler(&inference, 500);
        scheduler.start(1, playing(), results.sink());
        tokio::time::sleep(Duration::from_millis(600)).await;
    }
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(inference.calls(), 1);
}
