//! Fixed-cadence capture -> infer -> report loop.
//!
//! The cadence is independent of the video frame rate. Each run has its own
//! `running` flag and in-flight slot:
//! - at most one inference is outstanding per run; a tick that finds the slot
//!   taken is skipped, not queued
//! - `stop` aborts the ticker immediately; an inference already in flight runs
//!   to completion but its result is dropped because the flag is cleared
//! - a per-tick failure or timeout is logged and counted, never fatal

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::detect::{InferenceService, TaggedResult};
use crate::error::PipelineError;
use crate::frame::VideoSourceRef;
use crate::Generation;

/// Callback receiving each delivered result.
pub type ResultCallback = Arc<dyn Fn(TaggedResult) + Send + Sync>;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub sample_interval: Duration,
    pub inference_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(500),
            inference_timeout: Duration::from_secs(5),
        }
    }
}

/// Counters for one scheduler, accumulated across runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub inferences_issued: u64,
    /// Ticks skipped because the previous inference was still in flight.
    pub skipped_in_flight: u64,
    /// Ticks where the source had no usable frame.
    pub skipped_no_frame: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub delivered: u64,
    /// Results that completed after `stop` and were dropped.
    pub suppressed: u64,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    inferences_issued: AtomicU64,
    skipped_in_flight: AtomicU64,
    skipped_no_frame: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    delivered: AtomicU64,
    suppressed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            inferences_issued: self.inferences_issued.load(Ordering::Relaxed),
            skipped_in_flight: self.skipped_in_flight.load(Ordering::Relaxed),
            skipped_no_frame: self.skipped_no_frame.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
        }
    }
}

struct Run {
    generation: Generation,
    running: Arc<AtomicBool>,
    ticker: JoinHandle<()>,
}

/// Shared state of one run, cloned into the ticker and inference tasks.
struct RunContext<I> {
    generation: Generation,
    inference: Arc<I>,
    source: VideoSourceRef,
    on_result: ResultCallback,
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    counters: Arc<Counters>,
    timeout: Duration,
}

pub struct DetectionScheduler<I: InferenceService> {
    inference: Arc<I>,
    config: SchedulerConfig,
    counters: Arc<Counters>,
    run: Option<Run>,
}

impl<I: InferenceService> DetectionScheduler<I> {
    pub fn new(inference: Arc<I>, config: SchedulerConfig) -> Self {
        Self {
            inference,
            config,
            counters: Arc::new(Counters::default()),
            run: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| run.running.load(Ordering::SeqCst))
    }

    /// Generation of the active run.
    pub fn generation(&self) -> Option<Generation> {
        self.run.as_ref().map(|run| run.generation)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    /// Start a fresh run sampling `source`. A run already in progress is stopped
    /// first. Must be called inside a tokio runtime.
    pub fn start<F>(&mut self, generation: Generation, source: VideoSourceRef, on_result: F)
    where
        F: Fn(TaggedResult) + Send + Sync + 'static,
    {
        self.stop();

        let running = Arc::new(AtomicBool::new(true));
        let ctx = Arc::new(RunContext {
            generation,
            inference: Arc::clone(&self.inference),
            source,
            on_result: Arc::new(on_result),
            running: Arc::clone(&running),
            in_flight: Arc::new(AtomicBool::new(false)),
            counters: Arc::clone(&self.counters),
            timeout: self.config.inference_timeout,
        });
        let interval = self.config.sample_interval;
        log::debug!(
            "detection scheduler starting: generation={} interval={:?} backend={}",
            generation,
            interval,
            self.inference.name()
        );
        let ticker = tokio::spawn(tick_loop(ctx, interval));
        self.run = Some(Run {
            generation,
            running,
            ticker,
        });
    }

    /// Stop the active run. Future ticks are cancelled immediately; a result
    /// still in flight is suppressed when it arrives.
    pub fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.running.store(false, Ordering::SeqCst);
            run.ticker.abort();
            log::debug!("detection scheduler stopped: generation={}", run.generation);
        }
    }
}

impl<I: InferenceService> Drop for DetectionScheduler<I> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn tick_loop<I: InferenceService>(ctx: Arc<RunContext<I>>, period: Duration) {
    // First sample one period after start.
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick = 0u64;

    loop {
        ticker.tick().await;
        if !ctx.running.load(Ordering::SeqCst) {
            break;
        }
        tick += 1;
        Counters::bump(&ctx.counters.ticks);

        if ctx.in_flight.swap(true, Ordering::SeqCst) {
            Counters::bump(&ctx.counters.skipped_in_flight);
            log::trace!("tick {} skipped: inference still in flight", tick);
            continue;
        }

        let Some(frame) = ctx.source.capture_frame() else {
            ctx.in_flight.store(false, Ordering::SeqCst);
            Counters::bump(&ctx.counters.skipped_no_frame);
            log::trace!("tick {} skipped: no playable frame", tick);
            continue;
        };

        Counters::bump(&ctx.counters.inferences_issued);
        tokio::spawn(run_inference(Arc::clone(&ctx), tick, frame));
    }
}

async fn run_inference<I: InferenceService>(
    ctx: Arc<RunContext<I>>,
    tick: u64,
    frame: crate::frame::VideoFrame,
) {
    let outcome = tokio::time::timeout(ctx.timeout, ctx.inference.infer(frame)).await;
    ctx.in_flight.store(false, Ordering::SeqCst);

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            Counters::bump(&ctx.counters.failures);
            let failure = PipelineError::InferenceTickFailure {
                tick,
                reason: format!("{err:#}"),
            };
            log::warn!("{}", failure);
            return;
        }
        Err(_) => {
            Counters::bump(&ctx.counters.timeouts);
            let failure = PipelineError::InferenceTimeout {
                tick,
                timeout: ctx.timeout,
            };
            log::warn!("{}", failure);
            return;
        }
    };

    if !ctx.running.load(Ordering::SeqCst) {
        Counters::bump(&ctx.counters.suppressed);
        log::debug!(
            "dropping result of tick {} (generation {}): scheduler stopped",
            tick,
            ctx.generation
        );
        return;
    }

    Counters::bump(&ctx.counters.delivered);
    (ctx.on_result)(TaggedResult {
        generation: ctx.generation,
        tick,
        result,
    });
}
