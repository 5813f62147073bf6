#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;

use live_overlay::pipeline::ConnectionState;
use live_overlay::transport::SyntheticConfig;
use live_overlay::{
    Detection, DetectionResult, InferenceService, Keypoint, VideoFrame, VideoSource,
};

/// Inference fake with a fixed latency and scripted failures.
pub struct ScriptedInference {
    latency: Duration,
    calls: AtomicUsize,
    failing_calls: Mutex<HashSet<usize>>,
    result: DetectionResult,
}

impl ScriptedInference {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            calls: AtomicUsize::new(0),
            failing_calls: Mutex::new(HashSet::new()),
            result: one_person(false),
        }
    }

    /// Fail the given 1-based calls.
    pub fn failing_on(self, calls: &[usize]) -> Self {
        self.failing_calls.lock().unwrap().extend(calls);
        self
    }

    pub fn returning(mut self, result: DetectionResult) -> Self {
        self.result = result;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceService for ScriptedInference {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn infer(&self, _frame: VideoFrame) -> anyhow::Result<DetectionResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing_calls.lock().unwrap().contains(&call) {
            bail!("scripted failure on call {call}");
        }
        Ok(self.result.clone())
    }
}

/// A source that always (or never) has a frame ready.
pub struct StaticSource {
    available: AtomicBool,
    captured: AtomicU64,
}

impl StaticSource {
    pub fn playing() -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(true),
            captured: AtomicU64::new(0),
        })
    }

    pub fn stalled() -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(false),
            captured: AtomicU64::new(0),
        })
    }

    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::SeqCst)
    }
}

impl VideoSource for StaticSource {
    fn capture_frame(&self) -> Option<VideoFrame> {
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        let sequence = self.captured.fetch_add(1, Ordering::SeqCst) + 1;
        Some(VideoFrame::new(vec![sequence as u8; 12], 2, 2, sequence))
    }

    fn is_playing(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// One person with a full-confidence pose, in 640x640 model space.
pub fn one_person(violation: bool) -> DetectionResult {
    let keypoints = (0..17)
        .map(|i| Keypoint {
            x: 300.0 + i as f32,
            y: 200.0 + 10.0 * i as f32,
            confidence: 0.9,
        })
        .collect();
    DetectionResult::new(
        vec![Detection::new([100.0, 100.0, 200.0, 400.0], 0.87).with_keypoints(keypoints)],
        violation,
    )
}

/// Synthetic transport config with a short, deterministic open latency.
pub fn quick_transport() -> SyntheticConfig {
    SyntheticConfig {
        width: 32,
        height: 24,
        open_latency: Duration::from_millis(100),
        ..SyntheticConfig::default()
    }
}

/// Records observer transitions.
#[derive(Clone, Default)]
pub struct StateLog(Arc<Mutex<Vec<ConnectionState>>>);

impl StateLog {
    pub fn observer(&self) -> impl FnMut(ConnectionState) + Send + 'static {
        let log = Arc::clone(&self.0);
        move |state| log.lock().unwrap().push(state)
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.0.lock().unwrap().clone()
    }
}
