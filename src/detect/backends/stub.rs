use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::detect::backend::InferenceService;
use crate::detect::result::{Detection, DetectionResult, Keypoint, KEYPOINT_COUNT};
use crate::frame::VideoFrame;
use crate::pipeline::ModelSpace;

/// Stub backend for demos and tests. Hashes pixels to detect scene changes.
///
/// An unchanged frame yields an empty result. A changed frame yields one
/// synthetic person whose box and pose are derived from the frame hash, so the
/// same pixels always produce the same detection.
///
/// Every stream numbers its frames from 1, so a sequence that does not advance
/// marks a new stream. Its first frame becomes the baseline and is never
/// compared against the previous stream.
pub struct StubInference {
    last: Mutex<Option<LastFrame>>,
    latency: Duration,
    model_space: ModelSpace,
}

impl StubInference {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
            latency: Duration::ZERO,
            model_space: ModelSpace::default(),
        }
    }

    /// Simulate a remote inference round-trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn classify(&self, frame: &VideoFrame) -> Result<DetectionResult> {
        let current: [u8; 32] = Sha256::digest(frame.pixels()).into();
        let changed = {
            let mut last = self
                .last
                .lock()
                .map_err(|_| anyhow!("stub inference state poisoned"))?;
            let changed = last
                .is_some_and(|prev| frame.sequence > prev.sequence && prev.hash != current);
            *last = Some(LastFrame {
                sequence: frame.sequence,
                hash: current,
            });
            changed
        };

        if !changed {
            return Ok(DetectionResult::default());
        }

        let detection = synthetic_person(&current, self.model_space);
        let violation = current[31] & 1 == 1;
        Ok(DetectionResult::new(vec![detection], violation))
    }
}

impl Default for StubInference {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceService for StubInference {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn infer(&self, frame: VideoFrame) -> Result<DetectionResult> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.classify(&frame)
    }
}

#[derive(Clone, Copy)]
struct LastFrame {
    sequence: u64,
    hash: [u8; 32],
}

fn unit(byte: u8) -> f32 {
    byte as f32 / 255.0
}

fn synthetic_person(hash: &[u8; 32], space: ModelSpace) -> Detection {
    let width = 80.0 + unit(hash[2]) * 160.0;
    let height = 160.0 + unit(hash[3]) * 200.0;
    let x1 = unit(hash[0]) * (space.width - width).max(0.0);
    let y1 = unit(hash[1]) * (space.height - height).max(0.0);
    let bbox = [x1, y1, x1 + width, y1 + height];
    let confidence = 0.5 + unit(hash[4]) * 0.5;

    let keypoints = (0..KEYPOINT_COUNT)
        .map(|i| {
            let (fx, fy) = POSE_TEMPLATE[i];
            Keypoint::new(
                x1 + fx * width,
                y1 + fy * height,
                unit(hash[(5 + i) % 32]),
            )
        })
        .collect();

    Detection::new(bbox, confidence).with_keypoints(keypoints)
}

/// Standing pose as fractions of the box, COCO keypoint order.
const POSE_TEMPLATE: [(f32, f32); KEYPOINT_COUNT] = [
    (0.50, 0.08),
    (0.46, 0.06),
    (0.54, 0.06),
    (0.42, 0.08),
    (0.58, 0.08),
    (0.35, 0.22),
    (0.65, 0.22),
    (0.28, 0.38),
    (0.72, 0.38),
    (0.25, 0.52),
    (0.75, 0.52),
    (0.40, 0.55),
    (0.60, 0.55),
    (0.40, 0.75),
    (0.60, 0.75),
    (0.40, 0.95),
    (0.60, 0.95),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: &[u8], sequence: u64) -> VideoFrame {
        VideoFrame::new(data.to_vec(), 4, 4, sequence)
    }

    #[tokio::test]
    async fn stub_reports_person_only_on_scene_change() {
        let backend = StubInference::new();

        let r1 = backend.infer(frame(b"frame1", 1)).await.unwrap();
        assert!(r1.is_empty());

        let r2 = backend.infer(frame(b"frame2", 2)).await.unwrap();
        assert_eq!(r2.count, 1);
        let person = &r2.detections[0];
        assert_eq!(person.keypoints.as_ref().map(Vec::len), Some(KEYPOINT_COUNT));
        assert!(person.bbox[2] <= 640.0 && person.bbox[3] <= 640.0);

        let r3 = backend.infer(frame(b"frame2", 3)).await.unwrap();
        assert!(r3.is_empty());
    }

    #[tokio::test]
    async fn identical_transitions_produce_identical_detections() {
        let a = StubInference::new();
        let b = StubInference::new();
        for backend in [&a, &b] {
            backend.infer(frame(b"before", 1)).await.unwrap();
        }
        let ra = a.infer(frame(b"after", 2)).await.unwrap();
        let rb = b.infer(frame(b"after", 2)).await.unwrap();
        assert_eq!(ra, rb);
    }

    #[tokio::test]
    async fn first_frame_of_a_new_stream_is_a_baseline() {
        let backend = StubInference::new();
        backend.infer(frame(b"cam-1 a", 1)).await.unwrap();
        backend.infer(frame(b"cam-1 b", 2)).await.unwrap();

        // Switched cameras: the new stream starts counting again.
        let first = backend.infer(frame(b"cam-2 a", 1)).await.unwrap();
        assert!(first.is_empty());

        let next = backend.infer(frame(b"cam-2 b", 2)).await.unwrap();
        assert_eq!(next.count, 1);
    }
}
