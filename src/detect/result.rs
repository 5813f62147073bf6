use serde::{Deserialize, Serialize};

use crate::Generation;

/// Number of body keypoints a pose detection carries (COCO layout).
pub const KEYPOINT_COUNT: usize = 17;

/// Result of running inference on one sampled frame.
///
/// All coordinates are in model space (see `ModelSpace`), never display pixels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Ordered detections; index order defines the "Person N" labels.
    #[serde(default)]
    pub detections: Vec<Detection>,
    /// Did any detection violate the configured safety rule?
    #[serde(default)]
    pub violation_detected: bool,
    /// Overall confidence for the frame.
    #[serde(default)]
    pub confidence: f32,
    /// Number of detections reported by the inference service.
    #[serde(default)]
    pub count: usize,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>, violation_detected: bool) -> Self {
        let confidence = detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0_f32, f32::max);
        let count = detections.len();
        Self {
            detections,
            violation_detected,
            confidence,
            count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// `[x1, y1, x2, y2]` in model space.
    pub bbox: [f32; 4],
    pub confidence: f32,
    /// Pose keypoints, when the model produces them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Vec<Keypoint>>,
}

impl Detection {
    pub fn new(bbox: [f32; 4], confidence: f32) -> Self {
        Self {
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
            keypoints: None,
        }
    }

    pub fn with_keypoints(mut self, keypoints: Vec<Keypoint>) -> Self {
        self.keypoints = Some(keypoints);
        self
    }
}

/// One pose keypoint; serialised as `[x, y, confidence]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }
}

impl From<[f32; 3]> for Keypoint {
    fn from([x, y, confidence]: [f32; 3]) -> Self {
        Self { x, y, confidence }
    }
}

impl From<Keypoint> for [f32; 3] {
    fn from(kp: Keypoint) -> Self {
        [kp.x, kp.y, kp.confidence]
    }
}

/// A detection result stamped with the tick that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct TaggedResult {
    /// Generation active when the tick was scheduled.
    pub generation: Generation,
    /// Tick index within the scheduler run (starts at 1).
    pub tick: u64,
    pub result: DetectionResult,
}
