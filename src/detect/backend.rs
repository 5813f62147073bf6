use std::future::Future;

use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::VideoFrame;

/// Inference collaborator.
///
/// Implementations own the frame for the duration of the call and must not
/// retain its pixels afterwards. Overlapping calls carry no ordering guarantee;
/// the scheduler therefore never issues more than one at a time per run.
pub trait InferenceService: Send + Sync + 'static {
    /// Backend identifier (for logs).
    fn name(&self) -> &'static str;

    /// Run detection on a captured frame.
    fn infer(&self, frame: VideoFrame) -> impl Future<Output = Result<DetectionResult>> + Send;
}
