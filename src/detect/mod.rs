//! Detection data model and the inference collaborator.
//!
//! Results are expressed in model space; the overlay renderer is the only place
//! that converts them to display coordinates.

mod backend;
mod backends;
mod result;

pub use backend::InferenceService;
pub use backends::StubInference;
pub use result::{Detection, DetectionResult, Keypoint, TaggedResult, KEYPOINT_COUNT};
