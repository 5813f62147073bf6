//! Live Overlay
//!
//! This crate drives a live video pane annotated with person/pose detections.
//!
//! # Architecture
//!
//! The pipeline enforces five invariants by construction:
//!
//! 1. **One Session**: At most one transport session is open per pipeline.
//! 2. **One Inference**: At most one inference is in flight per detection run.
//! 3. **No Stale Overlays**: Results are tagged with the generation that produced
//!    them and dropped once the generation moves on.
//! 4. **Clear Before Draw**: Every overlay batch starts with a full clear.
//! 5. **Full Teardown**: Destroying a pipeline leaves no session or loop behind.
//!
//! # Module Structure
//!
//! - `frame`: Captured frames and the playable stream abstraction
//! - `detect`: Detection data model and inference collaborators
//! - `transport`: Session transports (synthetic, RTSP)
//! - `pipeline`: Connection manager, detection scheduler, overlay, controller
//! - `config`: Layered runtime configuration
//! - `error`: Typed pipeline failures

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod transport;

pub use config::PipelineConfig;
pub use detect::{
    Detection, DetectionResult, InferenceService, Keypoint, StubInference, TaggedResult,
};
pub use error::PipelineError;
pub use frame::{VideoFrame, VideoSource, VideoSourceRef};
pub use pipeline::{
    ConnectionManager, ConnectionState, DetectionScheduler, DrawCommand, OverlayRenderer,
    PlaybackController, PlaybackEvent, PlaybackState, RecordingSurface, RenderSurface,
    SurfaceSize,
};
#[cfg(feature = "rtsp-gstreamer")]
pub use transport::GstreamerTransport;
pub use transport::{SessionHandle, SyntheticTransport, TransportSession, VideoTransport};

/// Monotonic counter identifying one connect/detect cycle of a pipeline.
pub type Generation = u64;

// -------------------- Devices --------------------

/// Opaque identifier of a video device, as the device directory reports it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A selectable video device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: DeviceId::new(id),
            name: name.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}
