//! The live annotated video pipeline.
//!
//! - `connection`: one transport session at a time, with a single automatic retry
//! - `scheduler`: fixed-cadence sampling with at most one inference in flight
//! - `overlay`: pure translation of detections into draw commands
//! - `surface`: where draw commands land
//! - `controller`: ties the above together for one video pane

mod connection;
mod controller;
mod overlay;
mod scheduler;
mod surface;

pub use connection::{
    ConnectAttempt, ConnectOutcome, Connection, ConnectionEvent, ConnectionManager,
    ConnectionState, StateObserver,
};
pub use controller::{ControllerStats, PlaybackController, PlaybackEvent, PlaybackState};
pub use overlay::{
    clear, label_text, render, DrawCommand, ModelSpace, OverlayRenderer, Palette, Point, Rect,
    Rgba, Scale, SurfaceSize, ALERT_PALETTE, KEYPOINT_CONFIDENCE_THRESHOLD, NORMAL_PALETTE,
    SKELETON_EDGES,
};
pub use scheduler::{DetectionScheduler, ResultCallback, SchedulerConfig, SchedulerStats};
#[cfg(feature = "raster")]
pub use surface::ImageSurface;
pub use surface::{RecordingSurface, RenderSurface, DEFAULT_HISTORY};
