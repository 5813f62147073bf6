//! Video transport collaborators.
//!
//! The pipeline only talks to the `VideoTransport` trait. Two implementations
//! ship with the crate:
//! - `SyntheticTransport`: generated scenes, failure injection, session ledger
//! - `GstreamerTransport`: RTSP via GStreamer (feature: rtsp-gstreamer)
//!
//! A transport MUST:
//! - Release every resource of a session in `close`
//! - Tolerate `close` for a handle it no longer knows (log, do not panic)

#[cfg(feature = "rtsp-gstreamer")]
mod rtsp_gstreamer;
mod session;
pub mod synthetic;

#[cfg(feature = "rtsp-gstreamer")]
pub use rtsp_gstreamer::GstreamerTransport;
pub use session::{SessionHandle, TransportSession, VideoTransport};
pub use synthetic::{SyntheticConfig, SyntheticStats, SyntheticTransport};
