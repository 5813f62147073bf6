//! Captured frames and the sources they are captured from.
//!
//! - `VideoFrame`: one decoded frame sampled from a live stream. Pixels are private;
//!   inference backends read them through `pixels()` and must not retain them.
//! - `VideoSource`: the playing media a detection tick samples from.
//!
//! Frames are sampled on the detection cadence, not the video frame rate, so a
//! source only ever needs to hand out its most recent decoded frame.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

/// A single frame captured from the currently playing stream.
///
/// There is no `Clone`: a frame is handed to exactly one inference call.
pub struct VideoFrame {
    /// RGB pixel data, row-major, no padding.
    pixels: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Per-stream capture counter.
    pub sequence: u64,

    captured_at: Instant,
}

impl VideoFrame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Read-only view of the pixel data for inference.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Time since capture (used to log inference latency).
    pub fn age(&self) -> std::time::Duration {
        self.captured_at.elapsed()
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Playing media bound to a live connection.
pub trait VideoSource: Send + Sync {
    /// Capture the frame currently on screen.
    ///
    /// Returns `None` while nothing is playable yet (not started, autoplay
    /// blocked, no decoded frame).
    fn capture_frame(&self) -> Option<VideoFrame>;

    /// Start rendering frames. May fail when the host requires user interaction.
    fn start_playback(&self) -> Result<()> {
        Ok(())
    }

    /// Whether frames are currently flowing.
    fn is_playing(&self) -> bool {
        true
    }
}

/// Shared handle to the media stream of a connection.
pub type VideoSourceRef = Arc<dyn VideoSource>;
