//! Synthetic transport for demos and tests.
//!
//! Every device opens a session whose stream renders a generated scene. The
//! scene changes every few captures so that the stub inference backend has
//! something to report.
//!
//! The transport keeps an exact ledger of open sessions (current and peak), which
//! is what the pipeline tests use to prove that connections never overlap and
//! never leak.
//!
//! Sessions negotiate only with `stub://` signaling endpoints; any other
//! endpoint fails the open like an unreachable signaling server would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use super::session::{SessionHandle, TransportSession, VideoTransport};
use crate::frame::{VideoFrame, VideoSource};
use crate::{Device, DeviceId};

/// Captures between scene changes.
const SCENE_PERIOD: u64 = 4;

const STUB_SCHEME: &str = "stub://";

/// Configuration for the synthetic transport.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Frame width of generated streams.
    pub width: u32,
    /// Frame height of generated streams.
    pub height: u32,
    /// Simulated signaling/negotiation time per open.
    pub open_latency: Duration,
    /// When set, the first automatic playback start of every stream fails.
    pub autoplay_blocked: bool,
    /// Signaling endpoint every session negotiates with.
    pub signaling_url: String,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            open_latency: Duration::from_millis(150),
            autoplay_blocked: false,
            signaling_url: "stub://signaling".to_string(),
        }
    }
}

/// In-process transport producing generated video.
pub struct SyntheticTransport {
    config: SyntheticConfig,
    next_handle: AtomicU64,
    sessions: Mutex<HashMap<SessionHandle, DeviceId>>,
    peak_open: AtomicUsize,
    opened_total: AtomicU64,
    closed_total: AtomicU64,
    failures: Mutex<HashMap<DeviceId, u32>>,
}

impl SyntheticTransport {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            next_handle: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            peak_open: AtomicUsize::new(0),
            opened_total: AtomicU64::new(0),
            closed_total: AtomicU64::new(0),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Make the next `attempts` opens for `device` fail.
    pub fn fail_next(&self, device: &DeviceId, attempts: u32) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(device.clone(), attempts);
        }
    }

    pub fn signaling_url(&self) -> &str {
        &self.config.signaling_url
    }

    /// Sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Highest number of sessions that were ever open at the same time.
    pub fn peak_open_sessions(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SyntheticStats {
        SyntheticStats {
            open: self.open_sessions(),
            peak_open: self.peak_open_sessions(),
            opened_total: self.opened_total.load(Ordering::SeqCst),
            closed_total: self.closed_total.load(Ordering::SeqCst),
        }
    }

    fn take_failure(&self, device: &DeviceId) -> Result<bool> {
        let mut failures = self
            .failures
            .lock()
            .map_err(|_| anyhow!("failure table poisoned"))?;
        match failures.get_mut(device) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Default for SyntheticTransport {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl VideoTransport for SyntheticTransport {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn open(&self, device: &Device) -> Result<TransportSession> {
        if !self.config.open_latency.is_zero() {
            tokio::time::sleep(self.config.open_latency).await;
        }
        if !self.config.signaling_url.starts_with(STUB_SCHEME) {
            bail!(
                "synthetic transport cannot negotiate via {}",
                self.config.signaling_url
            );
        }
        if self.take_failure(&device.id)? {
            bail!("synthetic transport refused {}", device.id);
        }

        let handle = SessionHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let open = {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| anyhow!("session table poisoned"))?;
            sessions.insert(handle, device.id.clone());
            sessions.len()
        };
        self.peak_open.fetch_max(open, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "SyntheticTransport: opened {} for {} via {}",
            handle,
            device.id,
            self.config.signaling_url
        );

        let stream = SyntheticStream::new(&self.config, rand::random::<u8>());
        Ok(TransportSession {
            handle,
            stream: Arc::new(stream),
        })
    }

    fn close(&self, handle: SessionHandle) {
        let removed = self
            .sessions
            .lock()
            .ok()
            .and_then(|mut sessions| sessions.remove(&handle));
        match removed {
            Some(device) => {
                self.closed_total.fetch_add(1, Ordering::SeqCst);
                log::info!("SyntheticTransport: closed {} for {}", handle, device);
            }
            None => log::warn!("SyntheticTransport: close of unknown {}", handle),
        }
    }
}

/// Counters exposed for health logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyntheticStats {
    pub open: usize,
    pub peak_open: usize,
    pub opened_total: u64,
    pub closed_total: u64,
}

// ----------------------------------------------------------------------------
// Generated stream
// ----------------------------------------------------------------------------

struct SyntheticStream {
    width: u32,
    height: u32,
    seed: u8,
    frame_count: AtomicU64,
    playing: AtomicBool,
    autoplay_blocked: AtomicBool,
}

impl SyntheticStream {
    fn new(config: &SyntheticConfig, seed: u8) -> Self {
        Self {
            width: config.width,
            height: config.height,
            seed,
            frame_count: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            autoplay_blocked: AtomicBool::new(config.autoplay_blocked),
        }
    }

    /// Fills the frame with a gradient that shifts with the scene index.
    fn generate_pixels(&self, frame_count: u64) -> Vec<u8> {
        let pixel_count = (self.width * self.height * 3) as usize;
        let scene = frame_count / SCENE_PERIOD;
        let offset = scene.wrapping_mul(37).wrapping_add(self.seed as u64);
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + offset) % 256) as u8;
        }
        pixels
    }
}

impl VideoSource for SyntheticStream {
    fn capture_frame(&self) -> Option<VideoFrame> {
        if !self.playing.load(Ordering::SeqCst) {
            return None;
        }
        let sequence = self.frame_count.fetch_add(1, Ordering::SeqCst) + 1;
        let pixels = self.generate_pixels(sequence);
        Some(VideoFrame::new(pixels, self.width, self.height, sequence))
    }

    /// The first start fails when autoplay is blocked; a later (user-initiated)
    /// start succeeds.
    fn start_playback(&self) -> Result<()> {
        if self.autoplay_blocked.swap(false, Ordering::SeqCst) {
            bail!("autoplay blocked; user interaction required");
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_config() -> SyntheticConfig {
        SyntheticConfig {
            width: 8,
            height: 6,
            open_latency: Duration::ZERO,
            ..SyntheticConfig::default()
        }
    }

    #[tokio::test]
    async fn open_and_close_keep_an_exact_ledger() -> Result<()> {
        let transport = SyntheticTransport::new(instant_config());
        let a = transport.open(&Device::new("cam-a", "A")).await?;
        let b = transport.open(&Device::new("cam-b", "B")).await?;
        assert_eq!(transport.open_sessions(), 2);

        transport.close(a.handle);
        transport.close(b.handle);
        transport.close(b.handle);

        let stats = transport.stats();
        assert_eq!(stats.open, 0);
        assert_eq!(stats.peak_open, 2);
        assert_eq!(stats.opened_total, 2);
        assert_eq!(stats.closed_total, 2);
        Ok(())
    }

    #[tokio::test]
    async fn sessions_negotiate_only_with_stub_signaling() {
        let device = Device::new("cam-a", "A");
        let transport = SyntheticTransport::new(SyntheticConfig {
            signaling_url: "stub://lab".to_string(),
            ..instant_config()
        });
        assert_eq!(transport.signaling_url(), "stub://lab");
        assert!(transport.open(&device).await.is_ok());

        let transport = SyntheticTransport::new(SyntheticConfig {
            signaling_url: "wss://signaling.example/ws".to_string(),
            ..instant_config()
        });
        let err = transport.open(&device).await.err().unwrap();
        assert!(err.to_string().contains("wss://signaling.example/ws"));
        assert_eq!(transport.stats().opened_total, 0);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let transport = SyntheticTransport::new(instant_config());
        let device = Device::new("cam-f", "Flaky");
        transport.fail_next(&device.id, 1);

        assert!(transport.open(&device).await.is_err());
        assert!(transport.open(&device).await.is_ok());
    }

    #[tokio::test]
    async fn stream_yields_frames_only_while_playing() -> Result<()> {
        let transport = SyntheticTransport::new(instant_config());
        let session = transport.open(&Device::new("cam-a", "A")).await?;
        assert!(session.stream.capture_frame().is_none());

        session.stream.start_playback()?;
        let frame = session.stream.capture_frame().expect("frame while playing");
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(frame.byte_len(), 8 * 6 * 3);
        Ok(())
    }

    #[tokio::test]
    async fn blocked_autoplay_needs_a_second_start() -> Result<()> {
        let transport = SyntheticTransport::new(SyntheticConfig {
            autoplay_blocked: true,
            ..instant_config()
        });
        let session = transport.open(&Device::new("cam-a", "A")).await?;
        assert!(session.stream.start_playback().is_err());
        assert!(!session.stream.is_playing());
        session.stream.start_playback()?;
        assert!(session.stream.is_playing());
        Ok(())
    }
}
