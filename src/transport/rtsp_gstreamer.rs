//! RTSP transport backed by GStreamer.
//!
//! Each session is one `rtspsrc ! decodebin ! videoconvert ! appsink` pipeline.
//! The appsink keeps a single buffer and drops older ones, so `capture_frame`
//! always returns the most recent decoded frame without blocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;

use super::session::{SessionHandle, TransportSession, VideoTransport};
use crate::frame::{VideoFrame, VideoSource};
use crate::Device;

/// Transport that opens one RTSP pipeline per device.
pub struct GstreamerTransport {
    /// URL with a `{device}` placeholder, e.g. `rtsp://nvr.local:554/{device}`.
    url_template: String,
    next_handle: AtomicU64,
    pipelines: Mutex<HashMap<SessionHandle, gstreamer::Pipeline>>,
}

impl GstreamerTransport {
    pub fn new(url_template: impl Into<String>) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;
        Ok(Self {
            url_template: url_template.into(),
            next_handle: AtomicU64::new(1),
            pipelines: Mutex::new(HashMap::new()),
        })
    }

    fn url_for(&self, device: &Device) -> String {
        self.url_template.replace("{device}", device.id.as_str())
    }
}

impl VideoTransport for GstreamerTransport {
    fn name(&self) -> &'static str {
        "rtsp-gstreamer"
    }

    async fn open(&self, device: &Device) -> Result<TransportSession> {
        let url = self.url_for(device);
        let (pipeline, appsink) = build_pipeline(&url)?;
        pipeline
            .set_state(gstreamer::State::Playing)
            .with_context(|| format!("set RTSP pipeline for {} to Playing", device.id))?;

        let handle = SessionHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.pipelines
            .lock()
            .map_err(|_| anyhow!("pipeline table poisoned"))?
            .insert(handle, pipeline.clone());
        log::info!("GstreamerTransport: opened {} for {}", handle, url);

        Ok(TransportSession {
            handle,
            stream: Arc::new(GstreamerStream {
                pipeline,
                appsink,
                frame_count: AtomicU64::new(0),
            }),
        })
    }

    fn close(&self, handle: SessionHandle) {
        let pipeline = self
            .pipelines
            .lock()
            .ok()
            .and_then(|mut pipelines| pipelines.remove(&handle));
        match pipeline {
            Some(pipeline) => {
                if let Err(err) = pipeline.set_state(gstreamer::State::Null) {
                    log::warn!("GstreamerTransport: stopping {} failed: {}", handle, err);
                }
                log::info!("GstreamerTransport: closed {}", handle);
            }
            None => log::warn!("GstreamerTransport: close of unknown {}", handle),
        }
    }
}

struct GstreamerStream {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: AtomicU64,
}

impl VideoSource for GstreamerStream {
    fn capture_frame(&self) -> Option<VideoFrame> {
        let sample = self.appsink.try_pull_sample(gstreamer::ClockTime::ZERO)?;
        match sample_to_pixels(&sample) {
            Ok((pixels, width, height)) => {
                let sequence = self.frame_count.fetch_add(1, Ordering::SeqCst) + 1;
                Some(VideoFrame::new(pixels, width, height, sequence))
            }
            Err(err) => {
                log::warn!("GstreamerStream: dropping undecodable sample: {:#}", err);
                None
            }
        }
    }

    fn start_playback(&self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("resume RTSP pipeline")?;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.pipeline.current_state() == gstreamer::State::Playing
    }
}

fn build_pipeline(url: &str) -> Result<(gstreamer::Pipeline, gstreamer_app::AppSink)> {
    let description = format!(
        "rtspsrc location={} latency=0 ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
         appsink name=appsink sync=false max-buffers=1 drop=true",
        url
    );
    let pipeline = gstreamer::parse::launch(&description)
        .context("build RTSP pipeline")?
        .downcast::<gstreamer::Pipeline>()
        .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;

    let appsink = pipeline
        .by_name("appsink")
        .context("appsink element missing from pipeline")?
        .downcast::<gstreamer_app::AppSink>()
        .map_err(|_| anyhow!("appsink element has unexpected type"))?;

    let caps = gstreamer::Caps::builder("video/x-raw")
        .field("format", "RGB")
        .build();
    appsink.set_caps(Some(&caps));
    appsink.set_max_buffers(1);
    appsink.set_drop(true);
    appsink.set_sync(false);

    Ok((pipeline, appsink))
}

fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("buffer row is out of bounds")?,
        );
    }
    Ok((pixels, width, height))
}
