//! liveview - drive a live annotated video pane against synthetic devices.
//!
//! This binary:
//! 1. Builds one playback pipeline over the synthetic (or RTSP) transport and stub inference
//! 2. Cycles through the given devices on a fixed period, as a user switching cameras would
//! 3. Reacts to host events the way a UI would (resume blocked playback, press retry)
//! 4. Tears the pipeline down on exit and reports session and detection counters

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use live_overlay::pipeline::{ConnectionState, ControllerStats, SurfaceSize};
use live_overlay::transport::SyntheticTransport;
use live_overlay::{
    Device, DeviceId, InferenceService, PipelineConfig, PlaybackController, PlaybackEvent,
    RecordingSurface, RenderSurface, StubInference, VideoTransport,
};

#[path = "../ui.rs"]
mod ui;

/// Opens for a `--fail-device` device that fail; covers the automatic retry.
const INJECTED_FAILURES: u32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "liveview",
    about = "Live video pane with detection overlays over synthetic devices"
)]
struct Args {
    /// Device to cycle through, as ID or ID=NAME (repeatable)
    #[arg(long = "device", value_name = "ID[=NAME]", default_values = ["cam-1=Front door", "cam-2=Loading bay"])]
    devices: Vec<String>,

    /// Switch to the next device every N seconds (0 disables switching)
    #[arg(long, default_value_t = 6, value_name = "SECS")]
    switch_every_secs: u64,

    /// Stop after N seconds
    #[arg(long, default_value_t = 20, value_name = "SECS")]
    duration_secs: u64,

    /// Start with detection disabled
    #[arg(long)]
    no_detection: bool,

    /// Make the first connect and its automatic retry fail for this device (repeatable)
    #[arg(long, value_name = "ID")]
    fail_device: Vec<String>,

    /// Simulate a browser that blocks autoplay on first start
    #[arg(long)]
    autoplay_blocked: bool,

    /// Simulated inference round-trip
    #[arg(long, default_value_t = 120, value_name = "MS")]
    inference_latency_ms: u64,

    /// Open devices over RTSP instead, e.g. rtsp://nvr.local:554/{device}
    #[cfg(feature = "rtsp-gstreamer")]
    #[arg(long, value_name = "URL")]
    rtsp_url_template: Option<String>,

    /// UI mode for stderr status (auto|plain|pretty)
    #[arg(long, env = "LIVEVIEW_UI", default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let devices = args
        .devices
        .iter()
        .map(|spec| parse_device(spec))
        .collect::<Result<Vec<_>>>()?;
    if devices.is_empty() {
        return Err(anyhow!("at least one --device is required"));
    }

    let mut config = PipelineConfig::load()?;
    if args.no_detection {
        config.detection_enabled = false;
    }
    log::info!(
        "liveview starting: {} device(s), sample every {:?}, retry after {:?}, signaling {}",
        devices.len(),
        config.sample_interval,
        config.retry_delay,
        config.signaling_url
    );

    #[cfg(feature = "rtsp-gstreamer")]
    if let Some(template) = &args.rtsp_url_template {
        log::info!("RTSP sessions negotiate with each camera; signaling url unused");
        let transport = Arc::new(live_overlay::GstreamerTransport::new(template.as_str())?);
        let stats = run(&args, &config, transport, &devices).await?;
        log_stats(&stats);
        return Ok(());
    }

    let mut synthetic = config.synthetic_config();
    synthetic.autoplay_blocked = args.autoplay_blocked;
    let transport = Arc::new(SyntheticTransport::new(synthetic));
    for id in &args.fail_device {
        transport.fail_next(&DeviceId::new(id.as_str()), INJECTED_FAILURES);
    }

    let stats = run(&args, &config, Arc::clone(&transport), &devices).await?;
    log_stats(&stats);

    let sessions = transport.stats();
    log::info!(
        "sessions: opened={} closed={} peak_open={} still_open={}",
        sessions.opened_total,
        sessions.closed_total,
        sessions.peak_open,
        sessions.open
    );
    if sessions.open != 0 {
        return Err(anyhow!("{} session(s) leaked past teardown", sessions.open));
    }
    Ok(())
}

/// Host event loop for one pane. Returns the final counters after teardown.
async fn run<T: VideoTransport>(
    args: &Args,
    config: &PipelineConfig,
    transport: Arc<T>,
    devices: &[Device],
) -> Result<ControllerStats> {
    let inference = Arc::new(
        StubInference::new().with_latency(Duration::from_millis(args.inference_latency_ms)),
    );
    let surface = RecordingSurface::new(SurfaceSize::new(1280, 720));

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut controller = PlaybackController::new(config, transport, inference, surface, events_tx);

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);
    let mut status = ui.status("liveview");

    let mut current = 0usize;
    controller.on_device_change(Some(devices[current].clone()));

    let switching = args.switch_every_secs > 0 && devices.len() > 1;
    let period = Duration::from_secs(args.switch_every_secs.max(1));
    let mut switch = tokio::time::interval_at(Instant::now() + period, period);
    switch.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = tokio::time::sleep(Duration::from_secs(args.duration_secs));
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = controller.process_next() => {}
            Some(event) = events_rx.recv() => handle_event(&mut controller, &mut status, event),
            _ = switch.tick(), if switching => {
                current = (current + 1) % devices.len();
                status.note(&format!("switching to {}", devices[current].name));
                controller.on_device_change(Some(devices[current].clone()));
            }
            _ = &mut deadline => break,
            res = &mut ctrl_c => {
                res?;
                log::info!("interrupted");
                break;
            }
        }
    }

    let stats = controller.stats();
    controller.destroy();
    Ok(stats)
}

fn log_stats(stats: &ControllerStats) {
    log::info!(
        "detection: ticks={} issued={} delivered={} skipped_in_flight={} skipped_no_frame={} failures={} timeouts={} suppressed={}",
        stats.scheduler.ticks,
        stats.scheduler.inferences_issued,
        stats.scheduler.delivered,
        stats.scheduler.skipped_in_flight,
        stats.scheduler.skipped_no_frame,
        stats.scheduler.failures,
        stats.scheduler.timeouts,
        stats.scheduler.suppressed
    );
    log::info!(
        "overlay: rendered={} stale_discarded={} generation={}",
        stats.rendered,
        stats.stale_discarded,
        stats.generation
    );
}

fn handle_event<T, I, S>(
    controller: &mut PlaybackController<T, I, S>,
    status: &mut ui::StatusLine,
    event: PlaybackEvent,
) where
    T: VideoTransport,
    I: InferenceService,
    S: RenderSurface,
{
    let device = controller
        .device()
        .map(|d| d.name.clone())
        .unwrap_or_else(|| "no device".to_string());
    match event {
        PlaybackEvent::Connection(state) => {
            let label = match state {
                ConnectionState::Idle => "idle",
                ConnectionState::Connecting => "connecting",
                ConnectionState::Connected => "live",
                ConnectionState::Failed => "failed",
            };
            status.update(format!("{device}: {label}"));
        }
        PlaybackEvent::Detections {
            tick,
            count,
            violation,
            confidence,
            ..
        } => {
            let alert = if violation { " [ALERT]" } else { "" };
            status.update(format!(
                "{device}: live, {count} person(s), confidence {:.0}%, tick {tick}{alert}",
                confidence * 100.0
            ));
        }
        PlaybackEvent::OverlayCleared => {}
        PlaybackEvent::PlaybackBlocked(err) => {
            status.note(&format!("{err}; resuming"));
            if let Err(err) = controller.resume_playback() {
                log::warn!("resume failed: {}", err);
            }
        }
        PlaybackEvent::RetryRequired(err) => {
            status.note(&format!("{err}; retrying"));
            if let Err(err) = controller.retry() {
                log::warn!("retry rejected: {}", err);
            }
        }
    }
}

fn parse_device(spec: &str) -> Result<Device> {
    let (id, name) = match spec.split_once('=') {
        Some((id, name)) => (id.trim(), name.trim()),
        None => (spec.trim(), spec.trim()),
    };
    if id.is_empty() {
        return Err(anyhow!("device id must not be empty (got {spec:?})"));
    }
    Ok(Device::new(id, if name.is_empty() { id } else { name }))
}
