//! Orchestrates connection, detection and overlay for a single video pane.
//!
//! The controller is the only component the host talks to. Host inputs
//! (`on_device_change`, `on_toggle_detection`, `retry`, `resume_playback`,
//! `destroy`) are synchronous and never wait on I/O. Asynchronous completions
//! (connect attempts, detection results) are applied by `process_next`, which
//! the host awaits alongside its own input sources.
//!
//! Device change ordering is fixed:
//! 1. stop detection
//! 2. disconnect
//! 3. clear the overlay
//! 4. bump the generation
//! 5. connect to the new device (if any)
//! 6. start detection once connected, bound to the new generation
//!
//! A result is rendered only while its generation is current.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::connection::{ConnectOutcome, ConnectionEvent, ConnectionManager, ConnectionState};
use super::overlay::OverlayRenderer;
use super::scheduler::{DetectionScheduler, SchedulerStats};
use super::surface::RenderSurface;
use crate::config::PipelineConfig;
use crate::detect::{InferenceService, TaggedResult};
use crate::error::PipelineError;
use crate::frame::VideoSourceRef;
use crate::transport::VideoTransport;
use crate::{Device, Generation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// No device selected.
    Idle,
    Connecting,
    /// Connected; detection runs when enabled.
    Live,
    /// Connect failed; manual retry available.
    Failed,
}

/// Notifications for the host UI, delivered in the order they occur.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackEvent {
    Connection(ConnectionState),
    Detections {
        generation: Generation,
        tick: u64,
        count: usize,
        violation: bool,
        confidence: f32,
    },
    OverlayCleared,
    /// Connected, but the media did not start; `resume_playback` after user input.
    PlaybackBlocked(PipelineError),
    /// Connect failed after the automatic retry; only `retry` recovers.
    RetryRequired(PipelineError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub generation: Generation,
    pub rendered: u64,
    pub stale_discarded: u64,
    pub scheduler: SchedulerStats,
}

pub struct PlaybackController<T, I, S>
where
    T: VideoTransport,
    I: InferenceService,
    S: RenderSurface,
{
    connections: ConnectionManager<T>,
    scheduler: DetectionScheduler<I>,
    renderer: OverlayRenderer,
    surface: S,
    device: Option<Device>,
    detection_enabled: bool,
    generation: Generation,
    stream: Option<VideoSourceRef>,
    results_tx: mpsc::UnboundedSender<TaggedResult>,
    results_rx: mpsc::UnboundedReceiver<TaggedResult>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    rendered: u64,
    stale_discarded: u64,
    destroyed: bool,
}

impl<T, I, S> PlaybackController<T, I, S>
where
    T: VideoTransport,
    I: InferenceService,
    S: RenderSurface,
{
    pub fn new(
        config: &PipelineConfig,
        transport: Arc<T>,
        inference: Arc<I>,
        surface: S,
        events: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Self {
        let observer_events = events.clone();
        let connections = ConnectionManager::new(transport, config.retry_delay).with_observer(
            move |state| {
                let _ = observer_events.send(PlaybackEvent::Connection(state));
            },
        );
        let scheduler = DetectionScheduler::new(inference, config.scheduler_config());
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            connections,
            scheduler,
            renderer: OverlayRenderer::new(config.model_space),
            surface,
            device: None,
            detection_enabled: config.detection_enabled,
            generation: 0,
            stream: None,
            results_tx,
            results_rx,
            events,
            rendered: 0,
            stale_discarded: 0,
            destroyed: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.device.is_none() {
            return PlaybackState::Idle;
        }
        match self.connections.state() {
            ConnectionState::Idle | ConnectionState::Connecting => PlaybackState::Connecting,
            ConnectionState::Connected => PlaybackState::Live,
            ConnectionState::Failed => PlaybackState::Failed,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connections.state()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn detection_enabled(&self) -> bool {
        self.detection_enabled
    }

    /// Whether the detection loop is currently running.
    pub fn is_detecting(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Host access to the surface, e.g. to resize it with the video element.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn transport(&self) -> &Arc<T> {
        self.connections.transport()
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            generation: self.generation,
            rendered: self.rendered,
            stale_discarded: self.stale_discarded,
            scheduler: self.scheduler.stats(),
        }
    }

    /// The host selected a different device, or cleared the selection.
    pub fn on_device_change(&mut self, device: Option<Device>) {
        let current = self.device.as_ref().map(|d| &d.id);
        if current == device.as_ref().map(|d| &d.id) {
            return;
        }
        self.teardown();
        self.device = device;
        if let Some(device) = self.device.clone() {
            self.connections.connect(&device, self.generation);
        }
    }

    /// Enable or disable detection without touching the connection.
    pub fn on_toggle_detection(&mut self, enabled: bool) {
        if self.detection_enabled == enabled {
            return;
        }
        self.detection_enabled = enabled;
        if enabled {
            if self.connections.state() == ConnectionState::Connected {
                self.start_detection();
            }
        } else {
            self.scheduler.stop();
            self.drain_results();
            self.clear_overlay();
        }
    }

    /// User-initiated reconnect after a failed connect.
    pub fn retry(&mut self) -> Result<(), PipelineError> {
        let state = self.state();
        let device = match (&self.device, state) {
            (Some(device), PlaybackState::Failed) => device.clone(),
            _ => return Err(PipelineError::RetryUnavailable { state }),
        };
        log::info!("manual retry for {}", device.id);
        self.scheduler.stop();
        self.clear_overlay();
        self.generation += 1;
        self.connections.connect(&device, self.generation);
        Ok(())
    }

    /// User-initiated playback start after `PlaybackBlocked`.
    pub fn resume_playback(&mut self) -> Result<(), PipelineError> {
        let (Some(stream), Some(device)) = (&self.stream, &self.device) else {
            return Ok(());
        };
        if stream.is_playing() {
            return Ok(());
        }
        stream
            .start_playback()
            .map_err(|err| PipelineError::PlaybackStartFailure {
                device: device.id.clone(),
                reason: format!("{err:#}"),
            })
    }

    /// Wait for the next asynchronous completion and apply it. Cancel-safe.
    pub async fn process_next(&mut self) {
        tokio::select! {
            outcome = self.connections.recv() => self.apply_connection_outcome(outcome),
            Some(tagged) = self.results_rx.recv() => self.apply_result(tagged),
        }
    }

    /// Full teardown. No connection or detection loop outlives this call.
    pub fn destroy(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.teardown();
        self.device = None;
        log::debug!("playback controller destroyed at generation {}", self.generation);
    }

    fn teardown(&mut self) {
        self.scheduler.stop();
        self.connections.disconnect();
        self.stream = None;
        self.clear_overlay();
        self.generation += 1;
    }

    fn apply_connection_outcome(&mut self, outcome: ConnectOutcome<T>) {
        match self.connections.apply(outcome) {
            Some(ConnectionEvent::Connected {
                generation,
                device,
                stream,
            }) => {
                debug_assert_eq!(generation, self.generation);
                log::info!("live on {} (generation {})", device.id, generation);
                self.stream = Some(Arc::clone(&stream));
                if let Err(err) = stream.start_playback() {
                    let error = PipelineError::PlaybackStartFailure {
                        device: device.id.clone(),
                        reason: format!("{err:#}"),
                    };
                    log::warn!("{}", error);
                    self.emit(PlaybackEvent::PlaybackBlocked(error));
                }
                if self.detection_enabled {
                    self.start_detection();
                }
            }
            Some(ConnectionEvent::Failed {
                error,
                retry_in: None,
                ..
            }) => {
                log::warn!("giving up on automatic reconnect: {}", error);
                self.emit(PlaybackEvent::RetryRequired(error));
            }
            Some(ConnectionEvent::Failed { .. }) | None => {}
        }
    }

    fn apply_result(&mut self, tagged: TaggedResult) {
        if tagged.generation != self.generation || !self.scheduler.is_running() {
            self.stale_discarded += 1;
            log::debug!(
                "discarding result of tick {} from generation {} (current {})",
                tagged.tick,
                tagged.generation,
                self.generation
            );
            return;
        }
        let commands = self.renderer.render(&tagged.result, self.surface.size());
        self.surface.draw(&commands);
        self.rendered += 1;
        self.emit(PlaybackEvent::Detections {
            generation: tagged.generation,
            tick: tagged.tick,
            count: tagged.result.detections.len(),
            violation: tagged.result.violation_detected,
            confidence: tagged.result.confidence,
        });
    }

    fn start_detection(&mut self) {
        let Some(stream) = self.stream.clone() else {
            return;
        };
        let results = self.results_tx.clone();
        self.scheduler.start(self.generation, stream, move |tagged| {
            let _ = results.send(tagged);
        });
    }

    fn drain_results(&mut self) {
        while self.results_rx.try_recv().is_ok() {
            self.stale_discarded += 1;
        }
    }

    fn clear_overlay(&mut self) {
        let commands = self.renderer.clear(self.surface.size());
        self.surface.draw(&commands);
        self.emit(PlaybackEvent::OverlayCleared);
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }
}

impl<T, I, S> Drop for PlaybackController<T, I, S>
where
    T: VideoTransport,
    I: InferenceService,
    S: RenderSurface,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
