//! Connection lifecycle for one live video transport session.
//!
//! The manager owns at most one `Connection` and at most one pending connect
//! attempt. Attempts run as spawned tasks that never touch manager state; they
//! report a generation-tagged `ConnectOutcome` which the owner feeds back through
//! `apply`. An outcome that no longer matches the pending attempt is stale and is
//! dropped, which closes any session it carries.
//!
//! State flow:
//! `idle -> connecting -> connected`, or `connecting -> failed -> (retry delay)
//! -> connecting -> connected | failed`. After the automatic retry fails the
//! manager stays `failed` until the caller connects again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::frame::VideoSourceRef;
use crate::transport::{SessionHandle, TransportSession, VideoTransport};
use crate::{Device, Generation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Failed,
}

/// Receives every state transition, synchronously and in order.
pub type StateObserver = Box<dyn FnMut(ConnectionState) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectAttempt {
    Initial,
    AutoRetry,
}

// ----------------------------------------------------------------------------
// Connection: exclusive owner of one transport session
// ----------------------------------------------------------------------------

/// A live transport session bound to a device.
///
/// Not `Clone`. The session is released exactly once, either by the manager
/// during teardown or on drop.
pub struct Connection<T: VideoTransport> {
    device: Device,
    handle: Option<SessionHandle>,
    stream: VideoSourceRef,
    transport: Arc<T>,
}

impl<T: VideoTransport> Connection<T> {
    fn new(transport: Arc<T>, device: Device, session: TransportSession) -> Self {
        Self {
            device,
            handle: Some(session.handle),
            stream: session.stream,
            transport,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The media stream carried by this connection.
    pub fn stream(&self) -> VideoSourceRef {
        Arc::clone(&self.stream)
    }

    /// `None` once the session has been released.
    pub fn handle(&self) -> Option<SessionHandle> {
        self.handle
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("releasing {} for {}", handle, self.device.id);
            self.transport.close(handle);
        }
    }
}

impl<T: VideoTransport> Drop for Connection<T> {
    fn drop(&mut self) {
        self.release();
    }
}

// ----------------------------------------------------------------------------
// Outcomes reported by attempt tasks
// ----------------------------------------------------------------------------

/// Message from a connect attempt task. Opaque to callers; pass it to `apply`.
pub struct ConnectOutcome<T: VideoTransport> {
    generation: Generation,
    attempt: ConnectAttempt,
    kind: OutcomeKind<T>,
}

impl<T: VideoTransport> ConnectOutcome<T> {
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

enum OutcomeKind<T: VideoTransport> {
    Opened(Result<Connection<T>>),
    RetryDue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Opening,
    WaitingForRetry,
}

impl<T: VideoTransport> OutcomeKind<T> {
    fn phase(&self) -> Phase {
        match self {
            OutcomeKind::Opened(_) => Phase::Opening,
            OutcomeKind::RetryDue => Phase::WaitingForRetry,
        }
    }
}

/// What a current (non-stale) outcome meant for the connection.
pub enum ConnectionEvent {
    Connected {
        generation: Generation,
        device: Device,
        stream: VideoSourceRef,
    },
    Failed {
        generation: Generation,
        error: PipelineError,
        /// Delay before the automatic retry, or `None` when the caller must retry.
        retry_in: Option<Duration>,
    },
}

struct PendingConnect {
    generation: Generation,
    device: Device,
    attempt: ConnectAttempt,
    phase: Phase,
    task: JoinHandle<()>,
}

// ----------------------------------------------------------------------------
// ConnectionManager
// ----------------------------------------------------------------------------

pub struct ConnectionManager<T: VideoTransport> {
    transport: Arc<T>,
    retry_delay: Duration,
    state: ConnectionState,
    observer: Option<StateObserver>,
    connection: Option<Connection<T>>,
    pending: Option<PendingConnect>,
    outcomes_tx: mpsc::UnboundedSender<ConnectOutcome<T>>,
    outcomes_rx: mpsc::UnboundedReceiver<ConnectOutcome<T>>,
}

impl<T: VideoTransport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>, retry_delay: Duration) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            retry_delay,
            state: ConnectionState::Idle,
            observer: None,
            connection: None,
            pending: None,
            outcomes_tx,
            outcomes_rx,
        }
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(ConnectionState) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connection(&self) -> Option<&Connection<T>> {
        self.connection.as_ref()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Start connecting to `device`.
    ///
    /// Any open connection or pending attempt is torn down first, synchronously,
    /// so two sessions are never open at once. Closing a live connection is
    /// reported as `idle` before `connecting`. Must be called inside a tokio
    /// runtime.
    pub fn connect(&mut self, device: &Device, generation: Generation) {
        if self.connection.is_some() {
            self.disconnect();
        } else {
            self.release_resources();
        }
        log::info!(
            "connecting to {} ({}) generation={}",
            device.id,
            device.name,
            generation
        );
        self.set_state(ConnectionState::Connecting);
        self.spawn_open(device.clone(), generation, ConnectAttempt::Initial);
    }

    /// Tear down the connection. No-op when already idle.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Idle
            && self.connection.is_none()
            && self.pending.is_none()
        {
            return;
        }
        self.release_resources();
        self.set_state(ConnectionState::Idle);
    }

    /// Wait for the next attempt outcome. Cancel-safe.
    pub async fn recv(&mut self) -> ConnectOutcome<T> {
        match self.outcomes_rx.recv().await {
            Some(outcome) => outcome,
            // The manager holds a sender, so the channel never closes.
            None => std::future::pending().await,
        }
    }

    /// Apply an attempt outcome. Returns `None` for stale outcomes and for
    /// internal steps (retry timer firing).
    pub fn apply(&mut self, outcome: ConnectOutcome<T>) -> Option<ConnectionEvent> {
        let is_current = self.pending.as_ref().is_some_and(|p| {
            p.generation == outcome.generation
                && p.attempt == outcome.attempt
                && p.phase == outcome.kind.phase()
        });
        if !is_current {
            log::debug!(
                "discarding stale connect outcome for generation {}",
                outcome.generation
            );
            // Dropping a stale connection closes its session.
            return None;
        }
        let pending = self.pending.take()?;
        let generation = outcome.generation;

        match outcome.kind {
            OutcomeKind::RetryDue => {
                log::info!("retrying connect to {}", pending.device.id);
                self.set_state(ConnectionState::Connecting);
                self.spawn_open(pending.device, generation, ConnectAttempt::AutoRetry);
                None
            }
            OutcomeKind::Opened(Ok(connection)) => {
                let device = connection.device().clone();
                let stream = connection.stream();
                self.connection = Some(connection);
                self.set_state(ConnectionState::Connected);
                Some(ConnectionEvent::Connected {
                    generation,
                    device,
                    stream,
                })
            }
            OutcomeKind::Opened(Err(err)) => {
                let error = PipelineError::connect(&pending.device.id, &err);
                log::warn!("{} ({:?} attempt)", error, outcome.attempt);
                self.set_state(ConnectionState::Failed);
                let retry_in = match outcome.attempt {
                    ConnectAttempt::Initial => {
                        log::info!(
                            "scheduling automatic retry for {} in {:?}",
                            pending.device.id,
                            self.retry_delay
                        );
                        self.schedule_retry(pending.device, generation);
                        Some(self.retry_delay)
                    }
                    ConnectAttempt::AutoRetry => None,
                };
                Some(ConnectionEvent::Failed {
                    generation,
                    error,
                    retry_in,
                })
            }
        }
    }

    fn spawn_open(&mut self, device: Device, generation: Generation, attempt: ConnectAttempt) {
        let transport = Arc::clone(&self.transport);
        let outcomes = self.outcomes_tx.clone();
        let task_device = device.clone();
        let task = tokio::spawn(async move {
            let opened = transport.open(&task_device).await;
            let opened = opened.map(|session| Connection::new(transport, task_device, session));
            // If the manager is gone the outcome is dropped and the session closed.
            let _ = outcomes.send(ConnectOutcome {
                generation,
                attempt,
                kind: OutcomeKind::Opened(opened),
            });
        });
        self.pending = Some(PendingConnect {
            generation,
            device,
            attempt,
            phase: Phase::Opening,
            task,
        });
    }

    fn schedule_retry(&mut self, device: Device, generation: Generation) {
        let outcomes = self.outcomes_tx.clone();
        let delay = self.retry_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = outcomes.send(ConnectOutcome {
                generation,
                attempt: ConnectAttempt::AutoRetry,
                kind: OutcomeKind::RetryDue,
            });
        });
        self.pending = Some(PendingConnect {
            generation,
            device,
            attempt: ConnectAttempt::AutoRetry,
            phase: Phase::WaitingForRetry,
            task,
        });
    }

    /// Release media/signaling resources, then clear the references.
    fn release_resources(&mut self) {
        if let Some(pending) = self.pending.take() {
            log::debug!(
                "abandoning pending connect to {} (generation {})",
                pending.device.id,
                pending.generation
            );
            pending.task.abort();
        }
        if let Some(connection) = self.connection.as_mut() {
            connection.release();
        }
        self.connection = None;
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        log::debug!("connection state {:?} -> {:?}", self.state, next);
        self.state = next;
        if let Some(observer) = self.observer.as_mut() {
            observer(next);
        }
    }
}

impl<T: VideoTransport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.release_resources();
    }
}
