use std::time::Duration;

use thiserror::Error;

use crate::pipeline::PlaybackState;
use crate::DeviceId;

/// Failures the pipeline surfaces to the host.
///
/// Stale results (generation mismatch) are not represented here: they are a
/// discard condition and never leave the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The transport could not be established for a device.
    #[error("connect to {device} failed: {reason}")]
    ConnectFailure { device: DeviceId, reason: String },

    /// The connection is up but the media element refused to start (e.g. autoplay blocked).
    #[error("playback on {device} did not start: {reason}")]
    PlaybackStartFailure { device: DeviceId, reason: String },

    /// A single detection tick's inference returned an error.
    #[error("inference for tick {tick} failed: {reason}")]
    InferenceTickFailure { tick: u64, reason: String },

    /// A single detection tick's inference exceeded its deadline.
    #[error("inference for tick {tick} timed out after {timeout:?}")]
    InferenceTimeout { tick: u64, timeout: Duration },

    /// Manual retry requested while the controller is not in `Failed`.
    #[error("manual retry is only available after a failed connect (state: {state:?})")]
    RetryUnavailable { state: PlaybackState },
}

impl PipelineError {
    pub(crate) fn connect(device: &DeviceId, err: &anyhow::Error) -> Self {
        Self::ConnectFailure {
            device: device.clone(),
            reason: format!("{err:#}"),
        }
    }

    /// Whether the host should present a user-visible retry affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectFailure { .. })
    }
}
