use std::fmt;
use std::future::Future;

use anyhow::Result;

use crate::frame::VideoSourceRef;
use crate::Device;

/// Opaque identifier of one transport session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// A freshly negotiated session: the handle to close and the stream it carries.
pub struct TransportSession {
    pub handle: SessionHandle,
    pub stream: VideoSourceRef,
}

/// Video transport collaborator (signaling + media negotiation).
///
/// `open` may take arbitrarily long and may fail. `close` must release every
/// resource associated with the handle; the pipeline calls it exactly once per
/// successfully opened session.
pub trait VideoTransport: Send + Sync + 'static {
    /// Transport identifier (for logs).
    fn name(&self) -> &'static str;

    /// Negotiate a live session with the device.
    fn open(&self, device: &Device) -> impl Future<Output = Result<TransportSession>> + Send;

    /// Tear down a session previously returned by `open`.
    fn close(&self, handle: SessionHandle);
}
