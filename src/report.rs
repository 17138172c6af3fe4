//! Error reporting for recoverable failures.
//!
//! Nothing in the session core is fatal. Inference, export, history and
//! backpressure failures degrade a single frame or session and are sent here
//! so they stay observable.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::fmt;

use crate::SessionId;

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Export sink could not open session resources. The session runs without durable export.
    BeginSession,
    /// Frame source refused to start. The session was rolled back.
    SourceStart,
    Inference,
    InferenceTimeout,
    Export,
    /// Pipeline queue was full; the frame was not accepted.
    FrameDropped,
    History,
    Permissions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub session_id: Option<SessionId>,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(kind: ErrorKind, session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        Self {
            kind,
            session_id,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session_id {
            Some(id) => write!(f, "{:?} (session {}): {}", self.kind, id, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

/// Sink for recoverable failures. Must not block the caller.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, event: ErrorEvent);
}

/// Writes every event to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, event: ErrorEvent) {
        log::warn!("{}", event);
    }
}

/// Forwards events to a bounded channel. Events are logged and discarded when
/// the channel is full or its receiver is gone.
#[derive(Clone, Debug)]
pub struct ChannelReporter {
    tx: Sender<ErrorEvent>,
}

impl ChannelReporter {
    pub fn bounded(capacity: usize) -> (Self, Receiver<ErrorEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl ErrorReporter for ChannelReporter {
    fn report(&self, event: ErrorEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) | Err(TrySendError::Disconnected(event)) => {
                log::warn!("error reporter channel unavailable, dropping: {}", event);
            }
        }
    }
}
