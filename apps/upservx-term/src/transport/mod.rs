use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::session::Target;

pub mod mock;
pub mod websocket;

/// One message carried over the terminal channel in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn text(value: impl Into<String>) -> Self {
        Payload::Text(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ChannelState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChannelState::Closed | ChannelState::Errored)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
            ChannelState::Errored => "errored",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid terminal url: {0}")]
    InvalidUrl(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("credentials rejected: {0}")]
    Auth(String),
}

/// Inbound notifications from a channel, delivered in the order they happened.
///
/// `Closed` and `Failed` are terminal: a channel emits at most one of them and
/// nothing after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Message(Payload),
    Closed { code: Option<u16>, reason: String },
    Failed(TransportError),
}

impl ChannelEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelEvent::Closed { .. } | ChannelEvent::Failed(_))
    }
}

pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// The single owner of a network connection to one remote terminal.
pub trait Channel: Send {
    fn state(&self) -> ChannelState;

    /// Queue a payload for transmission. Payloads sent while the channel is not
    /// open are dropped.
    fn send(&mut self, payload: Payload);

    /// Release the underlying connection. Safe to call repeatedly.
    fn close(&mut self);

    fn is_disposed(&self) -> bool;

    /// How many times the underlying resource has actually been released.
    fn release_count(&self) -> usize;
}

/// Builds a fresh channel for a target. Channels are never reused.
pub trait Connector {
    type Channel: Channel;

    fn connect(&self, target: &Target) -> Result<(Self::Channel, ChannelEvents), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_bytes_cover_both_variants() {
        assert_eq!(Payload::text("ls").as_bytes(), b"ls");
        assert_eq!(Payload::Binary(vec![0x1b, b'[']).len(), 2);
        assert!(Payload::text("").is_empty());
    }

    #[test]
    fn only_close_and_failure_are_terminal() {
        assert!(!ChannelEvent::Opened.is_terminal());
        assert!(!ChannelEvent::Message(Payload::text("x")).is_terminal());
        assert!(
            ChannelEvent::Closed {
                code: None,
                reason: String::new()
            }
            .is_terminal()
        );
        assert!(ChannelEvent::Failed(TransportError::Handshake("refused".into())).is_terminal());
        assert!(ChannelState::Errored.is_terminal());
        assert!(!ChannelState::Connecting.is_terminal());
    }
}
