use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Channel, ChannelEvent, ChannelEvents, ChannelState, Connector, Payload, TransportError};
use crate::session::Target;

struct MockShared {
    state: ChannelState,
    sent: Vec<Payload>,
    disposed: bool,
    releases: usize,
    events: Option<mpsc::UnboundedSender<ChannelEvent>>,
}

/// In-memory channel whose remote end is driven by a [`MockRemote`].
pub struct MockChannel {
    shared: Arc<Mutex<MockShared>>,
}

/// Test handle standing in for the backend side of a [`MockChannel`].
#[derive(Clone)]
pub struct MockRemote {
    shared: Arc<Mutex<MockShared>>,
}

impl MockChannel {
    pub fn pair() -> (MockChannel, MockRemote, ChannelEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(MockShared {
            state: ChannelState::Connecting,
            sent: Vec::new(),
            disposed: false,
            releases: 0,
            events: Some(tx),
        }));
        (
            MockChannel {
                shared: shared.clone(),
            },
            MockRemote { shared },
            rx,
        )
    }
}

impl Channel for MockChannel {
    fn state(&self) -> ChannelState {
        self.shared.lock().state
    }

    fn send(&mut self, payload: Payload) {
        let mut shared = self.shared.lock();
        if shared.state != ChannelState::Open || shared.disposed {
            tracing::debug!(state = %shared.state, bytes = payload.len(), "mock channel dropped payload");
            return;
        }
        shared.sent.push(payload);
    }

    fn close(&mut self) {
        let mut shared = self.shared.lock();
        if shared.disposed {
            return;
        }
        shared.disposed = true;
        shared.releases += 1;
        shared.events = None;
        if !shared.state.is_terminal() {
            shared.state = ChannelState::Closed;
        }
    }

    fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    fn release_count(&self) -> usize {
        self.shared.lock().releases
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl MockRemote {
    /// Completes the handshake.
    pub fn open(&self) -> bool {
        self.transition(ChannelState::Open, ChannelEvent::Opened)
    }

    pub fn message(&self, payload: Payload) -> bool {
        let shared = self.shared.lock();
        if shared.state != ChannelState::Open {
            return false;
        }
        match shared.events.as_ref() {
            Some(tx) => tx.send(ChannelEvent::Message(payload)).is_ok(),
            None => false,
        }
    }

    pub fn text(&self, text: &str) -> bool {
        self.message(Payload::text(text))
    }

    pub fn close(&self, code: Option<u16>, reason: &str) -> bool {
        self.transition(
            ChannelState::Closed,
            ChannelEvent::Closed {
                code,
                reason: reason.to_string(),
            },
        )
    }

    pub fn fail(&self, error: TransportError) -> bool {
        self.transition(ChannelState::Errored, ChannelEvent::Failed(error))
    }

    pub fn sent(&self) -> Vec<Payload> {
        self.shared.lock().sent.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    pub fn release_count(&self) -> usize {
        self.shared.lock().releases
    }

    pub fn state(&self) -> ChannelState {
        self.shared.lock().state
    }

    fn transition(&self, next: ChannelState, event: ChannelEvent) -> bool {
        let mut shared = self.shared.lock();
        if shared.disposed || shared.state.is_terminal() {
            return false;
        }
        let delivered = match shared.events.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        };
        shared.state = next;
        if next.is_terminal() {
            shared.events = None;
        }
        delivered
    }
}

/// Hands out one prepared [`MockChannel`]; a second connect is refused.
pub struct MockConnector {
    prepared: Mutex<Option<(MockChannel, ChannelEvents)>>,
    refusal: Option<TransportError>,
}

impl MockConnector {
    pub fn new() -> (MockConnector, MockRemote) {
        let (channel, remote, events) = MockChannel::pair();
        (
            MockConnector {
                prepared: Mutex::new(Some((channel, events))),
                refusal: None,
            },
            remote,
        )
    }

    pub fn refusing(error: TransportError) -> MockConnector {
        MockConnector {
            prepared: Mutex::new(None),
            refusal: Some(error),
        }
    }
}

impl Connector for MockConnector {
    type Channel = MockChannel;

    fn connect(&self, target: &Target) -> Result<(MockChannel, ChannelEvents), TransportError> {
        if let Some(error) = self.refusal.clone() {
            return Err(error);
        }
        tracing::debug!(remote = %target, "mock connect");
        self.prepared
            .lock()
            .take()
            .ok_or_else(|| TransportError::Handshake("mock channel already used".into()))
    }
}
