use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{Request, StatusCode};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{Level, debug, trace, warn};
use url::Url;

use super::{Channel, ChannelEvent, ChannelEvents, ChannelState, Connector, Payload, TransportError};
use crate::auth;
use crate::session::Target;
use crate::telemetry::logging::hexdump;

pub mod config;
pub use config::WebSocketConfig;

enum Outbound {
    Payload(Payload),
    Close,
}

/// Terminal channel backed by one websocket connection.
///
/// The socket lives on its own task; this handle only queues outbound
/// payloads and owns the task's lifetime.
pub struct WebSocketChannel {
    url: Url,
    state: Arc<Mutex<ChannelState>>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
    disposed: bool,
    releases: usize,
}

impl WebSocketChannel {
    fn spawn(url: Url, request: Request<()>) -> Result<(Self, ChannelEvents), TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TransportError::Handshake("no async runtime available".into()))?;

        let (tx_out, rx_out) = mpsc::unbounded_channel();
        let (tx_events, rx_events) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ChannelState::Connecting));

        let task = runtime.spawn(run_socket(
            request,
            url.clone(),
            state.clone(),
            rx_out,
            tx_events,
        ));

        Ok((
            Self {
                url,
                state,
                outbound: Some(tx_out),
                task: Some(task),
                disposed: false,
                releases: 0,
            },
            rx_events,
        ))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Channel for WebSocketChannel {
    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    fn send(&mut self, payload: Payload) {
        let state = self.state();
        if state != ChannelState::Open {
            debug!(%state, bytes = payload.len(), "dropping payload; channel not open");
            return;
        }
        let Some(tx) = self.outbound.as_ref() else {
            debug!(bytes = payload.len(), "dropping payload; channel released");
            return;
        };
        if tx.send(Outbound::Payload(payload)).is_err() {
            debug!("dropping payload; socket task has exited");
        }
    }

    fn close(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.releases += 1;

        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            if !previous.is_terminal() {
                *state = ChannelState::Closed;
            }
            previous
        };

        let outbound = self.outbound.take();
        match (previous, self.task.take()) {
            (ChannelState::Open, Some(_task)) => {
                // The task sends a close frame and exits on its own.
                if let Some(tx) = outbound {
                    let _ = tx.send(Outbound::Close);
                }
            }
            (_, Some(task)) => {
                task.abort();
            }
            (_, None) => {}
        }
        debug!(url = %self.url, %previous, "terminal channel released");
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn release_count(&self) -> usize {
        self.releases
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connects terminal channels through the host's websocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

impl Connector for WebSocketConnector {
    type Channel = WebSocketChannel;

    fn connect(&self, target: &Target) -> Result<(WebSocketChannel, ChannelEvents), TransportError> {
        let url = self.config.url_for(target)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        if let Some(credentials) = self.config.credentials.as_ref() {
            auth::authorize(&mut request, credentials)
                .map_err(|err| TransportError::Auth(err.to_string()))?;
        }
        debug!(url = %url, authenticated = self.config.credentials.is_some(), "opening terminal channel");
        WebSocketChannel::spawn(url, request)
    }
}

/// Send an event unless the owning handle has already released the channel.
/// A terminal event also moves the shared state.
fn emit(
    state: &Mutex<ChannelState>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    next: Option<ChannelState>,
    event: ChannelEvent,
) -> bool {
    let mut guard = state.lock();
    if guard.is_terminal() {
        return false;
    }
    if let Some(next) = next {
        *guard = next;
    }
    events.send(event).is_ok()
}

async fn run_socket(
    request: Request<()>,
    url: Url,
    state: Arc<Mutex<ChannelState>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let stream = match connect_async(request).await {
        Ok((stream, response)) => {
            debug!(url = %url, status = %response.status(), "terminal socket handshake complete");
            stream
        }
        Err(err) => {
            let error = classify_handshake_error(err);
            warn!(url = %url, error = %error, "terminal socket handshake failed");
            emit(&state, &events, Some(ChannelState::Errored), ChannelEvent::Failed(error));
            return;
        }
    };

    if !emit(&state, &events, Some(ChannelState::Open), ChannelEvent::Opened) {
        return;
    }

    let (mut sink, mut source) = stream.split();
    // Ends with whether our own close frame still has to go out.
    let send_close = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Payload(payload)) => {
                    trace!(bytes = payload.len(), "terminal socket send");
                    if let Err(err) = sink.send(into_message(payload)).await {
                        let error = TransportError::ConnectionLost(err.to_string());
                        emit(&state, &events, Some(ChannelState::Errored), ChannelEvent::Failed(error));
                        break false;
                    }
                }
                Some(Outbound::Close) | None => break true,
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    log_inbound(text.as_bytes());
                    // A refused event means the handle was released first.
                    if !emit(&state, &events, None, ChannelEvent::Message(Payload::Text(text))) {
                        break true;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    log_inbound(&bytes);
                    if !emit(&state, &events, None, ChannelEvent::Message(Payload::Binary(bytes))) {
                        break true;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (next, event) = close_event(frame);
                    debug!(url = %url, ?event, "terminal socket closed by remote");
                    emit(&state, &events, Some(next), event);
                    // tungstenite queues the close reply; push it out.
                    let _ = sink.flush().await;
                    break false;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let error = TransportError::ConnectionLost(err.to_string());
                    emit(&state, &events, Some(ChannelState::Errored), ChannelEvent::Failed(error));
                    break false;
                }
                None => {
                    let error = TransportError::ConnectionLost("stream ended without close frame".into());
                    emit(&state, &events, Some(ChannelState::Errored), ChannelEvent::Failed(error));
                    break false;
                }
            }
        }
    };

    if send_close {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "terminal closed".into(),
        };
        let _ = sink.send(Message::Close(Some(frame))).await;
        let _ = sink.close().await;
    }
}

fn into_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text),
        Payload::Binary(bytes) => Message::Binary(bytes),
    }
}

fn log_inbound(bytes: &[u8]) {
    if tracing::enabled!(Level::TRACE) {
        trace!(bytes = bytes.len(), dump = %hexdump(bytes), "terminal socket recv");
    }
}

fn close_event(frame: Option<CloseFrame<'static>>) -> (ChannelState, ChannelEvent) {
    match frame {
        None => (
            ChannelState::Closed,
            ChannelEvent::Closed {
                code: None,
                reason: String::new(),
            },
        ),
        Some(frame) => {
            let code = u16::from(frame.code);
            let reason = frame.reason.into_owned();
            if matches!(frame.code, CloseCode::Normal | CloseCode::Away) {
                (
                    ChannelState::Closed,
                    ChannelEvent::Closed {
                        code: Some(code),
                        reason,
                    },
                )
            } else {
                let detail = if reason.is_empty() {
                    format!("closed with code {code}")
                } else {
                    format!("closed with code {code}: {reason}")
                };
                (
                    ChannelState::Errored,
                    ChannelEvent::Failed(TransportError::Protocol(detail)),
                )
            }
        }
    }
}

fn classify_handshake_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
        {
            TransportError::Auth(format!("server answered {}", response.status()))
        }
        tungstenite::Error::Http(response) => {
            TransportError::Handshake(format!("server answered {}", response.status()))
        }
        tungstenite::Error::Url(err) => TransportError::InvalidUrl(err.to_string()),
        other => TransportError::Handshake(other.to_string()),
    }
}
