#![allow(dead_code)]

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use upservx_term_core::transport::{ChannelEvent, ChannelEvents};

pub const WAIT: Duration = Duration::from_secs(5);

/// What the stub host observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Upgraded {
        kind: String,
        name: String,
        authorization: Option<String>,
    },
    Text(String),
    Binary(Vec<u8>),
    Closed(Option<u16>),
}

#[derive(Clone)]
struct StubState {
    seen: mpsc::UnboundedSender<Seen>,
}

pub struct StubHost {
    pub addr: SocketAddr,
    pub seen: mpsc::UnboundedReceiver<Seen>,
}

impl StubHost {
    pub async fn next_seen(&mut self) -> Seen {
        timeout(WAIT, self.seen.recv())
            .await
            .expect("stub host timed out")
            .expect("stub host stopped")
    }

    /// Skip the upgrade record and return the next thing the client did.
    pub async fn next_message(&mut self) -> Seen {
        loop {
            match self.next_seen().await {
                Seen::Upgraded { .. } => continue,
                other => return other,
            }
        }
    }
}

/// Serve `/{kind}/{name}/terminal` the way the upservx host does. The name
/// picks the behaviour:
///
/// * `greet-close`: sends `hello`, ` world\n`, then a normal close with reason `bye`
/// * `crash`: closes with code 1011
/// * `vanish`: sends one line and drops the socket without a close frame
/// * `locked`: answers 401 unless an Authorization header is present
/// * `chatty`: streams a line every few milliseconds until the client closes
/// * `close-ack`: closes with reason `done` and records the client's reply
/// * anything else echoes every text and binary frame back
pub async fn spawn_stub_host() -> StubHost {
    let (tx, rx) = mpsc::unbounded_channel();
    let router = Router::new()
        .route("/:kind/:name/terminal", get(upgrade))
        .with_state(StubState { seen: tx });
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub host");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    StubHost { addr, seen: rx }
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Path((kind, name)): Path<(String, String)>,
    headers: HeaderMap,
    State(state): State<StubState>,
) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if name == "locked" && authorization.is_none() {
        return (StatusCode::UNAUTHORIZED, "credentials required").into_response();
    }
    let _ = state.seen.send(Seen::Upgraded {
        kind,
        name: name.clone(),
        authorization,
    });
    ws.on_upgrade(move |socket| serve_terminal(socket, name, state.seen))
}

async fn serve_terminal(mut socket: WebSocket, name: String, seen: mpsc::UnboundedSender<Seen>) {
    match name.as_str() {
        "greet-close" => {
            let _ = socket.send(WsMessage::Text("hello".into())).await;
            let _ = socket.send(WsMessage::Text(" world\n".into())).await;
            let _ = socket
                .send(WsMessage::Close(Some(CloseFrame {
                    code: 1000,
                    reason: "bye".into(),
                })))
                .await;
        }
        "crash" => {
            let _ = socket
                .send(WsMessage::Close(Some(CloseFrame {
                    code: 1011,
                    reason: "shell died".into(),
                })))
                .await;
        }
        "chatty" => {
            let mut count = 0u64;
            loop {
                tokio::select! {
                    message = socket.recv() => {
                        let code = match message {
                            Some(Ok(WsMessage::Close(frame))) => frame.map(|frame| frame.code),
                            Some(Ok(_)) => continue,
                            _ => None,
                        };
                        let _ = seen.send(Seen::Closed(code));
                        return;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(2)) => {
                        count += 1;
                        if socket.send(WsMessage::Text(format!("tick {count}\n"))).await.is_err() {
                            let _ = seen.send(Seen::Closed(None));
                            return;
                        }
                    }
                }
            }
        }
        "close-ack" => {
            let _ = socket
                .send(WsMessage::Close(Some(CloseFrame {
                    code: 1000,
                    reason: "done".into(),
                })))
                .await;
            let code = match socket.recv().await {
                Some(Ok(WsMessage::Close(frame))) => frame.map(|frame| frame.code),
                _ => None,
            };
            let _ = seen.send(Seen::Closed(code));
            return;
        }
        "vanish" => {
            let _ = socket.send(WsMessage::Text("going away\n".into())).await;
            return;
        }
        _ => {}
    }

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            WsMessage::Text(text) => {
                let _ = seen.send(Seen::Text(text.clone()));
                if socket.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            WsMessage::Binary(bytes) => {
                let _ = seen.send(Seen::Binary(bytes.clone()));
                if socket.send(WsMessage::Binary(bytes)).await.is_err() {
                    break;
                }
            }
            WsMessage::Close(frame) => {
                let _ = seen.send(Seen::Closed(frame.map(|frame| frame.code)));
                break;
            }
            _ => {}
        }
    }
}

pub async fn next_event(events: &mut ChannelEvents) -> ChannelEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("channel event stream ended")
}

/// A `Write` sink tests can read back after handing it to a renderer.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
