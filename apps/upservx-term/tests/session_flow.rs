mod support;

use std::io;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;

use support::{Seen, SharedBuffer, next_event, spawn_stub_host};
use upservx_term_core::render::{CellRenderer, LogRenderer};
use upservx_term_core::session::{
    InteractionMode, KeyOutcome, Session, SessionOptions, SessionState, Target,
};
use upservx_term_core::terminal::runner::drive;
use upservx_term_core::transport::websocket::{WebSocketChannel, WebSocketConfig, WebSocketConnector};
use upservx_term_core::transport::{Channel, ChannelEvent, ChannelEvents};

fn press(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

async fn pump_until<F>(session: &mut Session<WebSocketChannel>, events: &mut ChannelEvents, mut done: F)
where
    F: FnMut(&ChannelEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        let stop = done(&event);
        session.handle_channel_event(event);
        if stop {
            return;
        }
    }
}

#[tokio::test]
async fn line_mode_session_against_a_live_socket() -> io::Result<()> {
    let mut host = spawn_stub_host().await;
    let connector = WebSocketConnector::new(WebSocketConfig::new("127.0.0.1", host.addr.port()));
    let screen = SharedBuffer::default();
    let options = SessionOptions {
        submit_suffix: "\n".into(),
        ..SessionOptions::default()
    };

    let (mut session, mut events) = Session::open(
        Target::container("web-01"),
        InteractionMode::LineBuffered,
        &connector,
        Box::new(LogRenderer::new(screen.clone(), 80, 24)),
        options,
    )
    .unwrap();
    assert_eq!(session.handle_key(&press(KeyCode::Char('x'))), KeyOutcome::Rejected);

    pump_until(&mut session, &mut events, |event| *event == ChannelEvent::Opened).await;
    assert_eq!(session.state(), SessionState::Open);

    for ch in "ls".chars() {
        session.handle_key(&press(KeyCode::Char(ch)));
    }
    assert_eq!(session.pending_input().unwrap().as_string(), "ls");
    session.handle_key(&press(KeyCode::Backspace));
    assert_eq!(session.pending_input().unwrap().as_string(), "l");
    for ch in "s -la".chars() {
        session.handle_key(&press(KeyCode::Char(ch)));
    }
    assert_eq!(session.pending_input().unwrap().as_string(), "ls -la");
    assert_eq!(session.handle_key(&press(KeyCode::Enter)), KeyOutcome::Submitted);

    assert_eq!(host.next_message().await, Seen::Text("ls -la\n".into()));
    pump_until(&mut session, &mut events, |event| {
        matches!(event, ChannelEvent::Message(_))
    })
    .await;

    assert_eq!(
        session.transcript().lines(),
        vec!["root@web-01:~$ ls -la".to_string(), "ls -la".to_string()]
    );
    assert!(screen.contents().contains("root@web-01:~$ ls -la"));

    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.channel().release_count(), 1);
    assert_eq!(host.next_message().await, Seen::Closed(Some(1000)));
    assert_eq!(
        session.transcript().lines().last().map(String::as_str),
        Some("[session closed]")
    );
    Ok(())
}

#[tokio::test]
async fn raw_session_streams_remote_output_until_close() {
    let host = spawn_stub_host().await;
    let connector = WebSocketConnector::new(WebSocketConfig::new("127.0.0.1", host.addr.port()));
    let screen = SharedBuffer::default();

    let (mut session, mut events) = Session::open(
        Target::container("greet-close"),
        InteractionMode::Raw,
        &connector,
        Box::new(CellRenderer::new(screen.clone(), 80, 24).with_newline_normalization(true)),
        SessionOptions::default(),
    )
    .unwrap();

    let (_keys, mut input) = mpsc::unbounded_channel();
    let state = drive(&mut session, &mut events, &mut input, std::future::pending()).await;

    assert_eq!(state, SessionState::Closed);
    assert_eq!(session.transcript().output_text(), "hello world\n");
    assert_eq!(
        session.transcript().lines(),
        vec![
            "hello world".to_string(),
            "[connection closed: bye]".to_string()
        ]
    );
    assert!(screen.contents().starts_with("hello world\r\n"));
    assert!(session.channel().is_disposed());
    assert_eq!(session.handle_key(&press(KeyCode::Char('a'))), KeyOutcome::Rejected);
}

#[tokio::test]
async fn dropping_a_connecting_session_releases_the_socket() {
    let host = spawn_stub_host().await;
    let connector = WebSocketConnector::new(WebSocketConfig::new("127.0.0.1", host.addr.port()));
    let (session, mut events) = Session::open(
        Target::container("web-01"),
        InteractionMode::Raw,
        &connector,
        Box::new(CellRenderer::new(SharedBuffer::default(), 80, 24)),
        SessionOptions::default(),
    )
    .unwrap();
    assert_eq!(session.state(), SessionState::Connecting);
    drop(session);

    // Either the handshake never reported, or it did before the abort landed;
    // both ways the stream ends and nothing arrives after that.
    loop {
        match tokio::time::timeout(support::WAIT, events.recv()).await.unwrap() {
            Some(ChannelEvent::Opened) => continue,
            Some(other) => panic!("unexpected event after drop: {other:?}"),
            None => break,
        }
    }
}
