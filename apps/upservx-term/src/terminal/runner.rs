use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::render::{CellRenderer, LogRenderer, OutputRenderer, ScrollRequest};
use crate::session::{EntryKind, InteractionMode, Session, SessionState, Target};
use crate::terminal::config::TerminalConfig;
use crate::terminal::error::CliError;
use crate::transport::{Channel, ChannelEvent, ChannelEvents, Connector, TransportError};
use crate::tty::{self, TerminalGuard};

const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a session run finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnd {
    pub state: SessionState,
    /// The last status line the session wrote.
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Reads crossterm events on a dedicated thread and hands them to the loop.
pub struct InputReader {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputReader {
    pub fn spawn() -> io::Result<(Self, mpsc::UnboundedReceiver<Event>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("upservx-input".into())
            .spawn(move || {
                while !thread_stop.load(Ordering::Relaxed) {
                    match event::poll(INPUT_POLL_INTERVAL) {
                        Ok(true) => match event::read() {
                            Ok(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "input read error");
                                break;
                            }
                        },
                        Ok(false) => {}
                        Err(err) => {
                            warn!(error = %err, "input poll error");
                            break;
                        }
                    }
                }
                debug!("input reader stopped");
            })?;
        Ok((
            Self {
                stop,
                handle: Some(handle),
            },
            rx,
        ))
    }
}

impl Drop for InputReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    key.kind != KeyEventKind::Release
        && key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q'))
}

/// Local scrollback keys. Only line mode intercepts them; raw mode forwards
/// every key to the remote.
fn scroll_request(key: &KeyEvent) -> Option<ScrollRequest> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);
    match key.code {
        KeyCode::Up if shift => Some(ScrollRequest::LineUp),
        KeyCode::Down if shift => Some(ScrollRequest::LineDown),
        KeyCode::End if shift => Some(ScrollRequest::Bottom),
        KeyCode::PageUp => Some(ScrollRequest::PageUp),
        KeyCode::PageDown => Some(ScrollRequest::PageDown),
        _ => None,
    }
}

fn handle_input<C: Channel>(session: &mut Session<C>, event: Event) -> Flow {
    match event {
        Event::Key(key) => {
            if is_quit(&key) {
                return Flow::Quit;
            }
            if session.mode() == InteractionMode::LineBuffered {
                if let Some(request) = scroll_request(&key) {
                    session.scroll(request);
                    return Flow::Continue;
                }
            }
            session.handle_key(&key);
        }
        Event::Paste(text) => {
            session.handle_paste(&text);
        }
        Event::Resize(cols, rows) => session.resize(cols, rows),
        _ => {}
    }
    Flow::Continue
}

/// Feed channel events and local input into `session` until it ends.
///
/// `shutdown` resolving closes the session from the local side.
pub async fn drive<C, F>(
    session: &mut Session<C>,
    events: &mut ChannelEvents,
    input: &mut mpsc::UnboundedReceiver<Event>,
    shutdown: F,
) -> SessionState
where
    C: Channel,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut input_open = true;

    while !session.state().is_terminal() {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => session.handle_channel_event(event),
                None => {
                    // The socket task went away without saying why.
                    session.handle_channel_event(ChannelEvent::Failed(
                        TransportError::ConnectionLost("channel task ended".into()),
                    ));
                }
            },
            event = input.recv(), if input_open => match event {
                Some(event) => {
                    if handle_input(session, event) == Flow::Quit {
                        info!(session_id = %session.id(), "quit requested");
                        session.close();
                    }
                }
                None => {
                    debug!(session_id = %session.id(), "input closed");
                    input_open = false;
                }
            },
            _ = &mut shutdown => {
                info!(session_id = %session.id(), "interrupted");
                session.close();
            }
        }
    }
    session.state()
}

/// SIGINT sent from outside the session. The tty is raw in both modes, so a
/// typed Ctrl+C arrives as a key instead: raw mode forwards it to the remote
/// and line mode ignores it. Ctrl+Q is the only local exit chord.
async fn external_interrupt() {
    if tokio::signal::ctrl_c().await.is_ok() {
        return;
    }
    std::future::pending::<()>().await
}

fn last_notice<C: Channel>(session: &Session<C>) -> Option<String> {
    session
        .transcript()
        .entries()
        .iter()
        .rev()
        .find(|entry| entry.kind == EntryKind::Notice)
        .map(|entry| entry.text())
}

/// Run one interactive session against the real tty.
pub async fn run<K>(target: Target, config: &TerminalConfig, connector: &K) -> Result<SessionEnd, CliError>
where
    K: Connector,
{
    let (cols, rows) = tty::size_or_default();
    let renderer: Box<dyn OutputRenderer> = match config.mode {
        InteractionMode::Raw => Box::new(
            CellRenderer::new(io::stdout(), cols, rows)
                .with_newline_normalization(config.normalize_newlines),
        ),
        InteractionMode::LineBuffered => Box::new(LogRenderer::new(io::stdout(), cols, rows)),
    };

    let (mut session, mut events) =
        Session::open(target, config.mode, connector, renderer, config.session_options())?;

    let guard = TerminalGuard::enter(config.mode);
    debug!(raw = guard.is_raw(), cols, rows, "terminal prepared");
    session.resize(cols, rows);

    let (reader, mut input) = InputReader::spawn()?;
    let state = drive(&mut session, &mut events, &mut input, external_interrupt()).await;
    drop(reader);

    let end = SessionEnd {
        state,
        notice: last_notice(&session),
    };
    let lines = session.transcript().lines();
    drop(session);
    drop(guard);

    // The alternate screen is gone; leave the log behind in the scrollback.
    if config.mode == InteractionMode::LineBuffered {
        let mut stdout = io::stdout().lock();
        for line in lines {
            writeln!(stdout, "{line}")?;
        }
        stdout.flush()?;
    } else {
        println!();
    }
    Ok(end)
}
