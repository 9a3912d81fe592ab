//! One interactive terminal bound to one remote target.
//!
//! A [`Session`] is a synchronous state machine. The caller drives it from a
//! single event loop: inbound [`ChannelEvent`]s go to
//! [`Session::handle_channel_event`] and local keys go to
//! [`Session::handle_key`]. The interaction mode is fixed when the session is
//! opened and picks the encoder; the caller supplies the matching renderer.

use std::fmt;
use std::io;

use clap::ValueEnum;
use crossterm::event::KeyEvent;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::input::{EchoEdit, InputEncoder, KeyAction, LineEncoder, PendingInput, RawEncoder};
use crate::render::{Frame, OutputRenderer, ScrollRequest};
use crate::transport::{Channel, ChannelEvent, ChannelEvents, Connector, Payload, TransportError};

mod transcript;

pub use transcript::{EntryKind, Transcript, TranscriptEntry};

pub const DEFAULT_PROMPT: &str = "root@{target}:~$ ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Container,
    Vm,
}

impl ResourceKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            ResourceKind::Container => "containers",
            ResourceKind::Vm => "vms",
        }
    }
}

/// A remote resource that can host a shell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub kind: ResourceKind,
    pub name: String,
}

impl Target {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Container, name)
    }

    pub fn vm(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Vm, name)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.path_segment(), self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }

    pub fn accepts_input(self) -> bool {
        self == SessionState::Open
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
            SessionState::Errored => "errored",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
pub enum InteractionMode {
    /// Forward every key as it is pressed; the remote echoes.
    #[default]
    #[value(name = "raw")]
    #[serde(rename = "raw")]
    Raw,
    /// Edit a line locally and send it on Enter.
    #[value(name = "line")]
    #[serde(rename = "line")]
    LineBuffered,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Prompt shown before the line being edited; `{target}` is replaced with
    /// the target name.
    pub prompt_template: String,
    /// Appended to each submitted line before it is sent.
    pub submit_suffix: String,
    /// Bytes sent for Enter in raw mode.
    pub enter_sequence: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            prompt_template: DEFAULT_PROMPT.to_string(),
            submit_suffix: String::new(),
            enter_sequence: "\n".to_string(),
        }
    }
}

impl SessionOptions {
    pub fn prompt_for(&self, target: &Target) -> String {
        self.prompt_template.replace("{target}", &target.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Sent,
    Echoed,
    Submitted,
    Ignored,
    /// The session is not open; nothing happened.
    Rejected,
}

pub struct Session<C: Channel> {
    id: Uuid,
    target: Target,
    mode: InteractionMode,
    state: SessionState,
    channel: C,
    encoder: Box<dyn InputEncoder>,
    renderer: Box<dyn OutputRenderer>,
    transcript: Transcript,
    prompt: String,
    submit_suffix: String,
}

impl<C: Channel> Session<C> {
    /// Start connecting to `target`. The returned receiver carries the
    /// channel's events and must be fed back through
    /// [`Session::handle_channel_event`].
    pub fn open<K>(
        target: Target,
        mode: InteractionMode,
        connector: &K,
        renderer: Box<dyn OutputRenderer>,
        options: SessionOptions,
    ) -> Result<(Self, ChannelEvents), SessionError>
    where
        K: Connector<Channel = C>,
    {
        if target.name.trim().is_empty() {
            return Err(SessionError::InvalidTarget("target name is empty".into()));
        }

        let id = Uuid::new_v4();
        let (channel, events) = connector.connect(&target)?;
        let encoder: Box<dyn InputEncoder> = match mode {
            InteractionMode::Raw => {
                Box::new(RawEncoder::new().with_enter_sequence(options.enter_sequence.clone()))
            }
            InteractionMode::LineBuffered => Box::new(LineEncoder::new()),
        };
        info!(session_id = %id, remote = %target, ?mode, "terminal session connecting");

        let session = Self {
            id,
            prompt: options.prompt_for(&target),
            submit_suffix: options.submit_suffix,
            target,
            mode,
            state: SessionState::Connecting,
            channel,
            encoder,
            renderer,
            transcript: Transcript::new(),
        };
        Ok((session, events))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pending_input(&self) -> Option<&PendingInput> {
        self.encoder.pending()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        if self.state.is_terminal() {
            trace!(session_id = %self.id, ?event, "event after session end dropped");
            return;
        }

        match event {
            ChannelEvent::Opened => {
                if self.state == SessionState::Connecting {
                    self.state = SessionState::Open;
                    info!(session_id = %self.id, remote = %self.target, "terminal session open");
                }
            }
            ChannelEvent::Message(payload) => {
                if self.state != SessionState::Open {
                    trace!(session_id = %self.id, bytes = payload.len(), "message before open dropped");
                    return;
                }
                let chunk = payload.as_bytes();
                self.transcript.push_output(chunk);
                self.render_with(|renderer, frame| renderer.output(chunk, frame));
            }
            ChannelEvent::Closed { code, reason } => {
                info!(session_id = %self.id, ?code, %reason, "remote closed terminal");
                let notice = if reason.is_empty() {
                    "[connection closed]".to_string()
                } else {
                    format!("[connection closed: {reason}]")
                };
                self.terminate(SessionState::Closed, notice);
            }
            ChannelEvent::Failed(error) => {
                warn!(session_id = %self.id, error = %error, "terminal channel failed");
                self.terminate(SessionState::Errored, format!("[connection error: {error}]"));
            }
        }
    }

    pub fn handle_key(&mut self, key: &KeyEvent) -> KeyOutcome {
        if !self.state.accepts_input() {
            debug!(session_id = %self.id, state = %self.state, code = ?key.code, "key rejected");
            return KeyOutcome::Rejected;
        }
        let action = self.encoder.encode(key);
        self.apply(action)
    }

    pub fn handle_paste(&mut self, text: &str) -> KeyOutcome {
        if !self.state.accepts_input() {
            debug!(session_id = %self.id, state = %self.state, chars = text.len(), "paste rejected");
            return KeyOutcome::Rejected;
        }
        let mut outcome = KeyOutcome::Ignored;
        for action in self.encoder.encode_paste(text) {
            match self.apply(action) {
                KeyOutcome::Ignored => {}
                other => outcome = other,
            }
        }
        outcome
    }

    fn apply(&mut self, action: KeyAction) -> KeyOutcome {
        match action {
            KeyAction::Send(payload) => {
                trace!(session_id = %self.id, bytes = payload.len(), "forwarding key");
                self.channel.send(payload);
                KeyOutcome::Sent
            }
            KeyAction::Echo(edit) => {
                self.render_with(|renderer, frame| renderer.echo(&edit, frame));
                KeyOutcome::Echoed
            }
            KeyAction::Submit(line) => {
                debug!(session_id = %self.id, chars = line.len(), "submitting line");
                let payload = Payload::Text(format!("{line}{}", self.submit_suffix));
                self.channel.send(payload);
                let echoed = format!("{}{line}", self.prompt);
                self.transcript.push_command(echoed.clone());
                let edit = EchoEdit::Commit(echoed);
                self.render_with(|renderer, frame| renderer.echo(&edit, frame));
                KeyOutcome::Submitted
            }
            KeyAction::Ignored => KeyOutcome::Ignored,
        }
    }

    pub fn scroll(&mut self, request: ScrollRequest) {
        self.render_with(|renderer, frame| renderer.scroll(request, frame));
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        debug!(session_id = %self.id, cols, rows, "terminal resized");
        self.render_with(|renderer, frame| renderer.resize(cols, rows, frame));
    }

    /// End the session from the local side. Later calls do nothing.
    pub fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        info!(session_id = %self.id, state = %self.state, "closing terminal session");
        self.terminate(SessionState::Closed, "[session closed]".to_string());
    }

    fn terminate(&mut self, next: SessionState, notice: String) {
        self.state = next;
        self.channel.close();
        self.encoder.reset();
        self.transcript.push_notice(notice.clone());
        self.render_with(|renderer, frame| renderer.notice(&notice, frame));
    }

    fn render_with<F>(&mut self, draw: F)
    where
        F: FnOnce(&mut dyn OutputRenderer, &Frame<'_>) -> io::Result<()>,
    {
        let frame = Frame {
            transcript: &self.transcript,
            pending: self.encoder.pending(),
            prompt: &self.prompt,
        };
        if let Err(err) = draw(self.renderer.as_mut(), &frame) {
            warn!(session_id = %self.id, error = %err, "render failed");
        }
    }
}

impl<C: Channel> Drop for Session<C> {
    fn drop(&mut self) {
        self.close();
    }
}
