//! Turning local key presses into outbound payloads.
//!
//! Two strategies exist and a session picks one when it is created:
//! [`RawEncoder`] forwards every key the moment it is pressed, while
//! [`LineEncoder`] edits a line locally and only transmits it on Enter.

use crossterm::event::{KeyEvent, KeyEventKind};

use crate::transport::Payload;

mod line;
mod raw;

pub use line::{LineEncoder, PendingInput};
pub use raw::{RawEncoder, encode_key_event};

/// A change to the locally echoed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoEdit {
    Insert(char),
    Erase,
    Clear,
    /// The submitted line, already prefixed with the prompt.
    Commit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Forward to the remote immediately.
    Send(Payload),
    /// Local-only change to the pending line.
    Echo(EchoEdit),
    /// Transmit the finished line.
    Submit(String),
    Ignored,
}

pub trait InputEncoder: Send {
    fn encode(&mut self, key: &KeyEvent) -> KeyAction;

    fn encode_paste(&mut self, text: &str) -> Vec<KeyAction>;

    /// The line being edited, for encoders that buffer.
    fn pending(&self) -> Option<&PendingInput> {
        None
    }

    /// Discard any buffered input.
    fn reset(&mut self) {}
}

/// Release reports (and anything else that is not a press) must never reach an
/// encoder twice for the same key.
pub(crate) fn is_press(key: &KeyEvent) -> bool {
    matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat)
}
