use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::{EchoEdit, InputEncoder, KeyAction, is_press};

/// Characters typed but not yet transmitted, plus the insertion point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingInput {
    chars: Vec<char>,
    cursor: usize,
}

impl PendingInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ch: char) {
        self.chars.insert(self.cursor, ch);
        self.cursor += 1;
    }

    /// Remove the character before the cursor. Returns `false` at the start of
    /// the line.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.chars.remove(self.cursor);
        true
    }

    /// Hand out the whole line and start over.
    pub fn take(&mut self) -> String {
        let line = self.as_string();
        self.clear();
        line
    }

    pub fn clear(&mut self) {
        self.chars.clear();
        self.cursor = 0;
    }

    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// Local line editing with immediate echo; the line goes out on Enter.
///
/// Only append, Backspace, Enter and Esc (cancel) are understood. Every other
/// key is dropped.
#[derive(Debug, Clone, Default)]
pub struct LineEncoder {
    buffer: PendingInput,
}

impl LineEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_printable(key: &KeyEvent, ch: char) -> bool {
    !ch.is_control() && !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
}

impl InputEncoder for LineEncoder {
    fn encode(&mut self, key: &KeyEvent) -> KeyAction {
        if !is_press(key) {
            return KeyAction::Ignored;
        }
        match key.code {
            KeyCode::Char(ch) if is_printable(key, ch) => {
                self.buffer.insert(ch);
                KeyAction::Echo(EchoEdit::Insert(ch))
            }
            KeyCode::Backspace => {
                if self.buffer.backspace() {
                    KeyAction::Echo(EchoEdit::Erase)
                } else {
                    KeyAction::Ignored
                }
            }
            KeyCode::Enter => KeyAction::Submit(self.buffer.take()),
            KeyCode::Esc if !self.buffer.is_empty() => {
                self.buffer.clear();
                KeyAction::Echo(EchoEdit::Clear)
            }
            _ => KeyAction::Ignored,
        }
    }

    fn encode_paste(&mut self, text: &str) -> Vec<KeyAction> {
        text.chars()
            .filter(|ch| !ch.is_control())
            .map(|ch| {
                self.buffer.insert(ch);
                KeyAction::Echo(EchoEdit::Insert(ch))
            })
            .collect()
    }

    fn pending(&self) -> Option<&PendingInput> {
        Some(&self.buffer)
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}
