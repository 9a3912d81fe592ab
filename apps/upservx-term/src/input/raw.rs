use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::{InputEncoder, KeyAction, is_press};
use crate::transport::Payload;

/// Forwards each key press as its own payload. Echo is left to the remote.
#[derive(Debug, Clone)]
pub struct RawEncoder {
    enter: String,
}

impl RawEncoder {
    pub fn new() -> Self {
        Self {
            enter: "\n".to_string(),
        }
    }

    /// Bytes sent for Enter; `\n` by default, some hosts want `\r`.
    pub fn with_enter_sequence(mut self, enter: impl Into<String>) -> Self {
        self.enter = enter.into();
        self
    }
}

impl Default for RawEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl InputEncoder for RawEncoder {
    fn encode(&mut self, key: &KeyEvent) -> KeyAction {
        if !is_press(key) {
            return KeyAction::Ignored;
        }
        if key.code == KeyCode::Enter {
            return KeyAction::Send(Payload::text(self.enter.clone()));
        }
        match encode_key_event(key) {
            Some(bytes) => match String::from_utf8(bytes) {
                Ok(text) => KeyAction::Send(Payload::Text(text)),
                Err(err) => KeyAction::Send(Payload::Binary(err.into_bytes())),
            },
            None => KeyAction::Ignored,
        }
    }

    fn encode_paste(&mut self, text: &str) -> Vec<KeyAction> {
        if text.is_empty() {
            return Vec::new();
        }
        vec![KeyAction::Send(Payload::text(text))]
    }
}

/// xterm-style byte encoding for a key press.
pub fn encode_key_event(key: &KeyEvent) -> Option<Vec<u8>> {
    match key.code {
        KeyCode::Char(c) => {
            let mut bytes = Vec::new();
            if key.modifiers.contains(KeyModifiers::ALT) {
                bytes.push(0x1b);
            }
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                match control_byte(c) {
                    Some(byte) => bytes.push(byte),
                    None => return None,
                }
            } else {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            Some(bytes)
        }
        KeyCode::Enter => Some(vec![b'\n']),
        KeyCode::Tab => Some(vec![b'\t']),
        KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),
        KeyCode::Backspace => Some(vec![0x7f]),
        KeyCode::Esc => Some(vec![0x1b]),
        KeyCode::Up => Some(b"\x1b[A".to_vec()),
        KeyCode::Down => Some(b"\x1b[B".to_vec()),
        KeyCode::Right => Some(b"\x1b[C".to_vec()),
        KeyCode::Left => Some(b"\x1b[D".to_vec()),
        KeyCode::Home => Some(b"\x1b[H".to_vec()),
        KeyCode::End => Some(b"\x1b[F".to_vec()),
        KeyCode::PageUp => Some(b"\x1b[5~".to_vec()),
        KeyCode::PageDown => Some(b"\x1b[6~".to_vec()),
        KeyCode::Delete => Some(b"\x1b[3~".to_vec()),
        KeyCode::Insert => Some(b"\x1b[2~".to_vec()),
        KeyCode::F(n) => function_key(n),
        _ => None,
    }
}

fn control_byte(c: char) -> Option<u8> {
    let lower = c.to_ascii_lowercase();
    match lower {
        'a'..='z' => Some((lower as u8 - b'a') + 1),
        ' ' | '@' => Some(0x00),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' => Some(0x1f),
        _ => None,
    }
}

fn function_key(n: u8) -> Option<Vec<u8>> {
    let seq: &[u8] = match n {
        1 => b"\x1bOP",
        2 => b"\x1bOQ",
        3 => b"\x1bOR",
        4 => b"\x1bOS",
        5 => b"\x1b[15~",
        6 => b"\x1b[17~",
        7 => b"\x1b[18~",
        8 => b"\x1b[19~",
        9 => b"\x1b[20~",
        10 => b"\x1b[21~",
        11 => b"\x1b[23~",
        12 => b"\x1b[24~",
        _ => return None,
    };
    Some(seq.to_vec())
}
