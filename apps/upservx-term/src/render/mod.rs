use std::io;

use crate::input::{EchoEdit, PendingInput};
use crate::session::Transcript;

mod cell;
mod plain;

pub use cell::CellRenderer;
pub use plain::{LogRenderer, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollRequest {
    LineUp,
    LineDown,
    PageUp,
    PageDown,
    Bottom,
}

/// Context handed to a renderer alongside each change.
pub struct Frame<'a> {
    pub transcript: &'a Transcript,
    pub pending: Option<&'a PendingInput>,
    pub prompt: &'a str,
}

/// Makes session changes visible. The transcript has already been updated
/// when any of these are called.
pub trait OutputRenderer: Send {
    /// An inbound chunk, in arrival order.
    fn output(&mut self, chunk: &[u8], frame: &Frame<'_>) -> io::Result<()>;

    fn echo(&mut self, edit: &EchoEdit, frame: &Frame<'_>) -> io::Result<()>;

    fn notice(&mut self, text: &str, frame: &Frame<'_>) -> io::Result<()>;

    fn scroll(&mut self, _request: ScrollRequest, _frame: &Frame<'_>) -> io::Result<()> {
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16, frame: &Frame<'_>) -> io::Result<()>;
}

/// Rewrites bare `\n` as `\r\n`. A `\r` at the end of one chunk still pairs
/// with a `\n` at the start of the next.
#[derive(Debug, Clone, Default)]
pub struct NewlineNormalizer {
    last_was_cr: bool,
}

impl NewlineNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len() + chunk.len() / 8);
        for &byte in chunk {
            if byte == b'\n' && !self.last_was_cr {
                out.push(b'\r');
            }
            out.push(byte);
            self.last_was_cr = byte == b'\r';
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_newlines_gain_carriage_returns() {
        let mut normalizer = NewlineNormalizer::new();
        assert_eq!(normalizer.normalize(b"a\nb\n"), b"a\r\nb\r\n");
    }

    #[test]
    fn existing_crlf_is_untouched_across_chunks() {
        let mut normalizer = NewlineNormalizer::new();
        assert_eq!(normalizer.normalize(b"a\r\n"), b"a\r\n");
        assert_eq!(normalizer.normalize(b"b\r"), b"b\r");
        assert_eq!(normalizer.normalize(b"\nc"), b"\nc");
    }
}
