use std::io::{self, Write};

use alacritty_terminal::{
    Term,
    event::{Event, EventListener},
    grid::Dimensions,
    index::{Column, Line, Point},
    term::{Config, cell::Flags as CellFlags},
    vte::ansi::Processor,
};
use tracing::trace;

use super::{Frame, NewlineNormalizer, OutputRenderer};
use crate::input::EchoEdit;

struct TermDimensions {
    columns: usize,
    screen_lines: usize,
}

impl TermDimensions {
    fn new(cols: u16, rows: u16) -> Self {
        Self {
            columns: usize::from(cols.max(1)),
            screen_lines: usize::from(rows.max(1)),
        }
    }
}

impl Dimensions for TermDimensions {
    fn total_lines(&self) -> usize {
        self.screen_lines
    }

    fn screen_lines(&self) -> usize {
        self.screen_lines
    }

    fn columns(&self) -> usize {
        self.columns
    }
}

#[derive(Clone, Copy, Default)]
struct EventProxy;

impl EventListener for EventProxy {
    fn send_event(&self, _event: Event) {}
}

/// Cell-grid emulation for raw mode.
///
/// Remote bytes are written through to the local terminal untouched (after
/// optional newline normalization) and fed to a shadow grid, so cursor
/// movement and erase sequences are honored both on screen and in
/// [`CellRenderer::screen_lines`]. Nothing is echoed locally.
pub struct CellRenderer<W: Write + Send> {
    term: Term<EventProxy>,
    parser: Processor,
    out: W,
    normalizer: Option<NewlineNormalizer>,
}

unsafe impl<W: Write + Send> Send for CellRenderer<W> {}

impl<W: Write + Send> CellRenderer<W> {
    pub fn new(out: W, cols: u16, rows: u16) -> Self {
        let dims = TermDimensions::new(cols, rows);
        Self {
            term: Term::new(Config::default(), &dims, EventProxy),
            parser: Processor::new(),
            out,
            normalizer: None,
        }
    }

    /// Treat bare `\n` from the remote as `\r\n`.
    pub fn with_newline_normalization(mut self, enabled: bool) -> Self {
        self.normalizer = enabled.then(NewlineNormalizer::new);
        self
    }

    fn feed(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.parser.advance(&mut self.term, *byte);
        }
    }

    fn write_through(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.feed(bytes);
        self.out.write_all(bytes)?;
        self.out.flush()
    }

    /// Visible rows with trailing blanks trimmed.
    pub fn screen_lines(&self) -> Vec<String> {
        let grid = self.term.grid();
        let cols = grid.columns();
        (0..grid.screen_lines())
            .map(|row| {
                let mut line = String::with_capacity(cols);
                for col in 0..cols {
                    let cell = &grid[Point::new(Line(row as i32), Column(col))];
                    if cell.flags.contains(CellFlags::WIDE_CHAR_SPACER) {
                        continue;
                    }
                    line.push(cell.c);
                }
                line.truncate(line.trim_end().len());
                line
            })
            .collect()
    }

    /// Cursor as `(row, col)` on the visible screen.
    pub fn cursor(&self) -> (usize, usize) {
        let point = self.term.renderable_content().cursor.point;
        (point.line.0.max(0) as usize, point.column.0)
    }

    pub fn writer(&self) -> &W {
        &self.out
    }
}

impl<W: Write + Send> OutputRenderer for CellRenderer<W> {
    fn output(&mut self, chunk: &[u8], _frame: &Frame<'_>) -> io::Result<()> {
        let bytes = match self.normalizer.as_mut() {
            Some(normalizer) => normalizer.normalize(chunk),
            None => chunk.to_vec(),
        };
        self.write_through(&bytes)
    }

    fn echo(&mut self, _edit: &EchoEdit, _frame: &Frame<'_>) -> io::Result<()> {
        Ok(())
    }

    fn notice(&mut self, text: &str, _frame: &Frame<'_>) -> io::Result<()> {
        let mut bytes = Vec::with_capacity(text.len() + 8);
        // Reset attributes the remote may have left active.
        bytes.extend_from_slice(b"\x1b[0m");
        if self.cursor().1 != 0 {
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.extend_from_slice(text.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        self.write_through(&bytes)
    }

    fn resize(&mut self, cols: u16, rows: u16, _frame: &Frame<'_>) -> io::Result<()> {
        trace!(cols, rows, "cell renderer resize");
        self.term.resize(TermDimensions::new(cols, rows));
        Ok(())
    }
}
