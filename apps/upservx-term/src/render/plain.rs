use std::io::{self, Write};
use std::iter::Peekable;
use std::ops::Range;
use std::str::Chars;

use crossterm::{
    cursor::{MoveTo, Show},
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use unicode_width::UnicodeWidthChar;

use super::{Frame, OutputRenderer, ScrollRequest};
use crate::input::EchoEdit;
use crate::session::{EntryKind, Transcript};

/// Which slice of the wrapped log is on screen.
///
/// `offset` counts rows hidden below the window. At zero the view follows the
/// tail; once scrolled back it holds still while new rows arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    cols: u16,
    rows: u16,
    offset: usize,
}

impl Viewport {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            offset: 0,
        }
    }

    /// Rows available for the log; the last screen row holds the input line.
    pub fn body_rows(&self) -> usize {
        usize::from(self.rows.saturating_sub(1)).max(1)
    }

    pub fn cols(&self) -> usize {
        usize::from(self.cols).max(1)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_following(&self) -> bool {
        self.offset == 0
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
    }

    /// Account for `added` rows appended below.
    pub fn grow(&mut self, added: usize) {
        if self.offset > 0 {
            self.offset += added;
        }
    }

    pub fn scroll_up(&mut self, by: usize, total: usize) {
        let max = total.saturating_sub(self.body_rows());
        self.offset = (self.offset + by).min(max);
    }

    pub fn scroll_down(&mut self, by: usize) {
        self.offset = self.offset.saturating_sub(by);
    }

    pub fn to_bottom(&mut self) {
        self.offset = 0;
    }

    /// Indices of the wrapped rows to draw, out of `total`.
    pub fn window(&self, total: usize) -> Range<usize> {
        let end = total.saturating_sub(self.offset);
        end.saturating_sub(self.body_rows())..end
    }
}

const TAB_STOP: usize = 8;

/// Make one display line safe to print. Escape sequences are dropped, tabs
/// become spaces up to the next stop, and other control characters show in
/// caret notation.
fn sanitize(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut width = 0;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\x1b' => skip_escape(&mut chars),
            '\u{9b}' => skip_csi(&mut chars),
            '\t' => {
                let pad = TAB_STOP - width % TAB_STOP;
                out.extend(std::iter::repeat_n(' ', pad));
                width += pad;
            }
            c if c.is_ascii_control() => {
                out.push('^');
                out.push(char::from(c as u8 ^ 0x40));
                width += 2;
            }
            '\u{80}'..='\u{9f}' => {}
            c => {
                width += c.width().unwrap_or(0);
                out.push(c);
            }
        }
    }
    out
}

fn skip_escape(chars: &mut Peekable<Chars<'_>>) {
    match chars.next() {
        Some('[') => skip_csi(chars),
        Some(']' | 'P' | '_' | '^' | 'X') => skip_string(chars),
        // Intermediate bytes, as in `ESC ( B`, take one more final byte.
        Some('\x20'..='\x2f') => {
            chars.next();
        }
        _ => {}
    }
}

fn skip_csi(chars: &mut Peekable<Chars<'_>>) {
    for ch in chars.by_ref() {
        if ('\x40'..='\x7e').contains(&ch) {
            break;
        }
    }
}

/// OSC, DCS and friends run until BEL or ST.
fn skip_string(chars: &mut Peekable<Chars<'_>>) {
    while let Some(ch) = chars.next() {
        match ch {
            '\x07' | '\u{9c}' => break,
            '\x1b' => {
                if chars.peek() == Some(&'\\') {
                    chars.next();
                }
                break;
            }
            _ => {}
        }
    }
}

/// Break a sanitized line into rows no wider than `cols` cells.
fn wrap_into(line: &str, cols: usize, rows: &mut Vec<String>) {
    let mut row = String::new();
    let mut width = 0;
    for ch in line.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if width + ch_width > cols && !row.is_empty() {
            rows.push(std::mem::take(&mut row));
            width = 0;
        }
        row.push(ch);
        width += ch_width;
    }
    rows.push(row);
}

/// The tail of `text` that fits in `cols` cells.
fn fit_tail(text: &str, cols: usize) -> &str {
    let mut width = 0;
    let mut start = text.len();
    for (index, ch) in text.char_indices().rev() {
        width += ch.width().unwrap_or(0);
        if width > cols {
            break;
        }
        start = index;
    }
    &text[start..]
}

/// Display lines built from the transcript as it grows, with their rows at the
/// current width. Finished lines are wrapped once; only the unterminated
/// output tail is re-wrapped when more of it arrives.
#[derive(Debug, Default)]
struct WrappedLog {
    consumed: usize,
    lines: Vec<String>,
    rows: Vec<String>,
    partial: Vec<u8>,
    partial_rows: Vec<String>,
}

impl WrappedLog {
    fn sync(&mut self, transcript: &Transcript, cols: usize) {
        let entries = transcript.entries();
        if entries.len() < self.consumed {
            *self = Self::default();
        }
        if entries.len() == self.consumed {
            return;
        }

        for entry in &entries[self.consumed..] {
            match entry.kind {
                EntryKind::Output => {
                    for &byte in &entry.bytes {
                        match byte {
                            b'\n' => self.finish_partial(cols),
                            b'\r' => {}
                            other => self.partial.push(other),
                        }
                    }
                }
                EntryKind::Command | EntryKind::Notice => {
                    if !self.partial.is_empty() {
                        self.finish_partial(cols);
                    }
                    self.push_line(&entry.text(), cols);
                }
            }
        }
        self.consumed = entries.len();
        self.wrap_partial(cols);
    }

    fn rewrap(&mut self, cols: usize) {
        self.rows.clear();
        for line in &self.lines {
            wrap_into(line, cols, &mut self.rows);
        }
        self.wrap_partial(cols);
    }

    fn finish_partial(&mut self, cols: usize) {
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        self.push_line(&line, cols);
    }

    fn push_line(&mut self, line: &str, cols: usize) {
        let line = sanitize(line);
        wrap_into(&line, cols, &mut self.rows);
        self.lines.push(line);
    }

    fn wrap_partial(&mut self, cols: usize) {
        self.partial_rows.clear();
        if !self.partial.is_empty() {
            let line = sanitize(&String::from_utf8_lossy(&self.partial));
            wrap_into(&line, cols, &mut self.partial_rows);
        }
    }

    fn len(&self) -> usize {
        self.rows.len() + self.partial_rows.len()
    }

    fn row(&self, index: usize) -> &str {
        self.rows
            .get(index)
            .or_else(|| self.partial_rows.get(index - self.rows.len()))
            .map_or("", String::as_str)
    }
}

/// Plain-log rendering for line mode.
///
/// The transcript is shown as a scrollable log with the prompt and the line
/// being edited pinned to the bottom row. Remote bytes are shown as text, never
/// interpreted. Each change repaints the visible window.
pub struct LogRenderer<W: Write + Send> {
    out: W,
    viewport: Viewport,
    log: WrappedLog,
}

impl<W: Write + Send> LogRenderer<W> {
    pub fn new(out: W, cols: u16, rows: u16) -> Self {
        Self {
            out,
            viewport: Viewport::new(cols, rows),
            log: WrappedLog::default(),
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    fn layout(&mut self, frame: &Frame<'_>) {
        let before = self.log.len();
        self.log.sync(frame.transcript, self.viewport.cols());
        let after = self.log.len();
        if after > before {
            self.viewport.grow(after - before);
        }
    }

    fn redraw(&mut self, frame: &Frame<'_>) -> io::Result<()> {
        self.layout(frame);
        self.draw(frame)
    }

    fn draw(&mut self, frame: &Frame<'_>) -> io::Result<()> {
        queue!(self.out, MoveTo(0, 0), Clear(ClearType::All))?;
        let window = self.viewport.window(self.log.len());
        for (screen_row, index) in window.enumerate() {
            queue!(self.out, MoveTo(0, screen_row as u16), Print(self.log.row(index)))?;
        }

        let mut input = frame.prompt.to_string();
        if let Some(pending) = frame.pending {
            input.push_str(&pending.as_string());
        }
        let input = sanitize(&input);
        let input_row = self.viewport.body_rows() as u16;
        queue!(
            self.out,
            MoveTo(0, input_row),
            Print(fit_tail(&input, self.viewport.cols().saturating_sub(1))),
            Show
        )?;
        self.out.flush()
    }
}

impl<W: Write + Send> OutputRenderer for LogRenderer<W> {
    fn output(&mut self, _chunk: &[u8], frame: &Frame<'_>) -> io::Result<()> {
        self.redraw(frame)
    }

    fn echo(&mut self, _edit: &EchoEdit, frame: &Frame<'_>) -> io::Result<()> {
        self.redraw(frame)
    }

    fn notice(&mut self, _text: &str, frame: &Frame<'_>) -> io::Result<()> {
        self.redraw(frame)
    }

    fn scroll(&mut self, request: ScrollRequest, frame: &Frame<'_>) -> io::Result<()> {
        self.layout(frame);
        let total = self.log.len();
        let page = self.viewport.body_rows();
        match request {
            ScrollRequest::LineUp => self.viewport.scroll_up(1, total),
            ScrollRequest::LineDown => self.viewport.scroll_down(1),
            ScrollRequest::PageUp => self.viewport.scroll_up(page, total),
            ScrollRequest::PageDown => self.viewport.scroll_down(page),
            ScrollRequest::Bottom => self.viewport.to_bottom(),
        }
        self.draw(frame)
    }

    fn resize(&mut self, cols: u16, rows: u16, frame: &Frame<'_>) -> io::Result<()> {
        self.viewport.resize(cols, rows);
        // Row count changes with the width; keep the view where it was.
        self.log.rewrap(self.viewport.cols());
        self.log.sync(frame.transcript, self.viewport.cols());
        self.draw(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::PendingInput;

    fn numbered(count: usize) -> Transcript {
        let mut transcript = Transcript::new();
        for n in 0..count {
            transcript.push_output(format!("line {n}\n").as_bytes());
        }
        transcript
    }

    fn frame<'a>(transcript: &'a Transcript, pending: Option<&'a PendingInput>) -> Frame<'a> {
        Frame {
            transcript,
            pending,
            prompt: "root@web-01:~$ ",
        }
    }

    fn screen(renderer: &LogRenderer<Vec<u8>>) -> String {
        String::from_utf8_lossy(renderer.writer()).into_owned()
    }

    #[test]
    fn viewport_follows_tail_by_default() {
        let viewport = Viewport::new(80, 5);
        assert!(viewport.is_following());
        assert_eq!(viewport.window(10), 6..10);
        assert_eq!(viewport.window(2), 0..2);
    }

    #[test]
    fn viewport_holds_position_while_scrolled_back() {
        let mut viewport = Viewport::new(80, 5);
        viewport.scroll_up(3, 20);
        assert_eq!(viewport.window(20), 13..17);

        viewport.grow(5);
        assert_eq!(viewport.window(25), 13..17);

        viewport.to_bottom();
        viewport.grow(5);
        assert_eq!(viewport.window(30), 26..30);
    }

    #[test]
    fn viewport_scroll_is_clamped() {
        let mut viewport = Viewport::new(80, 5);
        viewport.scroll_up(100, 10);
        assert_eq!(viewport.offset(), 6);
        assert_eq!(viewport.window(10), 0..4);
        viewport.scroll_down(100);
        assert!(viewport.is_following());
    }

    fn wrap_all(lines: &[String], cols: usize) -> Vec<String> {
        let mut rows = Vec::new();
        for line in lines {
            wrap_into(&sanitize(line), cols, &mut rows);
        }
        rows
    }

    fn log_rows<W: Write + Send>(renderer: &LogRenderer<W>) -> Vec<String> {
        (0..renderer.log.len())
            .map(|index| renderer.log.row(index).to_string())
            .collect()
    }

    #[test]
    fn long_lines_wrap_by_display_width() {
        let rows = wrap_all(&["abcdef".to_string(), "日本語".to_string(), String::new()], 4);
        assert_eq!(rows, vec!["abcd", "ef", "日本", "語", ""]);
    }

    #[test]
    fn escape_sequences_take_no_columns() {
        let colored = format!("{}abc", "\x1b[31m".repeat(10));
        assert_eq!(wrap_all(&[colored], 10), vec!["abc"]);
    }

    #[test]
    fn sanitize_strips_sequences_and_expands_tabs() {
        assert_eq!(sanitize("\x1b[2J\x1b[1;1Hspoof\tX"), "spoof   X");
        assert_eq!(sanitize("\x1b]0;title\x07done"), "done");
        assert_eq!(sanitize("\x1b]0;title\x1b\\done"), "done");
        assert_eq!(sanitize("\x1b(Bplain\x1b="), "plain");
        assert_eq!(sanitize("a\x08b\x07"), "a^Hb^G");
        assert_eq!(sanitize("\tx"), "        x");
    }

    #[test]
    fn remote_escapes_never_reach_the_screen() {
        let mut transcript = Transcript::new();
        let chunk = b"ok\n\x1b[2J\x1b[5;5Hspoof\tX\n";
        transcript.push_output(chunk);
        let mut renderer = LogRenderer::new(Vec::new(), 80, 10);
        renderer.output(chunk, &frame(&transcript, None)).unwrap();

        let drawn = screen(&renderer);
        // Only the renderer's own clear is present.
        assert_eq!(drawn.matches("\x1b[2J").count(), 1);
        assert!(!drawn.contains("\x1b[5;5H"));
        assert!(drawn.contains("spoof   X"));
        assert_eq!(log_rows(&renderer), vec!["ok", "spoof   X"]);
    }

    #[test]
    fn rows_are_built_incrementally() {
        let mut transcript = Transcript::new();
        let mut renderer = LogRenderer::new(Vec::new(), 6, 10);

        transcript.push_output(b"abc");
        renderer.output(b"abc", &frame(&transcript, None)).unwrap();
        assert_eq!(log_rows(&renderer), vec!["abc"]);

        transcript.push_output(b"defgh\xe2\x82");
        renderer.output(b"", &frame(&transcript, None)).unwrap();
        transcript.push_output(b"\xac\nnext");
        renderer.output(b"", &frame(&transcript, None)).unwrap();
        transcript.push_command("$ ls");
        renderer
            .echo(&EchoEdit::Commit("$ ls".into()), &frame(&transcript, None))
            .unwrap();
        transcript.push_output(b"tail");
        renderer.output(b"tail", &frame(&transcript, None)).unwrap();

        assert_eq!(renderer.log.consumed, transcript.len());
        assert_eq!(renderer.log.lines.len(), 3);
        assert_eq!(log_rows(&renderer), wrap_all(&transcript.lines(), 6));
        assert_eq!(log_rows(&renderer), vec!["abcdef", "gh€", "next", "$ ls", "tail"]);
    }

    #[test]
    fn resize_rewraps_cached_lines() {
        let mut transcript = Transcript::new();
        transcript.push_output(b"abcdefgh\npart");
        let mut renderer = LogRenderer::new(Vec::new(), 80, 10);
        renderer.output(b"", &frame(&transcript, None)).unwrap();
        assert_eq!(log_rows(&renderer), vec!["abcdefgh", "part"]);

        transcript.push_output(b"ial");
        renderer.resize(4, 10, &frame(&transcript, None)).unwrap();
        assert_eq!(log_rows(&renderer), vec!["abcd", "efgh", "part", "ial"]);
        assert_eq!(log_rows(&renderer), wrap_all(&transcript.lines(), 4));
    }

    #[test]
    fn input_line_keeps_its_tail() {
        assert_eq!(fit_tail("root@web-01:~$ ls -la", 6), "ls -la");
        assert_eq!(fit_tail("ab", 6), "ab");
    }

    #[test]
    fn redraw_shows_log_prompt_and_pending_line() {
        let mut transcript = Transcript::new();
        transcript.push_output(b"welcome\n");
        let mut pending = PendingInput::new();
        pending.insert('l');
        pending.insert('s');

        let mut renderer = LogRenderer::new(Vec::new(), 80, 10);
        renderer
            .echo(&EchoEdit::Insert('s'), &frame(&transcript, Some(&pending)))
            .unwrap();
        let drawn = screen(&renderer);
        assert!(drawn.contains("welcome"));
        assert!(drawn.contains("root@web-01:~$ ls"));
    }

    #[test]
    fn page_up_reveals_older_lines() {
        let transcript = numbered(30);
        let mut renderer = LogRenderer::new(Vec::new(), 80, 6);
        renderer.output(b"", &frame(&transcript, None)).unwrap();
        assert!(renderer.viewport().is_following());

        renderer
            .scroll(ScrollRequest::PageUp, &frame(&transcript, None))
            .unwrap();
        assert_eq!(renderer.viewport().offset(), 5);
        assert!(screen(&renderer).contains("line 20"));

        renderer
            .scroll(ScrollRequest::Bottom, &frame(&transcript, None))
            .unwrap();
        assert!(renderer.viewport().is_following());
    }

    #[test]
    fn new_output_does_not_yank_a_scrolled_view() {
        let mut transcript = numbered(30);
        let mut renderer = LogRenderer::new(Vec::new(), 80, 6);
        renderer.output(b"", &frame(&transcript, None)).unwrap();
        renderer
            .scroll(ScrollRequest::LineUp, &frame(&transcript, None))
            .unwrap();
        let before = renderer.viewport().window(30);

        transcript.push_output(b"fresh\n");
        renderer.output(b"fresh\n", &frame(&transcript, None)).unwrap();
        assert_eq!(renderer.viewport().window(31), before);
    }
}
