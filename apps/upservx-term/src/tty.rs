use std::io::{self, Write};

use crossterm::{
    cursor::Show,
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use tracing::warn;

use crate::session::InteractionMode;

/// Puts the local tty into the shape a session needs and restores it on drop.
///
/// Both modes read keys one at a time, so raw mode is always requested. Line
/// mode additionally owns the alternate screen for its redrawn log.
pub struct TerminalGuard {
    raw: bool,
    alternate: bool,
}

impl TerminalGuard {
    pub fn enter(mode: InteractionMode) -> Self {
        let raw = match enable_raw_mode() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "failed to enable raw mode");
                false
            }
        };

        let mut stdout = io::stdout();
        let alternate = match mode {
            InteractionMode::LineBuffered => {
                match execute!(stdout, EnterAlternateScreen, EnableBracketedPaste) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(error = %err, "failed to enter alternate screen");
                        false
                    }
                }
            }
            InteractionMode::Raw => {
                if let Err(err) = execute!(stdout, EnableBracketedPaste) {
                    warn!(error = %err, "failed to enable bracketed paste");
                }
                false
            }
        };

        Self { raw, alternate }
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = execute!(stdout, DisableBracketedPaste);
        if self.alternate {
            let _ = execute!(stdout, LeaveAlternateScreen, Show);
        }
        if self.raw {
            let _ = disable_raw_mode();
        }
        let _ = stdout.flush();
    }
}

/// Current terminal size, or a conventional 80x24 when stdout is not a tty.
pub fn size_or_default() -> (u16, u16) {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => (cols, rows),
        _ => (80, 24),
    }
}
