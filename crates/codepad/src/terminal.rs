//! Terminal stream processing
//!
//! Dev servers and package managers write for a real terminal: colors,
//! spinners redrawn with carriage returns, and full-screen clears. The
//! [`TerminalBuffer`] replays that stream into plain appendable text.
//!
//! Escape parsing state survives chunk boundaries, so a sequence split across
//! two reads is still recognized. Malformed or oversized sequences are
//! dropped; feeding never fails.

/// Longest CSI parameter run accepted before the sequence is discarded
const MAX_CSI_LEN: usize = 32;

/// Longest OSC payload accepted before the sequence is discarded
const MAX_OSC_LEN: usize = 512;

const ESC: char = '\x1b';
const BEL: char = '\x07';
const BACKSPACE: char = '\x08';

/// Escape parser state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Scan {
    #[default]
    Ground,
    /// Saw ESC
    Escape,
    /// ESC followed by an intermediate byte; the next byte ends the sequence
    EscapeIntermediate,
    /// ESC [ with accumulated parameter bytes
    Csi(String),
    /// ESC ] payload; `esc` is set after an ESC that may start the terminator
    Osc { len: usize, esc: bool },
}

/// What a completed escape sequence does to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// Styling or cursor movement with no effect on text
    Ignore,
    /// Clear the screen: drop everything accumulated so far
    Reset,
    /// Cursor to the top-left corner; a following erase clears the screen
    Home,
    /// Cursor to column zero: the next text replaces the current line
    Rewind,
    /// Erase the current line
    EraseLine,
    /// Erase from the cursor to the end of the line
    EraseToEnd,
    /// Erase from the cursor to the end of the screen
    EraseBelow,
}

/// Accumulated, normalized terminal output
#[derive(Debug, Clone, Default)]
pub struct TerminalBuffer {
    text: String,
    /// Byte offset where the last line starts
    line_start: usize,
    /// A lone carriage return was seen: the next text replaces the last line
    rewind: bool,
    /// A carriage return ended the previous input; `\r\n` or rewind is decided later
    pending_cr: bool,
    /// Cursor was sent home; an erase-display right after resets the buffer
    home: bool,
    scan: Scan,
}

impl TerminalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current normalized text
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Drop all text and parser state
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Replace the buffer with plain text, bypassing escape processing
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.clear();
        self.text = text.into();
        self.line_start = self.text.rfind('\n').map_or(0, |idx| idx + 1);
    }

    /// Feed a chunk of raw process output
    pub fn feed(&mut self, chunk: &str) {
        for c in chunk.chars() {
            self.step(c);
        }
    }

    fn step(&mut self, c: char) {
        match std::mem::take(&mut self.scan) {
            Scan::Ground => self.ground(c),
            Scan::Escape => self.escape(c),
            Scan::EscapeIntermediate => {
                // Final byte of a two-byte escape (charset designation etc.)
                if !is_escape_final(c) {
                    self.ground(c);
                }
            }
            Scan::Csi(mut params) => {
                if is_csi_final(c) {
                    let action = csi_action(&params, c);
                    self.apply(action);
                } else if is_csi_param(c) && params.len() < MAX_CSI_LEN {
                    params.push(c);
                    self.scan = Scan::Csi(params);
                } else {
                    // Malformed or runaway sequence: drop it and keep the byte as text
                    self.ground(c);
                }
            }
            Scan::Osc { len, esc } => {
                if c == BEL || (esc && c == '\\') {
                    return;
                }
                if len >= MAX_OSC_LEN {
                    self.ground(c);
                    return;
                }
                self.scan = Scan::Osc {
                    len: len + 1,
                    esc: c == ESC,
                };
            }
        }
    }

    fn ground(&mut self, c: char) {
        if self.pending_cr {
            self.pending_cr = false;
            if c == '\n' {
                self.newline();
                return;
            }
            self.rewind = true;
        }

        match c {
            ESC => self.scan = Scan::Escape,
            '\r' => self.pending_cr = true,
            '\n' => self.newline(),
            BACKSPACE => {
                if self.text.len() > self.line_start {
                    self.text.pop();
                }
            }
            '\t' => self.push(c),
            c if c.is_control() => {}
            c => self.push(c),
        }
    }

    fn escape(&mut self, c: char) {
        match c {
            '[' => self.scan = Scan::Csi(String::new()),
            ']' => self.scan = Scan::Osc { len: 0, esc: false },
            'c' => self.apply(Action::Reset),
            c if is_escape_intermediate(c) => self.scan = Scan::EscapeIntermediate,
            c if is_escape_final(c) => {}
            // Orphan ESC: discard it and treat the byte as ordinary input
            c => self.ground(c),
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Ignore => return,
            Action::Reset => {
                self.clear();
                return;
            }
            Action::Home => {
                self.home = true;
                return;
            }
            Action::EraseBelow => {
                if self.home {
                    self.clear();
                    return;
                }
            }
            Action::Rewind => self.rewind = true,
            Action::EraseLine => {
                self.text.truncate(self.line_start);
                self.rewind = false;
            }
            Action::EraseToEnd => {
                if self.rewind {
                    self.text.truncate(self.line_start);
                    self.rewind = false;
                }
            }
        }
        self.home = false;
    }

    fn push(&mut self, c: char) {
        self.home = false;
        if self.rewind {
            self.text.truncate(self.line_start);
            self.rewind = false;
        }
        self.text.push(c);
    }

    fn newline(&mut self) {
        self.home = false;
        self.rewind = false;
        // Collapse runs of blank lines to a single empty line
        if !self.text.ends_with("\n\n") {
            self.text.push('\n');
        }
        self.line_start = self.text.len();
    }
}

/// Clean a complete piece of terminal output in one go
pub fn clean(input: &str) -> String {
    let mut buffer = TerminalBuffer::new();
    buffer.feed(input);
    buffer.into_text()
}

fn is_csi_param(c: char) -> bool {
    // Parameter bytes 0x30-0x3F and intermediate bytes 0x20-0x2F
    ('\x20'..='\x3f').contains(&c)
}

fn is_csi_final(c: char) -> bool {
    ('\x40'..='\x7e').contains(&c)
}

fn is_escape_intermediate(c: char) -> bool {
    ('\x20'..='\x2f').contains(&c)
}

fn is_escape_final(c: char) -> bool {
    ('\x30'..='\x7e').contains(&c)
}

fn csi_action(params: &str, final_byte: char) -> Action {
    match final_byte {
        'H' | 'f' => {
            if matches!(params, "" | "1" | "1;1" | "0;0" | ";") {
                Action::Home
            } else {
                Action::Ignore
            }
        }
        'J' => match params {
            "2" | "3" => Action::Reset,
            "" | "0" => Action::EraseBelow,
            _ => Action::Ignore,
        },
        'K' => match params {
            "2" => Action::EraseLine,
            "" | "0" => Action::EraseToEnd,
            _ => Action::Ignore,
        },
        'G' if matches!(params, "" | "0" | "1") => Action::Rewind,
        _ => Action::Ignore,
    }
}
