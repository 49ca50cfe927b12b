/// Shadow model of the remote line editor's input buffer.
///
/// The remote shell is the ground truth; this is a best-effort local mirror
/// built from the keystrokes we forward. Transient divergence is tolerated,
/// and the buffer is fully reset on every line-terminating event so drift
/// cannot accumulate across commands.

/// Local guess of the remote editor's text and cursor. The cursor is
/// counted in chars, never bytes, so multi-byte input stays in bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowLineBuffer {
    text: String,
    cursor: usize,
}

impl ShadowLineBuffer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Byte offset of the char cursor.
    fn byte_cursor(&self) -> usize {
        self.text
            .char_indices()
            .nth(self.cursor)
            .map(|(idx, _)| idx)
            .unwrap_or(self.text.len())
    }

    pub fn insert_str(&mut self, s: &str) {
        let at = self.byte_cursor();
        self.text.insert_str(at, s);
        self.cursor += s.chars().count();
    }

    /// Delete the char before the cursor. No-op at position 0.
    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_cursor();
        self.text.remove(at);
    }

    /// Delete the char at the cursor.
    pub fn forward_delete(&mut self) {
        if self.cursor < self.char_count() {
            let at = self.byte_cursor();
            self.text.remove(at);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.char_count() {
            self.cursor += 1;
        }
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.char_count();
    }

    /// Shell word-erase: delete the run of whitespace immediately before
    /// the cursor, then the non-whitespace token before that.
    pub fn word_erase(&mut self) {
        let end = self.byte_cursor();
        let head = &self.text[..end];
        let mut boundary = end;
        let mut chars: Vec<(usize, char)> = head.char_indices().collect();
        while let Some(&(idx, ch)) = chars.last() {
            if ch.is_whitespace() {
                boundary = idx;
                chars.pop();
            } else {
                break;
            }
        }
        while let Some(&(idx, ch)) = chars.last() {
            if !ch.is_whitespace() {
                boundary = idx;
                chars.pop();
            } else {
                break;
            }
        }
        let removed = self.text[boundary..end].chars().count();
        self.text.replace_range(boundary..end, "");
        self.cursor -= removed;
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    /// Take the current line and reset to empty.
    pub fn take_line(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    /// Replace the token after the last whitespace before the cursor with
    /// `replacement`, leaving anything after the cursor in place. Used when
    /// a completion is applied.
    pub fn replace_trailing_token(&mut self, replacement: &str) {
        let end = self.byte_cursor();
        let head = &self.text[..end];
        let token_start = head
            .char_indices()
            .rev()
            .find(|(_, ch)| ch.is_whitespace())
            .map(|(idx, ch)| idx + ch.len_utf8())
            .unwrap_or(0);
        let prefix_chars = self.text[..token_start].chars().count();
        self.text.replace_range(token_start..end, replacement);
        self.cursor = prefix_chars + replacement.chars().count();
    }
}

/// One classified input unit. A unit is the byte sequence a single
/// keystroke (or paste) produces on the browser side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyUnit {
    Insert(String),
    Backspace,
    ForwardDelete,
    Left,
    Right,
    Home,
    End,
    WordErase,
    /// Ctrl-C. Always clears the line.
    Interrupt,
    /// Ctrl-D. Clears only when the buffer is empty; otherwise the
    /// readline dual behavior applies and it deletes at the cursor.
    Eof,
    /// Ctrl-U.
    KillLine,
    Enter,
    Tab,
    /// Anything we do not recognize is forwarded untouched and the shadow
    /// is left alone.
    Passthrough,
}

pub fn classify(raw: &[u8]) -> KeyUnit {
    match raw {
        b"\t" => KeyUnit::Tab,
        b"\r" | b"\n" | b"\r\n" => KeyUnit::Enter,
        [0x7f] | [0x08] => KeyUnit::Backspace,
        [0x03] => KeyUnit::Interrupt,
        [0x04] => KeyUnit::Eof,
        [0x15] => KeyUnit::KillLine,
        [0x17] => KeyUnit::WordErase,
        [0x01] => KeyUnit::Home,
        [0x05] => KeyUnit::End,
        [0x1b, b'[', b'D'] => KeyUnit::Left,
        [0x1b, b'[', b'C'] => KeyUnit::Right,
        [0x1b, b'[', b'H'] | [0x1b, b'O', b'H'] | [0x1b, b'[', b'1', b'~'] => KeyUnit::Home,
        [0x1b, b'[', b'F'] | [0x1b, b'O', b'F'] | [0x1b, b'[', b'4', b'~'] => KeyUnit::End,
        [0x1b, b'[', b'3', b'~'] => KeyUnit::ForwardDelete,
        _ => match std::str::from_utf8(raw) {
            Ok(s) if !s.is_empty() && s.chars().all(|c| !c.is_control()) => {
                KeyUnit::Insert(s.to_string())
            }
            _ => KeyUnit::Passthrough,
        },
    }
}

/// What the session should do with a unit after the shadow has absorbed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedInput {
    /// Forward the raw bytes to the transport unchanged.
    Forward,
    /// Tab is intercepted, never forwarded; carries the shadow snapshot
    /// for the completion request.
    Tab { text: String, cursor: usize },
    /// Enter is intercepted; the line goes to the risk gate instead of
    /// the wire.
    Submit { text: String },
}

/// Consumes every raw input unit destined for the remote editor and keeps
/// the shadow buffer in step. Never blocks, no side effects beyond the
/// buffer.
#[derive(Debug, Default)]
pub struct ShadowTracker {
    buffer: ShadowLineBuffer,
}

impl ShadowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &ShadowLineBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ShadowLineBuffer {
        &mut self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn ingest(&mut self, raw: &[u8]) -> TrackedInput {
        match classify(raw) {
            KeyUnit::Insert(s) => {
                self.buffer.insert_str(&s);
                TrackedInput::Forward
            }
            KeyUnit::Backspace => {
                self.buffer.backspace();
                TrackedInput::Forward
            }
            KeyUnit::ForwardDelete => {
                self.buffer.forward_delete();
                TrackedInput::Forward
            }
            KeyUnit::Left => {
                self.buffer.move_left();
                TrackedInput::Forward
            }
            KeyUnit::Right => {
                self.buffer.move_right();
                TrackedInput::Forward
            }
            KeyUnit::Home => {
                self.buffer.move_home();
                TrackedInput::Forward
            }
            KeyUnit::End => {
                self.buffer.move_end();
                TrackedInput::Forward
            }
            KeyUnit::WordErase => {
                self.buffer.word_erase();
                TrackedInput::Forward
            }
            KeyUnit::Interrupt | KeyUnit::KillLine => {
                self.buffer.clear();
                TrackedInput::Forward
            }
            KeyUnit::Eof => {
                if self.buffer.is_empty() {
                    self.buffer.clear();
                } else {
                    self.buffer.forward_delete();
                }
                TrackedInput::Forward
            }
            KeyUnit::Enter => TrackedInput::Submit {
                text: self.buffer.take_line(),
            },
            KeyUnit::Tab => TrackedInput::Tab {
                text: self.buffer.text().to_string(),
                cursor: self.buffer.cursor(),
            },
            KeyUnit::Passthrough => TrackedInput::Forward,
        }
    }
}
