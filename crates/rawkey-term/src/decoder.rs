// SPDX-License-Identifier: MIT
//
// Input decoder — raw terminal bytes in, one `KeyEvent` out per call.
//
// Each `next_event()` call blocks for one byte and then decides:
//
//   0x20..=0x7E      → Character
//   1..=26, 127      → ControlChar (Tab and Enter included)
//   ESC              → escape continuation (below)
//   anything else    → Unrecognized
//
// # Escape vs escape sequence
//
// A lone ESC is either the Escape key or the first byte of a sequence,
// and only timing tells them apart. After an ESC the source is switched
// to a short read timeout (`DecoderConfig::escape_timeout`) for the rest
// of the sequence; nothing arriving in time means the Escape key. A very
// slow paste can be misread as Escape + characters, which is accepted.
// The source is back in blocking mode before every return, error paths
// included.
//
// Recognized continuations:
//
//   CSI A/B/C/D            arrows
//   CSI H / F / Z          Home, End, Shift+Tab
//   CSI n ~                1/7 Home, 2 Insert, 3 Delete, 4/8 End, 5 PgUp, 6 PgDn
//   CSI nn ~               11–14 F1–F4, 15–24 F5–F12
//   SS3 P/Q/R/S            F1–F4
//
// Anything else after `CSI` costs at most three more bytes of lookahead
// (stopping at the sequence's final byte) and yields `Unrecognized`.
//
// # Push-back
//
// ESC followed by an unrelated byte (Alt+x, or two Escapes in a row) is
// reported as Escape, and the second byte is kept and decoded by the next
// call. That one byte is the only state carried between calls.

use std::io;
use std::time::Duration;

use crate::error::DecodeError;
use crate::key::{Arrow, ControlCode, KeyEvent, NavKey};
use crate::source::ByteSource;

const ESC: u8 = 0x1B;

/// How long to wait for the byte after an ESC before calling it the
/// Escape key. Terminals send a whole sequence in one write, so the
/// second byte normally arrives within a millisecond.
pub const DEFAULT_ESCAPE_TIMEOUT: Duration = Duration::from_millis(30);

/// Extra bytes an unknown CSI sequence may swallow.
const MAX_DISCARD: usize = 3;

/// Decoder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Read timeout inside an escape sequence.
    pub escape_timeout: Duration,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            escape_timeout: DEFAULT_ESCAPE_TIMEOUT,
        }
    }
}

/// Turns a [`ByteSource`] into key events.
///
/// # Example
///
/// ```
/// use rawkey_term::decoder::Decoder;
/// use rawkey_term::key::{Arrow, KeyEvent};
/// use rawkey_term::source::MemorySource;
///
/// let mut decoder = Decoder::new(MemorySource::new(b"a\x1b[B"));
/// assert_eq!(decoder.next_event()?, KeyEvent::Character(b'a'));
/// assert_eq!(decoder.next_event()?, KeyEvent::Arrow(Arrow::Down));
/// # Ok::<(), rawkey_term::DecodeError>(())
/// ```
#[derive(Debug)]
pub struct Decoder<S> {
    source: S,
    config: DecoderConfig,
    /// A byte read past the end of the previous event.
    pending: Option<u8>,
}

impl<S: ByteSource> Decoder<S> {
    /// A decoder with the default escape timeout.
    pub fn new(source: S) -> Self {
        Self::with_config(source, DecoderConfig::default())
    }

    #[must_use]
    pub const fn with_config(source: S, config: DecoderConfig) -> Self {
        Self {
            source,
            config,
            pending: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DecoderConfig {
        &self.config
    }

    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Direct access to the byte source, bypassing any pushed-back byte.
    ///
    /// The geometry probe reads its reply through this, so a pushed-back
    /// keystroke stays queued for the next [`next_event`](Self::next_event).
    pub const fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Whether a pushed-back byte is waiting to be decoded.
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Read one key event, blocking until the first byte arrives.
    ///
    /// # Errors
    ///
    /// [`DecodeError::StreamClosed`] when the source ends or fails. Unknown
    /// bytes are never an error; they come back as
    /// [`KeyEvent::Unrecognized`].
    pub fn next_event(&mut self) -> Result<KeyEvent, DecodeError> {
        let byte = match self.pending.take() {
            Some(byte) => byte,
            None => self
                .source
                .read_byte()?
                .ok_or(DecodeError::StreamClosed { source: None })?,
        };

        match byte {
            0x20..=0x7E => Ok(KeyEvent::Character(byte)),
            1..=26 | 0x7F => Ok(ControlCode::new(byte)
                .map_or(KeyEvent::Unrecognized, KeyEvent::ControlChar)),
            ESC => self.with_timeout(Self::escape),
            0xC0..=0xF7 => self.with_timeout(|d| d.skip_utf8_tail(byte)),
            _ => {
                tracing::debug!(byte, "unrecognized input byte");
                Ok(KeyEvent::Unrecognized)
            }
        }
    }

    /// Run `f` with the escape timeout applied, then put the source back
    /// into blocking mode whatever `f` returned.
    fn with_timeout(
        &mut self,
        f: impl FnOnce(&mut Self) -> io::Result<KeyEvent>,
    ) -> Result<KeyEvent, DecodeError> {
        self.source
            .set_read_timeout(Some(self.config.escape_timeout))?;
        let event = f(self);
        let restored = self.source.set_read_timeout(None);
        let event = event?;
        restored?;
        Ok(event)
    }

    // ── Escape continuation ─────────────────────────────────────────

    fn escape(&mut self) -> io::Result<KeyEvent> {
        let Some(next) = self.source.read_byte()? else {
            return Ok(KeyEvent::ControlChar(ControlCode::ESCAPE));
        };

        match next {
            b'[' => self.csi(),
            b'O' => self.ss3(),
            other => {
                self.pending = Some(other);
                Ok(KeyEvent::ControlChar(ControlCode::ESCAPE))
            }
        }
    }

    fn csi(&mut self) -> io::Result<KeyEvent> {
        let Some(byte) = self.source.read_byte()? else {
            return Ok(unrecognized(&[ESC, b'[']));
        };

        if let Some(arrow) = Arrow::from_final_byte(byte) {
            return Ok(KeyEvent::Arrow(arrow));
        }

        match byte {
            b'H' => Ok(KeyEvent::Navigation(NavKey::Home)),
            b'F' => Ok(KeyEvent::Navigation(NavKey::End)),
            b'Z' => Ok(KeyEvent::Navigation(NavKey::ShiftTab)),
            b'0'..=b'9' => self.csi_tilde(byte),
            _ => self.give_up(vec![ESC, b'[', byte], MAX_DISCARD),
        }
    }

    /// `CSI <digit> ~` and `CSI <digit><digit> ~`.
    fn csi_tilde(&mut self, first: u8) -> io::Result<KeyEvent> {
        let mut seen = vec![ESC, b'[', first];

        let Some(second) = self.source.read_byte()? else {
            return Ok(unrecognized(&seen));
        };
        seen.push(second);

        if second == b'~' {
            let param = u16::from(first - b'0');
            return Ok(tilde_key(param).unwrap_or_else(|| unrecognized(&seen)));
        }
        if !second.is_ascii_digit() {
            return self.give_up(seen, MAX_DISCARD - 1);
        }

        let Some(third) = self.source.read_byte()? else {
            return Ok(unrecognized(&seen));
        };
        seen.push(third);

        if third != b'~' {
            return self.give_up(seen, MAX_DISCARD - 2);
        }

        let param = u16::from(first - b'0') * 10 + u16::from(second - b'0');
        Ok(tilde_key(param).unwrap_or_else(|| unrecognized(&seen)))
    }

    fn ss3(&mut self) -> io::Result<KeyEvent> {
        let Some(byte) = self.source.read_byte()? else {
            return Ok(unrecognized(&[ESC, b'O']));
        };

        match byte {
            b'P'..=b'S' => Ok(KeyEvent::FunctionKey(byte - b'P' + 1)),
            _ => Ok(unrecognized(&[ESC, b'O', byte])),
        }
    }

    /// Swallow the rest of an unknown CSI sequence: while the last byte is
    /// a parameter or intermediate byte, read on, at most `budget` more
    /// bytes. Bytes read past the first after `CSI` count against
    /// [`MAX_DISCARD`], so callers pass what is left of it.
    fn give_up(&mut self, mut seen: Vec<u8>, budget: usize) -> io::Result<KeyEvent> {
        for _ in 0..budget {
            if !seen.last().is_some_and(|&b| is_csi_parameter(b)) {
                break;
            }
            match self.source.read_byte()? {
                Some(byte) => seen.push(byte),
                None => break,
            }
        }
        Ok(unrecognized(&seen))
    }

    // ── Non-ASCII ───────────────────────────────────────────────────

    /// A UTF-8 lead byte: drop its continuation bytes so they don't each
    /// come back as their own `Unrecognized`. A byte that is not a
    /// continuation is pushed back rather than lost.
    fn skip_utf8_tail(&mut self, lead: u8) -> io::Result<KeyEvent> {
        let mut seen = vec![lead];

        for _ in 1..utf8_char_len(lead) {
            match self.source.read_byte()? {
                Some(byte) if byte & 0xC0 == 0x80 => seen.push(byte),
                Some(byte) => {
                    self.pending = Some(byte);
                    break;
                }
                None => break,
            }
        }
        Ok(unrecognized(&seen))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn unrecognized(bytes: &[u8]) -> KeyEvent {
    tracing::debug!(?bytes, "unrecognized key sequence");
    KeyEvent::Unrecognized
}

/// Key for a `CSI <param> ~` sequence.
const fn tilde_key(param: u16) -> Option<KeyEvent> {
    let key = match param {
        1 | 7 => KeyEvent::Navigation(NavKey::Home),
        2 => KeyEvent::Navigation(NavKey::Insert),
        3 => KeyEvent::Navigation(NavKey::Delete),
        4 | 8 => KeyEvent::Navigation(NavKey::End),
        5 => KeyEvent::Navigation(NavKey::PageUp),
        6 => KeyEvent::Navigation(NavKey::PageDown),
        11 => KeyEvent::FunctionKey(1),
        12 => KeyEvent::FunctionKey(2),
        13 => KeyEvent::FunctionKey(3),
        14 => KeyEvent::FunctionKey(4),
        15 => KeyEvent::FunctionKey(5),
        17 => KeyEvent::FunctionKey(6),
        18 => KeyEvent::FunctionKey(7),
        19 => KeyEvent::FunctionKey(8),
        20 => KeyEvent::FunctionKey(9),
        21 => KeyEvent::FunctionKey(10),
        23 => KeyEvent::FunctionKey(11),
        24 => KeyEvent::FunctionKey(12),
        _ => return None,
    };
    Some(key)
}

/// CSI parameter (`0x30..=0x3F`) or intermediate (`0x20..=0x2F`) byte.
const fn is_csi_parameter(byte: u8) -> bool {
    matches!(byte, 0x20..=0x3F)
}

/// Expected length of a UTF-8 sequence from its lead byte.
const fn utf8_char_len(lead: u8) -> usize {
    match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
