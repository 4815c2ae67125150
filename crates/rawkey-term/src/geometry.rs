// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Geometry probe — how big is the terminal?
//
// Two ways to ask. The direct way is `ioctl(TIOCGWINSZ)`, on stdout first
// and on `/dev/tty` when stdout is redirected. The round-trip way works on
// anything that speaks VT100: park the cursor at (9999, 9999), let the
// terminal clamp it to its last cell, ask where it ended up with DSR 6,
// and read `ESC [ rows ; cols R` back from the input stream.
//
// The reply reader is strict. It consumes bytes only while they still fit
// the grammar, keeps the offending byte in the error, and leaves whatever
// follows on the stream for the key decoder. Every read has a timeout, and
// the source always goes back to blocking afterwards, so a terminal that
// never answers cannot hang the caller.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use crate::ansi;
use crate::error::GeometryError;
use crate::source::{ByteSource, MemorySource};

/// How long to wait for each byte of a cursor position reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Most digits accepted per coordinate. Five covers 65535.
const MAX_DIGITS: usize = 5;

// ─── Types ───────────────────────────────────────────────────────────────────

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GeometrySize {
    pub rows: u16,
    pub cols: u16,
}

impl GeometrySize {
    /// Size could not be determined.
    pub const UNKNOWN: Self = Self { rows: 0, cols: 0 };

    #[inline]
    #[must_use]
    pub const fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Whether either dimension is zero.
    #[inline]
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Total number of cells.
    #[inline]
    #[must_use]
    pub const fn area(self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

impl fmt::Display for GeometrySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// A 1-based cursor position as reported by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorPosition {
    pub row: u16,
    pub col: u16,
}

impl From<CursorPosition> for GeometrySize {
    /// The clamped far-corner position is the size.
    fn from(pos: CursorPosition) -> Self {
        Self {
            rows: pos.row,
            cols: pos.col,
        }
    }
}

/// Which way to ask for the size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStrategy {
    /// `ioctl(TIOCGWINSZ)`.
    Direct,
    /// Cursor-position round trip through the terminal.
    CursorRoundTrip,
}

impl Default for ProbeStrategy {
    fn default() -> Self {
        if cfg!(unix) {
            Self::Direct
        } else {
            Self::CursorRoundTrip
        }
    }
}

/// Geometry probe settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub strategy: ProbeStrategy,
    /// Per-byte wait while reading a round-trip reply.
    pub reply_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            strategy: ProbeStrategy::default(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

// ─── Direct query ────────────────────────────────────────────────────────────

/// Query the size with `ioctl(TIOCGWINSZ)`.
///
/// Tries stdout, then `/dev/tty`.
///
/// # Errors
///
/// [`GeometryError::NotATerminal`] if neither reports a non-zero size.
#[cfg(unix)]
pub fn direct_size() -> Result<GeometrySize, GeometryError> {
    use std::os::fd::AsRawFd;

    if let Some(size) = winsize_of(libc::STDOUT_FILENO) {
        return Ok(size);
    }

    let tty = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/tty")
        .map_err(|err| {
            tracing::debug!(error = %err, "no /dev/tty to query");
            GeometryError::NotATerminal
        })?;
    winsize_of(tty.as_raw_fd()).ok_or(GeometryError::NotATerminal)
}

#[cfg(unix)]
fn winsize_of(fd: libc::c_int) -> Option<GeometrySize> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &raw mut ws) };

    if result == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some(GeometrySize {
            rows: ws.ws_row,
            cols: ws.ws_col,
        })
    } else {
        None
    }
}

/// No ioctl off Unix.
///
/// # Errors
///
/// Always [`GeometryError::NotATerminal`].
#[cfg(not(unix))]
pub fn direct_size() -> Result<GeometrySize, GeometryError> {
    Err(GeometryError::NotATerminal)
}

// ─── Cursor round trip ───────────────────────────────────────────────────────

/// Write the far-corner size request: save cursor, move to
/// ([`ansi::FAR_CORNER`], [`ansi::FAR_CORNER`]), DSR 6, restore cursor.
///
/// The restore is queued behind the report request, so the terminal
/// reports the clamped position before the cursor moves back.
///
/// # Errors
///
/// Returns the write error.
pub fn write_size_request(w: &mut impl Write) -> io::Result<()> {
    ansi::save_cursor(w)?;
    ansi::cursor_to(w, ansi::FAR_CORNER, ansi::FAR_CORNER)?;
    ansi::request_cursor_position(w)?;
    ansi::restore_cursor(w)?;
    w.flush()
}

/// Ask for the cursor position and read the reply.
///
/// # Errors
///
/// [`GeometryError::Io`] if writing or reading fails,
/// [`GeometryError::MalformedReply`] if the reply is bad or late.
pub fn probe_position<S, W>(
    src: &mut S,
    out: &mut W,
    timeout: Duration,
) -> Result<CursorPosition, GeometryError>
where
    S: ByteSource + ?Sized,
    W: Write,
{
    ansi::request_cursor_position(out)?;
    out.flush()?;
    read_cursor_reply(src, timeout)
}

/// Size the terminal with the far-corner round trip.
///
/// # Errors
///
/// As [`probe_position`].
pub fn probe_size<S, W>(src: &mut S, out: &mut W, timeout: Duration) -> Result<GeometrySize, GeometryError>
where
    S: ByteSource + ?Sized,
    W: Write,
{
    write_size_request(out)?;
    let size = GeometrySize::from(read_cursor_reply(src, timeout)?);
    tracing::trace!(%size, "terminal size from cursor round trip");
    Ok(size)
}

/// Read one `ESC [ row ; col R` reply, waiting at most `timeout` per byte.
///
/// Consumes the reply and nothing after it. On a bad byte, that byte is
/// consumed and reported; the rest of the stream is untouched. The source
/// is left blocking on every path.
///
/// # Errors
///
/// [`GeometryError::MalformedReply`] on a grammar violation or timeout,
/// [`GeometryError::Io`] if the source fails.
pub fn read_cursor_reply<S>(src: &mut S, timeout: Duration) -> Result<CursorPosition, GeometryError>
where
    S: ByteSource + ?Sized,
{
    src.set_read_timeout(Some(timeout))?;
    let result = read_reply(src);
    let blocking = src.set_read_timeout(None);

    let position = result?;
    blocking?;
    Ok(position)
}

/// Parse a complete reply held in memory. Trailing bytes are an error.
///
/// # Errors
///
/// [`GeometryError::MalformedReply`] with the full input.
pub fn parse_cursor_reply(bytes: &[u8]) -> Result<CursorPosition, GeometryError> {
    let mut src = MemorySource::new(bytes);
    let position = read_reply(&mut src)?;
    if src.remaining() > 0 {
        return Err(malformed(bytes));
    }
    Ok(position)
}

fn read_reply<S: ByteSource + ?Sized>(src: &mut S) -> Result<CursorPosition, GeometryError> {
    let mut reply = Vec::with_capacity(16);

    for expected in [0x1b, b'['] {
        if next(src, &mut reply)? != expected {
            return Err(malformed(&reply));
        }
    }
    let row = number(src, &mut reply, b';')?;
    let col = number(src, &mut reply, b'R')?;

    Ok(CursorPosition { row, col })
}

/// Digits up to `terminator`, which is consumed.
fn number<S: ByteSource + ?Sized>(
    src: &mut S,
    reply: &mut Vec<u8>,
    terminator: u8,
) -> Result<u16, GeometryError> {
    let mut value: u32 = 0;
    let mut digits = 0;

    loop {
        let byte = next(src, reply)?;
        match byte {
            b'0'..=b'9' if digits < MAX_DIGITS => {
                value = value * 10 + u32::from(byte - b'0');
                digits += 1;
            }
            _ if byte == terminator && digits > 0 => {
                return u16::try_from(value).map_err(|_| malformed(reply));
            }
            _ => return Err(malformed(reply)),
        }
    }
}

fn next<S: ByteSource + ?Sized>(src: &mut S, reply: &mut Vec<u8>) -> Result<u8, GeometryError> {
    match src.read_byte()? {
        Some(byte) => {
            reply.push(byte);
            Ok(byte)
        }
        None => Err(malformed(reply)),
    }
}

fn malformed(reply: &[u8]) -> GeometryError {
    tracing::debug!(?reply, "malformed cursor position reply");
    GeometryError::MalformedReply {
        reply: reply.to_vec(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
