// SPDX-License-Identifier: MIT
//
// Outgoing escape sequences (program → terminal).
//
// Pure functions that write to any `impl Write`. No state and no flushing;
// callers batch what they need and flush once. Coordinates are the
// terminal's own 1-based rows and columns, passed through unchanged.

use std::io::{self, Write};

/// Row and column far beyond any real terminal. The terminal clamps a
/// cursor move to its last cell, which is how the round-trip probe
/// learns the size.
pub const FAR_CORNER: u16 = 9999;

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// Move the cursor to `(row, col)`, both 1-based (CUP).
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn cursor_to(w: &mut impl Write, row: u16, col: u16) -> io::Result<()> {
    write!(w, "\x1b[{row};{col}H")
}

/// Move the cursor to the top-left cell.
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn cursor_home(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[H")
}

/// Hide the cursor (DECTCEM reset).
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn cursor_hide(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25l")
}

/// Show the cursor (DECTCEM set).
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn cursor_show(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25h")
}

/// Show or hide the cursor.
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn cursor_visible(w: &mut impl Write, visible: bool) -> io::Result<()> {
    if visible { cursor_show(w) } else { cursor_hide(w) }
}

/// Save the cursor position (DECSC).
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn save_cursor(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b7")
}

/// Restore the position saved by [`save_cursor`] (DECRC).
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn restore_cursor(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b8")
}

/// Ask the terminal to report the cursor position (DSR 6).
///
/// The reply arrives on stdin as `ESC [ row ; col R`.
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn request_cursor_position(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[6n")
}

// ─── Screen ──────────────────────────────────────────────────────────────────

/// Clear the entire screen (ED 2).
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn clear_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[2J")
}

/// Reset all SGR attributes to terminal defaults (SGR 0).
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn reset(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[0m")
}

/// Switch to the alternate screen buffer.
///
/// Mode 1049 also saves the cursor, so leaving restores both the primary
/// screen content and the cursor position.
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn enter_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049h")
}

/// Return to the primary screen buffer.
///
/// # Errors
///
/// Whatever writing to `w` returns.
#[inline]
pub fn exit_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049l")
}

// ─── Tests ───────────────────────────────────────────────────────────────────
