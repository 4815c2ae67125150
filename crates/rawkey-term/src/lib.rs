// SPDX-License-Identifier: MIT
//
// rawkey-term — terminal control for rawkey.
//
// Three pieces, consumed bottom-up by an application:
//
//   mode     → raw mode, alternate screen, cursor visibility, guaranteed restore
//   geometry → terminal size, by ioctl or by a cursor-position round trip
//   decoder  → raw stdin bytes collapsed into one `KeyEvent` per call
//
// `console` ties the decoder and the probe to one shared input lock so a
// geometry reply can never be torn apart by a concurrent key read. The
// free functions below are the process-level surface: one controlling
// terminal per process, one lazily created console on stdin/stdout.

pub mod ansi;
pub mod console;
pub mod decoder;
pub mod error;
pub mod geometry;
pub mod key;
pub mod mode;
pub mod resize;
pub mod source;

pub use console::Console;
pub use decoder::{Decoder, DecoderConfig};
pub use error::{DecodeError, GeometryError, ModeError};
pub use geometry::{CursorPosition, GeometrySize, ProbeConfig, ProbeStrategy};
pub use key::{Arrow, ControlCode, KeyEvent, NavKey};
pub use mode::{ModeGuard, TerminalMode};

/// Enter raw mode on the controlling terminal. See [`mode::enter_raw_mode`].
///
/// # Errors
///
/// [`ModeError::NotATerminal`] when stdin is not a TTY, [`ModeError::SystemCall`]
/// when a termios call or terminal write fails.
pub fn enter_raw_mode(show_cursor: bool) -> Result<(), ModeError> {
    mode::enter_raw_mode(show_cursor)
}

/// Undo everything [`enter_raw_mode`] did. Safe to call at any time.
///
/// # Errors
///
/// [`ModeError::SystemCall`] when restoring termios or writing fails.
pub fn restore_mode() -> Result<(), ModeError> {
    mode::restore_mode()
}

/// Query the terminal size with the platform's default strategy.
///
/// # Errors
///
/// See [`Console::query_geometry`].
pub fn query_geometry() -> Result<GeometrySize, GeometryError> {
    console::global().query_geometry(&ProbeConfig::default())
}

/// Block until the next key event arrives on stdin.
///
/// # Errors
///
/// [`DecodeError::StreamClosed`] once stdin is closed or unreadable.
pub fn next_key_event() -> Result<KeyEvent, DecodeError> {
    console::global().next_key_event()
}
