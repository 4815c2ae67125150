// SPDX-License-Identifier: MIT
//
// Error types for the three terminal components.
//
// Only hard failures live here. Malformed key input is never an error: it
// comes back as `KeyEvent::Unrecognized` so the read loop stays alive.

use std::io;

use thiserror::Error;

/// Failure to switch the terminal into or out of raw mode.
#[derive(Debug, Error)]
pub enum ModeError {
    /// Standard input is not an interactive terminal.
    #[error("standard input is not a terminal")]
    NotATerminal,

    /// A termios call or a write of a mode sequence failed.
    #[error("{op} failed: {source}")]
    SystemCall {
        /// The operation that failed.
        op: &'static str,
        /// Underlying OS error.
        source: io::Error,
    },
}

impl ModeError {
    pub(crate) const fn system(op: &'static str, source: io::Error) -> Self {
        Self::SystemCall { op, source }
    }
}

/// Failure to determine the terminal size.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// No controlling terminal to ask.
    #[error("no controlling terminal")]
    NotATerminal,

    /// The cursor report did not match `ESC [ rows ; cols R`.
    #[error("malformed cursor position reply: {reply:?}")]
    MalformedReply {
        /// Bytes consumed before the grammar broke (or the reply ended).
        reply: Vec<u8>,
    },

    /// Writing the request or reading the reply failed.
    #[error("geometry probe I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Failure to read the next key event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The byte source reached end of stream or its read failed.
    #[error("input stream closed")]
    StreamClosed {
        /// The read error, if the stream did not simply end.
        #[source]
        source: Option<io::Error>,
    },
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        Self::StreamClosed { source: Some(err) }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
