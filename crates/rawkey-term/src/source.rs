// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Byte sources — where the decoder and the geometry probe read from.
//
// The decoder needs exactly two things from its input: a one-byte read,
// and a way to stop that read from blocking forever while it decides
// whether a lone ESC was the Escape key or the start of a sequence.
// `ByteSource` is that capability and nothing more, so the decoder and
// the probe are written once and tested against `MemorySource`.
//
// `StdinSource` reads fd 0 directly with `read(2)`, one byte at a time.
// Going through `io::stdin()` would put Rust's internal `BufReader` in
// between, and bytes sitting in that buffer are invisible to `poll(2)`,
// which would break the timeout. With a timeout set, each read first
// polls the fd for readability.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

/// A blocking one-byte reader with an optional per-read timeout.
pub trait ByteSource {
    /// Read one byte.
    ///
    /// Returns `Ok(None)` at end of stream, or, when a read timeout is set,
    /// when no byte arrived in time.
    ///
    /// # Errors
    ///
    /// Returns the underlying read error. Interrupted reads are retried
    /// by implementations, never surfaced.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Set how long [`read_byte`](Self::read_byte) may wait. `None` blocks
    /// until a byte arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the change.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }
}

// ─── Stdin ───────────────────────────────────────────────────────────────────

/// Standard input, read unbuffered.
#[derive(Debug)]
pub struct StdinSource {
    timeout: Option<Duration>,
}

impl StdinSource {
    /// A blocking source over fd 0.
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl ByteSource for StdinSource {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        loop {
            if let Some(timeout) = self.timeout {
                if !poll_readable(libc::STDIN_FILENO, timeout)? {
                    return Ok(None);
                }
            }

            let mut byte = 0u8;
            let n = unsafe { libc::read(libc::STDIN_FILENO, (&raw mut byte).cast(), 1) };

            match n {
                1 => return Ok(Some(byte)),
                0 => return Ok(None),
                _ => {
                    let err = io::Error::last_os_error();
                    if err.kind() != io::ErrorKind::Interrupted {
                        return Err(err);
                    }
                }
            }
        }
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}

/// Wait up to `timeout` for `fd` to become readable.
#[cfg(unix)]
fn poll_readable(fd: libc::c_int, timeout: Duration) -> io::Result<bool> {
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    loop {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&raw mut pfd, 1, millis) };

        if ready >= 0 {
            return Ok(ready > 0);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Non-unix fallback: plain blocking reads.
///
/// The timeout is recorded but not enforced, so a bare Escape is only
/// reported once the next byte arrives.
#[cfg(not(unix))]
impl ByteSource for StdinSource {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        use std::io::Read;

        let mut byte = [0u8; 1];
        loop {
            match io::stdin().lock().read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}

// ─── Memory ──────────────────────────────────────────────────────────────────

/// An in-memory byte queue.
///
/// Reads pop from the front; an empty queue reads as `None`, which the
/// decoder treats as "timed out" inside an escape sequence and as end of
/// stream otherwise. Records the timeout so tests can check the decoder
/// always puts the source back into blocking mode.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    bytes: VecDeque<u8>,
    timeout: Option<Duration>,
}

impl MemorySource {
    /// A source that will yield `bytes` in order.
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().collect(),
            timeout: None,
        }
    }

    /// Append more bytes to the end of the queue.
    pub fn push(&mut self, bytes: &[u8]) {
        self.bytes.extend(bytes);
    }

    /// Bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }

    /// Whether reads currently block (no timeout set).
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        self.timeout.is_none()
    }
}

impl ByteSource for MemorySource {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.bytes.pop_front())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
