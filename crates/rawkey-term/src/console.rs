// SPDX-License-Identifier: MIT
//
// Console — one input stream, one output stream, shared across threads.
//
// Key decoding and the cursor round-trip probe read the same bytes. If a
// reader thread pulled half of a `ESC [ 24 ; 80 R` reply out from under
// the probe, both would see garbage. So both go through one input mutex
// that is held for the whole multi-byte read. Output has its own mutex;
// whenever both are needed the order is input, then output.
//
// The direct (ioctl) probe touches neither stream and takes no lock.

use std::io::{self, Write};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use crate::decoder::{Decoder, DecoderConfig};
use crate::error::{DecodeError, GeometryError};
use crate::geometry::{self, CursorPosition, GeometrySize, ProbeConfig, ProbeStrategy};
use crate::key::KeyEvent;
use crate::source::{ByteSource, StdinSource};

/// A terminal's input decoder and output writer behind their locks.
#[derive(Debug)]
pub struct Console<S = StdinSource, W = io::Stdout> {
    input: Mutex<Decoder<S>>,
    output: Mutex<W>,
    probe: ProbeConfig,
}

impl Console {
    /// Stdin and stdout with default settings.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(StdinSource::new(), io::stdout())
    }
}

impl<S: ByteSource, W: Write> Console<S, W> {
    /// Default decoder and probe settings.
    #[must_use]
    pub fn new(source: S, output: W) -> Self {
        Self::with_config(source, output, DecoderConfig::default(), ProbeConfig::default())
    }

    /// `decoder` tunes key decoding; `probe` is used by
    /// [`cursor_position`](Self::cursor_position).
    #[must_use]
    pub fn with_config(source: S, output: W, decoder: DecoderConfig, probe: ProbeConfig) -> Self {
        Self {
            input: Mutex::new(Decoder::with_config(source, decoder)),
            output: Mutex::new(output),
            probe,
        }
    }

    /// Settings used by [`cursor_position`](Self::cursor_position).
    #[must_use]
    pub const fn probe_config(&self) -> &ProbeConfig {
        &self.probe
    }

    /// Block until the next key event. See [`Decoder::next_event`].
    ///
    /// # Errors
    ///
    /// [`DecodeError::StreamClosed`] once the input ends or fails.
    pub fn next_key_event(&self) -> Result<KeyEvent, DecodeError> {
        self.input().next_event()
    }

    /// Terminal size using `config.strategy`.
    ///
    /// The round trip waits for the input lock, so it queues behind a
    /// reader blocked in [`next_key_event`](Self::next_key_event).
    ///
    /// # Errors
    ///
    /// [`GeometryError::NotATerminal`] from the direct query;
    /// [`GeometryError::MalformedReply`] or [`GeometryError::Io`] from the
    /// round trip.
    pub fn query_geometry(&self, config: &ProbeConfig) -> Result<GeometrySize, GeometryError> {
        match config.strategy {
            ProbeStrategy::Direct => geometry::direct_size(),
            ProbeStrategy::CursorRoundTrip => {
                let mut input = self.input();
                let mut output = self.output();
                geometry::probe_size(input.source_mut(), &mut *output, config.reply_timeout)
            }
        }
    }

    /// Where the cursor is now, by DSR 6. The cursor does not move.
    ///
    /// # Errors
    ///
    /// [`GeometryError::MalformedReply`] or [`GeometryError::Io`].
    pub fn cursor_position(&self) -> Result<CursorPosition, GeometryError> {
        let mut input = self.input();
        let mut output = self.output();
        geometry::probe_position(input.source_mut(), &mut *output, self.probe.reply_timeout)
    }

    /// Run `f` with the output stream locked.
    pub fn with_output<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.output())
    }

    /// Give back the decoder and the writer. A poisoned lock still yields
    /// its contents.
    #[must_use]
    pub fn into_parts(self) -> (Decoder<S>, W) {
        (
            self.input.into_inner().unwrap_or_else(PoisonError::into_inner),
            self.output.into_inner().unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn input(&self) -> MutexGuard<'_, Decoder<S>> {
        self.input.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn output(&self) -> MutexGuard<'_, W> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static GLOBAL: LazyLock<Console> = LazyLock::new(Console::stdin);

/// The process-wide console on stdin and stdout.
#[must_use]
pub fn global() -> &'static Console {
    &GLOBAL
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Arrow, ControlCode};
    use crate::source::MemorySource;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    fn console(bytes: &[u8]) -> Console<MemorySource, Vec<u8>> {
        Console::new(MemorySource::new(bytes), Vec::new())
    }

    fn round_trip() -> ProbeConfig {
        ProbeConfig {
            strategy: ProbeStrategy::CursorRoundTrip,
            ..ProbeConfig::default()
        }
    }

    #[test]
    fn decodes_through_the_lock() {
        let c = console(b"a\x1b[A\x03");
        assert_eq!(c.next_key_event().unwrap(), KeyEvent::Character(b'a'));
        assert_eq!(c.next_key_event().unwrap(), KeyEvent::Arrow(Arrow::Up));
        assert!(c.next_key_event().unwrap() == ControlCode::CTRL_C);
        assert!(matches!(
            c.next_key_event(),
            Err(DecodeError::StreamClosed { source: None })
        ));
    }

    #[test]
    fn round_trip_geometry() {
        let c = console(b"\x1b[40;120R");
        let size = c.query_geometry(&round_trip()).unwrap();
        assert_eq!(size, GeometrySize::new(40, 120));

        let (_, out) = c.into_parts();
        assert_eq!(out, b"\x1b7\x1b[9999;9999H\x1b[6n\x1b8");
    }

    #[test]
    fn round_trip_keeps_pushed_back_key() {
        // ESC then 'x' decodes as Escape with 'x' held back; the reply
        // behind it must not disturb that.
        let c = console(b"\x1bx\x1b[24;80R");
        assert!(c.next_key_event().unwrap() == ControlCode::ESCAPE);

        let size = c.query_geometry(&round_trip()).unwrap();
        assert_eq!(size, GeometrySize::new(24, 80));
        assert_eq!(c.next_key_event().unwrap(), KeyEvent::Character(b'x'));
    }

    #[test]
    fn round_trip_leaves_following_keys() {
        let c = console(b"\x1b[24;80Rq");
        c.query_geometry(&round_trip()).unwrap();
        assert_eq!(c.next_key_event().unwrap(), KeyEvent::Character(b'q'));
    }

    #[test]
    fn malformed_reply_is_reported() {
        let c = console(b"garbage");
        assert!(matches!(
            c.query_geometry(&round_trip()),
            Err(GeometryError::MalformedReply { .. })
        ));
    }

    #[test]
    fn cursor_position_does_not_move_cursor() {
        let c = console(b"\x1b[5;9R");
        assert_eq!(
            c.cursor_position().unwrap(),
            CursorPosition { row: 5, col: 9 }
        );
        c.with_output(|out| assert_eq!(out.as_slice(), b"\x1b[6n"));
    }

    #[test]
    fn direct_geometry_does_not_panic() {
        let c = console(b"");
        let direct = ProbeConfig {
            strategy: ProbeStrategy::Direct,
            ..ProbeConfig::default()
        };
        let _ = c.query_geometry(&direct);
        c.with_output(|out| assert!(out.is_empty()));
    }

    #[test]
    fn concurrent_readers_never_tear_sequences() {
        const SEQUENCES: usize = 200;
        let bytes = b"\x1b[D".repeat(SEQUENCES);
        let c = Arc::new(console(&bytes));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&c);
                thread::spawn(move || {
                    let mut events = Vec::new();
                    while let Ok(event) = c.next_key_event() {
                        events.push(event);
                    }
                    events
                })
            })
            .collect();

        let events: Vec<KeyEvent> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(events.len(), SEQUENCES);
        assert!(events.iter().all(|e| *e == KeyEvent::Arrow(Arrow::Left)));
    }

    #[test]
    fn into_parts_survives_a_panicked_writer() {
        let c = Arc::new(console(b""));
        let writer = Arc::clone(&c);
        let result = thread::spawn(move || {
            writer.with_output(|out| {
                out.extend_from_slice(b"half");
                panic!("writer died");
            });
        })
        .join();
        assert!(result.is_err());

        // Still usable, and the bytes written before the panic are kept.
        c.with_output(|out| out.extend_from_slice(b" done"));
        let c = Arc::try_unwrap(c).unwrap();
        let (_, out) = c.into_parts();
        assert_eq!(out, b"half done");
    }

    #[test]
    fn stdin_console_uses_defaults() {
        let c = Console::stdin();
        assert_eq!(*c.probe_config(), ProbeConfig::default());
    }
}
