// SPDX-License-Identifier: MIT
//
// The key-event viewer loop.
//
// Threads:
//
//   key-reader → blocks in `Console::next_key_event`, sends each event
//                through a channel, sets the quit flag on the quit key
//   main       → `recv_timeout` on the channel, prints events, checks the
//                SIGWINCH flag once per tick and re-probes the geometry
//
// Once the reader is running it holds the input lock while blocked in
// read(), so a cursor round trip would stall until the next keystroke.
// Re-measuring after a resize always uses the ioctl query; SIGWINCH only
// exists where that query does.
//
// The reader exits on its own once it has seen the quit key or the input
// has closed, which also disconnects the channel and ends the main loop.
//
// Layout:
//
//   row 1   banner, centered
//   row 2   terminal size
//   row 4…  one line per event; back to row 4 after a full screen

use std::any::Any;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use rawkey_term::{
    ansi, resize, Console, ControlCode, GeometrySize, KeyEvent, ModeGuard, ProbeConfig,
    ProbeStrategy,
};
use rawkey_term::source::{ByteSource, StdinSource};
use unicode_width::UnicodeWidthStr;

use crate::cli::Cli;

/// How often the main loop wakes to check for resizes without input.
const TICK: Duration = Duration::from_millis(50);

/// First row used for events.
const FIRST_EVENT_ROW: u16 = 4;

const BANNER: &str = "rawkey · key event viewer";

/// Whether `event` ends the session.
pub fn is_quit(event: KeyEvent, quit_char: u8) -> bool {
    event == ControlCode::CTRL_C || event == KeyEvent::Character(quit_char)
}

/// 1-based column that centers `text` in `cols` display columns.
pub fn centered_col(text: &str, cols: u16) -> u16 {
    let width = u16::try_from(text.width()).unwrap_or(u16::MAX);
    cols.saturating_sub(width) / 2 + 1
}

// ─── Screen ──────────────────────────────────────────────────────────────────

/// What the viewer shows and where the next event goes.
#[derive(Debug)]
pub struct Screen {
    size: GeometrySize,
    quit_char: u8,
    row: u16,
    seen: u64,
}

impl Screen {
    pub const fn new(size: GeometrySize, quit_char: u8) -> Self {
        Self {
            size,
            quit_char,
            row: FIRST_EVENT_ROW,
            seen: 0,
        }
    }

    pub const fn set_size(&mut self, size: GeometrySize) {
        self.size = size;
    }

    /// Clear and draw the header. Events start over below it.
    pub fn redraw(&mut self, out: &mut impl Write) -> io::Result<()> {
        ansi::clear_screen(out)?;
        ansi::cursor_to(out, 1, centered_col(BANNER, self.size.cols))?;
        out.write_all(BANNER.as_bytes())?;

        ansi::cursor_to(out, 2, 1)?;
        if self.size.is_unknown() {
            out.write_all(b"size: unknown")?;
        } else {
            write!(out, "size: {}", self.size)?;
        }
        write!(
            out,
            "   quit: '{}' or Ctrl-C",
            char::from(self.quit_char)
        )?;

        self.row = FIRST_EVENT_ROW;
        out.flush()
    }

    /// Print one event on its own line.
    pub fn push_event(&mut self, out: &mut impl Write, event: KeyEvent) -> io::Result<()> {
        if !self.size.is_unknown() && self.row > self.size.rows {
            self.redraw(out)?;
        }
        self.seen += 1;

        ansi::cursor_to(out, self.row, 1)?;
        write!(out, "{:>5}  {event}", self.seen)?;
        self.row = self.row.saturating_add(1);
        out.flush()
    }
}

// ─── Run ─────────────────────────────────────────────────────────────────────

/// Run the viewer until the quit key or end of input.
///
/// # Errors
///
/// Fails if raw mode can't be entered, the terminal can't be written, or
/// restoring the terminal fails at the end.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let probe = cli.probe_config();
    let console = Arc::new(Console::with_config(
        StdinSource::new(),
        io::stdout(),
        cli.decoder_config(),
        probe,
    ));

    let guard = ModeGuard::enter(cli.show_cursor).context("cannot enter raw mode")?;
    resize::install();

    let result = session(&console, &probe, cli.quit_char);
    let restored = guard.restore().context("failed to restore the terminal");
    result.and(restored)
}

fn session(console: &Arc<Console>, probe: &ProbeConfig, quit_char: u8) -> anyhow::Result<()> {
    // Measure before the reader holds the input lock.
    let mut screen = Screen::new(measure(console, probe), quit_char);
    console
        .with_output(|out| screen.redraw(out))
        .context("failed to draw")?;

    let quit = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    let reader = spawn_reader(Arc::clone(console), tx, Arc::clone(&quit), quit_char)?;

    let result = event_loop(console, &rx, &quit, probe, &mut screen);

    // The reader is done once it saw the quit key or end of input. After
    // an error it may still be blocked in read(); leave it behind.
    if quit.load(Ordering::Relaxed) || reader.is_finished() {
        if let Err(payload) = reader.join() {
            tracing::warn!(panic = panic_message(&*payload), "key reader thread panicked");
        }
    }
    result
}

fn event_loop(
    console: &Console,
    rx: &Receiver<KeyEvent>,
    quit: &AtomicBool,
    probe: &ProbeConfig,
    screen: &mut Screen,
) -> anyhow::Result<()> {
    loop {
        match rx.recv_timeout(TICK) {
            Ok(event) => console
                .with_output(|out| screen.push_event(out, event))
                .context("failed to print event")?,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }

        if quit.load(Ordering::Relaxed) {
            return Ok(());
        }

        if resize::take() {
            screen.set_size(measure(console, &resize_config(probe)));
            console
                .with_output(|out| screen.redraw(out))
                .context("failed to redraw")?;
        }
    }
}

fn spawn_reader(
    console: Arc<Console>,
    tx: Sender<KeyEvent>,
    quit: Arc<AtomicBool>,
    quit_char: u8,
) -> anyhow::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("key-reader".into())
        .spawn(move || {
            loop {
                match console.next_key_event() {
                    Ok(event) if is_quit(event, quit_char) => {
                        tracing::info!(%event, "quit key");
                        quit.store(true, Ordering::Relaxed);
                        break;
                    }
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::info!(error = %err, "input closed");
                        break;
                    }
                }
            }
        })
        .context("failed to spawn key reader thread")
}

/// Settings for re-measuring after SIGWINCH: never the round trip, which
/// would wait on the reader's input lock.
const fn resize_config(probe: &ProbeConfig) -> ProbeConfig {
    ProbeConfig {
        strategy: ProbeStrategy::Direct,
        reply_timeout: probe.reply_timeout,
    }
}

/// Text of a thread panic payload, if it carried one.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// Geometry, or [`GeometrySize::UNKNOWN`] if the probe fails.
fn measure<S: ByteSource, W: Write>(console: &Console<S, W>, probe: &ProbeConfig) -> GeometrySize {
    console.query_geometry(probe).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "terminal size unknown");
        GeometrySize::UNKNOWN
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rawkey_term::Arrow;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    // ── Quit detection ───────────────────────────────────────────────

    #[test]
    fn ctrl_c_and_quit_char_quit() {
        assert!(is_quit(KeyEvent::ControlChar(ControlCode::CTRL_C), b'q'));
        assert!(is_quit(KeyEvent::Character(b'q'), b'q'));
        assert!(is_quit(KeyEvent::Character(b'x'), b'x'));
    }

    #[test]
    fn other_keys_do_not_quit() {
        assert!(!is_quit(KeyEvent::Character(b'Q'), b'q'));
        assert!(!is_quit(KeyEvent::ControlChar(ControlCode::ESCAPE), b'q'));
        assert!(!is_quit(KeyEvent::ControlChar(ControlCode::CTRL_D), b'q'));
        assert!(!is_quit(KeyEvent::Arrow(Arrow::Up), b'q'));
        assert!(!is_quit(KeyEvent::Unrecognized, b'q'));
    }

    // ── Resize ───────────────────────────────────────────────────────

    #[test]
    fn resize_never_uses_the_round_trip() {
        let cursor = ProbeConfig {
            strategy: ProbeStrategy::CursorRoundTrip,
            reply_timeout: Duration::from_millis(120),
        };
        let resized = resize_config(&cursor);
        assert_eq!(resized.strategy, ProbeStrategy::Direct);
        assert_eq!(resized.reply_timeout, Duration::from_millis(120));
        assert_eq!(resize_config(&ProbeConfig::default()).strategy, ProbeStrategy::Direct);
    }

    #[test]
    fn resize_measure_sends_nothing_to_the_terminal() {
        use rawkey_term::source::MemorySource;

        // Pending keys stay with the reader.
        let console = Console::new(MemorySource::new(b"q"), Vec::new());
        let cursor = ProbeConfig {
            strategy: ProbeStrategy::CursorRoundTrip,
            ..ProbeConfig::default()
        };
        let _ = measure(&console, &resize_config(&cursor));

        console.with_output(|out| assert!(out.is_empty()));
        assert_eq!(console.next_key_event().unwrap(), KeyEvent::Character(b'q'));
    }

    // ── Thread panics ────────────────────────────────────────────────

    #[test]
    fn panic_payload_text() {
        let str_payload = thread::spawn(|| panic!("boom")).join().unwrap_err();
        assert_eq!(panic_message(&*str_payload), "boom");

        let string_payload = thread::spawn(|| panic!("{}", String::from("bang")))
            .join()
            .unwrap_err();
        assert_eq!(panic_message(&*string_payload), "bang");

        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*other), "<non-string panic payload>");
    }

    // ── Layout ───────────────────────────────────────────────────────

    #[test]
    fn centering_uses_display_width() {
        // The middle dot is two bytes but one column.
        assert_eq!(BANNER.width(), 25);
        assert_eq!(centered_col(BANNER, 80), 28);
        assert_eq!(centered_col("ab", 4), 2);
    }

    #[test]
    fn centering_narrow_or_unknown_terminal() {
        assert_eq!(centered_col(BANNER, 10), 1);
        assert_eq!(centered_col(BANNER, 0), 1);
    }

    #[test]
    fn redraw_writes_header() {
        let mut screen = Screen::new(GeometrySize::new(24, 80), b'q');
        let out = render(|w| screen.redraw(w));
        assert!(out.starts_with("\x1b[2J\x1b[1;28H"));
        assert!(out.contains(BANNER));
        assert!(out.contains("\x1b[2;1Hsize: 80x24   quit: 'q' or Ctrl-C"));
    }

    #[test]
    fn redraw_with_unknown_size() {
        let mut screen = Screen::new(GeometrySize::UNKNOWN, b'x');
        let out = render(|w| screen.redraw(w));
        assert!(out.contains("size: unknown   quit: 'x' or Ctrl-C"));
    }

    #[test]
    fn events_go_one_per_row() {
        let mut screen = Screen::new(GeometrySize::new(24, 80), b'q');
        let first = render(|w| screen.push_event(w, KeyEvent::Character(b'a')));
        let second = render(|w| screen.push_event(w, KeyEvent::Arrow(Arrow::Up)));
        assert_eq!(first, "\x1b[4;1H    1  character: 'a'");
        assert_eq!(second, "\x1b[5;1H    2  arrow: Up");
    }

    #[test]
    fn full_screen_starts_over() {
        let mut screen = Screen::new(GeometrySize::new(5, 80), b'q');
        render(|w| screen.push_event(w, KeyEvent::Character(b'a')));
        render(|w| screen.push_event(w, KeyEvent::Character(b'b')));
        let third = render(|w| screen.push_event(w, KeyEvent::Character(b'c')));
        assert!(third.starts_with("\x1b[2J"));
        assert!(third.ends_with("\x1b[4;1H    3  character: 'c'"));
    }

    #[test]
    fn unknown_size_never_wraps() {
        let mut screen = Screen::new(GeometrySize::UNKNOWN, b'q');
        for _ in 0..100 {
            let out = render(|w| screen.push_event(w, KeyEvent::Unrecognized));
            assert!(!out.contains("\x1b[2J"));
        }
    }
}
