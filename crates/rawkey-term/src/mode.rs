// SPDX-License-Identifier: MIT
//
// Mode controller — raw mode, alternate screen, cursor visibility, and
// guaranteed restoration.
//
// Safety: the Unix backend necessarily uses `unsafe` for termios
// (tcgetattr, tcsetattr), isatty, and a raw fd write in the panic hook.
// These are the standard POSIX interfaces for terminal control. Each
// unsafe block is minimal.
#![allow(unsafe_code)]
//
// `ModeController` is the state machine: it remembers which effects of
// `enter` are in force and `restore` undoes exactly those, in reverse
// order. Effects are recorded before the bytes that cause them are
// written, so a half-finished `enter` is still fully undone. Restoring
// with nothing in force is a no-op, which makes `restore` safe to call
// from every exit path, any number of times.
//
// The platform side (save attributes, go raw, put them back) sits behind
// `RawModeBackend`. The process-wide controller pairs the termios backend
// with stdout and lives behind a mutex; `ModeGuard` is the RAII handle
// applications hold.
//
// The panic hook bypasses that mutex entirely. It writes a pre-built
// restore sequence straight to fd 1 and puts the saved termios back, so
// a panic in raw mode (even one raised while the stdout lock was held)
// still prints its message to a working terminal.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, Once, PoisonError};

use bitflags::bitflags;

use crate::ansi;
use crate::error::ModeError;

// ─── TerminalMode ───────────────────────────────────────────────────────────

/// Snapshot of the terminal's mode as far as this process changed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalMode {
    /// Canonical input and echo are off.
    pub raw_mode: bool,
    /// The alternate screen buffer is shown.
    pub alternate_buffer: bool,
    /// The cursor is visible.
    pub cursor_visible: bool,
}

impl TerminalMode {
    /// The untouched terminal: line-buffered, primary screen, cursor shown.
    pub const COOKED: Self = Self {
        raw_mode: false,
        alternate_buffer: false,
        cursor_visible: true,
    };
}

impl Default for TerminalMode {
    fn default() -> Self {
        Self::COOKED
    }
}

bitflags! {
    /// Effects of `enter` currently in force.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct Applied: u8 {
        const RAW = 0b001;
        const ALTERNATE_SCREEN = 0b010;
        const CURSOR_HIDDEN = 0b100;
    }
}

// ─── Backend ────────────────────────────────────────────────────────────────

/// Platform hooks for switching terminal input between cooked and raw.
pub trait RawModeBackend {
    /// Whatever is needed to put the original attributes back.
    type Saved;

    /// Whether stdin and stdout are an interactive terminal.
    fn is_terminal(&self) -> bool;

    /// Save the current attributes, then switch input to raw mode.
    ///
    /// # Errors
    ///
    /// Returns the OS error if reading or applying attributes fails.
    fn enable_raw(&mut self) -> io::Result<Self::Saved>;

    /// Put back attributes saved by [`enable_raw`](Self::enable_raw).
    ///
    /// # Errors
    ///
    /// Returns the OS error if applying attributes fails.
    fn restore(&mut self, saved: &Self::Saved) -> io::Result<()>;
}

/// Backend for the platform this crate was built for.
#[cfg(unix)]
pub type PlatformBackend = TermiosBackend;
#[cfg(not(unix))]
pub type PlatformBackend = UnsupportedBackend;

/// Global backup of the original termios for panic recovery.
///
/// The controller owns its own copy, but the panic hook can't reach the
/// controller without risking a deadlock on its mutex.
#[cfg(unix)]
static TERMIOS_BACKUP: Mutex<Option<libc::termios>> = Mutex::new(None);

/// Raw mode through POSIX termios on stdin.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct TermiosBackend;

#[cfg(unix)]
impl RawModeBackend for TermiosBackend {
    type Saved = libc::termios;

    fn is_terminal(&self) -> bool {
        unsafe { libc::isatty(libc::STDIN_FILENO) != 0 && libc::isatty(libc::STDOUT_FILENO) != 0 }
    }

    fn enable_raw(&mut self) -> io::Result<libc::termios> {
        let fd = libc::STDIN_FILENO;

        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &raw mut termios) != 0 {
                return Err(io::Error::last_os_error());
            }
            let original = termios;

            // cfmakeraw equivalent. ISIG goes too, so Ctrl-C arrives as byte 3.
            termios.c_iflag &= !(libc::IGNBRK
                | libc::BRKINT
                | libc::PARMRK
                | libc::ISTRIP
                | libc::INLCR
                | libc::IGNCR
                | libc::ICRNL
                | libc::IXON);
            termios.c_oflag &= !libc::OPOST;
            termios.c_lflag &=
                !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
            termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
            termios.c_cflag |= libc::CS8;

            // VMIN=1, VTIME=0: read() blocks until at least 1 byte available.
            termios.c_cc[libc::VMIN] = 1;
            termios.c_cc[libc::VTIME] = 0;

            if libc::tcsetattr(fd, libc::TCSAFLUSH, &raw const termios) != 0 {
                return Err(io::Error::last_os_error());
            }

            *TERMIOS_BACKUP.lock().unwrap_or_else(PoisonError::into_inner) = Some(original);
            Ok(original)
        }
    }

    fn restore(&mut self, saved: &libc::termios) -> io::Result<()> {
        unsafe {
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, saved) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        *TERMIOS_BACKUP.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Backend for platforms without termios: never a terminal.
#[cfg(not(unix))]
#[derive(Debug, Default)]
pub struct UnsupportedBackend;

#[cfg(not(unix))]
impl RawModeBackend for UnsupportedBackend {
    type Saved = ();

    fn is_terminal(&self) -> bool {
        false
    }

    fn enable_raw(&mut self) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    fn restore(&mut self, _saved: &()) -> io::Result<()> {
        Ok(())
    }
}

// ─── ModeController ─────────────────────────────────────────────────────────

/// Tracks and reverses every change `enter` makes to the terminal.
pub struct ModeController<B: RawModeBackend, W> {
    backend: B,
    out: W,
    saved: Option<B::Saved>,
    applied: Applied,
}

impl<B: RawModeBackend, W: Write> ModeController<B, W> {
    /// A controller with nothing applied. Sequences go to `out`.
    pub const fn new(backend: B, out: W) -> Self {
        Self {
            backend,
            out,
            saved: None,
            applied: Applied::empty(),
        }
    }

    /// Current mode as seen by this controller.
    #[must_use]
    pub const fn mode(&self) -> TerminalMode {
        TerminalMode {
            raw_mode: self.applied.contains(Applied::RAW),
            alternate_buffer: self.applied.contains(Applied::ALTERNATE_SCREEN),
            cursor_visible: !self.applied.contains(Applied::CURSOR_HIDDEN),
        }
    }

    /// Whether anything still needs restoring.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.applied.is_empty()
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub const fn output(&self) -> &W {
        &self.out
    }

    /// Enter raw mode on the alternate screen, cleared, cursor at home.
    ///
    /// A no-op while already active.
    ///
    /// # Errors
    ///
    /// [`ModeError::NotATerminal`] if the backend reports no terminal;
    /// [`ModeError::SystemCall`] if going raw or writing the sequences
    /// fails. After a write failure the raw mode stays recorded, so
    /// [`restore`](Self::restore) still undoes it.
    pub fn enter(&mut self, show_cursor: bool) -> Result<(), ModeError> {
        if self.is_active() {
            return Ok(());
        }
        if !self.backend.is_terminal() {
            return Err(ModeError::NotATerminal);
        }

        let saved = self
            .backend
            .enable_raw()
            .map_err(|e| ModeError::system("enable raw mode", e))?;
        self.saved = Some(saved);
        self.applied.insert(Applied::RAW | Applied::ALTERNATE_SCREEN);
        if !show_cursor {
            self.applied.insert(Applied::CURSOR_HIDDEN);
        }

        self.write_enter(show_cursor)
            .map_err(|e| ModeError::system("write mode sequences", e))?;

        tracing::debug!(show_cursor, "terminal entered raw mode");
        Ok(())
    }

    fn write_enter(&mut self, show_cursor: bool) -> io::Result<()> {
        ansi::enter_alt_screen(&mut self.out)?;
        ansi::clear_screen(&mut self.out)?;
        ansi::cursor_home(&mut self.out)?;
        ansi::cursor_visible(&mut self.out, show_cursor)?;
        self.out.flush()
    }

    /// Undo whatever [`enter`](Self::enter) put in force, in reverse order.
    ///
    /// Always attempts every step. Screen and cursor state count as
    /// restored once the attempt is made; raw mode stays recorded if
    /// putting termios back fails, so a later call can retry.
    ///
    /// # Errors
    ///
    /// The first failure, as [`ModeError::SystemCall`].
    pub fn restore(&mut self) -> Result<(), ModeError> {
        if !self.is_active() {
            return Ok(());
        }

        let written = self
            .write_restore()
            .map_err(|e| ModeError::system("write restore sequences", e));
        self.applied
            .remove(Applied::CURSOR_HIDDEN | Applied::ALTERNATE_SCREEN);

        let termios = match &self.saved {
            Some(saved) => self
                .backend
                .restore(saved)
                .map_err(|e| ModeError::system("restore terminal attributes", e)),
            None => Ok(()),
        };
        if termios.is_ok() {
            self.saved = None;
            self.applied.remove(Applied::RAW);
            tracing::debug!("terminal restored");
        }

        written.and(termios)
    }

    fn write_restore(&mut self) -> io::Result<()> {
        if self.applied.contains(Applied::CURSOR_HIDDEN) {
            ansi::cursor_show(&mut self.out)?;
        }
        ansi::reset(&mut self.out)?;
        if self.applied.contains(Applied::ALTERNATE_SCREEN) {
            ansi::exit_alt_screen(&mut self.out)?;
        }
        self.out.flush()
    }
}

// ─── Process-wide controller ────────────────────────────────────────────────

type GlobalController = ModeController<PlatformBackend, io::Stdout>;

/// The one controlling terminal. Created on first use.
static CONTROLLER: LazyLock<Mutex<GlobalController>> =
    LazyLock::new(|| Mutex::new(ModeController::new(PlatformBackend::default(), io::stdout())));

/// Set while the process-wide controller has something to restore.
/// Read by the panic hook, which must not touch `CONTROLLER`.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Poison-tolerant: a panic elsewhere must not block restoration.
fn controller() -> MutexGuard<'static, GlobalController> {
    CONTROLLER.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Enter raw mode on the controlling terminal.
///
/// Installs the panic hook on first call. See [`ModeController::enter`].
///
/// # Errors
///
/// [`ModeError::NotATerminal`] or [`ModeError::SystemCall`].
pub fn enter_raw_mode(show_cursor: bool) -> Result<(), ModeError> {
    install_panic_hook();
    let mut controller = controller();
    let result = controller.enter(show_cursor);
    ACTIVE.store(controller.is_active(), Ordering::SeqCst);
    result
}

/// Restore the controlling terminal. A no-op if nothing was entered.
///
/// # Errors
///
/// [`ModeError::SystemCall`] if a restoration step failed.
pub fn restore_mode() -> Result<(), ModeError> {
    let mut controller = controller();
    let result = controller.restore();
    ACTIVE.store(controller.is_active(), Ordering::SeqCst);
    result
}

/// Mode of the controlling terminal as this process left it.
#[must_use]
pub fn current_mode() -> TerminalMode {
    controller().mode()
}

/// RAII handle for raw mode on the controlling terminal.
///
/// Restores on drop, including during unwinding. A failed restore on drop
/// is logged, since nothing else can be done with it at that point; call
/// [`restore`](Self::restore) explicitly to observe the result.
///
/// # Example
///
/// ```no_run
/// use rawkey_term::mode::ModeGuard;
///
/// let guard = ModeGuard::enter(false)?;
/// // ... read keys, draw ...
/// guard.restore()?;
/// # Ok::<(), rawkey_term::ModeError>(())
/// ```
#[derive(Debug)]
#[must_use = "dropping the guard restores the terminal immediately"]
pub struct ModeGuard {
    _private: (),
}

impl ModeGuard {
    /// Enter raw mode. On failure, anything partially applied is undone
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Same as [`enter_raw_mode`].
    pub fn enter(show_cursor: bool) -> Result<Self, ModeError> {
        if let Err(err) = enter_raw_mode(show_cursor) {
            if let Err(cleanup) = restore_mode() {
                tracing::warn!(error = %cleanup, "cleanup after failed enter also failed");
            }
            return Err(err);
        }
        Ok(Self { _private: () })
    }

    /// Restore now and report the outcome.
    ///
    /// # Errors
    ///
    /// Same as [`restore_mode`].
    pub fn restore(self) -> Result<(), ModeError> {
        // Drop runs after this and only has work left if it failed.
        restore_mode()
    }
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        if let Err(err) = restore_mode() {
            tracing::warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

// ─── Panic-Safe Terminal Restore ────────────────────────────────────────────

/// Emergency restore sequence: reset SGR, show cursor, leave the
/// alternate screen. Alternate screen exit is last so the shell content
/// comes back with no TUI artifacts.
const EMERGENCY_RESTORE: &[u8] = b"\x1b[0m\x1b[?25h\x1b[?1049l";

static PANIC_HOOK_INSTALLED: Once = Once::new();

fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if ACTIVE.load(Ordering::SeqCst) {
                emergency_restore();
            }
            original(info);
        }));
    });
}

/// Write [`EMERGENCY_RESTORE`] to fd 1 without Rust's stdout lock, then
/// put the backed-up termios back.
#[cfg(unix)]
fn emergency_restore() {
    use std::sync::TryLockError;

    unsafe {
        let _ = libc::write(
            libc::STDOUT_FILENO,
            EMERGENCY_RESTORE.as_ptr().cast::<libc::c_void>(),
            EMERGENCY_RESTORE.len(),
        );
    }

    let backup = match TERMIOS_BACKUP.try_lock() {
        Ok(guard) => *guard,
        Err(TryLockError::Poisoned(poisoned)) => *poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => None,
    };
    if let Some(original) = backup {
        unsafe {
            let _ = libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw const original);
        }
    }
}

#[cfg(not(unix))]
fn emergency_restore() {
    let mut out = io::stdout();
    let _ = out.write_all(EMERGENCY_RESTORE);
    let _ = out.flush();
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENTER_HIDDEN: &str = "\x1b[?1049h\x1b[2J\x1b[H\x1b[?25l";
    const RESTORE_HIDDEN: &str = "\x1b[?25h\x1b[0m\x1b[?1049l";

    #[derive(Debug, Default)]
    struct FakeBackend {
        not_a_tty: bool,
        fail_enable: bool,
        fail_restore: bool,
        raw: bool,
        restores: usize,
    }

    impl RawModeBackend for FakeBackend {
        type Saved = &'static str;

        fn is_terminal(&self) -> bool {
            !self.not_a_tty
        }

        fn enable_raw(&mut self) -> io::Result<&'static str> {
            if self.fail_enable {
                return Err(io::Error::other("tcgetattr"));
            }
            self.raw = true;
            Ok("cooked")
        }

        fn restore(&mut self, saved: &&'static str) -> io::Result<()> {
            assert_eq!(*saved, "cooked");
            self.restores += 1;
            if self.fail_restore {
                return Err(io::Error::other("tcsetattr"));
            }
            self.raw = false;
            Ok(())
        }
    }

    /// Accepts nothing.
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    fn fake() -> ModeController<FakeBackend, Vec<u8>> {
        ModeController::new(FakeBackend::default(), Vec::new())
    }

    fn written(ctl: &ModeController<FakeBackend, Vec<u8>>) -> String {
        String::from_utf8(ctl.output().clone()).unwrap()
    }

    // ── TerminalMode ─────────────────────────────────────────────────

    #[test]
    fn default_mode_is_cooked() {
        assert_eq!(TerminalMode::default(), TerminalMode::COOKED);
        assert_eq!(fake().mode(), TerminalMode::COOKED);
        assert!(!fake().is_active());
    }

    // ── Enter ────────────────────────────────────────────────────────

    #[test]
    fn enter_writes_sequences_in_order() {
        let mut ctl = fake();
        ctl.enter(false).unwrap();
        assert_eq!(written(&ctl), ENTER_HIDDEN);
        assert!(ctl.backend().raw);
        assert_eq!(
            ctl.mode(),
            TerminalMode {
                raw_mode: true,
                alternate_buffer: true,
                cursor_visible: false,
            }
        );
    }

    #[test]
    fn enter_with_visible_cursor() {
        let mut ctl = fake();
        ctl.enter(true).unwrap();
        assert!(written(&ctl).ends_with("\x1b[?25h"));
        assert!(ctl.mode().cursor_visible);
    }

    #[test]
    fn enter_twice_is_idempotent() {
        let mut ctl = fake();
        ctl.enter(false).unwrap();
        ctl.enter(true).unwrap();
        assert_eq!(written(&ctl), ENTER_HIDDEN);
        assert!(!ctl.mode().cursor_visible);
    }

    #[test]
    fn enter_without_terminal() {
        let mut ctl = ModeController::new(
            FakeBackend {
                not_a_tty: true,
                ..FakeBackend::default()
            },
            Vec::new(),
        );
        assert!(matches!(ctl.enter(false), Err(ModeError::NotATerminal)));
        assert!(ctl.output().is_empty());
        assert!(!ctl.is_active());
    }

    #[test]
    fn enter_raw_failure_applies_nothing() {
        let mut ctl = ModeController::new(
            FakeBackend {
                fail_enable: true,
                ..FakeBackend::default()
            },
            Vec::new(),
        );
        assert!(matches!(
            ctl.enter(false),
            Err(ModeError::SystemCall { .. })
        ));
        assert!(ctl.output().is_empty());
        assert_eq!(ctl.mode(), TerminalMode::COOKED);
    }

    #[test]
    fn failed_write_during_enter_is_still_undone() {
        let mut ctl = ModeController::new(FakeBackend::default(), BrokenPipe);
        assert!(matches!(
            ctl.enter(false),
            Err(ModeError::SystemCall { .. })
        ));
        assert!(ctl.mode().raw_mode);

        // Writing fails again, but raw mode still comes off.
        assert!(ctl.restore().is_err());
        assert!(!ctl.backend().raw);
        assert_eq!(ctl.mode(), TerminalMode::COOKED);
        assert!(ctl.restore().is_ok());
    }

    // ── Restore ──────────────────────────────────────────────────────

    #[test]
    fn restore_before_enter_is_noop() {
        let mut ctl = fake();
        ctl.restore().unwrap();
        assert!(ctl.output().is_empty());
        assert_eq!(ctl.backend().restores, 0);
    }

    #[test]
    fn restore_reverses_enter() {
        let mut ctl = fake();
        ctl.enter(false).unwrap();
        ctl.restore().unwrap();
        assert_eq!(written(&ctl), format!("{ENTER_HIDDEN}{RESTORE_HIDDEN}"));
        assert!(!ctl.backend().raw);
        assert_eq!(ctl.mode(), TerminalMode::COOKED);
    }

    #[test]
    fn restore_skips_cursor_when_it_was_visible() {
        let mut ctl = fake();
        ctl.enter(true).unwrap();
        let before = written(&ctl).len();
        ctl.restore().unwrap();
        assert_eq!(&written(&ctl)[before..], "\x1b[0m\x1b[?1049l");
    }

    #[test]
    fn double_restore_matches_single() {
        let mut ctl = fake();
        ctl.enter(false).unwrap();
        ctl.restore().unwrap();
        let once = (written(&ctl), ctl.mode(), ctl.backend().restores);
        ctl.restore().unwrap();
        let twice = (written(&ctl), ctl.mode(), ctl.backend().restores);
        assert_eq!(once, twice);
    }

    #[test]
    fn failed_termios_restore_can_be_retried() {
        let mut ctl = ModeController::new(
            FakeBackend {
                fail_restore: true,
                ..FakeBackend::default()
            },
            Vec::new(),
        );
        ctl.enter(false).unwrap();
        assert!(ctl.restore().is_err());
        assert!(ctl.mode().raw_mode);
        assert!(!ctl.mode().alternate_buffer);

        ctl.backend.fail_restore = false;
        ctl.restore().unwrap();
        assert_eq!(ctl.backend().restores, 2);
        assert_eq!(ctl.mode(), TerminalMode::COOKED);
    }

    #[test]
    fn multiple_cycles() {
        let mut ctl = fake();
        for _ in 0..3 {
            ctl.enter(false).unwrap();
            assert!(ctl.is_active());
            ctl.restore().unwrap();
            assert!(!ctl.is_active());
        }
        assert_eq!(ctl.backend().restores, 3);
    }

    // ── Process-wide controller ─────────────────────────────────────

    #[test]
    fn global_restore_before_enter_is_ok() {
        restore_mode().unwrap();
        restore_mode().unwrap();
    }

    #[test]
    fn guard_does_not_panic() {
        // Not a terminal under `cargo test` in CI; either way the guard
        // must leave the terminal cooked.
        if let Ok(guard) = ModeGuard::enter(false) {
            guard.restore().unwrap();
        }
        assert_eq!(current_mode(), TerminalMode::COOKED);
    }

    // ── Emergency restore sequence ──────────────────────────────────

    #[test]
    fn emergency_restore_exits_alt_screen_last() {
        let s = std::str::from_utf8(EMERGENCY_RESTORE).unwrap();
        assert!(s.ends_with("\x1b[?1049l"));
        assert!(s.contains("\x1b[?25h"), "must show cursor");
        assert!(s.contains("\x1b[0m"), "must reset SGR attributes");
    }
}
