// SPDX-License-Identifier: MIT
//
// Key events — the unit the decoder produces.
//
// One keypress, one value, exactly one variant. Call sites mostly want to
// ask "is this 'q' or Ctrl-C or Escape?", so `KeyEvent` compares directly
// against a bare `char`, a `ControlCode`, an `Arrow`, or a `NavKey`:
//
//     key == 'q' || key == ControlCode::CTRL_C || key == ControlCode::ESCAPE
//
// Each comparison is true only for its own variant: `Character(b'\t')`
// never happens (Tab is a control code), and `ControlChar(TAB) != '\t'`.

use std::fmt;

// ─── Arrow ──────────────────────────────────────────────────────────────────

/// Cursor key direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arrow {
    Up,
    Down,
    Right,
    Left,
}

impl Arrow {
    /// Map a CSI final byte (`A`..`D`) to its direction.
    #[must_use]
    pub const fn from_final_byte(byte: u8) -> Option<Self> {
        match byte {
            b'A' => Some(Self::Up),
            b'B' => Some(Self::Down),
            b'C' => Some(Self::Right),
            b'D' => Some(Self::Left),
            _ => None,
        }
    }

    /// The CSI final byte a terminal sends for this direction.
    #[must_use]
    pub const fn final_byte(self) -> u8 {
        match self {
            Self::Up => b'A',
            Self::Down => b'B',
            Self::Right => b'C',
            Self::Left => b'D',
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Right => "Right",
            Self::Left => "Left",
        }
    }
}

impl fmt::Display for Arrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Navigation ─────────────────────────────────────────────────────────────

/// Editing and paging keys. Encodings vary by terminal; see the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavKey {
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    /// Shift+Tab, reported as `CSI Z` (back-tab).
    ShiftTab,
}

impl NavKey {
    const fn name(self) -> &'static str {
        match self {
            Self::Home => "Home",
            Self::End => "End",
            Self::PageUp => "PageUp",
            Self::PageDown => "PageDown",
            Self::Insert => "Insert",
            Self::Delete => "Delete",
            Self::ShiftTab => "ShiftTab",
        }
    }
}

impl fmt::Display for NavKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Control codes ──────────────────────────────────────────────────────────

/// A control byte: Ctrl+A..Ctrl+Z (1–26), Escape (27) or Backspace (127).
///
/// Tab and Enter are Ctrl+I and Ctrl+M on the wire, so they share the
/// 1–26 range and are exposed as named constants for readability.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlCode(u8);

impl ControlCode {
    pub const TAB: Self = Self(9);
    pub const ENTER: Self = Self(13);
    pub const ESCAPE: Self = Self(27);
    pub const BACKSPACE: Self = Self(127);

    pub const CTRL_C: Self = Self(3);
    pub const CTRL_D: Self = Self(4);
    pub const CTRL_Q: Self = Self(17);
    pub const CTRL_Z: Self = Self(26);

    /// Wrap a raw byte if it is a control code this type models.
    #[must_use]
    pub const fn new(code: u8) -> Option<Self> {
        match code {
            1..=27 | 127 => Some(Self(code)),
            _ => None,
        }
    }

    /// The control code for Ctrl+`letter` (case-insensitive ASCII letter).
    #[must_use]
    pub const fn ctrl(letter: u8) -> Option<Self> {
        let upper = letter.to_ascii_uppercase();
        if upper.is_ascii_uppercase() {
            Some(Self(upper - b'A' + 1))
        } else {
            None
        }
    }

    /// The raw byte value.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self.0
    }

    /// The letter for Ctrl+letter codes (1–26), uppercase.
    #[must_use]
    pub const fn letter(self) -> Option<char> {
        match self.0 {
            1..=26 => Some((self.0 + b'A' - 1) as char),
            _ => None,
        }
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::TAB => f.write_str("Tab"),
            Self::ENTER => f.write_str("Enter"),
            Self::ESCAPE => f.write_str("Esc"),
            Self::BACKSPACE => f.write_str("Backspace"),
            other => match other.letter() {
                Some(letter) => write!(f, "Ctrl{letter}"),
                None => write!(f, "Control({})", other.0),
            },
        }
    }
}

impl fmt::Debug for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControlCode({self})")
    }
}

// ─── KeyEvent ───────────────────────────────────────────────────────────────

/// One decoded keypress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEvent {
    /// Printable ASCII, `0x20..=0x7E`.
    Character(u8),
    /// Ctrl+letter, Tab, Enter, Escape or Backspace.
    ControlChar(ControlCode),
    /// A cursor key.
    Arrow(Arrow),
    /// F1 through F12.
    FunctionKey(u8),
    /// Home, End, `PageUp`, `PageDown`, Insert, Delete, Shift+Tab.
    Navigation(NavKey),
    /// Bytes were consumed but did not form a known key.
    Unrecognized,
}

impl KeyEvent {
    /// The printable character, if this is a [`Character`](Self::Character).
    #[must_use]
    pub const fn as_char(self) -> Option<char> {
        match self {
            Self::Character(b) => Some(b as char),
            _ => None,
        }
    }

    /// The control code, if this is a [`ControlChar`](Self::ControlChar).
    #[must_use]
    pub const fn as_control(self) -> Option<ControlCode> {
        match self {
            Self::ControlChar(code) => Some(code),
            _ => None,
        }
    }
}

impl PartialEq<char> for KeyEvent {
    fn eq(&self, other: &char) -> bool {
        matches!(*self, Self::Character(b) if char::from(b) == *other)
    }
}

impl PartialEq<ControlCode> for KeyEvent {
    fn eq(&self, other: &ControlCode) -> bool {
        matches!(*self, Self::ControlChar(code) if code == *other)
    }
}

impl PartialEq<Arrow> for KeyEvent {
    fn eq(&self, other: &Arrow) -> bool {
        matches!(*self, Self::Arrow(arrow) if arrow == *other)
    }
}

impl PartialEq<NavKey> for KeyEvent {
    fn eq(&self, other: &NavKey) -> bool {
        matches!(*self, Self::Navigation(nav) if nav == *other)
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Character(b) => write!(f, "character: '{}'", char::from(b)),
            Self::ControlChar(code) => write!(f, "special: {code}"),
            Self::Arrow(arrow) => write!(f, "arrow: {arrow}"),
            Self::FunctionKey(n) => write!(f, "special: F{n}"),
            Self::Navigation(nav) => write!(f, "navigation: {nav}"),
            Self::Unrecognized => f.write_str("unrecognized"),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
