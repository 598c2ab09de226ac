//! Matrix keypad - key symbols, the board's key map and the async scanner.
//!
//! The handset keypad is a 4 × 5 matrix: columns are driven high one at a
//! time and rows (pulled down) read high where a switch closes the circuit.
//! A separate active-low power key sits outside the matrix.
//!
//! The scanner (`Keypad::run`) emits `KeyEvent`s into an embassy channel.
//! Matrix events always come in press/release pairs.

mod scanner;

#[cfg(test)]
mod tests;

pub use scanner::{Keypad, ScanTiming};

use crate::config::{KEYPAD_COLS, KEYPAD_ROWS, KEY_QUEUE_DEPTH};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Duration;

/// A key on the handset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Key {
    /// Number key `0`..=`9`.
    Digit(u8),
    Star,
    Hash,
    /// `C` - back / clear.
    Clear,
    /// `S` - select / call.
    Select,
    Up,
    Down,
    /// The power key, outside the matrix.
    Power,
}

impl Key {
    /// Printed symbol of the key.
    pub const fn as_char(self) -> char {
        match self {
            Key::Digit(d) => (b'0' + (d % 10)) as char,
            Key::Star => '*',
            Key::Hash => '#',
            Key::Clear => 'C',
            Key::Select => 'S',
            Key::Up => 'U',
            Key::Down => 'D',
            Key::Power => 'P',
        }
    }

    pub const fn from_char(c: char) -> Option<Key> {
        match c {
            '0'..='9' => Some(Key::Digit(c as u8 - b'0')),
            '*' => Some(Key::Star),
            '#' => Some(Key::Hash),
            'C' => Some(Key::Clear),
            'S' => Some(Key::Select),
            'U' => Some(Key::Up),
            'D' => Some(Key::Down),
            'P' => Some(Key::Power),
            _ => None,
        }
    }

    /// Keys that can appear in a dialled number.
    pub const fn is_dialable(self) -> bool {
        matches!(self, Key::Digit(_) | Key::Star | Key::Hash)
    }
}

/// One transition of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyEvent {
    pub key: Key,
    /// `true` on press, `false` on release.
    pub pressed: bool,
    /// How long the key was held; zero on press.
    pub duration: Duration,
}

impl KeyEvent {
    pub const fn press(key: Key) -> Self {
        Self {
            key,
            pressed: true,
            duration: Duration::from_ticks(0),
        }
    }

    pub const fn release(key: Key, duration: Duration) -> Self {
        Self {
            key,
            pressed: false,
            duration,
        }
    }
}

/// Channel carrying key events from the scanner to the active screen.
pub type KeyChannel = Channel<CriticalSectionRawMutex, KeyEvent, KEY_QUEUE_DEPTH>;

/// `(row, col)` → key lookup. `None` marks positions with no switch.
pub type KeyMap = [[Option<Key>; KEYPAD_COLS]; KEYPAD_ROWS];

/// Key map of the handset PCB.
pub const KEYMAP: KeyMap = [
    [None, Some(Key::Clear), Some(Key::Digit(1)), Some(Key::Digit(2)), Some(Key::Digit(3))],
    [None, Some(Key::Select), Some(Key::Digit(4)), Some(Key::Digit(5)), Some(Key::Digit(6))],
    [Some(Key::Down), None, Some(Key::Digit(7)), Some(Key::Digit(8)), Some(Key::Digit(9))],
    [None, Some(Key::Up), Some(Key::Star), Some(Key::Digit(0)), Some(Key::Hash)],
];

/// Outcome of recording a bad matrix read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultVerdict {
    /// Probably noise, keep scanning this position.
    Transient,
    /// Same position keeps faulting, likely a short.
    Suspect,
}

/// Counts consecutive faults on a single matrix position.
///
/// The count restarts when a different position faults and is cleared when
/// a valid key is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultTracker {
    position: Option<(u8, u8)>,
    count: u8,
    limit: u8,
}

impl FaultTracker {
    pub const fn new(limit: u8) -> Self {
        Self {
            position: None,
            count: 0,
            limit,
        }
    }

    /// Record a fault at `(row, col)`.
    pub fn record(&mut self, row: u8, col: u8) -> FaultVerdict {
        if self.position == Some((row, col)) {
            self.count = self.count.saturating_add(1);
        } else {
            self.position = Some((row, col));
            self.count = 1;
        }

        if self.count > self.limit {
            FaultVerdict::Suspect
        } else {
            FaultVerdict::Transient
        }
    }

    /// Forget past faults. Returns `true` if there were any.
    pub fn clear(&mut self) -> bool {
        let had_faults = self.count > 0;
        self.position = None;
        self.count = 0;
        had_faults
    }

    pub fn count(&self) -> u8 {
        self.count
    }
}
