//! Hardware collaborators the core talks to.
//!
//! The navigation core never touches peripherals directly. Screens reach
//! the display, buzzer and modem through these traits and message types;
//! the firmware binary provides the nRF52840 implementations and tests
//! provide fakes.

use crate::config::{MAX_NUMBER_LEN, MODEM_QUEUE_DEPTH};
use crate::error::{DeviceError, ScreenError};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use core::fmt::Write;
use heapless::String;

/// Monochrome text display.
pub trait Display {
    /// Blank the frame buffer.
    fn clear(&mut self);

    /// Put `text` on text line `line` of the frame buffer.
    fn draw_text(&mut self, line: u8, text: &str);

    /// Push the frame buffer to the panel.
    fn render(&mut self) -> Result<(), DeviceError>;

    fn set_power(&mut self, on: bool);

    fn set_brightness(&mut self, level: u8);

    /// Whether the panel is currently powered.
    fn is_on(&self) -> bool;
}

/// Sound the handset can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tone {
    /// Short key click.
    Key,
    /// DTMF tone of a dialled digit.
    Dtmf(char),
    /// Attention sequence for alerts.
    Alert,
    /// Incoming call, repeats until cancelled.
    Ringtone,
}

/// One step of a melody. `hz == 0` is a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub hz: u32,
    pub ms: u16,
}

const fn note(hz: u32, ms: u16) -> Note {
    Note { hz, ms }
}

const KEY_CLICK: [Note; 1] = [note(2000, 30)];
const ALERT: [Note; 5] = [
    note(1760, 150),
    note(0, 50),
    note(1760, 150),
    note(0, 50),
    note(1760, 300),
];
const RINGTONE: [Note; 5] = [
    note(1319, 100),
    note(1568, 100),
    note(1319, 100),
    note(1568, 100),
    note(0, 1000),
];
/// A buzzer cannot mix the two DTMF frequencies; the column tone is used.
const DTMF_COL_1: [Note; 1] = [note(1209, 100)];
const DTMF_COL_2: [Note; 1] = [note(1336, 100)];
const DTMF_COL_3: [Note; 1] = [note(1477, 100)];
const DTMF_COL_4: [Note; 1] = [note(1633, 100)];

impl Tone {
    /// Notes of one pass of the tone.
    pub const fn melody(self) -> &'static [Note] {
        match self {
            Tone::Key => &KEY_CLICK,
            Tone::Alert => &ALERT,
            Tone::Ringtone => &RINGTONE,
            Tone::Dtmf('1' | '4' | '7' | '*') => &DTMF_COL_1,
            Tone::Dtmf('2' | '5' | '8' | '0') => &DTMF_COL_2,
            Tone::Dtmf('3' | '6' | '9' | '#') => &DTMF_COL_3,
            Tone::Dtmf(_) => &DTMF_COL_4,
        }
    }

    /// Whether the melody loops until cancelled.
    pub const fn repeats(self) -> bool {
        matches!(self, Tone::Ringtone)
    }
}

/// Buzzer / speaker.
#[allow(async_fn_in_trait)]
pub trait Audio {
    /// Play `tone` to completion. Dropping the future cancels playback.
    async fn play(&mut self, tone: Tone) -> Result<(), DeviceError>;

    /// Silence anything still sounding.
    fn stop(&mut self);
}

/// Unsolicited modem events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemEvent {
    /// Incoming call.
    Ringing,
    /// A call was connected.
    CallStarted,
    /// The call ended or was rejected.
    CallEnded,
    /// The modem reported an error for the current call.
    CallError,
}

impl ModemEvent {
    /// Event carried by an unsolicited result line, if any.
    pub fn from_urc(line: &str) -> Option<Self> {
        let line = line.trim();
        if line == "RING" || line.starts_with("+CRING") {
            Some(ModemEvent::Ringing)
        } else if line == "CONNECT" || line == "VOICE CALL: BEGIN" {
            Some(ModemEvent::CallStarted)
        } else if line == "NO CARRIER" || line == "BUSY" || line == "VOICE CALL: END" {
            Some(ModemEvent::CallEnded)
        } else if line.starts_with("+CME ERROR") || line == "NO ANSWER" {
            Some(ModemEvent::CallError)
        } else {
            None
        }
    }
}

/// Requests from screens to the modem driver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemCommand {
    Dial(String<MAX_NUMBER_LEN>),
    Answer,
    HangUp,
    /// Send an in-call DTMF digit.
    Digit(char),
}

impl ModemCommand {
    /// Dial command for `number`, if it fits.
    pub fn dial(number: &str) -> Result<Self, ScreenError> {
        let number = String::try_from(number).map_err(|_| ScreenError::Modem)?;
        Ok(ModemCommand::Dial(number))
    }

    /// AT command line for this request, `\r` terminated.
    pub fn to_at(&self) -> Result<String<AT_LINE_LEN>, DeviceError> {
        let mut line = String::new();
        match self {
            ModemCommand::Dial(number) => write!(line, "ATD{};\r", number),
            ModemCommand::Answer => write!(line, "ATA\r"),
            ModemCommand::HangUp => write!(line, "ATH\r"),
            ModemCommand::Digit(digit) => write!(line, "AT+VTS={}\r", digit),
        }
        .map_err(|_| DeviceError::Overflow)?;
        Ok(line)
    }
}

/// Longest AT command line the driver sends.
pub const AT_LINE_LEN: usize = MAX_NUMBER_LEN + 8;

/// Modem → core event queue.
pub type ModemEvents = Channel<CriticalSectionRawMutex, ModemEvent, MODEM_QUEUE_DEPTH>;

/// Core → modem command queue.
pub type ModemCommands = Channel<CriticalSectionRawMutex, ModemCommand, MODEM_QUEUE_DEPTH>;

/// How the application should end.
///
/// The numeric values are the exit codes the boot loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QuitReason {
    /// Power the handset off.
    Shutdown = 1,
    /// Full hardware reset.
    HardReboot = 2,
    /// Restart the application only.
    SoftRestart = 3,
}

impl QuitReason {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Application-level hooks the navigator needs from its context.
#[allow(async_fn_in_trait)]
pub trait Supervisor {
    /// Silence audio and put the crash alert on screen.
    async fn show_crash(&self, error: ScreenError);

    /// Terminate the application.
    fn quit(&self, reason: QuitReason);
}
