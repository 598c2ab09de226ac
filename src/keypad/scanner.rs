//! Async matrix scanner with software debouncing.
//!
//! One scan pass, in priority order:
//!   1. Power key - if held, report it and wait for release; the matrix is
//!      not scanned meanwhile.
//!   2. Matrix press - energise each column in turn and debounce any row
//!      that reads high.
//!   3. Matrix release - while a key is held, watch only its row.
//!
//! Dropping the `run` future cancels the scanner at whichever wait it is in;
//! all columns are driven low on the way out.

use super::{FaultTracker, FaultVerdict, Key, KeyEvent, KeyMap, KEYMAP};
use crate::config::{
    KEYPAD_COLS, KEYPAD_ROWS, KEY_FAULT_BACKOFF_MS, KEY_FAULT_LIMIT, KEY_PRESS_SETTLE_MS,
    KEY_QUEUE_DEPTH, KEY_RELEASE_SETTLE_MS, KEY_SCAN_IDLE_MS, KEY_SETTLE_STEPS,
};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::{InputPin, OutputPin};

/// Debounce and pacing windows of the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTiming {
    /// A press must read stable for this long.
    pub press_settle: Duration,
    /// A release must read stable for this long.
    pub release_settle: Duration,
    /// Re-reads per settle window.
    pub steps: u32,
    /// Pause after a bad matrix read.
    pub fault_backoff: Duration,
    /// Pause between passes and between release polls.
    pub idle: Duration,
}

impl Default for ScanTiming {
    fn default() -> Self {
        Self {
            press_settle: Duration::from_millis(KEY_PRESS_SETTLE_MS),
            release_settle: Duration::from_millis(KEY_RELEASE_SETTLE_MS),
            steps: KEY_SETTLE_STEPS,
            fault_backoff: Duration::from_millis(KEY_FAULT_BACKOFF_MS),
            idle: Duration::from_millis(KEY_SCAN_IDLE_MS),
        }
    }
}

/// A matrix key currently held down.
#[derive(Clone, Copy)]
struct Held {
    row: usize,
    col: usize,
    key: Key,
    since: Instant,
}

/// Keypad hardware plus scanner state.
///
/// `R` are the row inputs (pulled down), `C` the column outputs and `P` the
/// power key input (pulled up, active low).
pub struct Keypad<R, C, P>
where
    R: InputPin,
    C: OutputPin,
    P: InputPin,
{
    rows: [R; KEYPAD_ROWS],
    cols: [C; KEYPAD_COLS],
    power: P,
    keymap: KeyMap,
    timing: ScanTiming,
    faults: FaultTracker,
}

impl<R, C, P> Keypad<R, C, P>
where
    R: InputPin,
    C: OutputPin,
    P: InputPin,
{
    pub fn new(rows: [R; KEYPAD_ROWS], cols: [C; KEYPAD_COLS], power: P) -> Self {
        Self {
            rows,
            cols,
            power,
            keymap: KEYMAP,
            timing: ScanTiming::default(),
            faults: FaultTracker::new(KEY_FAULT_LIMIT),
        }
    }

    pub fn with_timing(mut self, timing: ScanTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_keymap(mut self, keymap: KeyMap) -> Self {
        self.keymap = keymap;
        self
    }

    /// Scan forever, sending events to `events`.
    pub async fn run(
        &mut self,
        events: Sender<'_, CriticalSectionRawMutex, KeyEvent, KEY_QUEUE_DEPTH>,
    ) -> ! {
        let mut scan = ColumnsOff(self);
        scan.0.release_columns();
        info!("keypad scanner started");

        let mut held: Option<Held> = None;
        loop {
            scan.0.scan_pass(&mut held, &events).await;
        }
    }

    async fn scan_pass(
        &mut self,
        held: &mut Option<Held>,
        events: &Sender<'_, CriticalSectionRawMutex, KeyEvent, KEY_QUEUE_DEPTH>,
    ) {
        let t = self.timing;

        // Power key
        if settle(&mut self.power, false, t.press_settle, t.steps).await {
            debug!("power key pressed");
            events.send(KeyEvent::press(Key::Power)).await;
            let since = Instant::now();
            while !settle(&mut self.power, true, t.release_settle, t.steps).await {
                Timer::after(t.idle).await;
            }
            events.send(KeyEvent::release(Key::Power, since.elapsed())).await;
        }

        // Matrix press
        if held.is_none() {
            *held = self.scan_matrix().await;
            if let Some(h) = held {
                events.send(KeyEvent::press(h.key)).await;
            }
        }

        // Matrix release
        if let Some(h) = held.take() {
            let _ = self.cols[h.col].set_high();
            while !settle(&mut self.rows[h.row], false, t.release_settle, t.steps).await {
                Timer::after(t.idle).await;
            }
            let _ = self.cols[h.col].set_low();
            events.send(KeyEvent::release(h.key, h.since.elapsed())).await;
        }

        Timer::after(t.idle).await;
    }

    /// Walk every column once. Returns the first confirmed key; its column
    /// is left energised.
    async fn scan_matrix(&mut self) -> Option<Held> {
        let t = self.timing;

        'columns: for col in 0..KEYPAD_COLS {
            let _ = self.cols[col].set_high();

            for row in 0..KEYPAD_ROWS {
                if read_level(&mut self.rows[row]) != Some(true) {
                    continue;
                }
                if !settle(&mut self.rows[row], true, t.press_settle, t.steps).await {
                    continue;
                }

                let Some(key) = self.keymap[row][col] else {
                    match self.faults.record(row as u8, col as u8) {
                        FaultVerdict::Transient => {
                            warn!("invalid keypress at {}:{}, attempting to recover", row, col);
                            let _ = self.cols[col].set_low();
                            Timer::after(t.fault_backoff).await;
                            continue 'columns;
                        }
                        FaultVerdict::Suspect => {
                            // Give up on this pair for the pass; the rest of
                            // the column is still read.
                            warn!("too many faulty reads, suspected short at {}:{}", row, col);
                            Timer::after(t.fault_backoff).await;
                            continue;
                        }
                    }
                };

                if self.faults.clear() {
                    info!("recovered from keypad fault");
                }
                debug!("keypress at {}:{}", row, col);
                return Some(Held {
                    row,
                    col,
                    key,
                    since: Instant::now(),
                });
            }

            let _ = self.cols[col].set_low();
        }

        None
    }

    fn release_columns(&mut self) {
        for col in self.cols.iter_mut() {
            let _ = col.set_low();
        }
    }
}

/// Drives every column low when the scan future is dropped.
struct ColumnsOff<'k, R, C, P>(&'k mut Keypad<R, C, P>)
where
    R: InputPin,
    C: OutputPin,
    P: InputPin;

impl<R, C, P> Drop for ColumnsOff<'_, R, C, P>
where
    R: InputPin,
    C: OutputPin,
    P: InputPin,
{
    fn drop(&mut self) {
        self.0.release_columns();
    }
}

/// `Some(true)` if the pin reads high. Read errors count as "no reading".
fn read_level<I: InputPin>(pin: &mut I) -> Option<bool> {
    pin.is_high().ok()
}

/// Check that `pin` stays at `high` for the whole `window`, re-reading
/// `steps` times. Bails out on the first mismatching read.
async fn settle<I: InputPin>(pin: &mut I, high: bool, window: Duration, steps: u32) -> bool {
    let steps = steps.max(1);
    let interval = window / steps;
    for _ in 0..steps {
        if read_level(pin) != Some(high) {
            return false;
        }
        Timer::after(interval).await;
    }
    true
}
