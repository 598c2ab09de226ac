use super::*;
use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use embassy_futures::block_on;
use embassy_futures::select::{select, Either};
use embassy_time::Timer;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

// ═══════════════════════════════════════════════════════════════════════════
// Simulated keypad wiring
// ═══════════════════════════════════════════════════════════════════════════

/// Electrical state of a fake keypad: which columns are driven and which
/// switches are closed.
#[derive(Default)]
struct Board {
    driven: RefCell<[bool; KEYPAD_COLS]>,
    closed: RefCell<Vec<(usize, usize)>>,
    power_down: Cell<bool>,
}

impl Board {
    fn close(&self, row: usize, col: usize) {
        self.closed.borrow_mut().push((row, col));
    }

    fn open_all(&self) {
        self.closed.borrow_mut().clear();
    }

    fn any_driven(&self) -> bool {
        self.driven.borrow().iter().any(|&d| d)
    }
}

struct Row<'b> {
    board: &'b Board,
    index: usize,
}

struct Col<'b> {
    board: &'b Board,
    index: usize,
}

struct PowerKey<'b> {
    board: &'b Board,
}

impl ErrorType for Row<'_> {
    type Error = Infallible;
}

impl InputPin for Row<'_> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let driven = self.board.driven.borrow();
        Ok(self
            .board
            .closed
            .borrow()
            .iter()
            .any(|&(r, c)| r == self.index && driven[c]))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|h| !h)
    }
}

impl ErrorType for Col<'_> {
    type Error = Infallible;
}

impl OutputPin for Col<'_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.board.driven.borrow_mut()[self.index] = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.board.driven.borrow_mut()[self.index] = true;
        Ok(())
    }
}

impl ErrorType for PowerKey<'_> {
    type Error = Infallible;
}

impl InputPin for PowerKey<'_> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.board.power_down.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.board.power_down.get())
    }
}

fn fast_timing() -> ScanTiming {
    ScanTiming {
        press_settle: Duration::from_millis(5),
        release_settle: Duration::from_millis(10),
        steps: 5,
        fault_backoff: Duration::from_millis(5),
        idle: Duration::from_millis(1),
    }
}

fn keypad(board: &Board) -> Keypad<Row<'_>, Col<'_>, PowerKey<'_>> {
    let rows = core::array::from_fn(|index| Row { board, index });
    let cols = core::array::from_fn(|index| Col { board, index });
    Keypad::new(rows, cols, PowerKey { board }).with_timing(fast_timing())
}

/// Run the scanner alongside `script`, then return everything it emitted.
fn scan_during<F: core::future::Future<Output = ()>>(board: &Board, script: F) -> Vec<KeyEvent> {
    let channel = KeyChannel::new();
    let mut pad = keypad(board);

    block_on(async {
        match select(pad.run(channel.sender()), script).await {
            Either::First(never) => never,
            Either::Second(()) => {}
        }
    });

    let mut events = Vec::new();
    while let Ok(event) = channel.try_receive() {
        events.push(event);
    }
    events
}

async fn ms(n: u64) {
    Timer::after(Duration::from_millis(n)).await;
}

// ═══════════════════════════════════════════════════════════════════════════
// Key map and symbols
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn keymap_matches_pcb_layout() {
    let expected = [
        ((0, 1), 'C'),
        ((0, 2), '1'),
        ((0, 3), '2'),
        ((0, 4), '3'),
        ((1, 1), 'S'),
        ((1, 2), '4'),
        ((1, 3), '5'),
        ((1, 4), '6'),
        ((2, 0), 'D'),
        ((2, 2), '7'),
        ((2, 3), '8'),
        ((2, 4), '9'),
        ((3, 1), 'U'),
        ((3, 2), '*'),
        ((3, 3), '0'),
        ((3, 4), '#'),
    ];

    let mut mapped = 0;
    for (row, cols) in KEYMAP.iter().enumerate() {
        for (col, key) in cols.iter().enumerate() {
            if let Some(key) = key {
                mapped += 1;
                let want = expected
                    .iter()
                    .find(|(pos, _)| *pos == (row, col))
                    .map(|(_, c)| *c);
                assert_eq!(Some(key.as_char()), want, "position {row}:{col}");
            }
        }
    }
    assert_eq!(mapped, expected.len());
}

#[test]
fn key_symbols_round_trip_through_chars() {
    for c in "0123456789*#CSUDP".chars() {
        let key = Key::from_char(c).unwrap();
        assert_eq!(key.as_char(), c);
    }
    assert_eq!(Key::from_char('x'), None);
    assert!(Key::Digit(7).is_dialable());
    assert!(Key::Hash.is_dialable());
    assert!(!Key::Select.is_dialable());
}

// ═══════════════════════════════════════════════════════════════════════════
// Fault tracker
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn fault_tracker_flags_position_after_limit() {
    let mut faults = FaultTracker::new(5);
    for _ in 0..5 {
        assert_eq!(faults.record(2, 1), FaultVerdict::Transient);
    }
    assert_eq!(faults.record(2, 1), FaultVerdict::Suspect);
    assert_eq!(faults.record(2, 1), FaultVerdict::Suspect);
}

#[test]
fn fault_tracker_restarts_on_new_position() {
    let mut faults = FaultTracker::new(5);
    for _ in 0..5 {
        faults.record(2, 1);
    }
    assert_eq!(faults.record(0, 0), FaultVerdict::Transient);
    assert_eq!(faults.count(), 1);
}

#[test]
fn fault_tracker_clear_reports_recovery() {
    let mut faults = FaultTracker::new(5);
    assert!(!faults.clear());
    faults.record(1, 0);
    assert!(faults.clear());
    assert_eq!(faults.count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Scanner
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn press_and_release_of_five() {
    let board = Board::default();

    let events = scan_during(&board, async {
        ms(5).await;
        board.close(1, 3);
        ms(40).await;
        board.open_all();
        ms(40).await;
    });

    assert_eq!(events.len(), 2, "{events:?}");
    assert_eq!(events[0], KeyEvent::press(Key::Digit(5)));
    assert_eq!(events[1].key, Key::Digit(5));
    assert!(!events[1].pressed);
    assert!(events[1].duration >= Duration::from_millis(20));
}

#[test]
fn short_glitch_is_ignored() {
    let board = Board::default();

    let events = scan_during(&board, async {
        ms(5).await;
        board.close(0, 2);
        // Shorter than one settle interval plus a read.
        Timer::after(Duration::from_micros(300)).await;
        board.open_all();
        ms(30).await;
    });

    assert!(events.is_empty(), "{events:?}");
}

#[test]
fn unmapped_position_emits_nothing_and_recovers() {
    let board = Board::default();

    let events = scan_during(&board, async {
        ms(5).await;
        // (2, 1) has no switch; a closed circuit there is a fault.
        board.close(2, 1);
        ms(80).await;
        board.open_all();
        ms(10).await;
        board.close(0, 2);
        ms(30).await;
        board.open_all();
        ms(40).await;
    });

    assert_eq!(events.len(), 2, "{events:?}");
    assert_eq!(events[0], KeyEvent::press(Key::Digit(1)));
    assert_eq!(events[1].key, Key::Digit(1));
    assert!(!events[1].pressed);
}

#[test]
fn suspected_short_is_skipped_so_its_column_still_scans() {
    let board = Board::default();

    let events = scan_during(&board, async {
        ms(5).await;
        // (1, 0) is shorted; Down shares its column further along.
        board.close(1, 0);
        board.close(2, 0);
        ms(150).await;
        board.open_all();
        ms(40).await;
    });

    assert_eq!(events.len(), 2, "{events:?}");
    assert_eq!(events[0], KeyEvent::press(Key::Down));
    assert_eq!(events[1].key, Key::Down);
    assert!(!events[1].pressed);
}

#[test]
fn events_pair_up_across_consecutive_keys() {
    let board = Board::default();

    let events = scan_during(&board, async {
        for (row, col) in [(0, 1), (3, 4), (2, 0)] {
            ms(5).await;
            board.close(row, col);
            ms(30).await;
            board.open_all();
            ms(30).await;
        }
    });

    let keys: Vec<(char, bool)> = events.iter().map(|e| (e.key.as_char(), e.pressed)).collect();
    assert_eq!(
        keys,
        [('C', true), ('C', false), ('#', true), ('#', false), ('D', true), ('D', false)]
    );
}

#[test]
fn power_key_reports_press_and_release() {
    let board = Board::default();

    let events = scan_during(&board, async {
        ms(5).await;
        board.power_down.set(true);
        ms(40).await;
        board.power_down.set(false);
        ms(40).await;
    });

    assert_eq!(events.len(), 2, "{events:?}");
    assert_eq!(events[0], KeyEvent::press(Key::Power));
    assert_eq!(events[1].key, Key::Power);
    assert!(!events[1].pressed);
    assert!(events[1].duration >= Duration::from_millis(20));
}

#[test]
fn matrix_waits_while_power_key_held() {
    let board = Board::default();

    let events = scan_during(&board, async {
        ms(5).await;
        board.power_down.set(true);
        ms(20).await;
        board.close(1, 2);
        ms(20).await;
        board.power_down.set(false);
        ms(40).await;
        board.open_all();
        ms(40).await;
    });

    let keys: Vec<(char, bool)> = events.iter().map(|e| (e.key.as_char(), e.pressed)).collect();
    assert_eq!(keys, [('P', true), ('P', false), ('4', true), ('4', false)]);
}

#[test]
fn cancelling_scanner_drives_columns_low() {
    let board = Board::default();

    let events = scan_during(&board, async {
        ms(5).await;
        board.close(1, 3);
        ms(20).await;
        // Scanner is dropped while the key is still held.
    });

    assert_eq!(events, [KeyEvent::press(Key::Digit(5))]);
    assert!(!board.any_driven());
}
