//! Resettable countdown timers.
//!
//! A `ResettableTimer` is shared (usually as a `static`) between the task
//! that runs it and the code that pokes it. Every user interaction calls
//! `reset()`; if nothing resets the timer for a whole period, its callback
//! fires and the countdown re-arms.
//!
//! Countdown, reset handling and the callback all live in the single
//! `run` future, so the callback never overlaps itself or a reset.

use crate::config::{DISPLAY_IDLE_MS, KEYLIGHT_IDLE_MS};
use core::sync::atomic::{AtomicBool, Ordering};
use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Stop,
    Restart,
}

/// Countdown that fires when not reset for `period`.
pub struct ResettableTimer {
    period: Duration,
    trigger_now: bool,
    /// Pending reset; repeated resets coalesce into one.
    resets: Signal<CriticalSectionRawMutex, ()>,
    control: Signal<CriticalSectionRawMutex, Control>,
    stopped: AtomicBool,
}

impl ResettableTimer {
    /// Timer with the given period. With `trigger_now` the callback also
    /// fires once as soon as `run` starts.
    pub const fn new(period: Duration, trigger_now: bool) -> Self {
        Self {
            period,
            trigger_now,
            resets: Signal::new(),
            control: Signal::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Push the deadline out by a full period. Never blocks.
    pub fn reset(&self) {
        self.resets.signal(());
    }

    /// Disarm. The callback will not fire again until `restart`, even if a
    /// reset was pending.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.control.signal(Control::Stop);
    }

    /// Re-arm from scratch with a full period, dropping pending resets.
    pub fn restart(&self) {
        self.stopped.store(false, Ordering::Release);
        self.control.signal(Control::Restart);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Drive the timer, calling `on_fire` at each expiry. Never returns;
    /// drop the future to tear the timer down.
    pub async fn run(&self, mut on_fire: impl FnMut()) -> ! {
        if self.trigger_now && !self.is_stopped() {
            on_fire();
        }

        loop {
            if self.is_stopped() {
                self.wait_for_restart().await;
            }
            self.resets.reset();

            let mut deadline = Instant::now() + self.period;
            loop {
                match select3(self.control.wait(), self.resets.wait(), Timer::at(deadline)).await {
                    Either3::First(Control::Stop) => {
                        trace!("timer stopped");
                        break;
                    }
                    Either3::First(Control::Restart) => break,
                    Either3::Second(()) => deadline = Instant::now() + self.period,
                    Either3::Third(()) => {
                        if self.is_stopped() {
                            break;
                        }
                        on_fire();
                        deadline = Instant::now() + self.period;
                    }
                }
            }
        }
    }

    async fn wait_for_restart(&self) {
        while self.control.wait().await != Control::Restart {}
    }
}

/// The two inactivity timers every screen keeps alive with key presses.
#[derive(Clone, Copy)]
pub struct IdleTimers<'a> {
    /// Fires to bring up the screensaver.
    pub display: &'a ResettableTimer,
    /// Fires to switch the key backlight off.
    pub keylight: &'a ResettableTimer,
}

impl<'a> IdleTimers<'a> {
    pub fn new(display: &'a ResettableTimer, keylight: &'a ResettableTimer) -> Self {
        Self { display, keylight }
    }

    /// Register user activity.
    pub fn reset_all(&self) {
        self.display.reset();
        self.keylight.reset();
    }

    pub fn restart_all(&self) {
        self.display.restart();
        self.keylight.restart();
    }

    pub fn stop_all(&self) {
        self.display.stop();
        self.keylight.stop();
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a ResettableTimer> {
        [self.display, self.keylight].into_iter()
    }
}

/// Default display-idle period.
pub const fn display_idle_period() -> Duration {
    Duration::from_millis(DISPLAY_IDLE_MS)
}

/// Default key-backlight period.
pub const fn keylight_idle_period() -> Duration {
    Duration::from_millis(KEYLIGHT_IDLE_MS)
}
