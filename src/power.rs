//! Battery alert policy.
//!
//! The firmware samples the fuel gauge periodically and feeds every reading
//! to a [`BatteryMonitor`]. The monitor decides whether the reading deserves
//! an alert screen:
//!
//! - ≤ 1 %: dead battery, reported once
//! - ≤ 5 %: very low
//! - ≤ 25 %: low
//!
//! Low and very-low alerts repeat at most once per re-alert interval, and a
//! reading that falls into a more severe band alerts straight away.

use crate::config::{
    BATTERY_DEAD_PERCENT, BATTERY_EMPTY_MV, BATTERY_FULL_MV, BATTERY_LOW_PERCENT,
    BATTERY_REALERT_SECS, BATTERY_VERY_LOW_PERCENT, SCREEN_DEAD_BATTERY, SCREEN_LOW_BATTERY,
    SCREEN_VERY_LOW_BATTERY,
};
use crate::timer::IdleTimers;
use embassy_time::{Duration, Instant};

/// Linear capacity estimate from the cell voltage.
pub fn capacity_from_millivolts(mv: u32) -> u8 {
    let span = BATTERY_FULL_MV - BATTERY_EMPTY_MV;
    let above = mv.clamp(BATTERY_EMPTY_MV, BATTERY_FULL_MV) - BATTERY_EMPTY_MV;
    (above * 100 / span) as u8
}

/// Battery condition worth interrupting the user for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BatteryAlert {
    Low,
    VeryLow,
    Dead,
}

impl BatteryAlert {
    /// Classify a capacity reading in percent.
    pub const fn classify(capacity: u8) -> Option<Self> {
        if capacity <= BATTERY_DEAD_PERCENT {
            Some(BatteryAlert::Dead)
        } else if capacity <= BATTERY_VERY_LOW_PERCENT {
            Some(BatteryAlert::VeryLow)
        } else if capacity <= BATTERY_LOW_PERCENT {
            Some(BatteryAlert::Low)
        } else {
            None
        }
    }

    /// Alert screen to navigate to.
    pub const fn screen(self) -> &'static str {
        match self {
            BatteryAlert::Low => SCREEN_LOW_BATTERY,
            BatteryAlert::VeryLow => SCREEN_VERY_LOW_BATTERY,
            BatteryAlert::Dead => SCREEN_DEAD_BATTERY,
        }
    }

    pub const fn timer_action(self) -> TimerAction {
        match self {
            BatteryAlert::Dead => TimerAction::Stop,
            BatteryAlert::Low | BatteryAlert::VeryLow => TimerAction::Restart,
        }
    }
}

/// What happens to the idle timers alongside a navigation change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerAction {
    /// Leave them alone.
    Keep,
    /// Keep the display lit: nothing may blank it.
    Stop,
    /// Start the idle countdowns afresh.
    Restart,
}

impl TimerAction {
    pub fn apply(self, idle: &IdleTimers<'_>) {
        match self {
            TimerAction::Keep => {}
            TimerAction::Stop => idle.stop_all(),
            TimerAction::Restart => idle.restart_all(),
        }
    }
}

/// Tracks which battery alerts have been shown.
pub struct BatteryMonitor {
    realert: Duration,
    last: Option<(BatteryAlert, Instant)>,
    dead_reported: bool,
}

impl BatteryMonitor {
    pub const fn new() -> Self {
        Self::with_realert(Duration::from_secs(BATTERY_REALERT_SECS))
    }

    pub const fn with_realert(realert: Duration) -> Self {
        Self {
            realert,
            last: None,
            dead_reported: false,
        }
    }

    /// Assess a reading taken at `now`. Returns the alert to show, if any.
    pub fn assess(&mut self, capacity: u8, now: Instant) -> Option<BatteryAlert> {
        let Some(alert) = BatteryAlert::classify(capacity) else {
            if self.last.take().is_some() {
                info!("Battery: recovered ({}%)", capacity);
            }
            self.dead_reported = false;
            return None;
        };

        if alert == BatteryAlert::Dead {
            if self.dead_reported {
                return None;
            }
            self.dead_reported = true;
            self.last = Some((alert, now));
            warn!("Battery: dead ({}%)", capacity);
            return Some(alert);
        }

        let due = match self.last {
            None => true,
            Some((previous, _)) if alert > previous => true,
            Some((_, at)) => now.saturating_duration_since(at) >= self.realert,
        };
        if !due {
            return None;
        }

        info!("Battery: {:?} ({}%)", alert, capacity);
        self.last = Some((alert, now));
        Some(alert)
    }
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ResettableTimer;

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    #[test]
    fn voltage_maps_onto_percent() {
        assert_eq!(capacity_from_millivolts(3000), 0);
        assert_eq!(capacity_from_millivolts(3300), 0);
        assert_eq!(capacity_from_millivolts(3750), 50);
        assert_eq!(capacity_from_millivolts(4200), 100);
        assert_eq!(capacity_from_millivolts(4350), 100);
    }

    #[test]
    fn readings_fall_into_bands() {
        assert_eq!(BatteryAlert::classify(100), None);
        assert_eq!(BatteryAlert::classify(26), None);
        assert_eq!(BatteryAlert::classify(25), Some(BatteryAlert::Low));
        assert_eq!(BatteryAlert::classify(6), Some(BatteryAlert::Low));
        assert_eq!(BatteryAlert::classify(5), Some(BatteryAlert::VeryLow));
        assert_eq!(BatteryAlert::classify(2), Some(BatteryAlert::VeryLow));
        assert_eq!(BatteryAlert::classify(1), Some(BatteryAlert::Dead));
        assert_eq!(BatteryAlert::classify(0), Some(BatteryAlert::Dead));
    }

    #[test]
    fn low_alert_repeats_after_interval() {
        let mut monitor = BatteryMonitor::new();
        assert_eq!(monitor.assess(20, at(0)), Some(BatteryAlert::Low));
        assert_eq!(monitor.assess(19, at(30)), None);
        assert_eq!(monitor.assess(18, at(599)), None);
        assert_eq!(monitor.assess(18, at(600)), Some(BatteryAlert::Low));
    }

    #[test]
    fn worse_band_alerts_immediately() {
        let mut monitor = BatteryMonitor::new();
        assert_eq!(monitor.assess(10, at(0)), Some(BatteryAlert::Low));
        assert_eq!(monitor.assess(5, at(30)), Some(BatteryAlert::VeryLow));
        assert_eq!(monitor.assess(4, at(60)), None);
    }

    #[test]
    fn dead_battery_reported_once() {
        let mut monitor = BatteryMonitor::new();
        assert_eq!(monitor.assess(1, at(0)), Some(BatteryAlert::Dead));
        assert_eq!(monitor.assess(1, at(700)), None);
        assert_eq!(monitor.assess(0, at(1400)), None);
    }

    #[test]
    fn charging_clears_alert_history() {
        let mut monitor = BatteryMonitor::new();
        assert_eq!(monitor.assess(1, at(0)), Some(BatteryAlert::Dead));
        assert_eq!(monitor.assess(40, at(30)), None);
        assert_eq!(monitor.assess(20, at(60)), Some(BatteryAlert::Low));
        assert_eq!(monitor.assess(1, at(90)), Some(BatteryAlert::Dead));
    }

    #[test]
    fn alerts_map_to_screens_and_timer_actions() {
        assert_eq!(BatteryAlert::Low.screen(), SCREEN_LOW_BATTERY);
        assert_eq!(BatteryAlert::VeryLow.screen(), SCREEN_VERY_LOW_BATTERY);
        assert_eq!(BatteryAlert::Dead.screen(), SCREEN_DEAD_BATTERY);
        assert_eq!(BatteryAlert::Low.timer_action(), TimerAction::Restart);
        assert_eq!(BatteryAlert::Dead.timer_action(), TimerAction::Stop);
    }

    #[test]
    fn timer_actions_drive_idle_timers() {
        let display = ResettableTimer::new(Duration::from_secs(1), false);
        let keylight = ResettableTimer::new(Duration::from_secs(1), false);
        let idle = IdleTimers::new(&display, &keylight);

        TimerAction::Stop.apply(&idle);
        assert!(display.is_stopped() && keylight.is_stopped());
        TimerAction::Keep.apply(&idle);
        assert!(display.is_stopped());
        TimerAction::Restart.apply(&idle);
        assert!(!display.is_stopped() && !keylight.is_stopped());
    }
}
