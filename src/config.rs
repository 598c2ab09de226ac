//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, and capacities
//! live here so they can be tuned in one place.

// Keypad

/// Matrix rows (inputs, pulled down, active high).
pub const KEYPAD_ROWS: usize = 4;

/// Matrix columns (outputs, driven high one at a time).
pub const KEYPAD_COLS: usize = 5;

/// Stable-high window before a press is confirmed (ms).
pub const KEY_PRESS_SETTLE_MS: u64 = 25;

/// Stable-low window before a release is confirmed (ms).
pub const KEY_RELEASE_SETTLE_MS: u64 = 50;

/// Number of re-reads a settle window is split into.
pub const KEY_SETTLE_STEPS: u32 = 10;

/// Back-off after an unmapped or suspect matrix read (ms).
pub const KEY_FAULT_BACKOFF_MS: u64 = 50;

/// Pause between scan passes (ms).
pub const KEY_SCAN_IDLE_MS: u64 = 1;

/// Faults on the same (row, col) tolerated before it is treated as a short.
pub const KEY_FAULT_LIMIT: u8 = 5;

/// Depth of the key event channel.
pub const KEY_QUEUE_DEPTH: usize = 10;

// GPIO pin assignments (custom handset PCB)
//
//   Keypad rows 0..3    → P0.11 P0.12 P0.13 P0.14
//   Keypad cols 0..4    → P0.28 P0.29 P0.30 P0.31 P1.15
//   Power key           → P1.13 (active low, pull-up)
//   I²C SDA / SCL       → P0.26 / P0.27
//   Buzzer (PWM0)       → P0.06
//   Key backlight       → P0.08
//   Modem UARTE TX / RX → P1.02 / P1.01
//   Battery sense       → P0.02 / AIN0 via 1:2 divider

// Navigation

/// Maximum depth of the navigation stack.
pub const MAX_STACK_DEPTH: usize = 8;

/// Maximum number of registered screens.
pub const MAX_SCREENS: usize = 16;

/// Maximum number of timers the navigator stops on shutdown.
pub const MAX_TIMERS: usize = 4;

/// Depth of the navigation request queue.
pub const NAV_QUEUE_DEPTH: usize = 8;

/// Budget for a screen's pause/stop before it is reported stuck (ms).
pub const SCREEN_STOP_TIMEOUT_MS: u64 = 1000;

/// How long the crash alert stays up before returning home (ms).
pub const CRASH_ALERT_MS: u64 = 3000;

/// Lines of the crash alert.
pub const CRASH_ALERT_LINES: [&str; 3] = ["Crashed!", "Returning to", "the home screen."];

// Screen names targeted by the event routers

pub const SCREEN_HOME: &str = "home";
pub const SCREEN_RING: &str = "ring";
pub const SCREEN_CALL: &str = "phone";
pub const SCREEN_SCREENSAVER: &str = "screensaver";
pub const SCREEN_DIALER: &str = "dialer";
pub const SCREEN_MENU: &str = "menu";
pub const SCREEN_LOW_BATTERY: &str = "low_battery";
pub const SCREEN_VERY_LOW_BATTERY: &str = "very_low_battery";
pub const SCREEN_DEAD_BATTERY: &str = "dead_battery";

// Shared state store

/// Maximum number of keys held in the shared store.
pub const STORE_CAPACITY: usize = 32;

/// Maximum key length in bytes.
pub const STORE_KEY_LEN: usize = 24;

/// Maximum length of a text value in bytes.
pub const STORE_TEXT_LEN: usize = 32;

/// Largest encoded value (tag + length + text).
pub const STORE_VALUE_MAX_ENCODED: usize = 2 + STORE_TEXT_LEN;

// Well-known store keys

pub const KEY_DEBUG_MODE: &str = "DebugMode";
pub const KEY_FIRMWARE_VERSION: &str = "FirmwareVersion";
pub const KEY_CAN_VIBRATE: &str = "CanVibrate";
pub const KEY_CAN_RING: &str = "CanRing";
pub const KEY_BEEP_ONLY: &str = "BeepOnly";
pub const KEY_BATTERY_PERCENT: &str = "BatteryPercent";

// Idle timers

/// Display inactivity before the screensaver is shown (ms).
pub const DISPLAY_IDLE_MS: u64 = 10_000;

/// Key backlight inactivity before it is switched off (ms).
pub const KEYLIGHT_IDLE_MS: u64 = 5_000;

// Battery

/// Capacity at or below which the low-battery alert is shown (%).
pub const BATTERY_LOW_PERCENT: u8 = 25;

/// Capacity at or below which the very-low alert is shown (%).
pub const BATTERY_VERY_LOW_PERCENT: u8 = 5;

/// Capacity at or below which the battery is considered dead (%).
pub const BATTERY_DEAD_PERCENT: u8 = 1;

/// Minimum spacing between repeated low / very-low alerts (seconds).
pub const BATTERY_REALERT_SECS: u64 = 600;

/// Battery sampling period (seconds).
pub const BATTERY_SAMPLE_SECS: u64 = 30;

/// Cell voltage read as 0 % (mV).
pub const BATTERY_EMPTY_MV: u32 = 3300;

/// Cell voltage read as 100 % (mV).
pub const BATTERY_FULL_MV: u32 = 4200;

// Modem

/// Depth of the modem event and command channels.
pub const MODEM_QUEUE_DEPTH: usize = 4;

/// Maximum dialable number length.
pub const MAX_NUMBER_LEN: usize = 24;

// Settings storage

/// Flash page index where the settings store starts (4 KB per page on nRF52840).
pub const STORAGE_FLASH_PAGE_START: u32 = 252;

/// Number of flash pages reserved for the settings store.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 4;
