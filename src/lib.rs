//! Handset core: screen navigation, keypad scanning, shared state and
//! timers for a keypad phone with a small monochrome display.
//!
//! Everything in this library is hardware-independent and runs on the host
//! under `cargo test`. The nRF52840 firmware in `main.rs` (feature
//! `embedded`) plugs real peripherals into the traits in [`device`] and
//! the `embedded-hal` pins taken by [`keypad::Keypad`].
//!
//! ## Overview
//!
//! ```text
//!  Keypad::run ──KeyChannel──▶ current screen ──NavLink──▶ Navigator::run
//!  modem task ──ModemEvents──▶ router ─────────────────────────▲
//!  idle timers / battery monitor ──────────────────────────────┘
//! ```

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod input_logic;
pub mod keypad;
pub mod nav;
pub mod power;
pub mod router;
pub mod screen;
pub mod store;
pub mod timer;

pub use context::Context;
pub use error::{DeviceError, Error, NavError, ScreenError, StoreError};
pub use keypad::{Key, KeyEvent, Keypad};
pub use nav::{Exit, NavLink, Navigator};
pub use screen::{Phase, Screen};
pub use store::{SharedStore, Value};
pub use timer::{IdleTimers, ResettableTimer};
