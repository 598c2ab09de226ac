//! User interface: the handset's screens.
//!
//! Every screen is a small state struct driven by the navigator through
//! the `Screen` lifecycle. `App` wraps them in one enum so the navigator
//! can own a single homogeneous registry.
//!
//! ## Screens
//!
//! - **home**: clock face substitute, battery level, entry to dialer / menu
//! - **menu**: ringer, vibrate, restart and power-off items
//! - **dialer**: number entry
//! - **ring** / **phone**: incoming and active call
//! - **screensaver**: blanks the panel until a key is pressed
//! - **low / very low / dead battery**: alerts raised by the battery task

pub mod display;

use crate::AppContext;
use core::fmt::Write;
use defmt::{info, warn};
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Timer};
use handset::config::{
    KEY_BATTERY_PERCENT, KEY_CAN_RING, KEY_CAN_VIBRATE, MAX_NUMBER_LEN, SCREEN_CALL,
    SCREEN_DEAD_BATTERY, SCREEN_DIALER, SCREEN_HOME, SCREEN_LOW_BATTERY, SCREEN_MENU,
    SCREEN_RING, SCREEN_SCREENSAVER, SCREEN_VERY_LOW_BATTERY,
};
use handset::device::{ModemCommand, QuitReason, Tone};
use handset::input_logic::{select_wrapping_next, select_wrapping_prev, window_start};
use handset::power::BatteryAlert;
use handset::{Key, KeyEvent, NavError, Navigator, Screen, ScreenError};
use heapless::String;

use display::TEXT_LINES;

/// Hold time that turns the power key into "power off".
const POWER_OFF_HOLD: Duration = Duration::from_secs(2);

/// How long a battery alert stays up without a key press.
const ALERT_TIMEOUT: Duration = Duration::from_secs(5);

type Line = String<32>;

/// Argument passed between screens.
#[derive(Debug, Clone, PartialEq, Eq, defmt::Format)]
pub enum Payload {
    /// Number to prefill or show.
    Number(String<MAX_NUMBER_LEN>),
    /// Battery capacity in percent.
    Battery(u8),
}

fn line(args: core::fmt::Arguments<'_>) -> Line {
    let mut out = Line::new();
    let _ = out.write_fmt(args);
    out
}

fn refused(result: Result<(), NavError>) {
    if let Err(e) = result {
        warn!("UI: navigation refused: {:?}", e);
    }
}

/// Next key press; releases are skipped apart from the power key.
async fn next_press(ctx: &AppContext) -> KeyEvent {
    loop {
        let event = ctx.next_key().await;
        if event.pressed || event.key == Key::Power {
            return event;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Home
// ═══════════════════════════════════════════════════════════════════════════

pub struct Home;

impl Home {
    async fn run(&mut self, ctx: &AppContext) -> Result<(), ScreenError> {
        ctx.wake_display().await;
        loop {
            let battery = ctx.store.get_int(KEY_BATTERY_PERCENT).unwrap_or(-1);
            let status = match battery {
                0..=100 => line(format_args!("Battery {}%", battery)),
                _ => line(format_args!("Battery --")),
            };
            ctx.show(&["Handset", status.as_str(), "", "S:dial  D:menu"])
                .await?;

            let event = next_press(ctx).await;
            refused(match event.key {
                Key::Power if !event.pressed && event.duration >= POWER_OFF_HOLD => {
                    ctx.nav.quit(QuitReason::Shutdown)
                }
                Key::Select => ctx.nav.push(SCREEN_DIALER),
                Key::Down => ctx.nav.push(SCREEN_MENU),
                key if key.is_dialable() => {
                    let mut number = String::new();
                    let _ = number.push(key.as_char());
                    ctx.nav.push_with(SCREEN_DIALER, Payload::Number(number))
                }
                _ => Ok(()),
            });
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Menu
// ═══════════════════════════════════════════════════════════════════════════

const MENU_ITEMS: [&str; 4] = ["Ringer", "Vibrate", "Restart", "Power off"];

pub struct Menu {
    selected: usize,
}

impl Menu {
    fn item(&self, ctx: &AppContext, index: usize) -> Line {
        let marker = if index == self.selected { '>' } else { ' ' };
        let flag = |key: &str| match ctx.store.get_bool(key) {
            Some(true) => " on",
            Some(false) => " off",
            None => "",
        };
        let state = match index {
            0 => flag(KEY_CAN_RING),
            1 => flag(KEY_CAN_VIBRATE),
            _ => "",
        };
        line(format_args!("{} {}{}", marker, MENU_ITEMS[index], state))
    }

    async fn draw(&self, ctx: &AppContext) -> Result<(), ScreenError> {
        let rows = TEXT_LINES - 1;
        let first = window_start(self.selected, MENU_ITEMS.len(), rows);
        let mut lines: [Line; TEXT_LINES] = Default::default();
        lines[0] = line(format_args!("Menu"));
        for (slot, index) in (first..MENU_ITEMS.len()).take(rows).enumerate() {
            lines[slot + 1] = self.item(ctx, index);
        }
        let text: [&str; TEXT_LINES] = core::array::from_fn(|i| lines[i].as_str());
        ctx.show(&text).await
    }

    async fn toggle(ctx: &AppContext, key: &str) -> Result<(), ScreenError> {
        let value = !ctx.store.get_bool(key).unwrap_or(false);
        ctx.store.set(key, value)?;
        if let Err(e) = ctx.store.sync_persistent().await {
            warn!("Menu: settings not saved: {:?}", e);
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &AppContext) -> Result<(), ScreenError> {
        loop {
            self.draw(ctx).await?;
            let event = next_press(ctx).await;
            match event.key {
                Key::Up => self.selected = select_wrapping_prev(self.selected, MENU_ITEMS.len()),
                Key::Down => self.selected = select_wrapping_next(self.selected, MENU_ITEMS.len()),
                Key::Clear => {
                    refused(ctx.nav.pop());
                }
                Key::Select => match self.selected {
                    0 => Self::toggle(ctx, KEY_CAN_RING).await?,
                    1 => Self::toggle(ctx, KEY_CAN_VIBRATE).await?,
                    2 => {
                        refused(ctx.nav.quit(QuitReason::SoftRestart));
                    }
                    _ => {
                        refused(ctx.nav.quit(QuitReason::Shutdown));
                    }
                },
                _ => {}
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Dialer
// ═══════════════════════════════════════════════════════════════════════════

pub struct Dialer {
    number: String<MAX_NUMBER_LEN>,
}

impl Dialer {
    async fn run(&mut self, ctx: &AppContext) -> Result<(), ScreenError> {
        loop {
            ctx.show(&["Dial", self.number.as_str(), "", "S:call  C:del"])
                .await?;

            let event = next_press(ctx).await;
            match event.key {
                key if key.is_dialable() => {
                    if self.number.push(key.as_char()).is_ok() {
                        let _ = ctx.beep(Tone::Dtmf(key.as_char())).await;
                    }
                }
                Key::Clear if self.number.is_empty() => {
                    refused(ctx.nav.pop());
                }
                Key::Clear => {
                    self.number.pop();
                }
                Key::Select if !self.number.is_empty() => {
                    ctx.command(ModemCommand::dial(&self.number)?)?;
                    refused(
                        ctx.nav
                            .to_menu_with(SCREEN_CALL, Payload::Number(self.number.clone())),
                    );
                }
                _ => {}
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Calls
// ═══════════════════════════════════════════════════════════════════════════

/// Incoming call. Masks navigation until answered or rejected.
pub struct Ring;

impl Ring {
    async fn ring(ctx: &AppContext) {
        if ctx.store.get_bool(KEY_CAN_RING).unwrap_or(true) {
            let _ = ctx.beep(Tone::Ringtone).await;
        }
        core::future::pending::<()>().await;
    }

    async fn answer(ctx: &AppContext) -> Result<(), ScreenError> {
        loop {
            let event = next_press(ctx).await;
            match event.key {
                Key::Select => {
                    ctx.nav.unmask();
                    return ctx.command(ModemCommand::Answer);
                }
                Key::Clear => {
                    ctx.nav.unmask();
                    return ctx.command(ModemCommand::HangUp);
                }
                _ => {}
            }
        }
    }

    async fn run(&mut self, ctx: &AppContext) -> Result<(), ScreenError> {
        ctx.nav.mask();
        ctx.wake_display().await;
        ctx.show(&["Incoming call", "", "S:answer", "C:reject"])
            .await?;

        match select(Self::ring(ctx), Self::answer(ctx)).await {
            Either::First(()) => Ok(()),
            Either::Second(result) => {
                ctx.silence().await;
                result
            }
        }
    }

    async fn stop(&mut self, ctx: &AppContext) {
        ctx.nav.unmask();
        ctx.silence().await;
    }
}

/// Call in progress.
pub struct Call {
    number: Option<String<MAX_NUMBER_LEN>>,
}

impl Call {
    async fn run(&mut self, ctx: &AppContext) -> Result<(), ScreenError> {
        let number = self.number.as_ref().map(|n| n.as_str()).unwrap_or("");
        ctx.show(&["In call", number, "", "C:hang up"]).await?;

        loop {
            let event = next_press(ctx).await;
            match event.key {
                key if key.is_dialable() => {
                    ctx.command(ModemCommand::Digit(key.as_char()))?;
                    let _ = ctx.beep(Tone::Dtmf(key.as_char())).await;
                }
                Key::Clear => ctx.command(ModemCommand::HangUp)?,
                _ => {}
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Screensaver
// ═══════════════════════════════════════════════════════════════════════════

pub struct Screensaver;

impl Screensaver {
    async fn run(&mut self, ctx: &AppContext) -> Result<(), ScreenError> {
        ctx.blank_display().await;
        next_press(ctx).await;
        ctx.wake_display().await;
        refused(ctx.nav.pop());
        Ok(())
    }

    async fn stop(&mut self, ctx: &AppContext) {
        ctx.wake_display().await;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Battery alerts
// ═══════════════════════════════════════════════════════════════════════════

pub struct BatteryScreen {
    alert: BatteryAlert,
    percent: Option<u8>,
}

impl BatteryScreen {
    fn configure_with(&mut self, payload: Payload) -> Result<(), ScreenError> {
        match payload {
            Payload::Battery(percent) => {
                self.percent = Some(percent);
                Ok(())
            }
            Payload::Number(_) => Err(ScreenError::UnexpectedPayload),
        }
    }

    async fn run(&mut self, ctx: &AppContext) -> Result<(), ScreenError> {
        let title = match self.alert {
            BatteryAlert::Low => "Battery low",
            BatteryAlert::VeryLow => "Battery very low",
            BatteryAlert::Dead => "Battery empty",
        };
        let level = match self.percent {
            Some(p) => line(format_args!("{}% left", p)),
            None => Line::new(),
        };
        let hint = match self.alert {
            BatteryAlert::Dead => "Shutting down",
            _ => "Please charge",
        };

        ctx.wake_display().await;
        ctx.show(&[title, level.as_str(), "", hint]).await?;
        let _ = ctx.beep(Tone::Alert).await;

        if self.alert == BatteryAlert::Dead {
            Timer::after(ALERT_TIMEOUT).await;
            refused(ctx.nav.quit(QuitReason::Shutdown));
            return Ok(());
        }

        let _ = select(next_press(ctx), Timer::after(ALERT_TIMEOUT)).await;
        refused(ctx.nav.pop());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════

/// Every screen of the handset.
pub enum App {
    Home(Home),
    Menu(Menu),
    Dialer(Dialer),
    Ring(Ring),
    Call(Call),
    Screensaver(Screensaver),
    Battery(BatteryScreen),
}

impl Screen for App {
    type Payload = Payload;
    type Context = AppContext;

    fn configure(&mut self) -> Result<(), ScreenError> {
        match self {
            App::Menu(menu) => menu.selected = 0,
            App::Dialer(dialer) => dialer.number.clear(),
            App::Call(call) => call.number = None,
            App::Battery(battery) => battery.percent = None,
            App::Home(_) | App::Ring(_) | App::Screensaver(_) => {}
        }
        Ok(())
    }

    fn configure_with(&mut self, payload: Payload) -> Result<(), ScreenError> {
        match (self, payload) {
            (App::Dialer(dialer), Payload::Number(number)) => dialer.number = number,
            (App::Call(call), Payload::Number(number)) => call.number = Some(number),
            (App::Battery(battery), payload) => return battery.configure_with(payload),
            _ => return Err(ScreenError::UnexpectedPayload),
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &AppContext) -> Result<(), ScreenError> {
        match self {
            App::Home(s) => s.run(ctx).await,
            App::Menu(s) => s.run(ctx).await,
            App::Dialer(s) => s.run(ctx).await,
            App::Ring(s) => s.run(ctx).await,
            App::Call(s) => s.run(ctx).await,
            App::Screensaver(s) => s.run(ctx).await,
            App::Battery(s) => s.run(ctx).await,
        }
    }

    async fn pause(&mut self, ctx: &AppContext) {
        if let App::Ring(_) = self {
            ctx.silence().await;
        }
    }

    async fn stop(&mut self, ctx: &AppContext) {
        match self {
            App::Ring(s) => s.stop(ctx).await,
            App::Screensaver(s) => s.stop(ctx).await,
            _ => {}
        }
    }
}

/// Register every screen with the navigator.
pub fn register(nav: &mut Navigator<'static, App>) -> Result<(), NavError> {
    nav.register(SCREEN_HOME, App::Home(Home))?;
    nav.register(SCREEN_MENU, App::Menu(Menu { selected: 0 }))?;
    nav.register(
        SCREEN_DIALER,
        App::Dialer(Dialer {
            number: String::new(),
        }),
    )?;
    nav.register(SCREEN_RING, App::Ring(Ring))?;
    nav.register(SCREEN_CALL, App::Call(Call { number: None }))?;
    nav.register(SCREEN_SCREENSAVER, App::Screensaver(Screensaver))?;
    for (name, alert) in [
        (SCREEN_LOW_BATTERY, BatteryAlert::Low),
        (SCREEN_VERY_LOW_BATTERY, BatteryAlert::VeryLow),
        (SCREEN_DEAD_BATTERY, BatteryAlert::Dead),
    ] {
        let screen = BatteryScreen {
            alert,
            percent: None,
        };
        nav.register(name, App::Battery(screen))?;
    }
    info!("UI: screens registered");
    Ok(())
}
