//! Handset firmware: nRF52840 + SSD1306 + matrix keypad + cellular modem.
//!
//! `main` brings up the peripherals, seeds the persistent settings and then
//! runs the navigator on the main task until the application quits. Every
//! other concern runs in its own task:
//!
//! ```text
//!  keypad ──RAW_KEYS──▶ key forwarder ──KEYS──▶ screens
//!                            │
//!                            └─▶ keylight, idle timers
//!  modem ──MODEM_EVENTS──▶ router ──NAV──▶ navigator
//!  battery ─────────────────────────NAV──▶ navigator
//!  display idle timer ──────────────NAV──▶ navigator (screensaver)
//! ```

#![no_std]
#![no_main]

mod audio;
mod modem;
mod storage;
mod ui;

use audio::Buzzer;
use defmt::{error, info, warn};
use embassy_embedded_hal::adapter::BlockingAsync;
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::peripherals::{TWISPI0, UARTE0};
use embassy_nrf::pwm::SimplePwm;
use embassy_nrf::saadc::{self, ChannelConfig, Saadc};
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::uarte::{self, Uarte, UarteRx, UarteTx};
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use handset::config::{
    BATTERY_SAMPLE_SECS, KEY_BATTERY_PERCENT, KEY_BEEP_ONLY, KEY_CAN_RING, KEY_CAN_VIBRATE,
    KEY_DEBUG_MODE, KEY_FIRMWARE_VERSION, KEY_QUEUE_DEPTH, SCREEN_HOME, SCREEN_SCREENSAVER,
};
use handset::device::{ModemCommands, ModemEvents, QuitReason};
use handset::keypad::KeyChannel;
use handset::power::{capacity_from_millivolts, BatteryMonitor};
use handset::router::route_modem_events;
use handset::timer::{display_idle_period, keylight_idle_period};
use handset::{
    Context, Error, Exit, IdleTimers, KeyEvent, Keypad, NavLink, Navigator, ResettableTimer,
    SharedStore, Value,
};
use static_cell::StaticCell;
use storage::FlashStore;
use ui::display::Oled;
use ui::{App, Payload};
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => twim::InterruptHandler<peripherals::TWISPI0>;
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
    SAADC => saadc::InterruptHandler;
});

type Panel = Oled<Twim<'static, TWISPI0>>;
type Store = FlashStore<BlockingAsync<Nvmc<'static>>>;
type HandsetKeypad = Keypad<Input<'static>, Output<'static>, Input<'static>>;

/// Everything a screen can reach.
pub type AppContext = Context<'static, Panel, Buzzer<'static>, Store, Payload>;

static NAV: NavLink<Payload> = NavLink::new();
static KEYS: KeyChannel = Channel::new();
static RAW_KEYS: Channel<CriticalSectionRawMutex, KeyEvent, KEY_QUEUE_DEPTH> = Channel::new();
static MODEM_EVENTS: ModemEvents = Channel::new();
static MODEM_COMMANDS: ModemCommands = Channel::new();
static DISPLAY_IDLE: ResettableTimer = ResettableTimer::new(display_idle_period(), false);
static KEYLIGHT_IDLE: ResettableTimer = ResettableTimer::new(keylight_idle_period(), false);
static QUIT: Signal<CriticalSectionRawMutex, QuitReason> = Signal::new();
static KEYLIGHT: Signal<CriticalSectionRawMutex, bool> = Signal::new();

static PANEL: StaticCell<Mutex<CriticalSectionRawMutex, Panel>> = StaticCell::new();
static BUZZER: StaticCell<Mutex<CriticalSectionRawMutex, Buzzer<'static>>> = StaticCell::new();
static STORE: StaticCell<SharedStore<Store>> = StaticCell::new();
static CONTEXT: StaticCell<AppContext> = StaticCell::new();

/// ADC reading to cell millivolts: 0.6 V reference, gain 1/6, 12 bits,
/// behind a 1:2 divider.
fn battery_millivolts(raw: i16) -> u32 {
    let raw = raw.max(0) as u32;
    raw * 3600 / 4096 * 2
}

fn idle_timers() -> IdleTimers<'static> {
    IdleTimers::new(&DISPLAY_IDLE, &KEYLIGHT_IDLE)
}

// ═══════════════════════════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════════════════════════

#[embassy_executor::task]
async fn keypad_task(mut keypad: HandsetKeypad) -> ! {
    keypad.run(RAW_KEYS.sender()).await
}

/// Every key event lights the keys and counts as activity before it
/// reaches the screens.
#[embassy_executor::task]
async fn key_forward_task() -> ! {
    let idle = idle_timers();
    loop {
        let event = RAW_KEYS.receive().await;
        KEYLIGHT.signal(true);
        idle.reset_all();
        KEYS.send(event).await;
    }
}

#[embassy_executor::task]
async fn keylight_task(mut led: Output<'static>) -> ! {
    loop {
        if KEYLIGHT.wait().await {
            led.set_high();
        } else {
            led.set_low();
        }
    }
}

#[embassy_executor::task]
async fn display_idle_task() -> ! {
    DISPLAY_IDLE
        .run(|| {
            if NAV.snapshot().top() == Some(SCREEN_SCREENSAVER) {
                return;
            }
            if let Err(e) = NAV.push(SCREEN_SCREENSAVER) {
                warn!("Idle: screensaver refused: {:?}", e);
            }
        })
        .await
}

#[embassy_executor::task]
async fn keylight_idle_task() -> ! {
    KEYLIGHT_IDLE.run(|| KEYLIGHT.signal(false)).await
}

#[embassy_executor::task]
async fn modem_task(rx: UarteRx<'static, UARTE0>, tx: UarteTx<'static, UARTE0>) -> ! {
    modem::modem_task(rx, tx, MODEM_EVENTS.sender(), MODEM_COMMANDS.receiver()).await
}

#[embassy_executor::task]
async fn router_task() -> ! {
    route_modem_events(MODEM_EVENTS.receiver(), &NAV, idle_timers()).await
}

#[embassy_executor::task]
async fn battery_task(mut adc: Saadc<'static, 1>, store: &'static SharedStore<Store>) -> ! {
    let idle = idle_timers();
    let mut monitor = BatteryMonitor::new();
    adc.calibrate().await;

    loop {
        let mut sample = [0i16; 1];
        adc.sample(&mut sample).await;
        let percent = capacity_from_millivolts(battery_millivolts(sample[0]));

        if let Err(e) = store.set(KEY_BATTERY_PERCENT, percent as i32) {
            warn!("Battery: level not stored: {:?}", e);
        }

        if let Some(alert) = monitor.assess(percent, Instant::now()) {
            alert.timer_action().apply(&idle);
            if let Err(e) = NAV.push_with(alert.screen(), Payload::Battery(percent)) {
                warn!("Battery: alert refused: {:?}", e);
            }
        }

        Timer::after(Duration::from_secs(BATTERY_SAMPLE_SECS)).await;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Startup
// ═══════════════════════════════════════════════════════════════════════════

async fn seed_settings(store: &SharedStore<Store>) -> Result<(), Error> {
    let defaults = [
        (KEY_CAN_RING, true),
        (KEY_CAN_VIBRATE, true),
        (KEY_BEEP_ONLY, false),
        (KEY_DEBUG_MODE, false),
    ];
    for (key, default) in defaults {
        store.create_or_load_persistent(key, default).await?;
    }
    store.set(KEY_FIRMWARE_VERSION, Value::text(env!("CARGO_PKG_VERSION"))?)?;
    Ok(())
}

fn start_ui(nav: &mut Navigator<'static, App>) -> Result<(), Error> {
    ui::register(nav)?;
    for timer in [&DISPLAY_IDLE, &KEYLIGHT_IDLE] {
        nav.add_timer(timer)?;
    }
    NAV.push(SCREEN_HOME)?;
    Ok(())
}

fn power_off() -> ! {
    info!("Powering off");
    embassy_nrf::pac::POWER
        .systemoff()
        .write(|w| w.set_systemoff(true));
    loop {
        cortex_m::asm::wfe();
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Handset v{} starting", env!("CARGO_PKG_VERSION"));
    let p = embassy_nrf::init(Default::default());

    // Display
    let i2c = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default());
    let panel: &'static _ = PANEL.init(Mutex::new(Oled::init(i2c)));

    // Buzzer
    let pwm = SimplePwm::new_1ch(p.PWM0, p.P0_06);
    let buzzer: &'static _ = BUZZER.init(Mutex::new(Buzzer::new(pwm)));

    // Settings
    let flash = BlockingAsync::new(Nvmc::new(p.NVMC));
    let store: &'static SharedStore<Store> = STORE.init(SharedStore::new(FlashStore::new(flash)));
    if let Err(e) = seed_settings(store).await {
        error!("Settings: running on defaults: {:?}", e);
    }

    // Keypad
    let rows = [
        Input::new(p.P0_11, Pull::Down),
        Input::new(p.P0_12, Pull::Down),
        Input::new(p.P0_13, Pull::Down),
        Input::new(p.P0_14, Pull::Down),
    ];
    let cols = [
        Output::new(p.P0_28, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_29, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_30, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_31, Level::Low, OutputDrive::Standard),
        Output::new(p.P1_15, Level::Low, OutputDrive::Standard),
    ];
    let power_key = Input::new(p.P1_13, Pull::Up);
    let keypad = Keypad::new(rows, cols, power_key);
    let keylight = Output::new(p.P0_08, Level::Low, OutputDrive::Standard);

    // Modem
    let mut uart_config = uarte::Config::default();
    uart_config.baudrate = uarte::Baudrate::BAUD115200;
    uart_config.parity = uarte::Parity::EXCLUDED;
    let uart = Uarte::new(p.UARTE0, Irqs, p.P1_01, p.P1_02, uart_config);
    let (tx, rx) = uart.split();

    // Battery sense
    let channel = ChannelConfig::single_ended(p.P0_02);
    let adc: Saadc<'static, 1> = Saadc::new(p.SAADC, Irqs, saadc::Config::default(), [channel]);

    spawner.must_spawn(keypad_task(keypad));
    spawner.must_spawn(key_forward_task());
    spawner.must_spawn(keylight_task(keylight));
    spawner.must_spawn(display_idle_task());
    spawner.must_spawn(keylight_idle_task());
    spawner.must_spawn(modem_task(rx, tx));
    spawner.must_spawn(router_task());
    spawner.must_spawn(battery_task(adc, store));

    let ctx = CONTEXT.init(Context {
        nav: &NAV,
        store,
        display: panel,
        audio: buzzer,
        keys: &KEYS,
        modem: &MODEM_COMMANDS,
        idle: idle_timers(),
        quit: &QUIT,
    });

    let mut nav: Navigator<'static, App> = Navigator::new(&NAV);
    if let Err(e) = start_ui(&mut nav) {
        error!("UI: startup incomplete: {:?}", e);
    }

    let exit = nav.run(ctx).await;
    info!("Navigator exited: {:?}", exit);

    if let Err(e) = store.sync_persistent().await {
        error!("Settings: final sync failed: {:?}", e);
    }

    match exit {
        Exit::Quit(QuitReason::SoftRestart) | Exit::Quit(QuitReason::HardReboot) => {
            cortex_m::peripheral::SCB::sys_reset()
        }
        Exit::Quit(QuitReason::Shutdown) | Exit::Shutdown => power_off(),
    }
}
