//! Dependency bundle handed to every screen.
//!
//! Screens never reach for globals: the display, buzzer, key queue, modem
//! queue, store and navigation link all come through one `Context`. The
//! firmware builds it from `static`s; tests build it from locals and fakes.

use crate::config::CRASH_ALERT_LINES;
use crate::device::{Audio, Display, ModemCommand, ModemCommands, QuitReason, Supervisor, Tone};
use crate::error::ScreenError;
use crate::keypad::{KeyChannel, KeyEvent};
use crate::nav::NavLink;
use crate::store::SharedStore;
use crate::timer::IdleTimers;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;

pub struct Context<'a, D, A, B, P> {
    pub nav: &'a NavLink<P>,
    pub store: &'a SharedStore<B>,
    pub display: &'a Mutex<CriticalSectionRawMutex, D>,
    pub audio: &'a Mutex<CriticalSectionRawMutex, A>,
    pub keys: &'a KeyChannel,
    pub modem: &'a ModemCommands,
    pub idle: IdleTimers<'a>,
    /// Raised once when the application should end.
    pub quit: &'a Signal<CriticalSectionRawMutex, QuitReason>,
}

impl<D: Display, A: Audio, B, P> Context<'_, D, A, B, P> {
    /// Next key event. Counts as user activity.
    pub async fn next_key(&self) -> KeyEvent {
        let event = self.keys.receive().await;
        self.note_activity();
        event
    }

    /// Keep the display and key light awake.
    pub fn note_activity(&self) {
        self.idle.reset_all();
    }

    /// Replace the screen contents with `lines`, top to bottom.
    pub async fn show(&self, lines: &[&str]) -> Result<(), ScreenError> {
        let mut display = self.display.lock().await;
        display.clear();
        for (line, text) in lines.iter().enumerate() {
            display.draw_text(line as u8, text);
        }
        display.render().map_err(|_| ScreenError::Display)
    }

    pub async fn wake_display(&self) {
        let mut display = self.display.lock().await;
        if !display.is_on() {
            display.set_power(true);
        }
    }

    pub async fn blank_display(&self) {
        self.display.lock().await.set_power(false);
    }

    /// Play `tone` to completion.
    pub async fn beep(&self, tone: Tone) -> Result<(), ScreenError> {
        self.audio
            .lock()
            .await
            .play(tone)
            .await
            .map_err(|_| ScreenError::Audio)
    }

    pub async fn silence(&self) {
        self.audio.lock().await.stop();
    }

    /// Queue a request for the modem driver.
    pub fn command(&self, command: ModemCommand) -> Result<(), ScreenError> {
        self.modem.try_send(command).map_err(|_| {
            warn!("modem queue full, command dropped");
            ScreenError::Modem
        })
    }
}

impl<D: Display, A: Audio, B, P> Supervisor for Context<'_, D, A, B, P> {
    async fn show_crash(&self, error: ScreenError) {
        let _ = error;
        self.silence().await;

        {
            let mut display = self.display.lock().await;
            display.set_power(true);
            display.clear();
            for (line, text) in CRASH_ALERT_LINES.iter().enumerate() {
                display.draw_text(line as u8, text);
            }
            if display.render().is_err() {
                error!("crash alert could not be drawn");
            }
        }

        if self.beep(Tone::Alert).await.is_err() {
            warn!("crash alert tone failed");
        }
    }

    fn quit(&self, reason: QuitReason) {
        info!("quit: {:?} (code {})", reason, reason.code());
        self.quit.signal(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use crate::keypad::Key;
    use crate::timer::ResettableTimer;
    use embassy_futures::block_on;
    use embassy_time::Duration;

    #[derive(Default)]
    struct FakeDisplay {
        lines: Vec<(u8, String)>,
        renders: u32,
        on: bool,
        broken: bool,
    }

    impl Display for FakeDisplay {
        fn clear(&mut self) {
            self.lines.clear();
        }

        fn draw_text(&mut self, line: u8, text: &str) {
            self.lines.push((line, text.to_string()));
        }

        fn render(&mut self) -> Result<(), DeviceError> {
            if self.broken {
                return Err(DeviceError::Bus);
            }
            self.renders += 1;
            Ok(())
        }

        fn set_power(&mut self, on: bool) {
            self.on = on;
        }

        fn set_brightness(&mut self, _level: u8) {}

        fn is_on(&self) -> bool {
            self.on
        }
    }

    #[derive(Default)]
    struct FakeAudio {
        played: Vec<Tone>,
        stops: u32,
    }

    impl Audio for FakeAudio {
        async fn play(&mut self, tone: Tone) -> Result<(), DeviceError> {
            self.played.push(tone);
            Ok(())
        }

        fn stop(&mut self) {
            self.stops += 1;
        }
    }

    struct Parts {
        nav: NavLink<()>,
        store: SharedStore<()>,
        display: Mutex<CriticalSectionRawMutex, FakeDisplay>,
        audio: Mutex<CriticalSectionRawMutex, FakeAudio>,
        keys: KeyChannel,
        modem: ModemCommands,
        display_idle: ResettableTimer,
        keylight_idle: ResettableTimer,
        quit: Signal<CriticalSectionRawMutex, QuitReason>,
    }

    impl Parts {
        fn new() -> Self {
            Self {
                nav: NavLink::new(),
                store: SharedStore::new(()),
                display: Mutex::new(FakeDisplay::default()),
                audio: Mutex::new(FakeAudio::default()),
                keys: KeyChannel::new(),
                modem: ModemCommands::new(),
                display_idle: ResettableTimer::new(Duration::from_secs(10), false),
                keylight_idle: ResettableTimer::new(Duration::from_secs(5), false),
                quit: Signal::new(),
            }
        }

        fn context(&self) -> Context<'_, FakeDisplay, FakeAudio, (), ()> {
            Context {
                nav: &self.nav,
                store: &self.store,
                display: &self.display,
                audio: &self.audio,
                keys: &self.keys,
                modem: &self.modem,
                idle: IdleTimers::new(&self.display_idle, &self.keylight_idle),
                quit: &self.quit,
            }
        }
    }

    #[test]
    fn crash_alert_silences_audio_and_draws_message() {
        let parts = Parts::new();
        let ctx = parts.context();

        block_on(ctx.show_crash(ScreenError::Fault("boom")));

        let display = block_on(parts.display.lock());
        assert!(display.on);
        assert_eq!(display.renders, 1);
        let text: Vec<&str> = display.lines.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(text, CRASH_ALERT_LINES);

        let audio = block_on(parts.audio.lock());
        assert_eq!(audio.stops, 1);
        assert_eq!(audio.played, [Tone::Alert]);
    }

    #[test]
    fn crash_alert_survives_broken_display() {
        let parts = Parts::new();
        block_on(parts.display.lock()).broken = true;

        block_on(parts.context().show_crash(ScreenError::Display));
        assert_eq!(block_on(parts.audio.lock()).played, [Tone::Alert]);
    }

    #[test]
    fn quit_raises_signal_with_reason() {
        let parts = Parts::new();
        parts.context().quit(QuitReason::HardReboot);
        assert_eq!(parts.quit.try_take(), Some(QuitReason::HardReboot));
    }

    #[test]
    fn show_numbers_lines_from_top() {
        let parts = Parts::new();
        block_on(parts.context().show(&["Menu", "> Calls"])).unwrap();

        let display = block_on(parts.display.lock());
        assert_eq!(
            display.lines,
            [(0, "Menu".to_string()), (1, "> Calls".to_string())]
        );
    }

    #[test]
    fn render_failure_is_a_display_error() {
        let parts = Parts::new();
        block_on(parts.display.lock()).broken = true;
        assert_eq!(
            block_on(parts.context().show(&["x"])),
            Err(ScreenError::Display)
        );
    }

    #[test]
    fn key_events_count_as_activity() {
        let parts = Parts::new();
        let ctx = parts.context();
        parts.display_idle.stop();
        parts.keys.try_send(KeyEvent::press(Key::Digit(5))).unwrap();

        let event = block_on(ctx.next_key());
        assert_eq!(event.key, Key::Digit(5));
        // A reset does not re-arm a stopped timer.
        assert!(parts.display_idle.is_stopped());
    }

    #[test]
    fn full_modem_queue_is_reported() {
        let parts = Parts::new();
        let ctx = parts.context();
        for _ in 0..crate::config::MODEM_QUEUE_DEPTH {
            ctx.command(ModemCommand::Answer).unwrap();
        }
        assert_eq!(ctx.command(ModemCommand::HangUp), Err(ScreenError::Modem));
    }
}
