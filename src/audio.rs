//! PWM buzzer.
//!
//! Melodies come from `Tone::melody`; each note reprograms the PWM period
//! and holds a 50 % duty for the note length. Dropping a `play` future
//! silences the buzzer.

use defmt::trace;
use embassy_nrf::peripherals::PWM0;
use embassy_nrf::pwm::SimplePwm;
use embassy_time::{Duration, Timer};
use handset::device::{Audio, Tone};
use handset::DeviceError;

pub struct Buzzer<'d> {
    pwm: SimplePwm<'d, PWM0>,
}

impl<'d> Buzzer<'d> {
    pub fn new(mut pwm: SimplePwm<'d, PWM0>) -> Self {
        pwm.disable();
        Self { pwm }
    }

    fn start(&mut self, hz: u32) {
        self.pwm.enable();
        self.pwm.set_period(hz);
        let half = self.pwm.max_duty() / 2;
        self.pwm.set_duty(0, half);
    }

    fn silence(&mut self) {
        self.pwm.set_duty(0, 0);
        self.pwm.disable();
    }
}

/// Silences the buzzer when playback ends or is cancelled.
struct Quiet<'a, 'd>(&'a mut Buzzer<'d>);

impl Drop for Quiet<'_, '_> {
    fn drop(&mut self) {
        self.0.silence();
    }
}

impl Audio for Buzzer<'_> {
    async fn play(&mut self, tone: Tone) -> Result<(), DeviceError> {
        trace!("Buzzer: {:?}", tone);
        let mut quiet = Quiet(self);

        loop {
            for note in tone.melody() {
                if note.hz == 0 {
                    quiet.0.silence();
                } else {
                    quiet.0.start(note.hz);
                }
                Timer::after(Duration::from_millis(note.ms as u64)).await;
            }
            if !tone.repeats() {
                return Ok(());
            }
        }
    }

    fn stop(&mut self) {
        self.silence();
    }
}
