//! SSD1306 OLED display wrapper.

use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use handset::device::Display;
use handset::DeviceError;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;

/// Text lines that fit the 64-pixel panel.
pub const TEXT_LINES: usize = 4;

/// Baseline of the first text line.
const FIRST_BASELINE: i32 = 10;

/// Distance between text baselines.
const LINE_PITCH: i32 = 14;

type Driver<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

/// The handset's 128×64 panel.
pub struct Oled<I2C> {
    driver: Driver<I2C>,
    on: bool,
}

impl<I2C> Oled<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    /// Initialise the SSD1306 display and clear the screen.
    pub fn init(i2c: I2C) -> Self {
        let interface = I2CDisplayInterface::new(i2c);
        let mut driver = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        let _ = driver.init();
        driver.clear_buffer();
        let _ = driver.flush();
        Self { driver, on: true }
    }
}

fn text_style() -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_6X10)
        .text_color(BinaryColor::On)
        .build()
}

fn brightness(level: u8) -> Brightness {
    match level {
        0..=50 => Brightness::DIMMEST,
        51..=101 => Brightness::DIM,
        102..=152 => Brightness::NORMAL,
        153..=203 => Brightness::BRIGHT,
        _ => Brightness::BRIGHTEST,
    }
}

impl<I2C> Display for Oled<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    fn clear(&mut self) {
        self.driver.clear_buffer();
    }

    fn draw_text(&mut self, line: u8, text: &str) {
        if line as usize >= TEXT_LINES {
            return;
        }
        let y = FIRST_BASELINE + line as i32 * LINE_PITCH;
        let _ = Text::new(text, Point::new(0, y), text_style()).draw(&mut self.driver);
    }

    fn render(&mut self) -> Result<(), DeviceError> {
        self.driver.flush().map_err(|_| DeviceError::Bus)
    }

    fn set_power(&mut self, on: bool) {
        if self.driver.set_display_on(on).is_ok() {
            self.on = on;
        }
    }

    fn set_brightness(&mut self, level: u8) {
        let _ = self.driver.set_brightness(brightness(level));
    }

    fn is_on(&self) -> bool {
        self.on
    }
}
