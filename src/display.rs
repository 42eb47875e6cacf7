//! Character display interface and an HD44780 driver wired for 4-bit, write-only use.

use embedded_hal::{delay::DelayNs, digital::OutputPin};

pub const CLEAR: u8 = 0b0000_0001;
pub const HOME: u8 = 0b0000_0010;
/// Cursor moves left to right, no display shift.
pub const ENTRY_MODE: u8 = 0b0000_0110;
pub const DISPLAY_OFF: u8 = 0b0000_1000;
/// Display on, cursor off, no blinking.
pub const DISPLAY_ON: u8 = 0b0000_1100;
pub const FUNCTION_RESET: u8 = 0b0011_0000;
/// 4-bit bus, 2 lines, 5x7 font.
pub const FUNCTION_SET_4BIT: u8 = 0b0010_1000;
pub const SET_CURSOR: u8 = 0b1000_0000;

pub const LINE_ONE: u8 = 0x00;
pub const LINE_TWO: u8 = 0x40;

/// Output side of the main loop. Writes are fire-and-forget.
pub trait Display {
    fn display_instruction(&mut self, code: u8);
    fn display_string(&mut self, text: &str);
}

/// HD44780 controller with RW tied low, so every wait is a fixed delay
/// instead of a busy flag poll.
pub struct Hd44780<RS, EN, D4, D5, D6, D7, DELAY> {
    rs: RS,
    en: EN,
    data: (D4, D5, D6, D7),
    delay: DELAY,
}

impl<RS, EN, D4, D5, D6, D7, DELAY, E> Hd44780<RS, EN, D4, D5, D6, D7, DELAY>
where
    RS: OutputPin<Error = E>,
    EN: OutputPin<Error = E>,
    D4: OutputPin<Error = E>,
    D5: OutputPin<Error = E>,
    D6: OutputPin<Error = E>,
    D7: OutputPin<Error = E>,
    DELAY: DelayNs,
{
    /// Runs the datasheet reset sequence and leaves the display on and cleared.
    pub fn new(rs: RS, en: EN, data: (D4, D5, D6, D7), delay: DELAY) -> Result<Self, E> {
        let mut lcd = Self {
            rs,
            en,
            data,
            delay,
        };

        lcd.delay.delay_ms(100);
        lcd.rs.set_low()?;
        lcd.en.set_low()?;

        // still in 8-bit mode, only the upper nibble reaches the controller
        lcd.write_nibble(FUNCTION_RESET)?;
        lcd.delay.delay_ms(10);
        lcd.write_nibble(FUNCTION_RESET)?;
        lcd.delay.delay_us(200);
        lcd.write_nibble(FUNCTION_RESET)?;
        lcd.delay.delay_us(80);
        lcd.write_nibble(FUNCTION_SET_4BIT)?;
        lcd.delay.delay_us(80);

        for code in [FUNCTION_SET_4BIT, DISPLAY_OFF, CLEAR, ENTRY_MODE, DISPLAY_ON] {
            lcd.write_instruction(code)?;
        }
        Ok(lcd)
    }

    pub fn write_instruction(&mut self, code: u8) -> Result<(), E> {
        self.rs.set_low()?;
        self.write_byte(code)?;
        // clear and home take up to 1.52 ms, everything else 37 us
        if code == CLEAR || code == HOME {
            self.delay.delay_us(2_000);
        } else {
            self.delay.delay_us(50);
        }
        Ok(())
    }

    pub fn write_character(&mut self, character: u8) -> Result<(), E> {
        self.rs.set_high()?;
        self.write_byte(character)?;
        self.delay.delay_us(50);
        Ok(())
    }

    pub fn release(self) -> (RS, EN, (D4, D5, D6, D7), DELAY) {
        (self.rs, self.en, self.data, self.delay)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), E> {
        self.write_nibble(byte)?;
        self.write_nibble(byte << 4)
    }

    /// Puts the upper nibble of `bits` on D4..D7 and pulses E.
    fn write_nibble(&mut self, bits: u8) -> Result<(), E> {
        set_level(&mut self.data.3, bits & 1 << 7 != 0)?;
        set_level(&mut self.data.2, bits & 1 << 6 != 0)?;
        set_level(&mut self.data.1, bits & 1 << 5 != 0)?;
        set_level(&mut self.data.0, bits & 1 << 4 != 0)?;

        self.en.set_high()?;
        self.delay.delay_us(1);
        self.en.set_low()?;
        self.delay.delay_us(1);
        Ok(())
    }
}

fn set_level<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), P::Error> {
    if high {
        pin.set_high()
    } else {
        pin.set_low()
    }
}

impl<RS, EN, D4, D5, D6, D7, DELAY, E> Display for Hd44780<RS, EN, D4, D5, D6, D7, DELAY>
where
    RS: OutputPin<Error = E>,
    EN: OutputPin<Error = E>,
    D4: OutputPin<Error = E>,
    D5: OutputPin<Error = E>,
    D6: OutputPin<Error = E>,
    D7: OutputPin<Error = E>,
    DELAY: DelayNs,
{
    fn display_instruction(&mut self, code: u8) {
        self.write_instruction(code).ok();
    }

    fn display_string(&mut self, text: &str) {
        for character in text.bytes() {
            if self.write_character(character).is_err() {
                return;
            }
        }
    }
}
