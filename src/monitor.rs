//! One pass of the level display loop.

use core::fmt::Write;

use embedded_hal::{delay::DelayNs, digital::OutputPin};
use heapless::String;
use log::{debug, warn};

use crate::{
    adc::AnalogInput,
    config::{MonitorConfig, TankGeometry},
    display::{Display, LINE_ONE, LINE_TWO, SET_CURSOR},
    ultrasonic::{OverflowTimer, Reading, Ultrasonic},
};

/// Characters per display line.
pub const LINE_WIDTH: usize = 16;

type Line = String<LINE_WIDTH>;

/// Shows the tank volume on the first line and the analog sample on the second.
pub struct LevelMonitor<D, A> {
    display: D,
    adc: A,
    tank: TankGeometry,
    config: MonitorConfig,
}

impl<D, A> LevelMonitor<D, A>
where
    D: Display,
    A: AnalogInput,
{
    pub fn new(display: D, adc: A, tank: TankGeometry, config: MonitorConfig) -> Self {
        Self {
            display,
            adc,
            tank,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Triggers a new cycle unless one is still running.
    ///
    /// The caller waits out `settle_ms` first. Returns whether a cycle was started.
    pub fn trigger<Trig, Delay, T>(&self, sensor: &mut Ultrasonic<'_, Trig, Delay, T>) -> bool
    where
        Trig: OutputPin,
        Delay: DelayNs,
        T: OverflowTimer,
    {
        if sensor.is_measurement_in_progress() {
            return false;
        }
        match sensor.start_measurement() {
            Ok(()) => true,
            Err(err) => {
                warn!("ultrasonic trigger failed: {:?}", err);
                false
            }
        }
    }

    /// Redraws both lines from the last reading and a fresh ADC sample.
    pub fn refresh(&mut self, reading: Reading) {
        let volume = reading.distance().map(|distance| {
            debug!("distance: {} mm", distance.mm());
            self.tank.volume_litres(distance)
        });
        if reading == Reading::Timeout {
            warn!("no echo before timeout");
        }

        let mut line = Line::new();
        push_value(&mut line, volume.map(|litres| litres as i32));
        line.push_str(" lit").ok();
        self.display.display_instruction(SET_CURSOR | LINE_ONE);
        self.display.display_string(&line);

        let sample = match self.adc.read_channel(self.config.adc_channel) {
            Ok(sample) => Some(sample),
            Err(_) => {
                warn!("adc channel {} read failed", self.config.adc_channel);
                None
            }
        };

        line.clear();
        push_value(&mut line, sample.map(i32::from));
        line.push_str(" bar").ok();
        self.display.display_instruction(SET_CURSOR | LINE_TWO);
        self.display.display_string(&line);
    }

    pub fn release(self) -> (D, A) {
        (self.display, self.adc)
    }
}

/// Right-aligns `value` in four columns, or dashes when there is none.
fn push_value(line: &mut Line, value: Option<i32>) {
    match value {
        Some(value) => write!(line, "{value:>4}").ok(),
        None => line.push_str("  --").ok(),
    };
}
