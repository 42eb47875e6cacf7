//! Compile-time configuration of the sensor timing, the tank and the main loop.

/// Longest echo pulse the sensor produces when nothing is in range, in microseconds.
pub const MAX_ECHO_US: u32 = 38_000;

/// Speed of sound at room temperature, in mm/s.
pub const SOUND_SPEED: u32 = 343_000;

/// Timing parameters of the ranging subsystem.
///
/// The distance conversion is only as good as `tick_period_ns`: it must match
/// the clock actually feeding the counter, nothing downstream can detect a
/// wrong value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangingConfig {
    /// Duration of one counter tick, in nanoseconds.
    pub tick_period_ns: u32,
    /// Number of distinct counter values before it wraps (256 for an 8-bit timer).
    pub counter_width: u32,
    /// Overflows after which a cycle is abandoned as out of range.
    pub timeout_overflows: u32,
    /// Speed of sound, in mm/s.
    pub speed_of_sound_mm_s: u32,
    /// Low time before the trigger pulse, in microseconds.
    pub settle_us: u32,
    /// Width of the trigger pulse, in microseconds.
    pub pulse_us: u32,
}

impl RangingConfig {
    /// The first ATtiny84 build of this board: 10 MHz core clock, no prescaler, timer0 (8 bits).
    ///
    /// Its timeout of 240 overflows is shorter than the 38 ms the sensor may
    /// take, limiting the range to roughly one metre.
    pub const ATTINY84_10MHZ: Self = Self::new(100, 256).with_timeout_overflows(240);

    /// Builds a configuration, deriving the timeout from [`MAX_ECHO_US`].
    pub const fn new(tick_period_ns: u32, counter_width: u32) -> Self {
        let overflow_ns = tick_period_ns as u64 * counter_width as u64;
        let max_echo_ns = MAX_ECHO_US as u64 * 1_000;
        let timeout_overflows = max_echo_ns.div_ceil(overflow_ns) as u32;

        Self {
            tick_period_ns,
            counter_width,
            timeout_overflows,
            speed_of_sound_mm_s: SOUND_SPEED,
            settle_us: 2,
            pulse_us: 10,
        }
    }

    pub const fn with_timeout_overflows(mut self, timeout_overflows: u32) -> Self {
        self.timeout_overflows = timeout_overflows;
        self
    }

    pub const fn with_speed_of_sound(mut self, speed_of_sound_mm_s: u32) -> Self {
        self.speed_of_sound_mm_s = speed_of_sound_mm_s;
        self
    }
}

/// Horizontal cylindrical tank with the sensor looking down from above.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TankGeometry {
    pub radius_cm: f32,
    pub length_cm: f32,
    /// Height of the sensor above the bottom of the tank.
    pub sensor_offset_cm: f32,
}

impl TankGeometry {
    pub const DEFAULT: Self = Self {
        radius_cm: 60.,
        length_cm: 265.,
        sensor_offset_cm: 134.,
    };
}

/// Pacing of the main loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Pause before each trigger so late echoes of the previous cycle die out.
    pub settle_ms: u32,
    /// Time between two display refreshes.
    pub refresh_ms: u32,
    /// ADC channel read for the second display line.
    pub adc_channel: u8,
}

impl MonitorConfig {
    pub const DEFAULT: Self = Self {
        settle_ms: 60,
        refresh_ms: 1000,
        adc_channel: 0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_covers_max_echo() {
        // 1 us ticks, 8-bit counter: 38 000 / 256 = 148.4
        let config = RangingConfig::new(1_000, 256);
        assert_eq!(config.timeout_overflows, 149);
        assert!(config.timeout_overflows * 256 * 1_000 >= MAX_ECHO_US * 1_000);
    }

    #[test]
    fn attiny_preset() {
        let config = RangingConfig::ATTINY84_10MHZ;
        assert_eq!(config.tick_period_ns, 100);
        assert_eq!(config.counter_width, 256);
        assert_eq!(config.timeout_overflows, 240);
        assert_eq!(config.speed_of_sound_mm_s, SOUND_SPEED);
        assert_eq!((config.settle_us, config.pulse_us), (2, 10));
    }
}
