use crate::config::RangingConfig;

/// Distance to the reflecting surface, already halved for the round trip.
///
/// Stored in micrometres so that short tick periods keep their resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance(u32);

impl Distance {
    pub const fn from_um(um: u32) -> Self {
        Self(um)
    }

    pub const fn from_mm(mm: u32) -> Self {
        Self(mm * 1_000)
    }

    /// Converts an echo pulse width into a distance.
    ///
    /// `ticks * tick_period * sound_speed / 2`, where ns * mm/s gives
    /// 1e-6 um.
    pub const fn from_ticks(ticks: u32, config: &RangingConfig) -> Self {
        let um = ticks as u64 * config.tick_period_ns as u64 * config.speed_of_sound_mm_s as u64
            / 2_000_000;
        if um > u32::MAX as u64 {
            Self(u32::MAX)
        } else {
            Self(um as u32)
        }
    }

    pub const fn um(&self) -> u32 {
        self.0
    }

    pub const fn mm(&self) -> u32 {
        self.0 / 1_000
    }

    pub fn cm(&self) -> f32 {
        self.0 as f32 / 10_000.
    }
}

/// Echo high-time in ticks: whole overflows plus the counter value read at the falling edge.
pub const fn elapsed_ticks(overflows: u32, count: u32, config: &RangingConfig) -> u32 {
    overflows
        .saturating_mul(config.counter_width)
        .saturating_add(count)
}
