//! Liquid volume of a horizontal cylindrical tank, from the sensor distance.

use libm::{acosf, sqrtf};

use crate::{config::TankGeometry, ultrasonic::Distance};

impl TankGeometry {
    /// Liquid height above the bottom, clamped to the tank diameter.
    pub fn fill_height_cm(&self, distance: Distance) -> f32 {
        let height = self.sensor_offset_cm - distance.cm();
        height.clamp(0., 2. * self.radius_cm)
    }

    /// Volume of the circular segment below the liquid surface times the tank length.
    pub fn volume_litres(&self, distance: Distance) -> f32 {
        let r = self.radius_cm;
        let h = self.fill_height_cm(distance);
        let area = r * r * acosf((r - h) / r) - (r - h) * sqrtf(2. * r * h - h * h);
        // cm^3 to litres
        self.length_cm * area / 1000.
    }

    pub fn capacity_litres(&self) -> f32 {
        core::f32::consts::PI * self.radius_cm * self.radius_cm * self.length_cm / 1000.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TANK: TankGeometry = TankGeometry::DEFAULT;

    fn at_cm(cm: u32) -> Distance {
        Distance::from_mm(cm * 10)
    }

    #[test]
    fn empty_tank() {
        // sensor 134 cm above the bottom
        assert_eq!(TANK.fill_height_cm(at_cm(134)), 0.);
        assert_eq!(TANK.volume_litres(at_cm(134)), 0.);
        // further than the bottom still reads empty
        assert_eq!(TANK.volume_litres(at_cm(200)), 0.);
    }

    #[test]
    fn half_full() {
        let volume = TANK.volume_litres(at_cm(74));
        let half = TANK.capacity_litres() / 2.;
        assert!((volume - half).abs() < 1., "{volume} vs {half}");
    }

    #[test]
    fn full_tank_is_clamped() {
        assert_eq!(TANK.fill_height_cm(at_cm(14)), 120.);
        assert_eq!(TANK.fill_height_cm(at_cm(1)), 120.);
        let volume = TANK.volume_litres(at_cm(1));
        assert!((volume - TANK.capacity_litres()).abs() < 1.);
    }

    #[test]
    fn volume_grows_with_level() {
        let mut last = -1.;
        for cm in (14..=134).rev().step_by(10) {
            let volume = TANK.volume_litres(at_cm(cm));
            assert!(volume > last);
            last = volume;
        }
    }
}
