use micromath::F32Ext;

use crate::math::Quaternion;
use crate::regulator::io::AttitudeSource;

/// Mahony complementary filter: integrates gyro rates and pulls the estimate
/// toward the measured gravity direction. Yaw is gyro-only.
pub struct Mahony {
    kp: f32,
    ki: f32,

    // Integral error
    ix: f32,
    iy: f32,
    iz: f32,

    q: Quaternion,
}

impl Mahony {
    pub fn new() -> Self {
        Self::with_gains(2.0, 0.005)
    }

    pub fn with_gains(kp: f32, ki: f32) -> Self {
        Self {
            kp,
            ki,
            ix: 0.0,
            iy: 0.0,
            iz: 0.0,
            q: Quaternion::IDENTITY,
        }
    }

    pub fn quaternion(&self) -> Quaternion {
        self.q
    }

    /// `g*` in rad/s, `a*` in any consistent unit (normalised here).
    pub fn update(&mut self, dt: f32, gx: f32, gy: f32, gz: f32, ax: f32, ay: f32, az: f32) {
        let Quaternion { w: q0, x: q1, y: q2, z: q3 } = self.q;

        let mut gx = gx;
        let mut gy = gy;
        let mut gz = gz;

        // Free fall or a dead sensor: skip the correction, keep integrating.
        let norm_sq = ax * ax + ay * ay + az * az;
        if norm_sq > 0.0 {
            let recip_norm = norm_sq.sqrt().recip();
            let ax = ax * recip_norm;
            let ay = ay * recip_norm;
            let az = az * recip_norm;

            // Estimated direction of gravity
            let halfvx = q1 * q3 - q0 * q2;
            let halfvy = q0 * q1 + q2 * q3;
            let halfvz = q0 * q0 - 0.5 + q3 * q3;

            // Cross product between estimated and measured gravity
            let halfex = ay * halfvz - az * halfvy;
            let halfey = az * halfvx - ax * halfvz;
            let halfez = ax * halfvy - ay * halfvx;

            if self.ki > 0.0 {
                self.ix += self.ki * halfex * dt;
                self.iy += self.ki * halfey * dt;
                self.iz += self.ki * halfez * dt;
            } else {
                self.ix = 0.0;
                self.iy = 0.0;
                self.iz = 0.0;
            }

            gx += self.kp * halfex + self.ix;
            gy += self.kp * halfey + self.iy;
            gz += self.kp * halfez + self.iz;
        }

        // Integrate rate of change of quaternion
        let gx = gx * (0.5 * dt);
        let gy = gy * (0.5 * dt);
        let gz = gz * (0.5 * dt);

        let w = q0 - q1 * gx - q2 * gy - q3 * gz;
        let x = q1 + q0 * gx + q2 * gz - q3 * gy;
        let y = q2 + q0 * gy - q1 * gz + q3 * gx;
        let z = q3 + q0 * gz + q1 * gy - q2 * gx;

        let recip_norm = (w * w + x * x + y * y + z * z).sqrt().recip();
        self.q = Quaternion::new(w * recip_norm, x * recip_norm, y * recip_norm, z * recip_norm);
    }
}

impl Default for Mahony {
    fn default() -> Self {
        Self::new()
    }
}

impl AttitudeSource for Mahony {
    fn attitude(&mut self) -> Quaternion {
        self.q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::FRAC_PI_2;

    #[test]
    fn test_level_and_still_stays_identity() {
        let mut ahrs = Mahony::new();
        for _ in 0..1000 {
            ahrs.update(0.001, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        }
        let q = ahrs.attitude();
        assert!((q.w - 1.0).abs() < 1e-6);
        assert!(q.x.abs() < 1e-6 && q.y.abs() < 1e-6 && q.z.abs() < 1e-6);
    }

    #[test]
    fn test_yaw_rate_integrates_to_quarter_turn() {
        let mut ahrs = Mahony::new();
        for _ in 0..1000 {
            ahrs.update(0.001, 0.0, 0.0, FRAC_PI_2, 0.0, 0.0, 1.0);
        }
        let q = ahrs.attitude();
        let h = core::f32::consts::FRAC_1_SQRT_2;
        assert!((q.w - h).abs() < 1e-2, "{:?}", q);
        assert!((q.z - h).abs() < 1e-2, "{:?}", q);
        assert!(q.x.abs() < 1e-3 && q.y.abs() < 1e-3);
    }

    #[test]
    fn test_accel_pulls_tilt_back_to_level() {
        let mut ahrs = Mahony::with_gains(5.0, 0.0);
        // Start tilted 0.3 rad about x with the body level.
        let (s, c) = (0.15f32.sin(), 0.15f32.cos());
        ahrs.q = Quaternion::new(c, s, 0.0, 0.0);
        for _ in 0..3000 {
            ahrs.update(0.001, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        }
        assert!(ahrs.attitude().x.abs() < 0.01, "{:?}", ahrs.attitude());
    }

    #[test]
    fn test_zero_accel_keeps_integrating_gyro() {
        let mut ahrs = Mahony::new();
        ahrs.update(0.01, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0);
        assert!(ahrs.attitude().z > 0.0);
    }
}
