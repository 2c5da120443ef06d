//! Orientation error extraction.
//!
//! The error quaternion `e = r ⊗ conj(p)` carries the pose onto the reference.
//! Written as `[cos(θ/2), sin(θ/2)·n]`, scaling the vector part by `θ / sin(θ/2)`
//! gives the rotation vector `θ·n`, whose body-axis components are the roll,
//! pitch and yaw errors. Trig goes through the BAMS tables.
use crate::math::{Bams16, Quaternion};

/// Rotation from pose to reference, split per body axis (radians).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttitudeError {
    /// Total rotation angle θ.
    pub angle: f32,
    /// About x (forward).
    pub roll: f32,
    /// About y (left).
    pub pitch: f32,
    /// About z (up).
    pub yaw: f32,
}

impl AttitudeError {
    pub const ZERO: Self = Self {
        angle: 0.0,
        roll: 0.0,
        pitch: 0.0,
        yaw: 0.0,
    };
}

pub fn extract(reference: &Quaternion, pose: &Quaternion) -> AttitudeError {
    let error = *reference * pose.conj();

    // θ = 0: the general branch would divide by sin(0).
    if error.w == 1.0 {
        return AttitudeError::ZERO;
    }

    let half_angle = Bams16::acos(error.w);
    // Doubling wraps in counts, so a half-angle past π/2 (w < 0, the long way
    // round) comes out as the negative short rotation and flips the axis.
    let angle = half_angle.wrapping_add(half_angle).to_signed_rad();
    let sin_half = half_angle.sin();

    // The table rounds angles within one count of 0 or π down to sin = 0,
    // where θ / sin(θ/2) tends to ±2.
    let scale = if sin_half != 0.0 {
        angle / sin_half
    } else if angle < 0.0 {
        -2.0
    } else {
        2.0
    };

    AttitudeError {
        angle: angle.abs(),
        roll: error.x * scale,
        pitch: error.y * scale,
        yaw: error.z * scale,
    }
}
