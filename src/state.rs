//! Plain data shared between the control tick and the slower tasks.
//!
//! All types are `Copy` so they can be moved through critical sections and
//! telemetry slots without allocation.
use crate::math::Quaternion;
use crate::regulator::attitude_error::AttitudeError;

// ── Commands ──────────────────────────────────────────────────────────────────

/// Latest stick values from the remote link, in actuator units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemoteCommand {
    pub thrust: f32,
    pub steer: f32,
    pub elevator: f32,
}

impl RemoteCommand {
    pub const fn new(thrust: f32, steer: f32, elevator: f32) -> Self {
        Self { thrust, steer, elevator }
    }
}

/// What the tick writes to the motor and servo outputs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActuatorCommand {
    pub thrust: f32,
    pub steer: f32,
    pub elevator: f32,
}

impl ActuatorCommand {
    pub const ZERO: Self = Self { thrust: 0.0, steer: 0.0, elevator: 0.0 };

    /// `[thrust, steer, elevator]`, the order telemetry consumers expect.
    pub fn as_array(&self) -> [f32; 3] {
        [self.thrust, self.steer, self.elevator]
    }
}

impl From<RemoteCommand> for ActuatorCommand {
    fn from(rc: RemoteCommand) -> Self {
        Self {
            thrust: rc.thrust,
            steer: rc.steer,
            elevator: rc.elevator,
        }
    }
}

// ── Telemetry ─────────────────────────────────────────────────────────────────

/// One recorded control tick.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegulatorState {
    /// Clock ticks when the sample was taken.
    pub time: u32,
    pub reference: Quaternion,
    pub pose: Quaternion,
    pub error: AttitudeError,
    pub u: ActuatorCommand,
}

impl RegulatorState {
    /// Every field zero, including both quaternions. Returned to readers when
    /// nothing is pending.
    pub const EMPTY: Self = Self {
        time: 0,
        reference: Quaternion::ZERO,
        pose: Quaternion::ZERO,
        error: AttitudeError::ZERO,
        u: ActuatorCommand::ZERO,
    };
}

impl Default for RegulatorState {
    fn default() -> Self {
        Self::EMPTY
    }
}
