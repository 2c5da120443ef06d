//! Collaborators the tick talks to, and the stage that drives the actuators.
use crate::math::Quaternion;
use crate::regulator::Mode;
use crate::state::ActuatorCommand;

/// Latest orientation estimate. Must not block.
pub trait AttitudeSource {
    fn attitude(&mut self) -> Quaternion;
}

/// Free-running monotonic tick counter.
pub trait TickClock {
    fn ticks(&self) -> u32;
}

pub trait MotorDriver {
    fn setup(&mut self);
    fn set_thrust(&mut self, value: f32);
    fn set_steer(&mut self, value: f32);
}

/// An actuator that has to be armed before it moves.
pub trait ServoDriver {
    fn setup(&mut self);
    fn start(&mut self);
    fn stop(&mut self);
    fn set_position(&mut self, value: f32);
}

/// Owns the motor and servo drivers on the tick side.
///
/// Servo arming follows the mode the tick read, so an arm or disarm takes
/// effect on the same tick boundary as the mode change itself.
pub struct OutputStage<M, S> {
    motor: M,
    servo: S,
    servo_running: bool,
}

impl<M: MotorDriver, S: ServoDriver> OutputStage<M, S> {
    pub fn new(motor: M, servo: S) -> Self {
        Self {
            motor,
            servo,
            servo_running: false,
        }
    }

    pub fn setup(&mut self) {
        self.servo.setup();
        self.motor.setup();
        self.servo_running = false;
    }

    pub fn apply(&mut self, mode: Mode, command: &ActuatorCommand) {
        let armed = mode.arms_actuators();
        if armed != self.servo_running {
            if armed {
                self.servo.start();
            } else {
                self.servo.stop();
            }
            self.servo_running = armed;
        }

        self.motor.set_steer(command.steer);
        self.motor.set_thrust(command.thrust);
        self.servo.set_position(command.elevator);
    }

    pub fn servo_running(&self) -> bool {
        self.servo_running
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }

    pub fn servo(&self) -> &S {
        &self.servo
    }
}
