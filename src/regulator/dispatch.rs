//! Mode-gated routing of loop outputs or remote commands to the actuators.
use crate::drivers::filter::RateFilter;
use crate::drivers::pid::PidController;
use crate::regulator::attitude_error::AttitudeError;
use crate::regulator::{Axis, Mode};
use crate::state::{ActuatorCommand, RemoteCommand};

/// Access to the per-axis control loops for one tick.
pub trait AxisLoops {
    /// Loop output for `error`, or 0 when the loop is stopped.
    fn run(&mut self, axis: Axis, error: f32) -> f32;
}

/// Runs one loop unless it is stopped. A stopped loop's state is not touched.
pub fn run_axis(pid: &mut PidController, filter: Option<&mut RateFilter>, error: f32) -> f32 {
    if !pid.is_running() {
        return 0.0;
    }
    pid.run(error, filter)
}

pub fn dispatch<L: AxisLoops>(
    mode: Mode,
    error: &AttitudeError,
    remote: &RemoteCommand,
    loops: &mut L,
) -> ActuatorCommand {
    match mode {
        Mode::RemoteControl => ActuatorCommand::from(*remote),
        Mode::Track => ActuatorCommand {
            // Thrust is never closed-loop.
            thrust: remote.thrust,
            steer: loops.run(Axis::Yaw, error.yaw),
            elevator: loops.run(Axis::Pitch, error.pitch),
        },
        Mode::Off => ActuatorCommand::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes the error scaled per axis and counts calls.
    struct Echo {
        calls: usize,
    }

    impl AxisLoops for Echo {
        fn run(&mut self, axis: Axis, error: f32) -> f32 {
            self.calls += 1;
            match axis {
                Axis::Yaw => error * 10.0,
                Axis::Pitch => error * 100.0,
                Axis::Roll => error * 1000.0,
            }
        }
    }

    const ERROR: AttitudeError = AttitudeError {
        angle: 0.5,
        roll: 0.3,
        pitch: 0.002,
        yaw: 0.01,
    };
    const REMOTE: RemoteCommand = RemoteCommand::new(0.7, -0.2, 0.4);

    #[test]
    fn test_off_outputs_zero_without_running_loops() {
        let mut loops = Echo { calls: 0 };
        assert_eq!(
            dispatch(Mode::Off, &ERROR, &REMOTE, &mut loops),
            ActuatorCommand::ZERO
        );
        assert_eq!(loops.calls, 0);
    }

    #[test]
    fn test_remote_control_passes_command_verbatim() {
        let mut loops = Echo { calls: 0 };
        let out = dispatch(Mode::RemoteControl, &ERROR, &REMOTE, &mut loops);
        assert_eq!(out, ActuatorCommand { thrust: 0.7, steer: -0.2, elevator: 0.4 });
        assert_eq!(loops.calls, 0);
    }

    #[test]
    fn test_track_uses_yaw_and_pitch_loops_with_remote_thrust() {
        let mut loops = Echo { calls: 0 };
        let out = dispatch(Mode::Track, &ERROR, &REMOTE, &mut loops);
        assert_eq!(out.thrust, 0.7);
        assert_eq!(out.steer, 0.01 * 10.0);
        assert_eq!(out.elevator, 0.002 * 100.0);
        assert_eq!(loops.calls, 2);
    }

    #[test]
    fn test_stopped_loop_yields_zero_and_keeps_state() {
        let mut pid = PidController::new();
        pid.init(0.01);
        pid.set_gains(0.0, 1.0, 1.0, 0.0);
        pid.set_saturation(1.0, -1.0);
        assert_eq!(run_axis(&mut pid, None, 0.5), 0.0);

        pid.start();
        assert!(run_axis(&mut pid, None, 0.5) != 0.0);
        pid.stop();
        assert_eq!(run_axis(&mut pid, None, 0.9), 0.0);
        assert_eq!(run_axis(&mut pid, None, -0.9), 0.0);
    }
}
