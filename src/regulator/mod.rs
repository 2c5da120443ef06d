//! The attitude regulator: one context shared by the control tick and the
//! command/telemetry tasks.
//!
//! Tick data flow: read pose, extract the error against the reference,
//! dispatch per mode, post-filter the pitch error channel, record telemetry,
//! write the actuators.
//!
//! Every multi-field value (reference, remote command, each loop, each filter,
//! the telemetry pool) sits behind its own critical-section mutex and is
//! copied in or out in one short lock. Mode and readiness are atomics read
//! once per tick.

pub mod attitude_error;
pub mod dispatch;
pub mod io;
pub mod mode;
pub mod pool;

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::drivers::filter::{FilterError, RateFilter, RateFilterParams};
use crate::drivers::pid::{PidController, PidParams};
use crate::math::Quaternion;
use crate::state::{RegulatorState, RemoteCommand};

use self::dispatch::AxisLoops;
use self::io::{AttitudeSource, MotorDriver, OutputStage, ServoDriver, TickClock};
use self::pool::TelemetryPool;

pub use self::attitude_error::AttitudeError;
pub use self::mode::{InvalidMode, Mode};

/// Telemetry snapshots kept for slow readers.
pub const TELEMETRY_DEPTH: usize = 5;

const YAW_SAT_MAX: f32 = 1.0;
const YAW_SAT_MIN: f32 = -1.0;
const PITCH_SAT_MAX: f32 = 1.0;
const PITCH_SAT_MIN: f32 = -1.0;
const ROLL_SAT_MAX: f32 = 1.0;
const ROLL_SAT_MIN: f32 = -1.0;

/// Body axes: x forward, y left, z up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Axis {
    Yaw,
    Pitch,
    Roll,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Yaw, Axis::Pitch, Axis::Roll];

    const fn index(self) -> usize {
        self as usize
    }

    /// `(max, min)` output bounds for this axis' loop.
    pub const fn saturation(self) -> (f32, f32) {
        match self {
            Axis::Yaw => (YAW_SAT_MAX, YAW_SAT_MIN),
            Axis::Pitch => (PITCH_SAT_MAX, PITCH_SAT_MIN),
            Axis::Roll => (ROLL_SAT_MAX, ROLL_SAT_MIN),
        }
    }
}

type Shared<T> = Mutex<CriticalSectionRawMutex, RefCell<T>>;
type SharedCopy<T> = Mutex<CriticalSectionRawMutex, Cell<T>>;

pub struct Regulator {
    ready: AtomicBool,
    mode: mode::ModeCell,
    reference: SharedCopy<Quaternion>,
    remote: SharedCopy<RemoteCommand>,
    loops: [Shared<PidController>; 3],
    filters: [Shared<Option<RateFilter>>; 3],
    telemetry: TelemetryPool<TELEMETRY_DEPTH>,
}

impl Regulator {
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            mode: mode::ModeCell::new(),
            reference: Mutex::new(Cell::new(Quaternion::IDENTITY)),
            remote: Mutex::new(Cell::new(RemoteCommand::new(0.0, 0.0, 0.0))),
            loops: [
                Mutex::new(RefCell::new(PidController::new())),
                Mutex::new(RefCell::new(PidController::new())),
                Mutex::new(RefCell::new(PidController::new())),
            ],
            filters: [
                Mutex::new(RefCell::new(None)),
                Mutex::new(RefCell::new(None)),
                Mutex::new(RefCell::new(None)),
            ],
            telemetry: TelemetryPool::new(),
        }
    }

    // ── Setup ────────────────────────────────────────────────────────────────

    /// Brings the regulator up with a tick period of `ts` seconds.
    ///
    /// The tick stays a no-op until this returns.
    pub fn setup<M: MotorDriver, S: ServoDriver>(&self, ts: f32, output: &mut OutputStage<M, S>) {
        self.ready.store(false, Ordering::Release);
        self.mode.set(Mode::Off);

        for axis in Axis::ALL {
            self.with_loop(axis, |pid| pid.init(ts));
        }

        output.setup();

        self.telemetry.reset();

        self.reference.lock(|r| r.set(Quaternion::IDENTITY));

        // The default is fixed and known valid.
        if let Ok(filter) = RateFilter::new(&RateFilterParams::default_rate()) {
            self.filters[Axis::Yaw.index()].lock(|f| *f.borrow_mut() = Some(filter));
        }

        self.ready.store(true, Ordering::Release);
        info!("regulator ready, ts={}", ts);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    // ── Mode ─────────────────────────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: Mode) {
        if mode.runs_loops() {
            // Loops are live before the tick can observe the new mode.
            for axis in Axis::ALL {
                self.with_loop(axis, |pid| pid.start());
            }
            self.mode.set(mode);
        } else {
            self.mode.set(mode);
            for axis in Axis::ALL {
                self.with_loop(axis, |pid| pid.stop());
            }
        }
        info!("mode -> {:?}", mode);
    }

    /// Raw mode value from a command link. Unknown values leave the mode as is.
    pub fn set_mode_flag(&self, flag: u8) -> Result<Mode, InvalidMode> {
        match Mode::try_from(flag) {
            Ok(mode) => {
                self.set_mode(mode);
                Ok(mode)
            }
            Err(e) => {
                warn!("ignoring mode flag {}", flag);
                Err(e)
            }
        }
    }

    // ── Loop configuration ───────────────────────────────────────────────────

    /// Replaces the rate filter for `axis`; `None` removes it. On error the
    /// installed filter is kept.
    pub fn set_rate_filter(
        &self,
        axis: Axis,
        params: Option<&RateFilterParams<'_>>,
    ) -> Result<(), FilterError> {
        let filter = match params {
            Some(p) => match RateFilter::new(p) {
                Ok(filter) => Some(filter),
                Err(e) => {
                    warn!("rejected {:?} rate filter: {:?}", axis, e);
                    return Err(e);
                }
            },
            None => None,
        };
        self.filters[axis.index()].lock(|f| *f.borrow_mut() = filter);
        Ok(())
    }

    pub fn has_rate_filter(&self, axis: Axis) -> bool {
        self.filters[axis.index()].lock(|f| f.borrow().is_some())
    }

    /// Gains, offset and reference weights; saturation is fixed per axis.
    pub fn set_pid(&self, axis: Axis, params: &PidParams) {
        let (max, min) = axis.saturation();
        self.with_loop(axis, |pid| {
            pid.set_gains(params.reference, params.kp, params.ki, params.kd);
            pid.set_offset(params.offset);
            pid.set_ref_weights(params.beta, params.gamma);
            pid.set_saturation(max, min);
        });
        debug!("{:?} gains kp={} ki={} kd={}", axis, params.kp, params.ki, params.kd);
    }

    pub fn pid_params(&self, axis: Axis) -> PidParams {
        self.with_loop(axis, |pid| pid.params())
    }

    pub fn set_axis_reference(&self, axis: Axis, reference: f32) {
        self.with_loop(axis, |pid| pid.set_reference(reference));
    }

    pub fn is_loop_running(&self, axis: Axis) -> bool {
        self.with_loop(axis, |pid| pid.is_running())
    }

    fn with_loop<R>(&self, axis: Axis, f: impl FnOnce(&mut PidController) -> R) -> R {
        self.loops[axis.index()].lock(|pid| f(&mut pid.borrow_mut()))
    }

    // ── Reference and remote command ─────────────────────────────────────────

    pub fn orientation_reference(&self) -> Quaternion {
        self.reference.lock(Cell::get)
    }

    /// `None` is ignored.
    pub fn set_orientation_reference(&self, reference: impl Into<Option<Quaternion>>) {
        if let Some(q) = reference.into() {
            self.reference.lock(|r| r.set(q));
        }
    }

    pub fn remote_command(&self) -> RemoteCommand {
        self.remote.lock(Cell::get)
    }

    pub fn set_remote_command(&self, thrust: f32, steer: f32, elevator: f32) {
        let command = RemoteCommand::new(thrust, steer, elevator);
        self.remote.lock(|rc| rc.set(command));
    }

    // ── Telemetry ────────────────────────────────────────────────────────────

    /// Oldest unread snapshot, or an all-zero one when nothing is pending.
    pub fn read_state(&self) -> RegulatorState {
        self.telemetry.read()
    }

    pub fn telemetry(&self) -> &TelemetryPool<TELEMETRY_DEPTH> {
        &self.telemetry
    }

    // ── Control tick ─────────────────────────────────────────────────────────

    pub fn run_controller<A, C, M, S>(
        &self,
        attitude: &mut A,
        clock: &C,
        output: &mut OutputStage<M, S>,
    ) where
        A: AttitudeSource,
        C: TickClock,
        M: MotorDriver,
        S: ServoDriver,
    {
        if !self.is_ready() {
            return;
        }

        let pose = attitude.attitude();
        let reference = self.orientation_reference();
        let remote = self.remote_command();
        let mode = self.mode.get();

        let mut error = attitude_error::extract(&reference, &pose);

        let command = dispatch::dispatch(mode, &error, &remote, &mut TickLoops(self));

        // Pitch error goes through the yaw-slot filter after the command is
        // already fixed, so only telemetry sees the filtered value.
        error.pitch = self.filters[Axis::Yaw.index()].lock(|f| match f.borrow_mut().as_mut() {
            Some(filter) => filter.apply(error.pitch),
            None => error.pitch,
        });

        let time = clock.ticks();
        self.telemetry.record(|state| {
            *state = RegulatorState {
                time,
                reference,
                pose,
                error,
                u: command,
            }
        });

        output.apply(mode, &command);
    }
}

impl Default for Regulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop access for one tick: each loop runs with its own axis filter.
struct TickLoops<'a>(&'a Regulator);

impl AxisLoops for TickLoops<'_> {
    fn run(&mut self, axis: Axis, error: f32) -> f32 {
        let reg = self.0;
        reg.with_loop(axis, |pid| {
            reg.filters[axis.index()]
                .lock(|f| dispatch::run_axis(pid, f.borrow_mut().as_mut(), error))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::filter::FilterKind;

    #[test]
    fn test_new_is_not_ready_and_off() {
        let reg = Regulator::new();
        assert!(!reg.is_ready());
        assert_eq!(reg.mode(), Mode::Off);
        assert_eq!(reg.orientation_reference(), Quaternion::IDENTITY);
    }

    #[test]
    fn test_mode_transitions_start_and_stop_loops() {
        let reg = Regulator::new();
        reg.set_mode(Mode::Track);
        assert!(Axis::ALL.iter().all(|&a| reg.is_loop_running(a)));

        reg.set_mode(Mode::RemoteControl);
        assert!(Axis::ALL.iter().all(|&a| !reg.is_loop_running(a)));

        reg.set_mode(Mode::Track);
        reg.set_mode(Mode::Off);
        assert!(Axis::ALL.iter().all(|&a| !reg.is_loop_running(a)));
    }

    #[test]
    fn test_invalid_mode_flag_keeps_mode() {
        let reg = Regulator::new();
        assert_eq!(reg.set_mode_flag(2), Ok(Mode::RemoteControl));
        assert_eq!(reg.set_mode_flag(9), Err(InvalidMode(9)));
        assert_eq!(reg.mode(), Mode::RemoteControl);
    }

    #[test]
    fn test_reference_round_trip_and_none_is_ignored() {
        let reg = Regulator::new();
        let q = Quaternion::new(0.5, 0.5, -0.5, 0.5);
        reg.set_orientation_reference(q);
        assert_eq!(reg.orientation_reference(), q);
        reg.set_orientation_reference(None);
        assert_eq!(reg.orientation_reference(), q);
    }

    #[test]
    fn test_set_pid_applies_fixed_saturation() {
        let reg = Regulator::new();
        let params = PidParams {
            reference: 0.1,
            kp: 2.0,
            ki: 0.5,
            kd: 0.01,
            offset: 0.2,
            beta: 0.8,
            gamma: 0.0,
        };
        reg.set_pid(Axis::Pitch, &params);
        assert_eq!(reg.pid_params(Axis::Pitch), params);
        assert_eq!(reg.with_loop(Axis::Pitch, |p| p.saturation()), (1.0, -1.0));

        reg.set_axis_reference(Axis::Pitch, -0.3);
        assert_eq!(reg.pid_params(Axis::Pitch).reference, -0.3);
        assert_eq!(reg.pid_params(Axis::Yaw), PidParams::default());
    }

    #[test]
    fn test_bad_filter_keeps_previous() {
        let reg = Regulator::new();
        reg.set_rate_filter(Axis::Roll, Some(&RateFilterParams::default_rate()))
            .unwrap();
        let bad = RateFilterParams {
            order: 9,
            kind: FilterKind::Iir,
            numerator: &[],
            denominator: &[],
        };
        assert_eq!(
            reg.set_rate_filter(Axis::Roll, Some(&bad)),
            Err(FilterError::OrderTooHigh(9))
        );
        assert!(reg.has_rate_filter(Axis::Roll));

        reg.set_rate_filter(Axis::Roll, None).unwrap();
        assert!(!reg.has_rate_filter(Axis::Roll));
    }

    #[test]
    fn test_remote_command_is_stored_whole() {
        let reg = Regulator::new();
        reg.set_remote_command(0.3, -0.4, 0.5);
        assert_eq!(reg.remote_command(), RemoteCommand::new(0.3, -0.4, 0.5));
    }

    #[test]
    fn test_read_state_without_ticks_is_all_zero() {
        let reg = Regulator::new();
        assert_eq!(reg.read_state(), RegulatorState::EMPTY);
    }
}
