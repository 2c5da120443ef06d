use embassy_executor::task;
use embassy_stm32::peripherals::SPI1;
use embassy_time::{Duration, Instant, Ticker};

use attitude_regulator::drivers::ahrs::Mahony;
use attitude_regulator::drivers::dshot::DshotMotors;
use attitude_regulator::drivers::filter::BiquadFilter;
use attitude_regulator::drivers::icm42688::{self, Icm42688};
use attitude_regulator::drivers::servo::ServoChannel;
use attitude_regulator::regulator::io::{AttitudeSource, OutputStage, TickClock};
use attitude_regulator::Quaternion;

use crate::{ELEVATOR_ENABLED, ELEVATOR_PULSE_US, REGULATOR, STEER_DSHOT_CMD, THRUST_DSHOT_CMD};

// ── Loop constants ────────────────────────────────────────────────────────────

const FAST_LOOP_HZ: u64 = 500;
const TS: f32 = 1.0 / FAST_LOOP_HZ as f32;
const GYRO_LPF_CUTOFF: f32 = 70.0;
const ACCEL_LPF_CUTOFF: f32 = 20.0;
const LPF_Q: f32 = 0.707;

// ── Calibration parameters (filled from main after static calib) ──────────────

pub struct FastLoopConfig {
    pub gyro_bias: [f32; 3],
    pub accel_bias: [f32; 3],
}

/// Microsecond tick counter, wrapping every ~71 minutes.
struct EmbassyClock;

impl TickClock for EmbassyClock {
    fn ticks(&self) -> u32 {
        Instant::now().as_micros() as u32
    }
}

/// Latest IMU sample through the estimator; the regulator reads it back once
/// per tick.
struct ImuAttitude {
    ahrs: Mahony,
    gyro_lpf: [BiquadFilter; 3],
    accel_lpf: [BiquadFilter; 3],
}

impl ImuAttitude {
    fn new() -> Self {
        let sample_rate = FAST_LOOP_HZ as f32;
        Self {
            ahrs: Mahony::new(),
            gyro_lpf: [(); 3].map(|_| BiquadFilter::new_lpf(GYRO_LPF_CUTOFF, sample_rate, LPF_Q)),
            accel_lpf: [(); 3].map(|_| BiquadFilter::new_lpf(ACCEL_LPF_CUTOFF, sample_rate, LPF_Q)),
        }
    }

    fn update(&mut self, dt: f32, accel: [f32; 3], gyro: [f32; 3]) {
        let mut a = [0.0f32; 3];
        let mut g = [0.0f32; 3];
        for i in 0..3 {
            a[i] = self.accel_lpf[i].filter(accel[i]);
            g[i] = self.gyro_lpf[i].filter(gyro[i]);
        }
        let (a, g) = icm42688::scale(a, g);
        self.ahrs.update(dt, g[0], g[1], g[2], a[0], a[1], a[2]);
    }
}

impl AttitudeSource for ImuAttitude {
    fn attitude(&mut self) -> Quaternion {
        self.ahrs.quaternion()
    }
}

// ── Task ─────────────────────────────────────────────────────────────────────

#[task]
pub async fn fast_loop_task(mut imu: Icm42688<'static, SPI1>, config: FastLoopConfig) {
    let mut output = OutputStage::new(
        DshotMotors::new(&THRUST_DSHOT_CMD, &STEER_DSHOT_CMD),
        ServoChannel::new(&ELEVATOR_PULSE_US, &ELEVATOR_ENABLED),
    );
    REGULATOR.setup(TS, &mut output);

    let mut attitude = ImuAttitude::new();
    let clock = EmbassyClock;

    let mut ticker = Ticker::every(Duration::from_hz(FAST_LOOP_HZ));
    let mut last = Instant::now();

    loop {
        ticker.next().await;

        let now = Instant::now();
        let dt = (now - last).as_micros() as f32 / 1_000_000.0;
        let dt = dt.clamp(0.5 * TS, 5.0 * TS);
        last = now;

        // A stale pose is still fed to the regulator on a bus error.
        match imu.read_raw() {
            Ok((accel_raw, gyro_raw)) => {
                let mut accel = [0.0f32; 3];
                let mut gyro = [0.0f32; 3];
                for i in 0..3 {
                    accel[i] = accel_raw[i] as f32 - config.accel_bias[i];
                    gyro[i] = gyro_raw[i] as f32 - config.gyro_bias[i];
                }
                attitude.update(dt, accel, gyro);
            }
            Err(_) => defmt::trace!("imu read failed"),
        }

        REGULATOR.run_controller(&mut attitude, &clock, &mut output);
    }
}
