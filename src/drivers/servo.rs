use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crate::regulator::io::ServoDriver;

pub const SERVO_CENTER_US: u16 = 1500;
pub const SERVO_HALF_TRAVEL_US: f32 = 500.0;
/// 50 Hz frame.
pub const SERVO_FRAME_US: u64 = 20_000;

/// `[-1, 1]` to a 1000..=2000 µs pulse.
pub fn unit_to_pulse_us(value: f32) -> u16 {
    let v = if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) };
    (SERVO_CENTER_US as f32 + v * SERVO_HALF_TRAVEL_US) as u16
}

/// Tick-side handle of the elevator servo. The pulse generator reads the same
/// atomics and keeps the line low while disabled.
pub struct ServoChannel<'a> {
    pulse_us: &'a AtomicU16,
    enabled: &'a AtomicBool,
}

impl<'a> ServoChannel<'a> {
    pub fn new(pulse_us: &'a AtomicU16, enabled: &'a AtomicBool) -> Self {
        Self { pulse_us, enabled }
    }

    pub fn pulse_us(&self) -> u16 {
        self.pulse_us.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

impl ServoDriver for ServoChannel<'_> {
    fn setup(&mut self) {
        self.enabled.store(false, Ordering::Relaxed);
        self.pulse_us.store(SERVO_CENTER_US, Ordering::Relaxed);
    }

    fn start(&mut self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    fn stop(&mut self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    fn set_position(&mut self, value: f32) {
        self.pulse_us.store(unit_to_pulse_us(value), Ordering::Relaxed);
    }
}

#[cfg(feature = "firmware")]
pub use self::pulse::PulseServo;

#[cfg(feature = "firmware")]
mod pulse {
    use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

    use embassy_stm32::gpio::{AnyPin, Level, Output, Speed};
    use embassy_time::{block_for, Duration, Timer};

    use super::SERVO_FRAME_US;

    /// Software servo PWM on a plain GPIO.
    pub struct PulseServo {
        pin: Output<'static, AnyPin>,
    }

    impl PulseServo {
        pub fn new(pin: AnyPin) -> Self {
            Self {
                pin: Output::new(pin, Level::Low, Speed::Medium),
            }
        }

        /// One 20 ms frame: the high phase is busy-waited, the rest awaited.
        pub async fn frame(&mut self, pulse_us: &AtomicU16, enabled: &AtomicBool) {
            let width = pulse_us.load(Ordering::Relaxed) as u64;
            if enabled.load(Ordering::Relaxed) {
                self.pin.set_high();
                block_for(Duration::from_micros(width));
                self.pin.set_low();
            }
            Timer::after(Duration::from_micros(SERVO_FRAME_US - width)).await;
        }
    }
}
