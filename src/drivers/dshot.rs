use core::sync::atomic::{AtomicU16, Ordering};

use crate::regulator::io::MotorDriver;

/// Lowest throttle value; 1..=47 are ESC commands and 0 is motor stop.
const DSHOT_MIN: f32 = 48.0;
const DSHOT_MAX: f32 = 2047.0;
/// 3D mode: 48..=1047 reverse, 1048..=2047 forward.
const DSHOT_3D_REVERSE_START: f32 = 1047.0;
const DSHOT_3D_FORWARD_START: f32 = 1048.0;

#[cfg(feature = "firmware")]
pub use self::bitbang::Dshot300;

#[cfg(feature = "firmware")]
mod bitbang {
    use cortex_m::asm;
    use embassy_stm32::gpio::{AnyPin, Level, Output, Speed};

    use super::dshot_frame;

    pub struct Dshot300 {
        pin: Output<'static, AnyPin>,
    }

    impl Dshot300 {
        // 168 MHz core clock
        const BIT_TOTAL_CYCLES: u32 = 560;
        const BIT1_HIGH_CYCLES: u32 = 420;
        const BIT1_LOW_CYCLES: u32 = Self::BIT_TOTAL_CYCLES - Self::BIT1_HIGH_CYCLES;
        const BIT0_HIGH_CYCLES: u32 = 210;
        const BIT0_LOW_CYCLES: u32 = Self::BIT_TOTAL_CYCLES - Self::BIT0_HIGH_CYCLES;
        const FRAME_GAP_CYCLES: u32 = 5200;

        pub fn new(pin: AnyPin) -> Self {
            Self {
                pin: Output::new(pin, Level::Low, Speed::VeryHigh),
            }
        }

        pub fn send_command(&mut self, command_11bit: u16, telemetry: bool) {
            self.send_frame(dshot_frame(command_11bit, telemetry));
        }

        pub fn send_frame(&mut self, frame: u16) {
            // Interrupts off for the whole frame (~60 µs); any ISR would
            // stretch a bit past its timing window.
            critical_section::with(|_cs| {
                for bit in (0..16).rev() {
                    let one = ((frame >> bit) & 0x1) != 0;

                    self.pin.set_high();
                    if one {
                        asm::delay(Self::BIT1_HIGH_CYCLES);
                        self.pin.set_low();
                        asm::delay(Self::BIT1_LOW_CYCLES);
                    } else {
                        asm::delay(Self::BIT0_HIGH_CYCLES);
                        self.pin.set_low();
                        asm::delay(Self::BIT0_LOW_CYCLES);
                    }
                }

                self.pin.set_low();
                asm::delay(Self::FRAME_GAP_CYCLES);
            });
        }
    }
}

/// 11-bit value, telemetry bit, 4-bit XOR checksum.
pub fn dshot_frame(command: u16, telemetry: bool) -> u16 {
    let mut packet = (command & 0x07ff) << 1;
    if telemetry {
        packet |= 1;
    }

    let mut csum = 0u16;
    let mut csum_data = packet;
    for _ in 0..3 {
        csum ^= csum_data;
        csum_data >>= 4;
    }
    csum &= 0x000f;

    (packet << 4) | csum
}

/// Unidirectional throttle `[0, 1]`. Zero or disarmed sends motor stop.
pub fn unit_to_dshot(unit_throttle: f32, armed: bool) -> u16 {
    if !armed || !(unit_throttle > 0.0) {
        return 0;
    }
    let t = unit_throttle.min(1.0);
    (DSHOT_MIN + t * (DSHOT_MAX - DSHOT_MIN)) as u16
}

/// Bidirectional (3D) command `[-1, 1]`. Exactly zero sends motor stop.
pub fn signed_unit_to_dshot_3d(unit_cmd: f32, armed: bool) -> u16 {
    if !armed || unit_cmd == 0.0 || unit_cmd.is_nan() {
        return 0;
    }

    let cmd = unit_cmd.clamp(-1.0, 1.0);
    if cmd > 0.0 {
        (DSHOT_3D_FORWARD_START + cmd * (DSHOT_MAX - DSHOT_3D_FORWARD_START)) as u16
    } else {
        (DSHOT_3D_REVERSE_START + cmd * (DSHOT_3D_REVERSE_START - DSHOT_MIN)) as u16
    }
}

/// Thrust and steer ESCs as seen from the tick: values land in atomics that
/// the DShot task streams out every frame.
pub struct DshotMotors<'a> {
    thrust: &'a AtomicU16,
    steer: &'a AtomicU16,
    armed: bool,
}

impl<'a> DshotMotors<'a> {
    pub fn new(thrust: &'a AtomicU16, steer: &'a AtomicU16) -> Self {
        Self {
            thrust,
            steer,
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl MotorDriver for DshotMotors<'_> {
    fn setup(&mut self) {
        self.thrust.store(0, Ordering::Relaxed);
        self.steer.store(0, Ordering::Relaxed);
        self.armed = true;
    }

    fn set_thrust(&mut self, value: f32) {
        self.thrust
            .store(unit_to_dshot(value, self.armed), Ordering::Relaxed);
    }

    fn set_steer(&mut self, value: f32) {
        self.steer
            .store(signed_unit_to_dshot_3d(value, self.armed), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_checksum() {
        // Motor stop with and without the telemetry bit.
        assert_eq!(dshot_frame(0, false), 0x0000);
        assert_eq!(dshot_frame(0, true), 0x0011);
        // 1046: packet 0x82C, checksum 0x8 ^ 0x2 ^ 0xC = 0x6
        assert_eq!(dshot_frame(1046, false), 0x82C6);
    }

    #[test]
    fn test_throttle_range() {
        assert_eq!(unit_to_dshot(0.0, true), 0);
        assert_eq!(unit_to_dshot(-0.5, true), 0);
        assert_eq!(unit_to_dshot(1.0, true), 2047);
        assert_eq!(unit_to_dshot(5.0, true), 2047);
        assert_eq!(unit_to_dshot(0.001, true), 49);
        assert_eq!(unit_to_dshot(1.0, false), 0);
    }

    #[test]
    fn test_3d_range() {
        assert_eq!(signed_unit_to_dshot_3d(0.0, true), 0);
        assert_eq!(signed_unit_to_dshot_3d(1.0, true), 2047);
        assert_eq!(signed_unit_to_dshot_3d(-1.0, true), 48);
        assert_eq!(signed_unit_to_dshot_3d(0.5, false), 0);
        assert!(signed_unit_to_dshot_3d(0.01, true) >= 1048);
        assert!(signed_unit_to_dshot_3d(-0.01, true) <= 1047);
    }

    #[test]
    fn test_motors_stay_stopped_until_setup() {
        let thrust = AtomicU16::new(0);
        let steer = AtomicU16::new(0);
        let mut motors = DshotMotors::new(&thrust, &steer);
        motors.set_thrust(0.5);
        assert_eq!(thrust.load(Ordering::Relaxed), 0);

        motors.setup();
        assert!(motors.is_armed());
        motors.set_thrust(1.0);
        motors.set_steer(-1.0);
        assert_eq!(thrust.load(Ordering::Relaxed), 2047);
        assert_eq!(steer.load(Ordering::Relaxed), 48);
    }
}
