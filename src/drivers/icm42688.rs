use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Error, Instance, Spi};
use embassy_time::{Duration, Timer};

const REG_DEVICE_CONFIG: u8 = 0x11;
const REG_ACCEL_DATA_X1: u8 = 0x1F;
const REG_PWR_MGMT0: u8 = 0x4E;
const REG_WHO_AM_I: u8 = 0x75;

const WHO_AM_I_VALUE: u8 = 0x47;

/// ±16 g full scale.
pub const ACCEL_LSB_PER_G: f32 = 2048.0;
/// ±2000 dps full scale.
pub const GYRO_LSB_PER_DPS: f32 = 16.4;

/// Raw `(accel, gyro)` counts.
pub type RawSample = ([i16; 3], [i16; 3]);

pub struct Icm42688<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance> Icm42688<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error> {
        let buf = [reg & 0x7F, value];
        self.cs.set_low();
        let res = self.spi.blocking_write(&buf);
        self.cs.set_high();
        res
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Error> {
        let tx = [reg | 0x80, 0x00];
        let mut rx = [0u8; 2];

        self.cs.set_low();
        let res = self.spi.blocking_transfer(&mut rx, &tx);
        self.cs.set_high();

        res?;
        Ok(rx[1])
    }

    pub async fn init(&mut self) -> Result<(), Error> {
        // Soft reset
        self.write_reg(REG_DEVICE_CONFIG, 0x01)?;
        Timer::after(Duration::from_millis(10)).await;

        let id = self.read_reg(REG_WHO_AM_I)?;
        if id != WHO_AM_I_VALUE {
            warn!("icm42688: unexpected WHO_AM_I {}", id);
        }

        // Gyro and accel in low-noise mode
        self.write_reg(REG_PWR_MGMT0, 0x0F)?;
        Timer::after(Duration::from_millis(50)).await;

        Ok(())
    }

    pub fn read_raw(&mut self) -> Result<RawSample, Error> {
        let mut tx = [0u8; 13];
        tx[0] = REG_ACCEL_DATA_X1 | 0x80;
        let mut rx = [0u8; 13];

        self.cs.set_low();
        let res = self.spi.blocking_transfer(&mut rx, &tx);
        self.cs.set_high();
        res?;

        let word = |i: usize| i16::from_be_bytes([rx[i], rx[i + 1]]);
        Ok((
            [word(1), word(3), word(5)],
            [word(7), word(9), word(11)],
        ))
    }
}

/// Bias-corrected counts to `(g, rad/s)`.
pub fn scale(accel: [f32; 3], gyro: [f32; 3]) -> ([f32; 3], [f32; 3]) {
    (
        accel.map(|a| a / ACCEL_LSB_PER_G),
        gyro.map(|g| (g / GYRO_LSB_PER_DPS).to_radians()),
    )
}
