use embassy_stm32::gpio::{AnyPin, Pin};
use embassy_stm32::peripherals::{DMA1_CH2, PA1, PA5, PA6, PA7, SPI1, UART4};
use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::Config;

/// Pins and peripherals the firmware uses, split out of `Peripherals` once.
pub struct Board {
    pub imu_spi: SPI1,
    pub imu_sck: PA5,
    pub imu_mosi: PA7,
    pub imu_miso: PA6,
    pub imu_cs: AnyPin,
    pub crsf_uart: UART4,
    pub crsf_rx: PA1,
    pub crsf_rx_dma: DMA1_CH2,
    pub thrust_esc: AnyPin,
    pub steer_esc: AnyPin,
    pub elevator_servo: AnyPin,
    pub led: AnyPin,
}

impl Board {
    pub fn init() -> Self {
        let mut config = Config::default();
        config.rcc.hse = Some(Hse {
            freq: TimeHertz(8_000_000),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2), // 168 MHz
            divq: Some(PllQDiv::DIV7),
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;

        let p = embassy_stm32::init(config);

        Self {
            imu_spi: p.SPI1,
            imu_sck: p.PA5,
            imu_mosi: p.PA7,
            imu_miso: p.PA6,
            imu_cs: p.PB12.degrade(),
            crsf_uart: p.UART4,
            crsf_rx: p.PA1,
            crsf_rx_dma: p.DMA1_CH2,
            thrust_esc: p.PB0.degrade(),
            steer_esc: p.PB1.degrade(),
            elevator_servo: p.PA2.degrade(),
            led: p.PC13.degrade(),
        }
    }
}
