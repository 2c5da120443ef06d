#![no_std]
#![no_main]

mod board;
mod tasks;

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use attitude_regulator::drivers::dshot::Dshot300;
use attitude_regulator::drivers::icm42688::Icm42688;
use attitude_regulator::drivers::servo::{PulseServo, SERVO_CENTER_US};
use attitude_regulator::Regulator;
use embassy_executor::Spawner;
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::usart::{Config as UsartConfig, UartRx};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::{Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

use crate::board::Board;
use crate::tasks::fast_loop::{fast_loop_task, FastLoopConfig};

// ── Shared state ──────────────────────────────────────────────────────────────
pub static REGULATOR: Regulator = Regulator::new();

pub static THRUST_DSHOT_CMD: AtomicU16 = AtomicU16::new(0);
pub static STEER_DSHOT_CMD: AtomicU16 = AtomicU16::new(0);
pub static ELEVATOR_PULSE_US: AtomicU16 = AtomicU16::new(SERVO_CENTER_US);
pub static ELEVATOR_ENABLED: AtomicBool = AtomicBool::new(false);

bind_interrupts!(struct Irqs {
    UART4 => embassy_stm32::usart::InterruptHandler<peripherals::UART4>;
});

// ── Actuator tasks ────────────────────────────────────────────────────────────
#[embassy_executor::task]
async fn dshot_task(mut thrust: Dshot300, mut steer: Dshot300) {
    loop {
        thrust.send_command(THRUST_DSHOT_CMD.load(Ordering::Relaxed), false);
        steer.send_command(STEER_DSHOT_CMD.load(Ordering::Relaxed), false);
        Timer::after(Duration::from_micros(1000)).await;
    }
}

#[embassy_executor::task]
async fn servo_task(mut servo: PulseServo) {
    loop {
        servo.frame(&ELEVATOR_PULSE_US, &ELEVATOR_ENABLED).await;
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();

    // 2. SPI1 @ 10 MHz: ICM-42688 IMU (SCK=PA5, MOSI=PA7, MISO=PA6, CS=PB12)
    let mut spi_config = SpiConfig::default();
    spi_config.frequency = TimeHertz(10_000_000);
    let spi = Spi::new(
        board.imu_spi,
        board.imu_sck, board.imu_mosi, board.imu_miso,
        NoDma, NoDma,
        spi_config,
    );
    let cs = Output::new(board.imu_cs, Level::High, Speed::VeryHigh);
    let mut imu = Icm42688::new(spi, cs);

    // 3. Actuators: thrust ESC on PB0, steer ESC (3D) on PB1, elevator servo on PA2
    spawner
        .spawn(dshot_task(Dshot300::new(board.thrust_esc), Dshot300::new(board.steer_esc)))
        .unwrap();
    spawner.spawn(servo_task(PulseServo::new(board.elevator_servo))).unwrap();

    // 4. CRSF/ELRS receiver on UART4 RX (PA1) @ 420000
    let mut crsf_config = UsartConfig::default();
    crsf_config.baudrate = 420_000;
    let crsf_rx = UartRx::new(
        board.crsf_uart, Irqs, board.crsf_rx,
        board.crsf_rx_dma,
        crsf_config,
    ).unwrap();

    let mut led = Output::new(board.led, Level::High, Speed::Low);

    // 5. IMU init
    Timer::after(Duration::from_millis(100)).await;
    if imu.init().await.is_err() {
        defmt::error!("imu init failed");
    }

    // 6. Static gyro/accel calibration: 100 samples × 10 ms = 1 s
    let mut gyro_bias = [0.0f32; 3];
    let mut accel_bias = [0.0f32; 3];
    const CALIB_N: usize = 100;
    for i in 0..CALIB_N {
        if let Ok((accel, gyro)) = imu.read_raw() {
            for j in 0..3 {
                accel_bias[j] += accel[j] as f32;
                gyro_bias[j] += gyro[j] as f32;
            }
        }
        if i % 10 == 0 {
            led.toggle();
        }
        Timer::after(Duration::from_millis(10)).await;
    }
    for j in 0..3 {
        accel_bias[j] /= CALIB_N as f32;
        gyro_bias[j] /= CALIB_N as f32;
    }
    // Keep 1 g on z
    accel_bias[2] -= attitude_regulator::drivers::icm42688::ACCEL_LSB_PER_G;
    led.set_high();

    // 7. Control, command and telemetry tasks
    spawner
        .spawn(fast_loop_task(imu, FastLoopConfig { gyro_bias, accel_bias }))
        .unwrap();
    spawner.spawn(tasks::crsf_task::crsf_task(crsf_rx)).unwrap();
    spawner.spawn(tasks::telemetry_task::telemetry_task()).unwrap();

    // 8. LED heartbeat @ 1 Hz
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(500)).await;
    }
}
