use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_stm32::peripherals::{DMA1_CH2, UART4};
use embassy_stm32::usart::UartRx;
use embassy_time::{Duration, Instant, Timer};

use attitude_regulator::drivers::crsf::CrsfParser;
use attitude_regulator::Mode;

use crate::REGULATOR;

/// No valid channel frame for this long drops the regulator to `Off`.
const FAILSAFE_TIMEOUT: Duration = Duration::from_millis(500);

/// CRSF/ELRS task: reads UART4 RX and forwards sticks and the mode switch.
#[task]
pub async fn crsf_task(mut crsf_rx: UartRx<'static, UART4, DMA1_CH2>) {
    let mut parser = CrsfParser::new();
    let mut buf = [0u8; 64];
    let mut last_frame = Instant::now();
    let mut switch_mode: Option<Mode> = None;

    loop {
        // CRSF frames are 26 bytes max; the read returns on line idle.
        match select(crsf_rx.read_until_idle(&mut buf), Timer::after(FAILSAFE_TIMEOUT)).await {
            Either::First(Ok(n)) => {
                if let Some(rc) = parser.push_bytes(&buf[..n]) {
                    last_frame = Instant::now();

                    let cmd = rc.remote_command();
                    REGULATOR.set_remote_command(cmd.thrust, cmd.steer, cmd.elevator);

                    // Only switch edges change the mode.
                    let mode = rc.mode();
                    if switch_mode != Some(mode) {
                        REGULATOR.set_mode(mode);
                        switch_mode = Some(mode);
                    }
                }
            }
            Either::First(Err(_)) => defmt::trace!("crsf rx error"),
            Either::Second(()) => {}
        }

        if Instant::now() - last_frame > FAILSAFE_TIMEOUT && switch_mode.is_some() {
            defmt::warn!("crsf link lost");
            REGULATOR.set_remote_command(0.0, 0.0, 0.0);
            REGULATOR.set_mode(Mode::Off);
            switch_mode = None;
        }
    }
}
