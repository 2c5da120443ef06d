use embassy_executor::task;
use embassy_time::{Duration, Ticker};

use crate::REGULATOR;

/// Telemetry task: 20 Hz. Drains every pending regulator snapshot over RTT.
#[task]
pub async fn telemetry_task() {
    let mut ticker = Ticker::every(Duration::from_hz(20));
    let mut last_evicted = 0u32;

    loop {
        ticker.next().await;

        for s in REGULATOR.telemetry().drain() {
            defmt::info!(
                "[REG] t={} e=({}, {}, {}) u={}",
                s.time,
                s.error.roll,
                s.error.pitch,
                s.error.yaw,
                s.u.as_array(),
            );
        }

        let evicted = REGULATOR.telemetry().evicted();
        if evicted != last_evicted {
            defmt::debug!("telemetry: {} snapshots overwritten", evicted.wrapping_sub(last_evicted));
            last_evicted = evicted;
        }
    }
}
