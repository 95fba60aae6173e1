use std::time::Duration;

use log::debug;
use rand::Rng;
use tokio::time;

use crate::engine::PulseEngine;
use crate::measurement::Measurement;
use crate::osc::PulseSink;

// Create UUID macro
#[macro_export]
macro_rules! create_uuid {
    ($a:expr) => {
        Uuid::parse_str($a).unwrap()
    };
}

pub(crate) fn convert_verbose_level_to_log_level(verbose_level: u8) -> log::LevelFilter {
    // 0 is error, 1 is warn, 2 is info, 3 is debug, 4 is trace
    match verbose_level {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        4 => log::LevelFilter::Trace,
        _ => log::LevelFilter::Trace,
    }
}

/// Synthesizes a random-walk heart rate with jittered beat intervals and
/// feeds it through the normal engine path, one notification per second.
/// Lets avatar setups be tested without any peripheral paired.
pub(crate) async fn dry_run_loop<S: PulseSink>(engine: PulseEngine<S>) {
    let mut bpm: i32 = 75;
    loop {
        let measurement = {
            let mut rng = rand::thread_rng();
            bpm = (bpm + rng.gen_range(-4..=4)).clamp(55, 140);
            let base = 60.0 / bpm as f32;
            // Roughly one second of beats per notification.
            let beats = ((1.0 / base).round() as usize).clamp(1, 3);
            let intervals = (0..beats)
                .map(|_| base * rng.gen_range(0.95..1.05))
                .collect();
            Measurement {
                bpm: bpm as u16,
                intervals,
            }
        };
        debug!("Synthetic heart rate: {}", measurement.bpm);
        engine.handle_measurement(&measurement);
        time::sleep(Duration::from_millis(1000)).await;
    }
}
