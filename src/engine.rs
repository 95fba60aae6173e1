//! The pacing queue engine: turns a backlog of validated beat intervals into
//! a real-time pulse stream, and throttles heart-rate display updates.
//!
//! One producer (the notification path, via [`PulseEngine::handle_measurement`])
//! and at most one consumer (the pacing task) share a single mutex over the
//! queue and the Idle/Draining flag. Only the lock holder may inspect or
//! mutate either, which rules out double pacing loops and lost wakeups.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use tokio::time::{self, Instant};

use crate::config::{CATCHUP_MAX_QUEUED_BEATS, CATCHUP_MAX_QUEUED_SECS, HR_SEND_INTERVAL_MS};
use crate::measurement::{validate_interval, Measurement};
use crate::osc::{PulseSink, Trend};

/// Cheap-to-clone handle; all clones drive the same queue and sink.
pub struct PulseEngine<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for PulseEngine<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<S> {
    sink: S,
    stopped: AtomicBool,
    inner: Mutex<Inner>,
}

struct Inner {
    /// Validated intervals awaiting their pulse, in seconds. FIFO.
    queue: VecDeque<f32>,
    /// True while a pacing task is alive (Draining); false is Idle.
    draining: bool,
    /// Last decoded heart rate, the validator fallback.
    last_hr: u16,
    /// Last heart rate actually forwarded to the sink.
    last_sent_hr: u16,
    last_sent_at: Option<Instant>,
}

impl Inner {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            draining: false,
            last_hr: 0,
            last_sent_hr: 0,
            last_sent_at: None,
        }
    }

    /// Throttle: forward only a changed value, at most once per send window.
    /// "Changed" compares against the last value the sink actually saw.
    fn note_heart_rate(&mut self, bpm: u16) -> Option<Trend> {
        if bpm == self.last_sent_hr {
            return None;
        }
        let now = Instant::now();
        if let Some(sent_at) = self.last_sent_at {
            if now.duration_since(sent_at) < Duration::from_millis(HR_SEND_INTERVAL_MS) {
                return None;
            }
        }
        let trend = if self.last_sent_at.is_none() {
            Trend::Steady
        } else if bpm > self.last_sent_hr {
            Trend::Rising
        } else {
            Trend::Falling
        };
        self.last_sent_hr = bpm;
        self.last_sent_at = Some(now);
        Some(trend)
    }

    /// Catch-up skip: discard oldest intervals until the backlog is at most
    /// two slowest-beat periods long and two seconds' worth of fastest beats
    /// deep. Bounds worst-case lag after a notification burst or reconnect.
    fn catch_up(&mut self) {
        let mut dropped = 0usize;
        while self.queue.iter().sum::<f32>() > CATCHUP_MAX_QUEUED_SECS
            || self.queue.len() as f32 > CATCHUP_MAX_QUEUED_BEATS
        {
            self.queue.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            debug!(
                "Catch-up: skipped {} stale interval(s), {} still queued",
                dropped,
                self.queue.len()
            );
        }
    }
}

impl<S: PulseSink> PulseEngine<S> {
    pub fn new(sink: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                stopped: AtomicBool::new(false),
                inner: Mutex::new(Inner::new()),
            }),
        }
    }

    /// Producer path, called once per decoded notification. Updates the
    /// throttle state, validates and enqueues every interval sample, and
    /// starts the pacing task if the engine was idle. Never blocks.
    /// A stopped engine ignores further notifications entirely.
    pub fn handle_measurement(&self, measurement: &Measurement) {
        if self.shared.stopped.load(Ordering::Relaxed) {
            return;
        }
        let forward = {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.last_hr = measurement.bpm;
            let forward = inner.note_heart_rate(measurement.bpm);

            let fallback_hr = inner.last_hr;
            for &rri in &measurement.intervals {
                inner.queue.push_back(validate_interval(rri, fallback_hr));
            }

            if !inner.queue.is_empty() && !inner.draining {
                inner.draining = true;
                tokio::spawn(drain(Arc::clone(&self.shared)));
            }
            forward
        };

        if let Some(trend) = forward {
            self.shared.sink.send_heart_rate(measurement.bpm, trend);
        }
    }

    /// Signals the pacing task to exit at its next wakeup. The engine is
    /// left idle; nothing else needs tearing down.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Relaxed);
    }

    #[cfg(test)]
    fn is_draining(&self) -> bool {
        self.shared.inner.lock().unwrap().draining
    }
}

/// The pacing task. Dequeues one interval at a time, emits a pulse for it,
/// then sleeps for that interval's duration so the pulse train reproduces
/// the wearer's rhythm rather than the notification cadence.
async fn drain<S: PulseSink>(shared: Arc<Shared<S>>) {
    debug!("Pacing loop started");
    loop {
        if shared.stopped.load(Ordering::Relaxed) {
            shared.inner.lock().unwrap().draining = false;
            debug!("Pacing loop stopped");
            return;
        }

        let interval = {
            let mut inner = shared.inner.lock().unwrap();
            inner.catch_up();
            match inner.queue.pop_front() {
                Some(rri) => rri,
                None => {
                    // Stall: normal Draining -> Idle transition.
                    inner.draining = false;
                    debug!("Pulse queue drained, pacing idle");
                    return;
                }
            }
        };

        shared.sink.send_pulse();
        time::sleep(Duration::from_secs_f32(interval)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HR_MAX, HR_MIN};

    #[derive(Clone, Default)]
    struct RecordingSink {
        pulses: Arc<Mutex<Vec<Instant>>>,
        heart_rates: Arc<Mutex<Vec<(u16, Trend)>>>,
    }

    impl RecordingSink {
        fn pulse_times(&self) -> Vec<Instant> {
            self.pulses.lock().unwrap().clone()
        }

        fn pulse_count(&self) -> usize {
            self.pulses.lock().unwrap().len()
        }

        fn heart_rates(&self) -> Vec<(u16, Trend)> {
            self.heart_rates.lock().unwrap().clone()
        }
    }

    impl PulseSink for RecordingSink {
        fn send_pulse(&self) {
            self.pulses.lock().unwrap().push(Instant::now());
        }

        fn send_heart_rate(&self, bpm: u16, trend: Trend) {
            self.heart_rates.lock().unwrap().push((bpm, trend));
        }
    }

    fn measurement(bpm: u16, intervals: Vec<f32>) -> Measurement {
        Measurement { bpm, intervals }
    }

    fn engine() -> (PulseEngine<RecordingSink>, RecordingSink) {
        let sink = RecordingSink::default();
        (PulseEngine::new(sink.clone()), sink)
    }

    async fn drained(engine: &PulseEngine<RecordingSink>) {
        while engine.is_draining() {
            time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn catch_up_respects_both_bounds() {
        let mut inner = Inner::new();
        for _ in 0..50 {
            inner.queue.push_back(0.33);
        }
        inner.catch_up();
        assert!(inner.queue.iter().sum::<f32>() <= CATCHUP_MAX_QUEUED_SECS);
        assert!(inner.queue.len() as f32 <= CATCHUP_MAX_QUEUED_BEATS);
        assert_eq!(inner.queue.len(), 2 * HR_MAX as usize / 60);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_one_pulse_per_interval_in_real_time() {
        let (engine, sink) = engine();
        let start = Instant::now();
        engine.handle_measurement(&measurement(60, vec![1.0, 1.0, 1.0]));
        drained(&engine).await;

        let times = sink.pulse_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_secs(1));
        assert_eq!(times[2] - times[1], Duration::from_secs(1));
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_backlog_is_skipped_before_pulsing_resumes() {
        let (engine, sink) = engine();
        // Ten seconds of backlog against a two-slow-beat (3s) bound: the
        // oldest seven intervals are skipped, only three are ever pulsed.
        engine.handle_measurement(&measurement(60, vec![1.0; 10]));
        drained(&engine).await;
        assert_eq!(sink.pulse_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stall_then_enqueue_restarts_a_single_loop() {
        let (engine, sink) = engine();
        engine.handle_measurement(&measurement(60, vec![1.0]));
        drained(&engine).await;
        assert_eq!(sink.pulse_count(), 1);
        assert!(!engine.is_draining());

        engine.handle_measurement(&measurement(60, vec![1.0, 1.0]));
        assert!(engine.is_draining());
        drained(&engine).await;

        // Still evenly spaced: a second concurrent loop would halve the gap.
        let times = sink.pulse_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[2] - times[1], Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_enqueues_never_spawn_a_second_loop() {
        let (engine, sink) = engine();
        let mut handles = Vec::new();
        for _ in 0..6 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.handle_measurement(&measurement(120, vec![0.5]));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        drained(&engine).await;

        let times = sink.pulse_times();
        assert_eq!(times.len(), 6);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_the_pacing_loop() {
        let (engine, sink) = engine();
        engine.handle_measurement(&measurement(60, vec![1.0, 1.0, 1.0]));
        time::sleep(Duration::from_millis(1500)).await;
        engine.stop();
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(sink.pulse_count(), 2);
        assert!(!engine.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_engine_ignores_new_measurements() {
        let (engine, sink) = engine();
        engine.stop();
        engine.handle_measurement(&measurement(80, vec![1.0, 1.0]));
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(sink.pulse_count(), 0);
        assert!(sink.heart_rates().is_empty());
        assert!(!engine.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_intervals_are_repaired_before_queueing() {
        let (engine, sink) = engine();
        // 120 bpm with a wildly long sample: repaired to 0.5s, not 5s.
        engine.handle_measurement(&measurement(120, vec![5.0]));
        let start = Instant::now();
        drained(&engine).await;
        assert_eq!(sink.pulse_count(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_suppresses_rapid_heart_rate_changes() {
        let (engine, sink) = engine();
        engine.handle_measurement(&measurement(80, vec![]));
        engine.handle_measurement(&measurement(90, vec![]));
        assert_eq!(sink.heart_rates(), vec![(80, Trend::Steady)]);

        time::sleep(Duration::from_millis(1600)).await;
        engine.handle_measurement(&measurement(90, vec![]));
        assert_eq!(
            sink.heart_rates(),
            vec![(80, Trend::Steady), (90, Trend::Rising)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_heart_rate_is_never_resent() {
        let (engine, sink) = engine();
        engine.handle_measurement(&measurement(80, vec![]));
        time::sleep(Duration::from_secs(2)).await;
        engine.handle_measurement(&measurement(80, vec![]));
        assert_eq!(sink.heart_rates().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn falling_heart_rate_reports_falling_trend() {
        let (engine, sink) = engine();
        engine.handle_measurement(&measurement(90, vec![]));
        time::sleep(Duration::from_secs(2)).await;
        engine.handle_measurement(&measurement(70, vec![]));
        assert_eq!(
            sink.heart_rates(),
            vec![(90, Trend::Steady), (70, Trend::Falling)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_bpm_still_paces_at_fallback_rate() {
        let (engine, sink) = engine();
        // hr at HR_MIN gives the validator no fallback; 1.0s is assumed.
        engine.handle_measurement(&measurement(HR_MIN, vec![9.9]));
        let start = Instant::now();
        drained(&engine).await;
        assert_eq!(sink.pulse_count(), 1);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }
}
