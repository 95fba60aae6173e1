//! Tuning constants, public so tests can assert against the same bounds the
//! engine runs with.

/// Physiological heart-rate bounds (bpm). Samples implying a rate outside
/// this range are treated as sensor noise.
pub const HR_MIN: u16 = 40;
pub const HR_MAX: u16 = 200;

/// Beat-to-beat interval bounds (seconds) derived from the bpm bounds.
pub const RRI_MIN: f32 = 60.0 / HR_MAX as f32;
pub const RRI_MAX: f32 = 60.0 / HR_MIN as f32;

/// Minimum time between two forwarded heart-rate chatbox updates.
pub const HR_SEND_INTERVAL_MS: u64 = 1500;

/// Catch-up thresholds: the pacing queue never holds more than two
/// slowest-heartbeat periods of total duration, nor more than two seconds'
/// worth of beats at the fastest physiological rate.
pub const CATCHUP_MAX_QUEUED_SECS: f32 = 2.0 * RRI_MAX;
pub const CATCHUP_MAX_QUEUED_BEATS: f32 = 2.0 * HR_MAX as f32 / 60.0;

/// VRChat listens for OSC on this port by default.
pub const DEFAULT_OSC_TARGET: &str = "127.0.0.1:9000";

/// Avatar parameter toggled once per drained beat interval.
pub const OSC_PULSE_ADDR: &str = "/avatar/parameters/HeartBeat";
/// VRChat chatbox input endpoint for the textual heart-rate display.
pub const OSC_CHATBOX_ADDR: &str = "/chatbox/input";
