//! Decoding of BLE Heart Rate Measurement (0x2A37) notification payloads and
//! bounds-correction of the beat-to-beat interval samples they carry.

use thiserror::Error;

use crate::config::{HR_MAX, HR_MIN, RRI_MAX, RRI_MIN};

/// Flags byte, bit 0: heart-rate field is u16 little-endian instead of u8.
const FLAG_HR_16BIT: u8 = 1 << 0;
/// Flags byte, bit 4: one or more RR-interval samples follow the heart rate.
const FLAG_RR_PRESENT: u8 = 1 << 4;

/// One decoded notification. Intervals are seconds, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub bpm: u16,
    pub intervals: Vec<f32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedPayload {
    #[error("empty payload")]
    Empty,
    #[error("payload promises {expected} heart-rate byte(s) but only {actual} remain")]
    TruncatedHeartRate { expected: usize, actual: usize },
    #[error("RR flag set but no interval bytes follow")]
    MissingIntervals,
    #[error("odd number of RR-interval bytes ({0})")]
    OddIntervalBytes(usize),
}

/// Decodes a raw Heart Rate Measurement payload.
///
/// Pure transform: no side effects, so a malformed notification can be
/// reported and dropped without touching any engine state. Flag bits other
/// than the HR width and RR presence bits are ignored.
pub fn decode(payload: &[u8]) -> Result<Measurement, MalformedPayload> {
    let (&flags, rest) = payload.split_first().ok_or(MalformedPayload::Empty)?;

    let (bpm, rest) = if flags & FLAG_HR_16BIT != 0 {
        if rest.len() < 2 {
            return Err(MalformedPayload::TruncatedHeartRate {
                expected: 2,
                actual: rest.len(),
            });
        }
        (u16::from_le_bytes([rest[0], rest[1]]), &rest[2..])
    } else {
        match rest.split_first() {
            Some((&b, rest)) => (b as u16, rest),
            None => {
                return Err(MalformedPayload::TruncatedHeartRate {
                    expected: 1,
                    actual: 0,
                })
            }
        }
    };

    let mut intervals = Vec::new();
    if flags & FLAG_RR_PRESENT != 0 {
        if rest.is_empty() {
            return Err(MalformedPayload::MissingIntervals);
        }
        if rest.len() % 2 != 0 {
            return Err(MalformedPayload::OddIntervalBytes(rest.len()));
        }
        for pair in rest.chunks_exact(2) {
            // Fixed-point wire value in 1/1024ths of a second.
            let raw = u16::from_le_bytes([pair[0], pair[1]]);
            intervals.push(raw as f32 / 1024.0);
        }
    }

    Ok(Measurement { bpm, intervals })
}

/// Clamps a raw interval sample into the physiological range.
///
/// Never fails: an out-of-range sample falls back to the last known heart
/// rate when that is itself plausible, and otherwise to exactly one second.
/// A single corrupt sample must never stall the pacing loop.
pub fn validate_interval(rri: f32, last_hr: u16) -> f32 {
    if (RRI_MIN..=RRI_MAX).contains(&rri) {
        rri
    } else if last_hr > HR_MIN && last_hr < HR_MAX {
        60.0 / last_hr as f32
    } else {
        1.0
    }
}
