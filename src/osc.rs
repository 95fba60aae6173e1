// VRChat Specific Data Parsing / Socket Here
// Type : OSC
// Requires port : 9000 on 127.0.0.1 / 127.1
// Parsing Format :
/*
    Send to OSC Address (address)
    /avatar/parameters/HeartBeat = one bool per drained beat interval
    /chatbox/input               = "🤍 <bpm>" text, send-immediately, no sound
*/

use std::sync::Arc;

use async_osc::{OscMessage, OscSocket, OscType};
use log::debug;

use crate::config::{OSC_CHATBOX_ADDR, OSC_PULSE_ADDR};

/// Direction of a heart-rate change relative to the last forwarded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Steady,
}

/// Output seam between the pacing engine and the transport.
///
/// Both operations are fire-and-forget: they must return immediately,
/// delivery failures are logged and never surfaced to the caller, and no
/// retries are attempted.
pub trait PulseSink: Send + Sync + 'static {
    /// Fire one heartbeat pulse.
    fn send_pulse(&self);
    /// Forward a (already throttled) heart-rate display update.
    fn send_heart_rate(&self, bpm: u16, trend: Trend);
}

/// Delivers pulses and chatbox updates to a VRChat OSC endpoint over UDP.
pub struct VrcOscSink {
    socket: Arc<OscSocket>,
}

impl VrcOscSink {
    pub async fn connect(target: &str) -> anyhow::Result<Self> {
        let socket = OscSocket::bind("0.0.0.0:0").await?;
        socket.connect(target).await?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }
}

impl PulseSink for VrcOscSink {
    fn send_pulse(&self) {
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            let message = OscMessage {
                addr: OSC_PULSE_ADDR.to_string(),
                args: vec![OscType::Bool(true)],
            };
            if let Err(err) = socket.send(message).await {
                debug!("Failed to send pulse: {}", err);
            }
        });
    }

    fn send_heart_rate(&self, bpm: u16, trend: Trend) {
        let text = match trend {
            Trend::Rising => format!("🤍 {} 🔺", bpm),
            Trend::Falling => format!("🤍 {} 🔻", bpm),
            Trend::Steady => format!("🤍 {}", bpm),
        };
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            let message = OscMessage {
                addr: OSC_CHATBOX_ADDR.to_string(),
                args: vec![
                    OscType::String(text),
                    OscType::Bool(true),
                    OscType::Bool(false),
                ],
            };
            if let Err(err) = socket.send(message).await {
                debug!("Failed to send heart rate update: {}", err);
            }
        });
    }
}
