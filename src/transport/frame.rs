//! Fixed-size little-endian radio frames.
//!
//! Sensor frame (17 bytes, packed):
//!
//! ```text
//! ┌────────────┬────────────┬────────────┬───────────┬─────────┐
//! │ temp f32   │ hum f32    │ press f32  │ ts i32    │ batt u8 │
//! └────────────┴────────────┴────────────┴───────────┴─────────┘
//! ```
//!
//! Clock frame (4 bytes): Unix seconds as `i32`.
//!
//! Receivers reject any frame whose length is not exactly one of these.

use core::fmt;

use crate::reading::{Origin, Reading, Sample};

pub const SENSOR_FRAME_LEN: usize = 17;
pub const CLOCK_FRAME_LEN: usize = 4;

/// Wire stand-in for "no barometer".
pub const PRESSURE_ABSENT: f32 = 404.0;

/// Wire stand-in for "battery level unknown".
pub const BATTERY_UNKNOWN: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Frame length differs from the fixed size.
    Length { expected: usize, actual: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length { expected, actual } => {
                write!(f, "bad frame length: expected {}, got {}", expected, actual)
            }
        }
    }
}

/// One fused reading on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
    pub timestamp: i32,
    pub battery_pct: u8,
}

impl SensorFrame {
    pub fn from_sample(sample: &Sample) -> Self {
        let r = &sample.reading;
        Self {
            temperature_c: r.temperature_c,
            humidity_pct: r.humidity_pct,
            pressure_hpa: r.pressure_hpa.unwrap_or(PRESSURE_ABSENT),
            timestamp: r.timestamp,
            battery_pct: sample.battery_pct.unwrap_or(BATTERY_UNKNOWN),
        }
    }

    /// The sample this frame describes, tagged as coming from the peer.
    pub fn into_sample(self) -> Sample {
        // Exact compare: the sentinel is written verbatim by the sender.
        #[allow(clippy::float_cmp)]
        let pressure = (self.pressure_hpa != PRESSURE_ABSENT).then_some(self.pressure_hpa);
        Sample {
            origin: Origin::Remote,
            reading: Reading {
                temperature_c: self.temperature_c,
                humidity_pct: self.humidity_pct,
                pressure_hpa: pressure,
                timestamp: self.timestamp,
            },
            battery_pct: (self.battery_pct != BATTERY_UNKNOWN).then_some(self.battery_pct),
        }
    }

    pub fn encode(&self) -> [u8; SENSOR_FRAME_LEN] {
        let mut buf = [0u8; SENSOR_FRAME_LEN];
        buf[0..4].copy_from_slice(&self.temperature_c.to_le_bytes());
        buf[4..8].copy_from_slice(&self.humidity_pct.to_le_bytes());
        buf[8..12].copy_from_slice(&self.pressure_hpa.to_le_bytes());
        buf[12..16].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[16] = self.battery_pct;
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let b: &[u8; SENSOR_FRAME_LEN] = bytes.try_into().map_err(|_| FrameError::Length {
            expected: SENSOR_FRAME_LEN,
            actual: bytes.len(),
        })?;
        let word = |i: usize| [b[i], b[i + 1], b[i + 2], b[i + 3]];
        Ok(Self {
            temperature_c: f32::from_le_bytes(word(0)),
            humidity_pct: f32::from_le_bytes(word(4)),
            pressure_hpa: f32::from_le_bytes(word(8)),
            timestamp: i32::from_le_bytes(word(12)),
            battery_pct: b[16],
        })
    }
}

/// Clock value sent back by the base node; doubles as the ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockFrame {
    pub unix: i32,
}

impl ClockFrame {
    pub fn encode(&self) -> [u8; CLOCK_FRAME_LEN] {
        self.unix.to_le_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let b: [u8; CLOCK_FRAME_LEN] = bytes.try_into().map_err(|_| FrameError::Length {
            expected: CLOCK_FRAME_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self {
            unix: i32::from_le_bytes(b),
        })
    }
}
