//! Reading data model shared by every pipeline stage.
//!
//! ```text
//!  SensorSource ──▶ TaggedReading ──▶ FusionEngine ──▶ FusedReading
//!                                                          │
//!                                     HistoryRing ◀────────┘
//!                                          │
//!                                          ▼
//!                               Sample { origin, reading, battery }
//! ```

use serde::{Deserialize, Serialize};

/// Timestamps below this are treated as "clock not yet set" (Nov 2023).
pub const PLAUSIBLE_UNIX_FLOOR: i64 = 1_700_000_000;

/// Wall-clock seconds as the 32-bit timestamp carried by readings and
/// frames, saturating outside the `i32` range.
pub fn unix_stamp(secs: i64) -> i32 {
    secs.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Raw values returned by one sensor read, before tagging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    /// `None` when the sensor has no barometer.
    pub pressure_hpa: Option<f32>,
}

/// Physical sensors a node may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorId {
    /// Temperature, humidity and pressure.
    Bme280,
    /// Temperature and humidity only.
    Sht4x,
}

impl SensorId {
    pub const fn measures_pressure(self) -> bool {
        matches!(self, Self::Bme280)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bme280 => "BME280",
            Self::Sht4x => "SHT4x",
        }
    }
}

/// One timestamped measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: Option<f32>,
    /// Unix seconds.
    pub timestamp: i32,
}

impl Reading {
    pub fn from_raw(raw: RawReading, timestamp: i32) -> Self {
        Self {
            temperature_c: raw.temperature_c,
            humidity_pct: raw.humidity_pct,
            pressure_hpa: raw.pressure_hpa,
            timestamp,
        }
    }

    /// True once the clock that stamped this reading had been set.
    pub fn has_plausible_time(&self) -> bool {
        i64::from(self.timestamp) >= PLAUSIBLE_UNIX_FLOOR
    }
}

/// A reading tagged with the sensor that produced it. Lives for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedReading {
    pub sensor: SensorId,
    pub reading: Reading,
}

/// The node's best single estimate for one epoch.
pub type FusedReading = Reading;

/// Where a sample in the distribution pipeline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Measured by this node.
    Local,
    /// Received from the peer node.
    Remote,
}

/// A fused reading as it flows through fan-out: copied into every sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub origin: Origin,
    pub reading: FusedReading,
    /// Battery charge in percent, when the producing node knows it.
    pub battery_pct: Option<u8>,
}

impl Sample {
    pub fn local(reading: FusedReading, battery_pct: Option<u8>) -> Self {
        Self {
            origin: Origin::Local,
            reading,
            battery_pct,
        }
    }
}
