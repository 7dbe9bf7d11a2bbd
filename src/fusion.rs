//! Redundant-sensor fusion.
//!
//! Combines the tagged readings gathered in one fan-in window into a single
//! [`FusedReading`]. Each sensor's known bias is subtracted first and the
//! corrected values are averaged afterwards, so a sensor that reads high by
//! `offset` contributes `(a + (b − offset)) / 2`, never `(a + b) / 2 − offset`.
//!
//! | Sensors answering | Temperature | Humidity   | Pressure          |
//! |-------------------|-------------|------------|-------------------|
//! | both              | mean        | mean       | from the BME280   |
//! | one               | corrected   | corrected  | its own or absent |
//! | none              | no record   |            |                   |

use serde::{Deserialize, Serialize};

use crate::config::NodeConfig;
use crate::reading::{FusedReading, SensorId, TaggedReading};

/// Additive bias a sensor is known to carry. Subtracted from its raw output.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Calibration {
    pub temperature_offset: f32,
    pub humidity_offset: f32,
}

/// Stateless fusion of up to two same-epoch readings.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    bme280: Calibration,
    sht4x: Calibration,
}

impl FusionEngine {
    pub fn new(bme280: Calibration, sht4x: Calibration) -> Self {
        Self { bme280, sht4x }
    }

    pub fn from_config(cfg: &NodeConfig) -> Self {
        Self::new(
            cfg.calibration_for(SensorId::Bme280),
            cfg.calibration_for(SensorId::Sht4x),
        )
    }

    pub fn calibration(&self, sensor: SensorId) -> Calibration {
        match sensor {
            SensorId::Bme280 => self.bme280,
            SensorId::Sht4x => self.sht4x,
        }
    }

    /// Fuse the readings collected this cycle, stamping the result with
    /// `now` (the fusion time, not the sampling time).
    ///
    /// Returns `None` when nothing arrived. If a sensor reported twice the
    /// later reading wins.
    pub fn fuse(&self, tagged: &[TaggedReading], now: i32) -> Option<FusedReading> {
        let mut slots: [Option<TaggedReading>; 2] = [None, None];
        for t in tagged {
            let idx = match t.sensor {
                SensorId::Bme280 => 0,
                SensorId::Sht4x => 1,
            };
            slots[idx] = Some(*t);
        }

        let mut count = 0u8;
        let mut temperature = 0.0f32;
        let mut humidity = 0.0f32;
        let mut pressure = None;

        for t in slots.iter().flatten() {
            let cal = self.calibration(t.sensor);
            temperature += t.reading.temperature_c - cal.temperature_offset;
            humidity += t.reading.humidity_pct - cal.humidity_offset;
            if t.sensor.measures_pressure() {
                pressure = t.reading.pressure_hpa;
            }
            count += 1;
        }

        if count == 0 {
            return None;
        }
        let n = f32::from(count);
        Some(FusedReading {
            temperature_c: temperature / n,
            humidity_pct: humidity / n,
            pressure_hpa: pressure,
            timestamp: now,
        })
    }
}
