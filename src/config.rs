//! Node configuration parameters
//!
//! Every tunable of the duty cycle. Defaults reproduce the deployed
//! firmware; values can be overridden through NVS.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fusion::Calibration;
use crate::reading::SensorId;
use crate::scheduler::SleepWindow;
use crate::transport::MacAddr;

/// Which half of the station this firmware image runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// Dual-sensor remote node; transmits and deep-sleeps.
    Outside,
    /// Display node; receives, renders, logs and idles.
    Base,
}

/// Per-sensor calibration entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorCalibration {
    pub sensor: SensorId,
    pub calibration: Calibration,
}

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub role: NodeRole,
    /// MAC of the node on the other end of the link.
    pub peer: MacAddr,
    /// Local time offset used for wake alignment and sleep hours.
    pub utc_offset_secs: i32,

    // --- Scheduling ---
    /// Wake alignment quantum (seconds).
    pub quantum_secs: u32,
    /// Optional overnight window during which the node stays asleep.
    pub sleep_window: Option<SleepWindow>,
    /// Power fully down between cycles instead of idling.
    pub deep_sleep: bool,
    /// Idle phases shorter than this mark the next remote refresh skippable.
    pub quick_idle_secs: u32,
    /// Ceiling on one idle phase before recovery kicks in.
    pub idle_ceiling_secs: u32,

    // --- Fusion ---
    /// Calibration applied before averaging, per sensor.
    pub calibrations: heapless::Vec<SensorCalibration, 2>,
    /// Readiness wait for each sensor after the first.
    pub readiness_wait_ms: u32,
    /// Drain window for the sensor queue.
    pub fan_in_window_ms: u32,
    /// Poll interval inside the drain window.
    pub fan_in_poll_ms: u32,
    /// Bounded wait used by producers posting into queues.
    pub post_wait_ms: u32,
    /// Bounded wait used by the distributor per sink.
    pub sink_wait_ms: u32,

    // --- Transport ---
    pub max_attempts: u8,
    pub ack_timeout_ms: u32,
    pub retry_delay_ms: u32,
    /// Minimum spacing between accepted frames from one peer.
    pub ignore_window_ms: u32,
    /// Base node: how long to wait for the peer exchange each cycle.
    pub exchange_wait_ms: u32,
    /// Base node: how long to wait for the local sample after the exchange.
    pub local_wait_ms: u32,

    // --- History ---
    /// Persisted history older than this is discarded at boot.
    pub history_max_age_secs: u32,
}

impl NodeConfig {
    /// Outside-node preset: SHT4x reads humidity 5 %RH high.
    pub fn outside() -> Self {
        Self::default()
    }

    /// Base-node preset: the inside SHT4x sits next to the display and
    /// reads warm and wet.
    pub fn base() -> Self {
        let mut calibrations = heapless::Vec::new();
        let _ = calibrations.push(SensorCalibration {
            sensor: SensorId::Sht4x,
            calibration: Calibration {
                temperature_offset: 0.4,
                humidity_offset: 5.0,
            },
        });
        Self {
            role: NodeRole::Base,
            deep_sleep: false,
            calibrations,
            ..Self::default()
        }
    }

    pub fn calibration_for(&self, sensor: SensorId) -> Calibration {
        self.calibrations
            .iter()
            .find(|c| c.sensor == sensor)
            .map(|c| c.calibration)
            .unwrap_or_default()
    }

    pub fn readiness_wait(&self) -> Duration {
        Duration::from_millis(u64::from(self.readiness_wait_ms))
    }

    pub fn fan_in_window(&self) -> Duration {
        Duration::from_millis(u64::from(self.fan_in_window_ms))
    }

    pub fn fan_in_poll(&self) -> Duration {
        Duration::from_millis(u64::from(self.fan_in_poll_ms))
    }

    pub fn post_wait(&self) -> Duration {
        Duration::from_millis(u64::from(self.post_wait_ms))
    }

    pub fn sink_wait(&self) -> Duration {
        Duration::from_millis(u64::from(self.sink_wait_ms))
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.ack_timeout_ms))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.retry_delay_ms))
    }

    pub fn exchange_wait(&self) -> Duration {
        Duration::from_millis(u64::from(self.exchange_wait_ms))
    }

    pub fn local_wait(&self) -> Duration {
        Duration::from_millis(u64::from(self.local_wait_ms))
    }

    pub fn idle_ceiling(&self) -> Duration {
        Duration::from_secs(u64::from(self.idle_ceiling_secs))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut calibrations = heapless::Vec::new();
        let _ = calibrations.push(SensorCalibration {
            sensor: SensorId::Sht4x,
            calibration: Calibration {
                temperature_offset: 0.0,
                humidity_offset: 5.0,
            },
        });
        Self {
            role: NodeRole::Outside,
            peer: [0x84, 0xF7, 0x03, 0x3A, 0xA8, 0x58],
            utc_offset_secs: 0,

            // Scheduling
            quantum_secs: 900, // quarter hour
            sleep_window: None,
            deep_sleep: true,
            quick_idle_secs: 180,
            idle_ceiling_secs: 16 * 60,

            // Fusion
            calibrations,
            readiness_wait_ms: 1000,
            fan_in_window_ms: 2000,
            fan_in_poll_ms: 100,
            post_wait_ms: 2000,
            sink_wait_ms: 10,

            // Transport
            max_attempts: 3,
            ack_timeout_ms: 10_000,
            retry_delay_ms: 3000,
            ignore_window_ms: 45_000,
            exchange_wait_ms: 30_000,
            local_wait_ms: 1000,

            // History
            history_max_age_secs: 3600,
        }
    }
}
