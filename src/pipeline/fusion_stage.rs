//! Fan-in consumer: readiness wait, bounded drain, fuse, bias, publish.

use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};

use super::channels::{PipelineChannels, SENSOR_DEPTH, block_on_timeout};
use crate::app::ports::{BatteryMonitor, StoragePort, WallClock};
use crate::battery;
use crate::config::NodeConfig;
use crate::fusion::FusionEngine;
use crate::history::HistoryStore;
use crate::reading::{Sample, TaggedReading, unix_stamp};

/// Timing of one fan-in window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanInTiming {
    /// Number of local sensors, i.e. readiness permits per cycle.
    pub expected: usize,
    /// Wait for each permit after the first.
    pub readiness_wait: Duration,
    /// Total time allowed for draining the sensor queue.
    pub window: Duration,
    pub poll: Duration,
    /// Bounded wait when posting the result downstream.
    pub post_wait: Duration,
}

impl FanInTiming {
    pub fn from_config(cfg: &NodeConfig, expected: usize) -> Self {
        Self {
            expected,
            readiness_wait: cfg.readiness_wait(),
            window: cfg.fan_in_window(),
            poll: cfg.fan_in_poll(),
            post_wait: cfg.post_wait(),
        }
    }
}

/// Result of one fusion cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Fused, biased and handed to the distributor.
    Published(Sample),
    /// No sensor answered within the window; history untouched.
    NoData,
    /// Fused but the published queue stayed full.
    Dropped(Sample),
}

pub struct FusionStage<S: StoragePort> {
    channels: Arc<PipelineChannels>,
    history: Arc<HistoryStore<S>>,
    engine: FusionEngine,
    clock: Arc<dyn WallClock>,
    battery: Option<Box<dyn BatteryMonitor>>,
    timing: FanInTiming,
}

impl<S: StoragePort> FusionStage<S> {
    pub fn new(
        channels: Arc<PipelineChannels>,
        history: Arc<HistoryStore<S>>,
        engine: FusionEngine,
        clock: Arc<dyn WallClock>,
        timing: FanInTiming,
    ) -> Self {
        Self {
            channels,
            history,
            engine,
            clock,
            battery: None,
            timing,
        }
    }

    pub fn with_battery(mut self, battery: Box<dyn BatteryMonitor>) -> Self {
        self.battery = Some(battery);
        self
    }

    /// Block until the first acquisition task reports, then collect and
    /// fuse this cycle's readings.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.channels.readiness.take();
        self.collect_and_publish()
    }

    /// Like [`run_cycle`](Self::run_cycle) but with a bound on the first
    /// readiness wait too.
    pub fn run_cycle_timeout(&mut self, trigger_wait: Duration) -> CycleOutcome {
        if !self.channels.readiness.take_timeout(trigger_wait) {
            warn!("Fusion: no acquisition task reported");
            return CycleOutcome::NoData;
        }
        self.collect_and_publish()
    }

    fn collect_and_publish(&mut self) -> CycleOutcome {
        for _ in 1..self.timing.expected {
            if !self.channels.readiness.take_timeout(self.timing.readiness_wait) {
                warn!("Fusion: readiness wait expired, fusing what arrived");
                break;
            }
        }

        let tagged = self.drain();
        let now = unix_stamp(self.clock.now_unix());
        let Some(fused) = self.engine.fuse(&tagged, now) else {
            warn!("Fusion: no sensor data this cycle");
            return CycleOutcome::NoData;
        };
        if tagged.len() < self.timing.expected {
            warn!(
                "Fusion: degraded, {} of {} sensors answered",
                tagged.len(),
                self.timing.expected
            );
        }

        let published = self.history.record(fused);
        let battery_pct = self
            .battery
            .as_mut()
            .and_then(|b| b.voltage())
            .map(battery::percentage);
        let sample = Sample::local(published, battery_pct);
        info!(
            "Fusion: T={:.2}C H={:.1}% P={:?} ts={}",
            published.temperature_c, published.humidity_pct, published.pressure_hpa, now
        );

        if self.channels.published.try_send(sample).is_ok()
            || block_on_timeout(self.timing.post_wait, self.channels.published.send(sample))
                .is_some()
        {
            CycleOutcome::Published(sample)
        } else {
            warn!("Fusion: published queue full, sample dropped");
            CycleOutcome::Dropped(sample)
        }
    }

    fn drain(&self) -> heapless::Vec<TaggedReading, SENSOR_DEPTH> {
        let mut tagged = heapless::Vec::new();
        let deadline = Instant::now() + self.timing.window;
        while tagged.len() < self.timing.expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let wait = remaining.min(self.timing.poll);
            if let Some(t) = block_on_timeout(wait, self.channels.sensor.receive()) {
                if tagged.push(t).is_err() {
                    break;
                }
            }
        }
        tagged
    }
}
