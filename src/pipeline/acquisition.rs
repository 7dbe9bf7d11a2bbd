//! One-shot acquisition tasks.
//!
//! Each cycle spawns one short-lived thread per local sensor. The thread
//! starts a conversion, waits out the sensor's measurement delay, reads,
//! posts the tagged reading with a bounded wait and always gives one
//! readiness permit, even on failure, so the fusion stage never waits on a
//! task that has already given up.

use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use log::{debug, warn};

use super::channels::{PipelineChannels, block_on_timeout};
use crate::app::ports::{SensorError, SensorSource, WallClock};
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::{Error, Result};
use crate::reading::{Reading, TaggedReading, unix_stamp};

/// A sensor shared between cycles; each cycle's task borrows it briefly.
pub type SharedSensor = Arc<Mutex<dyn SensorSource>>;

const ACQ_PRIORITY: u8 = 5;
const ACQ_STACK_KB: usize = 4;

#[derive(Clone)]
pub struct Acquisition {
    channels: Arc<PipelineChannels>,
    clock: Arc<dyn WallClock>,
    post_wait: Duration,
}

impl Acquisition {
    pub fn new(
        channels: Arc<PipelineChannels>,
        clock: Arc<dyn WallClock>,
        post_wait: Duration,
    ) -> Self {
        Self {
            channels,
            clock,
            post_wait,
        }
    }

    /// Sample one sensor and hand the result to the fusion stage.
    pub fn acquire_once(&self, sensor: &mut dyn SensorSource) -> Result<TaggedReading> {
        let result = self.measure(sensor).and_then(|tagged| {
            let posted =
                block_on_timeout(self.post_wait, self.channels.sensor.send(tagged)).is_some();
            if posted {
                debug!("Acquisition: {} posted", tagged.sensor.name());
                Ok(tagged)
            } else {
                warn!(
                    "Acquisition: sensor queue full, {} reading dropped",
                    tagged.sensor.name()
                );
                Err(Error::QueueFull("sensor"))
            }
        });
        self.channels.readiness.give();
        result
    }

    fn measure(&self, sensor: &mut dyn SensorSource) -> Result<TaggedReading> {
        let id = sensor.id();
        let raw = sensor
            .start_measurement()
            .and_then(|()| {
                std::thread::sleep(sensor.measurement_delay());
                sensor.read()
            })
            .map_err(|e: SensorError| {
                warn!("Acquisition: {} failed ({})", id.name(), e);
                Error::Sensor(e)
            })?;
        Ok(TaggedReading {
            sensor: id,
            reading: Reading::from_raw(raw, unix_stamp(self.clock.now_unix())),
        })
    }

    /// Launch one acquisition task. If the task cannot be spawned its
    /// readiness permit is given here instead.
    pub fn spawn(&self, sensor: SharedSensor) -> Result<JoinHandle<()>> {
        let this = self.clone();
        let handle = spawn_on_core(Core::App, ACQ_PRIORITY, ACQ_STACK_KB, "acquire\0", move || {
            let mut guard = sensor.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = this.acquire_once(&mut *guard);
        });
        if handle.is_err() {
            self.channels.readiness.give();
        }
        handle
    }

    /// Start this cycle's acquisition on every local sensor in parallel.
    pub fn trigger(&self, sensors: &[SharedSensor]) -> usize {
        sensors
            .iter()
            .filter(|s| match self.spawn(Arc::clone(s)) {
                Ok(_) => true,
                Err(e) => {
                    warn!("Acquisition: {}", e);
                    false
                }
            })
            .count()
    }
}
