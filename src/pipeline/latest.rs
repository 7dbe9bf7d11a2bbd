//! Latest inside / outside sample, fed by the `latest` sink.

use std::sync::{Mutex, PoisonError};

use super::channels::PipelineChannels;
use crate::reading::{Origin, Sample};

#[derive(Default)]
pub struct LatestValues {
    slots: Mutex<[Option<Sample>; 2]>,
}

impl LatestValues {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(origin: Origin) -> usize {
        match origin {
            Origin::Local => 0,
            Origin::Remote => 1,
        }
    }

    pub fn update(&self, sample: Sample) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots[Self::index(sample.origin)] = Some(sample);
    }

    pub fn get(&self, origin: Origin) -> Option<Sample> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)[Self::index(origin)]
    }

    /// Long-lived consumer of the `latest` sink.
    pub fn run(&self, channels: &PipelineChannels) {
        loop {
            self.update(channels.latest.take());
        }
    }
}
