//! Circular history of fused readings and the bias blend built on it.
//!
//! The ring keeps the last [`HISTORY_SLOTS`] published readings. Once it is
//! full, every new reading is published as `(4·new + mean) / 5` per field;
//! before that it passes through untouched.
//!
//! [`HistoryStore`] owns the ring behind one lock together with its storage
//! backend, so mutation, blending and persistence happen as a single
//! critical section and readers never see a torn ring.

use std::sync::{Mutex, PoisonError};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};
use crate::reading::{FusedReading, Reading};

pub const HISTORY_SLOTS: usize = 3;

const HISTORY_NAMESPACE: &str = "storage";
const HISTORY_KEY: &str = "sensor_history";
const INDEX_KEY: &str = "history_index";
const COUNT_KEY: &str = "num_readings";

/// Large enough for three postcard-encoded readings.
const BLOB_BUF: usize = 96;

/// Fixed-capacity FIFO of recent fused readings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryRing {
    slots: [Reading; HISTORY_SLOTS],
    cursor: usize,
    count: usize,
}

#[derive(Serialize, Deserialize)]
struct PersistedSlots {
    slots: [Reading; HISTORY_SLOTS],
}

impl HistoryRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of valid slots (saturates at [`HISTORY_SLOTS`]).
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Index of the next slot to overwrite.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The most recently pushed reading.
    pub fn newest(&self) -> Option<&Reading> {
        if self.count == 0 {
            return None;
        }
        Some(&self.slots[(self.cursor + HISTORY_SLOTS - 1) % HISTORY_SLOTS])
    }

    /// Valid slots, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        let start = (self.cursor + HISTORY_SLOTS - self.count) % HISTORY_SLOTS;
        (0..self.count).map(move |i| &self.slots[(start + i) % HISTORY_SLOTS])
    }

    /// Overwrite the oldest slot and advance the cursor.
    pub fn push(&mut self, reading: Reading) {
        self.slots[self.cursor] = reading;
        self.cursor = (self.cursor + 1) % HISTORY_SLOTS;
        if self.count < HISTORY_SLOTS {
            self.count += 1;
        }
    }

    /// Per-field mean over the valid slots. Pressure averages only the
    /// slots that carry one.
    pub fn mean(&self) -> Option<Reading> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f32;
        let mut temperature = 0.0;
        let mut humidity = 0.0;
        let mut pressure = 0.0;
        let mut pressure_n = 0u8;
        for r in self.iter() {
            temperature += r.temperature_c;
            humidity += r.humidity_pct;
            if let Some(p) = r.pressure_hpa {
                pressure += p;
                pressure_n += 1;
            }
        }
        Some(Reading {
            temperature_c: temperature / n,
            humidity_pct: humidity / n,
            pressure_hpa: (pressure_n > 0).then(|| pressure / f32::from(pressure_n)),
            timestamp: self.newest().map_or(0, |r| r.timestamp),
        })
    }

    /// Push `reading` and return the value to publish downstream.
    pub fn record(&mut self, reading: FusedReading) -> FusedReading {
        self.push(reading);
        if self.count < HISTORY_SLOTS {
            return reading;
        }
        let Some(mean) = self.mean() else {
            return reading;
        };
        let blend = |new: f32, avg: f32| (4.0 * new + avg) / 5.0;
        FusedReading {
            temperature_c: blend(reading.temperature_c, mean.temperature_c),
            humidity_pct: blend(reading.humidity_pct, mean.humidity_pct),
            pressure_hpa: match (reading.pressure_hpa, mean.pressure_hpa) {
                (Some(new), Some(avg)) => Some(blend(new, avg)),
                (new, _) => new,
            },
            timestamp: reading.timestamp,
        }
    }

    /// Persist slots, cursor and count.
    pub fn save(&self, storage: &mut dyn StoragePort) -> Result<(), StorageError> {
        let blob = postcard::to_allocvec(&PersistedSlots { slots: self.slots })
            .map_err(|_| StorageError::IoError)?;
        storage.write(HISTORY_NAMESPACE, HISTORY_KEY, &blob)?;
        storage.set_i32(HISTORY_NAMESPACE, INDEX_KEY, self.cursor as i32)?;
        storage.set_i32(HISTORY_NAMESPACE, COUNT_KEY, self.count as i32)
    }

    /// Restore a ring saved by [`save`](Self::save).
    pub fn load(storage: &dyn StoragePort) -> Result<Self, StorageError> {
        let mut buf = [0u8; BLOB_BUF];
        let len = storage.read(HISTORY_NAMESPACE, HISTORY_KEY, &mut buf)?;
        let persisted: PersistedSlots =
            postcard::from_bytes(&buf[..len]).map_err(|_| StorageError::Corrupted)?;
        let cursor = storage.get_i32(HISTORY_NAMESPACE, INDEX_KEY)?;
        let count = storage.get_i32(HISTORY_NAMESPACE, COUNT_KEY)?;
        let valid = 0..HISTORY_SLOTS as i32;
        if !valid.contains(&cursor) || !(0..=HISTORY_SLOTS as i32).contains(&count) {
            return Err(StorageError::Corrupted);
        }
        Ok(Self {
            slots: persisted.slots,
            cursor: cursor as usize,
            count: count as usize,
        })
    }
}

struct Inner<S> {
    ring: HistoryRing,
    storage: S,
}

/// The history ring plus its storage, behind a single lock.
pub struct HistoryStore<S: StoragePort> {
    inner: Mutex<Inner<S>>,
}

impl<S: StoragePort> HistoryStore<S> {
    /// Start with an empty ring without touching storage.
    pub fn empty(storage: S) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: HistoryRing::new(),
                storage,
            }),
        }
    }

    /// Reload persisted history, discarding it when the newest entry is
    /// more than `max_age_secs` older than `now`. Storage failures fall
    /// back to an empty ring.
    pub fn load(storage: S, now: i64, max_age_secs: u32) -> Self {
        let ring = match HistoryRing::load(&storage) {
            Ok(ring) => match ring.newest() {
                Some(newest) if now - i64::from(newest.timestamp) > i64::from(max_age_secs) => {
                    warn!(
                        "History: newest entry {}s old, discarding",
                        now - i64::from(newest.timestamp)
                    );
                    HistoryRing::new()
                }
                _ => {
                    info!("History: restored {} entries", ring.len());
                    ring
                }
            },
            Err(StorageError::NotFound) => {
                info!("History: nothing persisted, starting empty");
                HistoryRing::new()
            }
            Err(e) => {
                warn!("History: load failed ({}), starting empty", e);
                HistoryRing::new()
            }
        };
        Self {
            inner: Mutex::new(Inner { ring, storage }),
        }
    }

    /// Record a fused reading, persist the ring and return the blended
    /// value to publish. A failed save is logged and otherwise ignored.
    pub fn record(&self, reading: FusedReading) -> FusedReading {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Inner { ring, storage } = &mut *inner;
        let published = ring.record(reading);
        if let Err(e) = ring.save(storage) {
            warn!("History: save failed ({})", e);
        }
        published
    }

    /// Consistent copy of the ring for diagnostics.
    pub fn snapshot(&self) -> HistoryRing {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ring
            .clone()
    }

    pub fn into_storage(self) -> S {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .storage
    }
}
