//! Restart diagnostics.
//!
//! Stores up to 4 restart entries in an NVS ring buffer under the "diag"
//! namespace. The stuck-idle supervisor writes an entry right before it
//! resets the node, so the reason survives the reboot.

use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};
use crate::error::LivenessFault;

const RESTART_RING_SLOTS: usize = 4;
const DIAG_NAMESPACE: &str = "diag";
const RESTART_INDEX_KEY: &str = "rst_idx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartEntry {
    /// Wall-clock seconds when the restart was decided.
    pub unix: i64,
    pub reason: LivenessFault,
}

/// NVS-backed ring buffer for restart entries.
pub struct RestartLog<S: StoragePort> {
    storage: S,
    write_index: usize,
}

impl<S: StoragePort> RestartLog<S> {
    /// Open the log, resuming at the persisted write index.
    pub fn open(storage: S) -> Self {
        let write_index = match storage.get_i32(DIAG_NAMESPACE, RESTART_INDEX_KEY) {
            Ok(i) => i.rem_euclid(RESTART_RING_SLOTS as i32) as usize,
            Err(_) => 0,
        };
        Self {
            storage,
            write_index,
        }
    }

    /// Write an entry to the next ring slot and advance the index.
    pub fn record(&mut self, entry: RestartEntry) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(&entry).map_err(|_| StorageError::Corrupted)?;
        self.storage
            .write(DIAG_NAMESPACE, &Self::slot_key(self.write_index), &bytes)?;
        self.write_index = (self.write_index + 1) % RESTART_RING_SLOTS;
        self.storage
            .set_i32(DIAG_NAMESPACE, RESTART_INDEX_KEY, self.write_index as i32)
    }

    /// Stored entries, oldest first.
    pub fn read_all(&self) -> heapless::Vec<RestartEntry, RESTART_RING_SLOTS> {
        let mut entries = heapless::Vec::new();
        for n in 0..RESTART_RING_SLOTS {
            let i = (self.write_index + n) % RESTART_RING_SLOTS;
            let mut buf = [0u8; 32];
            if let Ok(len) = self.storage.read(DIAG_NAMESPACE, &Self::slot_key(i), &mut buf) {
                if let Ok(entry) = postcard::from_bytes::<RestartEntry>(&buf[..len]) {
                    let _ = entries.push(entry);
                }
            }
        }
        entries
    }

    pub fn clear(&mut self) {
        for i in 0..RESTART_RING_SLOTS {
            let _ = self.storage.delete(DIAG_NAMESPACE, &Self::slot_key(i));
        }
        let _ = self.storage.delete(DIAG_NAMESPACE, RESTART_INDEX_KEY);
        self.write_index = 0;
    }

    pub fn count(&self) -> usize {
        (0..RESTART_RING_SLOTS)
            .filter(|i| self.storage.exists(DIAG_NAMESPACE, &Self::slot_key(*i)))
            .count()
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    fn slot_key(index: usize) -> heapless::String<8> {
        let mut s = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut s, format_args!("r{}", index));
        s
    }
}
