//! Unified error types for the wxnode firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the node
//! services handle failures uniformly. All variants are `Copy` so they can
//! cross task boundaries and be logged without allocation.

use core::fmt;

use serde::{Deserialize, Serialize};

pub use crate::app::ports::{RadioError, SensorError, StorageError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be started or read.
    Sensor(SensorError),
    /// The radio refused or failed a transmission.
    Radio(RadioError),
    /// Durable storage failed.
    Storage(StorageError),
    /// A task could not be spawned.
    Spawn(&'static str),
    /// A bounded queue stayed full and the item was dropped.
    QueueFull(&'static str),
    /// An expected phase-completion signal never arrived.
    Liveness(LivenessFault),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
    /// An ESP-IDF peripheral call returned a non-OK code.
    Hardware(i32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Spawn(name) => write!(f, "spawn: {name}"),
            Self::QueueFull(name) => write!(f, "queue full: {name}"),
            Self::Liveness(e) => write!(f, "liveness: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Hardware(rc) => write!(f, "hardware: rc={rc}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Liveness faults
// ---------------------------------------------------------------------------

/// Escalation stages of the stuck-idle recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LivenessFault {
    /// The idle phase did not report completion within its ceiling.
    IdleStuck,
    /// The recovery relaunch could not be started.
    RelaunchFailed,
    /// The recovery relaunch also failed to complete.
    RelaunchStuck,
}

impl LivenessFault {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdleStuck => "idle phase stuck",
            Self::RelaunchFailed => "idle relaunch failed",
            Self::RelaunchStuck => "idle relaunch stuck",
        }
    }
}

impl fmt::Display for LivenessFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LivenessFault> for Error {
    fn from(e: LivenessFault) -> Self {
        Self::Liveness(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
