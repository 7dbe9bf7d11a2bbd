//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ pipeline / node services (domain)
//! ```
//!
//! Driven adapters (sensors, radio, clock, storage, render and log sinks)
//! implement these traits. The pipeline stages and node services consume
//! them via generics or trait objects, so the domain core never touches
//! hardware directly.

use core::time::Duration;

use crate::config::NodeConfig;
use crate::reading::{RawReading, SensorId};
use crate::render::{RenderBuffer, Screen};
use crate::transport::MacAddr;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// One physical sensor. Acquisition calls `start_measurement`, waits
/// `measurement_delay`, then calls `read`.
pub trait SensorSource: Send {
    fn id(&self) -> SensorId;

    /// Kick off a conversion.
    fn start_measurement(&mut self) -> Result<(), SensorError>;

    /// How long a conversion takes once started.
    fn measurement_delay(&self) -> Duration;

    fn read(&mut self) -> Result<RawReading, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Radio port
// ───────────────────────────────────────────────────────────────

/// Best-effort unicast datagram primitive.
///
/// Inbound frames are delivered by the adapter to a callback registered
/// once at startup; that callback runs in a restricted context and only
/// performs non-blocking hand-offs.
pub trait Radio: Send + Sync {
    fn send(&self, peer: &MacAddr, bytes: &[u8]) -> Result<(), RadioError>;
}

impl<R: Radio + ?Sized> Radio for std::sync::Arc<R> {
    fn send(&self, peer: &MacAddr, bytes: &[u8]) -> Result<(), RadioError> {
        (**self).send(peer, bytes)
    }
}

// ───────────────────────────────────────────────────────────────
// Clock and platform ports
// ───────────────────────────────────────────────────────────────

/// Wall clock plus a monotonic uptime counter.
pub trait WallClock: Send + Sync {
    /// Current Unix time in seconds.
    fn now_unix(&self) -> i64;

    /// Overwrite the system clock (last writer wins).
    fn set_unix(&self, secs: i64);

    /// Milliseconds since boot; never goes backwards.
    fn uptime_ms(&self) -> u64;
}

/// Power and reset control.
pub trait Platform: Send + Sync {
    /// Arm the wake timer and power down. Does not return on hardware.
    fn deep_sleep(&self, duration: Duration);

    /// Full node restart. Does not return on hardware.
    fn restart(&self);
}

// ───────────────────────────────────────────────────────────────
// Sink ports (domain → display / durable log / remote refresh)
// ───────────────────────────────────────────────────────────────

/// Draws one screen from the buffered samples.
pub trait Renderer: Send {
    fn render(&mut self, screen: Screen, buffer: &RenderBuffer);
}

/// Durable append-only log. Best effort.
pub trait LogAppender: Send {
    fn append(&mut self, path: &str, line: &str) -> Result<(), StorageError>;
}

/// Optional expensive remote-data refresh (e.g. a forecast download).
pub trait RemoteRefresh: Send {
    fn refresh(&mut self);
}

/// Battery voltage source.
pub trait BatteryMonitor: Send {
    fn voltage(&mut self) -> Option<f32>;
}

impl<F: FnMut() -> Option<f32> + Send> BatteryMonitor for F {
    fn voltage(&mut self) -> Option<f32> {
        self()
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The node services emit structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists node configuration.
///
/// Implementations MUST validate config values before persisting and
/// reject invalid ranges with [`ConfigError::ValidationFailed`].
pub trait ConfigPort {
    /// Returns [`NodeConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<NodeConfig, ConfigError>;

    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent namespaced key-value storage.
///
/// Writes MUST be atomic per key (ESP-IDF NVS commits are).
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;

    fn get_i32(&self, namespace: &str, key: &str) -> Result<i32, StorageError> {
        let mut buf = [0u8; 4];
        match self.read(namespace, key, &mut buf)? {
            4 => Ok(i32::from_le_bytes(buf)),
            _ => Err(StorageError::Corrupted),
        }
    }

    fn set_i32(&mut self, namespace: &str, key: &str, value: i32) -> Result<(), StorageError> {
        self.write(namespace, key, &value.to_le_bytes())
    }
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] and [`LogAppender`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    IoError,
    /// Stored bytes have the wrong size or shape.
    Corrupted,
}

/// Errors from [`SensorSource`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The bus transaction failed.
    Bus,
    /// CRC or chip-id check failed.
    Checksum,
    /// Read called before the conversion finished.
    NotReady,
}

/// Errors from [`Radio::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// Peer not registered with the radio driver.
    UnknownPeer,
    /// Driver rejected the frame.
    SendFailed,
    NotInitialised,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored value corrupted"),
        }
    }
}

impl core::fmt::Display for SensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus => write!(f, "bus error"),
            Self::Checksum => write!(f, "checksum mismatch"),
            Self::NotReady => write!(f, "measurement not ready"),
        }
    }
}

impl core::fmt::Display for RadioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownPeer => write!(f, "unknown peer"),
            Self::SendFailed => write!(f, "send failed"),
            Self::NotInitialised => write!(f, "radio not initialised"),
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for StorageError {}
impl std::error::Error for SensorError {}
impl std::error::Error for RadioError {}
