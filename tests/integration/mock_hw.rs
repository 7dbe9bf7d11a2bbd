//! Mock adapters for integration tests.
//!
//! Each mock records what the domain asked of it so tests can assert on
//! the full call history without radio, I2C or flash.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wxnode::app::events::AppEvent;
use wxnode::app::ports::{
    EventSink, LogAppender, Platform, Radio, RadioError, Renderer, RemoteRefresh, SensorError,
    SensorSource, StorageError, WallClock,
};
use wxnode::config::{NodeConfig, NodeRole};
use wxnode::reading::{RawReading, SensorId};
use wxnode::render::{RenderBuffer, Screen};
use wxnode::transport::{AckListener, ClockFrame, MacAddr};

pub const OUTSIDE_MAC: MacAddr = [0xA0, 0xB7, 0x65, 0x01, 0x02, 0x03];
pub const BASE_MAC: MacAddr = [0x84, 0xF7, 0x03, 0x3A, 0xA8, 0x58];

/// 2023-11-14 22:13:20 UTC, just above the plausibility floor.
pub const T0: i64 = 1_700_000_000;

// ── Config ────────────────────────────────────────────────────

/// Role preset with every wait shrunk to milliseconds.
pub fn fast_config(role: NodeRole) -> NodeConfig {
    let mut cfg = match role {
        NodeRole::Outside => NodeConfig::outside(),
        NodeRole::Base => NodeConfig::base(),
    };
    cfg.peer = match role {
        NodeRole::Outside => BASE_MAC,
        NodeRole::Base => OUTSIDE_MAC,
    };
    cfg.readiness_wait_ms = 200;
    cfg.fan_in_window_ms = 300;
    cfg.fan_in_poll_ms = 5;
    cfg.post_wait_ms = 100;
    cfg.sink_wait_ms = 20;
    cfg.ack_timeout_ms = 30;
    cfg.retry_delay_ms = 1;
    cfg.exchange_wait_ms = 300;
    cfg.local_wait_ms = 500;
    cfg
}

// ── Clock ─────────────────────────────────────────────────────

pub struct FakeClock {
    unix: AtomicI64,
    uptime_ms: AtomicU64,
    sets: AtomicU32,
}

impl FakeClock {
    pub fn new(unix: i64) -> Arc<Self> {
        Arc::new(Self {
            unix: AtomicI64::new(unix),
            uptime_ms: AtomicU64::new(0),
            sets: AtomicU32::new(0),
        })
    }

    pub fn advance_ms(&self, ms: u64) {
        self.uptime_ms.fetch_add(ms, Ordering::SeqCst);
        self.unix.fetch_add((ms / 1000) as i64, Ordering::SeqCst);
    }

    /// How often `set_unix` was called.
    pub fn sets(&self) -> u32 {
        self.sets.load(Ordering::SeqCst)
    }
}

impl WallClock for FakeClock {
    fn now_unix(&self) -> i64 {
        self.unix.load(Ordering::SeqCst)
    }

    fn set_unix(&self, secs: i64) {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.unix.store(secs, Ordering::SeqCst);
    }

    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.load(Ordering::SeqCst)
    }
}

// ── Radio ─────────────────────────────────────────────────────

/// What the peer does with one transmitted frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeerReply {
    /// Acknowledge with this clock value.
    Ack(i32),
    /// Never answer.
    Silent,
    /// The driver refuses the frame.
    Reject,
}

/// Radio that records every frame and answers from a script. Frames
/// beyond the script get no answer.
pub struct RecordingRadio {
    sent: Mutex<Vec<(MacAddr, Vec<u8>)>>,
    script: Mutex<VecDeque<PeerReply>>,
    acks: Mutex<Option<Arc<AckListener>>>,
}

impl RecordingRadio {
    pub fn new() -> Arc<Self> {
        Self::scripted(&[])
    }

    pub fn scripted(replies: &[PeerReply]) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(replies.iter().copied().collect()),
            acks: Mutex::new(None),
        })
    }

    /// Route scripted acknowledgements into `acks`.
    pub fn deliver_acks_to(&self, acks: Arc<AckListener>) {
        *self.acks.lock().unwrap() = Some(acks);
    }

    pub fn sent(&self) -> Vec<(MacAddr, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Radio for RecordingRadio {
    fn send(&self, peer: &MacAddr, bytes: &[u8]) -> Result<(), RadioError> {
        self.sent.lock().unwrap().push((*peer, bytes.to_vec()));
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PeerReply::Silent);
        match reply {
            PeerReply::Reject => Err(RadioError::SendFailed),
            PeerReply::Silent => Ok(()),
            PeerReply::Ack(unix) => {
                if let Some(acks) = self.acks.lock().unwrap().as_ref() {
                    acks.on_frame(peer, &ClockFrame { unix }.encode());
                }
                Ok(())
            }
        }
    }
}

// ── Sensors ───────────────────────────────────────────────────

/// Sensor that returns the same reading every time, or fails.
pub struct ScriptedSensor {
    id: SensorId,
    result: Result<RawReading, SensorError>,
    pub starts: u32,
}

impl ScriptedSensor {
    pub fn reading(id: SensorId, temperature_c: f32, humidity_pct: f32, pressure_hpa: Option<f32>) -> Self {
        Self {
            id,
            result: Ok(RawReading {
                temperature_c,
                humidity_pct,
                pressure_hpa,
            }),
            starts: 0,
        }
    }

    pub fn failing(id: SensorId, error: SensorError) -> Self {
        Self {
            id,
            result: Err(error),
            starts: 0,
        }
    }
}

impl SensorSource for ScriptedSensor {
    fn id(&self) -> SensorId {
        self.id
    }

    fn start_measurement(&mut self) -> Result<(), SensorError> {
        self.starts += 1;
        Ok(())
    }

    fn measurement_delay(&self) -> Duration {
        Duration::from_millis(2)
    }

    fn read(&mut self) -> Result<RawReading, SensorError> {
        self.result
    }
}

// ── Platform ──────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingPlatform {
    pub sleeps: Mutex<Vec<Duration>>,
    pub restarts: AtomicU32,
}

impl RecordingPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl Platform for RecordingPlatform {
    fn deep_sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }

    fn restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Sinks ─────────────────────────────────────────────────────

/// In-memory append log; optionally refuses every write.
#[derive(Clone, Default)]
pub struct MemLog {
    pub rows: Arc<Mutex<Vec<(String, String)>>>,
    pub fail: bool,
}

impl MemLog {
    pub fn rows(&self) -> Vec<(String, String)> {
        self.rows.lock().unwrap().clone()
    }
}

impl LogAppender for MemLog {
    fn append(&mut self, path: &str, line: &str) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::IoError);
        }
        self.rows.lock().unwrap().push((path.to_owned(), line.to_owned()));
        Ok(())
    }
}

/// Renderer that keeps every frame it was asked to draw.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    pub frames: Arc<Mutex<Vec<(Screen, RenderBuffer)>>>,
}

impl RecordingRenderer {
    pub fn frames(&self) -> Vec<(Screen, RenderBuffer)> {
        self.frames.lock().unwrap().clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, screen: Screen, buffer: &RenderBuffer) {
        self.frames.lock().unwrap().push((screen, *buffer));
    }
}

#[derive(Clone, Default)]
pub struct CountingRefresh {
    pub calls: Arc<AtomicU32>,
}

impl RemoteRefresh for CountingRefresh {
    fn refresh(&mut self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(*event);
    }
}
