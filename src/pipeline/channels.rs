//! Inter-task channels of the reading pipeline.
//!
//! Uses `embassy-sync` bounded channels and signals so ISR-like contexts
//! (radio callback, button interrupt) can hand off with non-blocking posts
//! while tasks block with explicit timeouts.
//!
//! ```text
//!  acquisition ──TaggedReading──▶ sensor ─┐
//!  acquisition ──()──────────▶ readiness ─┤
//!                                         ▼
//!                                   fusion stage
//!                                         │ Sample
//!  radio callback ──Sample────────▶ published
//!                                         │
//!                                    distributor
//!               ┌───────────┬────────────┼────────────┐
//!               ▼           ▼            ▼            ▼
//!           outbound      render       latest        log
//! ```

use core::future::Future;
use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::reading::{Sample, TaggedReading};

/// Bounded FIFO shared between tasks.
pub type Queue<T, const N: usize> = Channel<CriticalSectionRawMutex, T, N>;

/// Binary "something happened" signal. The latest value wins.
pub type Flag<T = ()> = Signal<CriticalSectionRawMutex, T>;

pub const SENSOR_DEPTH: usize = 10;
pub const PUBLISH_DEPTH: usize = 10;
pub const OUTBOUND_DEPTH: usize = 10;
pub const RENDER_DEPTH: usize = 4;
pub const LATEST_DEPTH: usize = 4;
pub const LOG_DEPTH: usize = 12;
const READINESS_DEPTH: usize = 4;

/// Drive `fut` on the current thread for at most `timeout`.
pub fn block_on_timeout<F: Future>(timeout: Duration, fut: F) -> Option<F::Output> {
    futures_lite::future::block_on(futures_lite::future::or(
        async { Some(fut.await) },
        async {
            async_io_mini::Timer::after(timeout).await;
            None
        },
    ))
}

// ── Counting readiness ───────────────────────────────────────

/// Counting semaphore: every acquisition task gives one permit, the
/// fusion stage takes one per expected sensor.
pub struct Readiness {
    permits: Queue<(), READINESS_DEPTH>,
}

impl Readiness {
    pub const fn new() -> Self {
        Self {
            permits: Channel::new(),
        }
    }

    /// Never blocks; surplus permits are dropped.
    pub fn give(&self) {
        let _ = self.permits.try_send(());
    }

    /// Wait without bound. Used only for the per-cycle trigger.
    pub fn take(&self) {
        futures_lite::future::block_on(self.permits.receive());
    }

    pub fn take_timeout(&self, timeout: Duration) -> bool {
        block_on_timeout(timeout, self.permits.receive()).is_some()
    }

    pub fn reset(&self) {
        while self.permits.try_receive().is_ok() {}
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

// ── Sink queues ──────────────────────────────────────────────

/// Destination of the distributor's fan-out.
pub trait Sink {
    fn name(&self) -> &'static str;

    /// Post a copy of `sample`, waiting at most `wait` for room.
    /// Returns `false` if the sample was dropped.
    fn offer(&self, sample: Sample, wait: Duration) -> bool;
}

/// A named, bounded sample queue consumed by exactly one task.
pub struct SinkQueue<const N: usize> {
    name: &'static str,
    queue: Queue<Sample, N>,
}

impl<const N: usize> SinkQueue<N> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            queue: Channel::new(),
        }
    }

    pub fn try_take(&self) -> Option<Sample> {
        self.queue.try_receive().ok()
    }

    pub fn take_timeout(&self, timeout: Duration) -> Option<Sample> {
        block_on_timeout(timeout, self.queue.receive())
    }

    /// Wait without bound. For long-lived consumer loops.
    pub fn take(&self) -> Sample {
        futures_lite::future::block_on(self.queue.receive())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<const N: usize> Sink for SinkQueue<N> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn offer(&self, sample: Sample, wait: Duration) -> bool {
        if self.queue.try_send(sample).is_ok() {
            return true;
        }
        block_on_timeout(wait, self.queue.send(sample)).is_some()
    }
}

/// Selects one of the fan-out sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkId {
    /// Radio transmission to the peer (outside node).
    Outbound,
    /// Display buffer (base node).
    Render,
    /// Latest-value snapshot (base node).
    Latest,
    /// Durable CSV log (base node).
    Log,
}

// ── Channel set ──────────────────────────────────────────────

/// Every queue and signal of one node's pipeline. Shared by `Arc`.
pub struct PipelineChannels {
    /// Acquisition → fusion.
    pub sensor: Queue<TaggedReading, SENSOR_DEPTH>,
    pub readiness: Readiness,
    /// Fusion and radio receive → distributor.
    pub published: Queue<Sample, PUBLISH_DEPTH>,
    pub outbound: SinkQueue<OUTBOUND_DEPTH>,
    pub render: SinkQueue<RENDER_DEPTH>,
    pub latest: SinkQueue<LATEST_DEPTH>,
    pub log: SinkQueue<LOG_DEPTH>,
    /// Given once a local sample was fanned out and, where the node keeps
    /// a log, its row was written.
    pub local_done: Flag,
    /// Given when a peer exchange finished or the user pressed the button.
    pub exchange_complete: Flag,
}

impl PipelineChannels {
    pub const fn new() -> Self {
        Self {
            sensor: Channel::new(),
            readiness: Readiness::new(),
            published: Channel::new(),
            outbound: SinkQueue::new("outbound"),
            render: SinkQueue::new("render"),
            latest: SinkQueue::new("latest"),
            log: SinkQueue::new("log"),
            local_done: Signal::new(),
            exchange_complete: Signal::new(),
        }
    }

    pub fn sink(&self, id: SinkId) -> &dyn Sink {
        match id {
            SinkId::Outbound => &self.outbound,
            SinkId::Render => &self.render,
            SinkId::Latest => &self.latest,
            SinkId::Log => &self.log,
        }
    }

    /// Drop anything a previous cycle left behind in the fan-in stage.
    pub fn reset_fan_in(&self) {
        while self.sensor.try_receive().is_ok() {}
        self.readiness.reset();
    }
}

impl Default for PipelineChannels {
    fn default() -> Self {
        Self::new()
    }
}
