//! Outbound application events.
//!
//! The node services emit these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other side
//! decide what to do with them; [`LogEventSink`](crate::adapters::log_sink::LogEventSink)
//! turns each into one log line.

use crate::config::NodeRole;
use crate::pipeline::CycleOutcome;
use crate::render::Screen;
use crate::scheduler::{IdleOutcome, SleepPlan};

/// Structured events emitted by the node services.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppEvent {
    /// The node service has started.
    Started { role: NodeRole, history_len: u8 },

    /// The fusion stage finished one cycle.
    Fused(CycleOutcome),

    /// One outbound transmission finished.
    Sent { delivered: bool },

    /// The base cycle gave up waiting for the peer exchange.
    ExchangeTimedOut,

    /// The remote refresh was skipped after a short idle.
    RefreshSkipped,

    /// A screen was drawn from this many newly drained samples.
    Rendered { screen: Screen, samples: u8 },

    /// The node is about to sleep or idle.
    Sleeping(SleepPlan),

    /// The supervised idle phase ended.
    Idle(IdleOutcome),
}
