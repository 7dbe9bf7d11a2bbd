//! Fan-out of published samples to independent sinks.
//!
//! The distributor is the single producer of every sink queue, which keeps
//! each sink FIFO in publish order. A full sink loses that sample only; the
//! other sinks and the producer are never held up beyond the short bounded
//! wait.

use core::time::Duration;
use std::sync::Arc;

use log::{debug, warn};

use super::channels::{PipelineChannels, SinkId, block_on_timeout};
use crate::config::NodeRole;
use crate::reading::{Origin, Sample};

const MAX_SINKS: usize = 4;

/// Per-sample fan-out report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: u8,
    /// Names of the sinks that dropped this sample.
    pub dropped: heapless::Vec<&'static str, MAX_SINKS>,
}

pub struct Distributor {
    channels: Arc<PipelineChannels>,
    sinks: heapless::Vec<SinkId, MAX_SINKS>,
    wait: Duration,
}

impl Distributor {
    pub fn new(channels: Arc<PipelineChannels>, sinks: &[SinkId], wait: Duration) -> Self {
        let mut list = heapless::Vec::new();
        for id in sinks.iter().take(MAX_SINKS) {
            let _ = list.push(*id);
        }
        Self {
            channels,
            sinks: list,
            wait,
        }
    }

    /// The sink set each node role fans out to.
    pub fn for_role(role: NodeRole, channels: Arc<PipelineChannels>, wait: Duration) -> Self {
        match role {
            NodeRole::Outside => Self::new(channels, &[SinkId::Outbound], wait),
            NodeRole::Base => Self::new(channels, &[SinkId::Render, SinkId::Latest, SinkId::Log], wait),
        }
    }

    /// Copy `sample` into every sink, then signal completion for local
    /// samples. When the log sink took the sample, the log writer signals
    /// completion after the row is written instead.
    pub fn fan_out(&self, sample: Sample) -> FanOut {
        let mut report = FanOut::default();
        let mut logged = false;
        for id in &self.sinks {
            let sink = self.channels.sink(*id);
            if sink.offer(sample, self.wait) {
                report.delivered += 1;
                logged |= *id == SinkId::Log;
            } else {
                warn!(
                    "Distributor: {} sink full, dropping {:?} sample ts={}",
                    sink.name(),
                    sample.origin,
                    sample.reading.timestamp
                );
                let _ = report.dropped.push(sink.name());
            }
        }
        debug!(
            "Distributor: {:?} sample to {}/{} sinks",
            sample.origin,
            report.delivered,
            self.sinks.len()
        );
        if sample.origin == Origin::Local && !logged {
            self.channels.local_done.signal(());
        }
        report
    }

    /// Distribute one published sample if one arrives within `timeout`.
    pub fn run_once(&self, timeout: Duration) -> Option<FanOut> {
        let sample = block_on_timeout(timeout, self.channels.published.receive())?;
        Some(self.fan_out(sample))
    }

    /// Distribute everything already published without waiting.
    pub fn drain(&self) -> usize {
        let mut n = 0;
        while let Ok(sample) = self.channels.published.try_receive() {
            self.fan_out(sample);
            n += 1;
        }
        n
    }

    /// Long-lived task body.
    pub fn run(&self) {
        loop {
            let sample = futures_lite::future::block_on(self.channels.published.receive());
            self.fan_out(sample);
        }
    }
}
