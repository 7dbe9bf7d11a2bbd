//! Sender half: bounded send-and-wait-for-ack with clock application.

use core::time::Duration;
use std::sync::Arc;

use embassy_sync::signal::Signal;
use log::{info, warn};

use super::MacAddr;
use super::frame::{ClockFrame, SensorFrame};
use crate::app::ports::{Radio, WallClock};
use crate::config::NodeConfig;
use crate::pipeline::channels::{Flag, block_on_timeout};
use crate::reading::Sample;

/// Retry parameters for one transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub ack_timeout: Duration,
    /// Pause between attempts (not after the last one).
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &NodeConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            ack_timeout: cfg.ack_timeout(),
            retry_delay: cfg.retry_delay(),
        }
    }
}

/// Progress of one [`SyncSender::send_with_retry`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryState {
    pub sample: Sample,
    pub attempts_made: u8,
    pub acknowledged: bool,
}

impl RetryState {
    fn new(sample: Sample) -> Self {
        Self {
            sample,
            attempts_made: 0,
            acknowledged: false,
        }
    }
}

/// Receive-side hook of the sender. Register [`on_frame`](Self::on_frame)
/// as the radio receive callback; it only performs a signal post.
pub struct AckListener {
    peer: MacAddr,
    ack: Flag<i32>,
}

impl AckListener {
    pub const fn new(peer: MacAddr) -> Self {
        Self {
            peer,
            ack: Signal::new(),
        }
    }

    /// Returns `true` if the frame was taken as an acknowledgement.
    pub fn on_frame(&self, from: &MacAddr, bytes: &[u8]) -> bool {
        if *from != self.peer {
            return false;
        }
        match ClockFrame::decode(bytes) {
            Ok(clock) => {
                self.ack.signal(clock.unix);
                true
            }
            Err(e) => {
                warn!("Ack: {}", e);
                false
            }
        }
    }

    fn arm(&self) {
        self.ack.reset();
    }

    fn wait(&self, timeout: Duration) -> Option<i32> {
        block_on_timeout(timeout, self.ack.wait())
    }
}

pub struct SyncSender<R: Radio> {
    radio: R,
    policy: RetryPolicy,
    acks: Arc<AckListener>,
    clock: Arc<dyn WallClock>,
}

impl<R: Radio> SyncSender<R> {
    pub fn new(
        radio: R,
        policy: RetryPolicy,
        acks: Arc<AckListener>,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            radio,
            policy,
            acks,
            clock,
        }
    }

    /// Transmit `sample` until the peer acknowledges or the attempts run
    /// out. A rejected send counts as an attempt. Returns whether the
    /// peer acknowledged; failure means this epoch's data is lost.
    pub fn send_with_retry(&self, sample: &Sample) -> bool {
        let frame = SensorFrame::from_sample(sample).encode();
        let peer = self.acks.peer;
        let mut state = RetryState::new(*sample);

        while state.attempts_made < self.policy.max_attempts && !state.acknowledged {
            if state.attempts_made > 0 {
                std::thread::sleep(self.policy.retry_delay);
            }
            state.attempts_made += 1;
            self.acks.arm();

            if let Err(e) = self.radio.send(&peer, &frame) {
                warn!(
                    "Sender: attempt {}/{} rejected ({})",
                    state.attempts_made, self.policy.max_attempts, e
                );
                continue;
            }

            match self.acks.wait(self.policy.ack_timeout) {
                Some(unix) => {
                    state.acknowledged = true;
                    self.apply_clock(unix);
                }
                None => warn!(
                    "Sender: attempt {}/{} not acknowledged",
                    state.attempts_made, self.policy.max_attempts
                ),
            }
        }

        if state.acknowledged {
            info!("Sender: delivered after {} attempt(s)", state.attempts_made);
        } else {
            warn!(
                "Sender: giving up after {} attempts, reading ts={} lost",
                state.attempts_made, state.sample.reading.timestamp
            );
        }
        state.acknowledged
    }

    fn apply_clock(&self, unix: i32) {
        if unix > 0 {
            self.clock.set_unix(i64::from(unix));
            info!("Sender: clock set from peer to {}", unix);
        } else {
            warn!("Sender: ack carried no usable time ({})", unix);
        }
    }
}
