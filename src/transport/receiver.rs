//! Receiver half: validate, de-duplicate, enqueue, reply with the clock.
//!
//! Work is split between two contexts:
//!
//! * [`FrameReceiver::on_frame_received`] runs in the radio receive
//!   callback. It validates, applies the ignore window and enqueues with
//!   `try_send` only, then posts a [`Receipt`]. It never blocks, logs or
//!   transmits.
//! * [`FrameReceiver::run`] runs as a task. It logs each receipt, sends
//!   the clock reply and then signals the exchange as complete.

use core::cell::RefCell;
use core::time::Duration;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::LinearMap;
use log::{error, info, warn};

use super::MacAddr;
use super::frame::{ClockFrame, SENSOR_FRAME_LEN, SensorFrame};
use crate::app::ports::{Radio, WallClock};
use crate::pipeline::channels::{PipelineChannels, block_on_timeout};
use crate::reading::{PLAUSIBLE_UNIX_FLOOR, unix_stamp};

/// Distinct peers tracked for the ignore window.
const MAX_PEERS: usize = 4;

/// Receipts waiting for the receiver task.
pub const RECEIPT_DEPTH: usize = 8;

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Length mismatch; carries the received length.
    BadLength(usize),
    /// Arrived inside the ignore window of the previous accepted frame.
    TooSoon,
    Accepted {
        /// `false` if the inbound queue was full and the reading was lost.
        queued: bool,
    },
}

/// One handled frame, as seen by the receiver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub peer: MacAddr,
    pub disposition: FrameDisposition,
    /// `true` once the clock reply went out. Only accepted frames are
    /// answered, and only while the local clock is trustworthy.
    pub replied: bool,
}

pub struct FrameReceiver<R: Radio> {
    radio: R,
    channels: Arc<PipelineChannels>,
    clock: Arc<dyn WallClock>,
    ignore_window_ms: u64,
    last_accept: BlockingMutex<CriticalSectionRawMutex, RefCell<LinearMap<MacAddr, u64, MAX_PEERS>>>,
    receipts: Channel<CriticalSectionRawMutex, (MacAddr, FrameDisposition), RECEIPT_DEPTH>,
}

impl<R: Radio> FrameReceiver<R> {
    pub fn new(
        radio: R,
        channels: Arc<PipelineChannels>,
        clock: Arc<dyn WallClock>,
        ignore_window_ms: u32,
    ) -> Self {
        Self {
            radio,
            channels,
            clock,
            ignore_window_ms: u64::from(ignore_window_ms),
            last_accept: BlockingMutex::new(RefCell::new(LinearMap::new())),
            receipts: Channel::new(),
        }
    }

    /// Radio callback entry point.
    pub fn on_frame_received(&self, peer: &MacAddr, bytes: &[u8]) -> FrameDisposition {
        let disposition = self.classify(peer, bytes);
        // A lost receipt only costs the reply; the sender retries.
        let _ = self.receipts.try_send((*peer, disposition));
        disposition
    }

    fn classify(&self, peer: &MacAddr, bytes: &[u8]) -> FrameDisposition {
        let Ok(frame) = SensorFrame::decode(bytes) else {
            return FrameDisposition::BadLength(bytes.len());
        };
        if !self.admit(peer) {
            return FrameDisposition::TooSoon;
        }
        let queued = self.channels.published.try_send(frame.into_sample()).is_ok();
        FrameDisposition::Accepted { queued }
    }

    /// Handle one pending receipt without waiting.
    pub fn process_next(&self) -> Option<Receipt> {
        let (peer, disposition) = self.receipts.try_receive().ok()?;
        Some(self.handle(peer, disposition))
    }

    /// Handle the next receipt if one is posted within `timeout`.
    pub fn process_timeout(&self, timeout: Duration) -> Option<Receipt> {
        let (peer, disposition) = block_on_timeout(timeout, self.receipts.receive())?;
        Some(self.handle(peer, disposition))
    }

    /// Long-lived task body.
    pub fn run(&self) {
        loop {
            let (peer, disposition) = futures_lite::future::block_on(self.receipts.receive());
            self.handle(peer, disposition);
        }
    }

    fn handle(&self, peer: MacAddr, disposition: FrameDisposition) -> Receipt {
        let replied = match disposition {
            FrameDisposition::BadLength(len) => {
                warn!(
                    "Receiver: {}-byte frame from {:02X?}, expected {}, discarding",
                    len,
                    peer,
                    SENSOR_FRAME_LEN
                );
                false
            }
            FrameDisposition::TooSoon => {
                warn!(
                    "Receiver: frame from {:02X?} inside {}ms ignore window",
                    peer, self.ignore_window_ms
                );
                false
            }
            FrameDisposition::Accepted { queued } => {
                if !queued {
                    error!("Receiver: inbound queue full, remote reading lost");
                }
                let replied = self.reply_with_clock(&peer);
                self.channels.exchange_complete.signal(());
                replied
            }
        };
        Receipt {
            peer,
            disposition,
            replied,
        }
    }

    /// Record an acceptance for `peer` unless it is inside the window.
    fn admit(&self, peer: &MacAddr) -> bool {
        let now_ms = self.clock.uptime_ms();
        self.last_accept.lock(|cell| {
            let mut seen = cell.borrow_mut();
            if let Some(&last) = seen.get(peer) {
                if now_ms.saturating_sub(last) < self.ignore_window_ms {
                    return false;
                }
            }
            if seen.insert(*peer, now_ms).is_err() {
                seen.clear();
                let _ = seen.insert(*peer, now_ms);
            }
            true
        })
    }

    fn reply_with_clock(&self, peer: &MacAddr) -> bool {
        let now = self.clock.now_unix();
        if now < PLAUSIBLE_UNIX_FLOOR {
            warn!("Receiver: clock not set ({}), skipping time reply", now);
            return false;
        }
        let reply = ClockFrame { unix: unix_stamp(now) }.encode();
        match self.radio.send(peer, &reply) {
            Ok(()) => {
                info!("Receiver: replied with time {}", now);
                true
            }
            Err(e) => {
                warn!("Receiver: time reply failed ({})", e);
                false
            }
        }
    }
}
