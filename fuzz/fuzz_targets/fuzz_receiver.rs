//! Fuzz target: `FrameReceiver::on_frame_received`
//!
//! Splits the input into (peer, payload) frames and drives them through
//! the base-node receive path and its receipt handling. The receiver must
//! never panic, must only queue and answer well-formed frames, and the
//! inbound queue must stay bounded.
//!
//! cargo fuzz run fuzz_receiver

#![no_main]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use libfuzzer_sys::fuzz_target;
use wxnode::app::ports::{Radio, RadioError, WallClock};
use wxnode::pipeline::PipelineChannels;
use wxnode::pipeline::channels::PUBLISH_DEPTH;
use wxnode::transport::frame::SENSOR_FRAME_LEN;
use wxnode::transport::{FrameDisposition, FrameReceiver, MacAddr};

struct NullRadio;

impl Radio for NullRadio {
    fn send(&self, _peer: &MacAddr, _bytes: &[u8]) -> Result<(), RadioError> {
        Ok(())
    }
}

/// Advances 10 s of uptime per call so the ignore window is exercised.
struct SteppingClock(AtomicU64);

impl WallClock for SteppingClock {
    fn now_unix(&self) -> i64 {
        1_700_000_000
    }
    fn set_unix(&self, _secs: i64) {}
    fn uptime_ms(&self) -> u64 {
        self.0.fetch_add(10_000, Ordering::Relaxed)
    }
}

fuzz_target!(|data: &[u8]| {
    let channels = Arc::new(PipelineChannels::new());
    let clock = Arc::new(SteppingClock(AtomicU64::new(0)));
    let receiver = FrameReceiver::new(NullRadio, channels.clone(), clock, 45_000);

    let mut rest = data;
    while rest.len() >= 2 {
        let peer: MacAddr = [rest[0] & 0x03, 0, 0, 0, 0, 0];
        let len = usize::from(rest[1]) % 24;
        rest = &rest[2..];
        let take = len.min(rest.len());
        let (payload, tail) = rest.split_at(take);
        rest = tail;

        match receiver.on_frame_received(&peer, payload) {
            FrameDisposition::BadLength(n) => assert_ne!(n, SENSOR_FRAME_LEN),
            FrameDisposition::Accepted { .. } | FrameDisposition::TooSoon => {
                assert_eq!(payload.len(), SENSOR_FRAME_LEN);
            }
        }
        while let Some(receipt) = receiver.process_next() {
            assert!(matches!(receipt.disposition, FrameDisposition::Accepted { .. }) || !receipt.replied);
        }
        assert!(channels.published.len() <= PUBLISH_DEPTH);
    }
});
