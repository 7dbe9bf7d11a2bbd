//! Ack-retry sender and base-node receiver, end to end over mock radios.

use std::sync::Arc;
use std::time::Duration;

use wxnode::app::ports::WallClock;
use wxnode::reading::{Origin, Reading, Sample};
use wxnode::transport::frame::PRESSURE_ABSENT;
use wxnode::transport::{
    AckListener, ClockFrame, FrameDisposition, FrameReceiver, Receipt, RetryPolicy, SensorFrame,
    SyncSender,
};
use wxnode::config::NodeRole;
use wxnode::pipeline::PipelineChannels;
use wxnode::pipeline::channels::PUBLISH_DEPTH;

use crate::mock_hw::{
    BASE_MAC, FakeClock, OUTSIDE_MAC, PeerReply, RecordingRadio, T0, fast_config,
};

fn outside_sample() -> Sample {
    Sample::local(
        Reading {
            temperature_c: 3.25,
            humidity_pct: 88.5,
            pressure_hpa: Some(1008.4),
            timestamp: T0 as i32,
        },
        None,
    )
}

fn sender(replies: &[PeerReply]) -> (SyncSender<Arc<RecordingRadio>>, Arc<RecordingRadio>, Arc<FakeClock>) {
    let cfg = fast_config(NodeRole::Outside);
    let radio = RecordingRadio::scripted(replies);
    let acks = Arc::new(AckListener::new(BASE_MAC));
    radio.deliver_acks_to(acks.clone());
    let clock = FakeClock::new(0);
    let s = SyncSender::new(radio.clone(), RetryPolicy::from_config(&cfg), acks, clock.clone());
    (s, radio, clock)
}

// ── Sender ────────────────────────────────────────────────────

#[test]
fn two_timeouts_then_ack_delivers_on_third_send() {
    let (s, radio, clock) = sender(&[
        PeerReply::Silent,
        PeerReply::Silent,
        PeerReply::Ack(1_712_345_678),
    ]);
    assert!(s.send_with_retry(&outside_sample()));
    assert_eq!(radio.send_count(), 3);
    assert_eq!(clock.now_unix(), 1_712_345_678);
    assert_eq!(clock.sets(), 1);
}

#[test]
fn three_timeouts_lose_the_reading() {
    let (s, radio, clock) = sender(&[PeerReply::Silent; 3]);
    assert!(!s.send_with_retry(&outside_sample()));
    assert_eq!(radio.send_count(), 3);
    assert_eq!(clock.sets(), 0);
}

#[test]
fn every_attempt_carries_the_same_frame() {
    let (s, radio, _) = sender(&[PeerReply::Reject, PeerReply::Silent, PeerReply::Ack(T0 as i32)]);
    assert!(s.send_with_retry(&outside_sample()));
    let sent = radio.sent();
    assert_eq!(sent.len(), 3);
    let expected = SensorFrame::from_sample(&outside_sample()).encode().to_vec();
    for (peer, bytes) in sent {
        assert_eq!(peer, BASE_MAC);
        assert_eq!(bytes, expected);
    }
}

#[test]
fn absent_pressure_travels_as_sentinel() {
    let mut sample = outside_sample();
    sample.reading.pressure_hpa = None;
    let (s, radio, _) = sender(&[PeerReply::Ack(T0 as i32)]);
    assert!(s.send_with_retry(&sample));
    let frame = SensorFrame::decode(&radio.sent()[0].1).unwrap();
    assert_eq!(frame.pressure_hpa, PRESSURE_ABSENT);
    assert_eq!(frame.into_sample().reading.pressure_hpa, None);
}

// ── Receiver ──────────────────────────────────────────────────

fn receiver(now: i64) -> (FrameReceiver<Arc<RecordingRadio>>, Arc<RecordingRadio>, Arc<PipelineChannels>, Arc<FakeClock>) {
    let cfg = fast_config(NodeRole::Base);
    let radio = RecordingRadio::new();
    let channels = Arc::new(PipelineChannels::new());
    let clock = FakeClock::new(now);
    let rx = FrameReceiver::new(radio.clone(), channels.clone(), clock.clone(), cfg.ignore_window_ms);
    (rx, radio, channels, clock)
}

fn frame_bytes() -> Vec<u8> {
    SensorFrame::from_sample(&outside_sample()).encode().to_vec()
}

#[test]
fn accepted_frame_is_queued_and_answered_with_time() {
    let (rx, radio, channels, _) = receiver(T0 + 60);
    let d = rx.on_frame_received(&OUTSIDE_MAC, &frame_bytes());
    assert_eq!(d, FrameDisposition::Accepted { queued: true });
    assert_eq!(
        rx.process_next(),
        Some(Receipt { peer: OUTSIDE_MAC, disposition: d, replied: true })
    );

    let sample = channels.published.try_receive().unwrap();
    assert_eq!(sample.origin, Origin::Remote);
    assert_eq!(sample.reading.pressure_hpa, Some(1008.4));
    assert_eq!(sample.battery_pct, None);

    let sent = radio.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, OUTSIDE_MAC);
    assert_eq!(ClockFrame::decode(&sent[0].1).unwrap().unix, (T0 + 60) as i32);
    assert!(channels.exchange_complete.signaled());
}

#[test]
fn radio_callback_never_transmits() {
    let (rx, radio, channels, _) = receiver(T0);
    rx.on_frame_received(&OUTSIDE_MAC, &frame_bytes());
    assert_eq!(radio.send_count(), 0);
    assert!(!channels.exchange_complete.signaled());
    // the reply goes out from the receiver task
    assert!(rx.process_timeout(Duration::from_millis(50)).unwrap().replied);
    assert_eq!(radio.send_count(), 1);
    assert!(channels.exchange_complete.signaled());
    assert_eq!(rx.process_next(), None);
}

#[test]
fn wrong_length_is_dropped_without_reply() {
    let (rx, radio, channels, _) = receiver(T0);
    let mut bytes = frame_bytes();
    bytes.push(0);
    assert_eq!(rx.on_frame_received(&OUTSIDE_MAC, &bytes), FrameDisposition::BadLength(18));
    assert_eq!(rx.on_frame_received(&OUTSIDE_MAC, &bytes[..4]), FrameDisposition::BadLength(4));
    while let Some(receipt) = rx.process_next() {
        assert!(!receipt.replied);
    }
    assert!(channels.published.try_receive().is_err());
    assert_eq!(radio.send_count(), 0);
    assert!(!channels.exchange_complete.signaled());
}

#[test]
fn retransmission_inside_ignore_window_is_dropped() {
    let (rx, radio, channels, clock) = receiver(T0);
    assert!(matches!(
        rx.on_frame_received(&OUTSIDE_MAC, &frame_bytes()),
        FrameDisposition::Accepted { .. }
    ));
    clock.advance_ms(44_999);
    assert_eq!(rx.on_frame_received(&OUTSIDE_MAC, &frame_bytes()), FrameDisposition::TooSoon);
    clock.advance_ms(1);
    assert!(matches!(
        rx.on_frame_received(&OUTSIDE_MAC, &frame_bytes()),
        FrameDisposition::Accepted { .. }
    ));
    let replies: Vec<bool> = std::iter::from_fn(|| rx.process_next()).map(|r| r.replied).collect();
    assert_eq!(replies, vec![true, false, true]);
    assert_eq!(channels.published.len(), 2);
    assert_eq!(radio.send_count(), 2);
}

#[test]
fn ignore_window_is_per_peer() {
    let (rx, _, channels, _) = receiver(T0);
    let other: [u8; 6] = [1, 2, 3, 4, 5, 6];
    assert!(matches!(
        rx.on_frame_received(&OUTSIDE_MAC, &frame_bytes()),
        FrameDisposition::Accepted { .. }
    ));
    assert!(matches!(
        rx.on_frame_received(&other, &frame_bytes()),
        FrameDisposition::Accepted { .. }
    ));
    assert_eq!(channels.published.len(), 2);
}

#[test]
fn unset_clock_still_queues_but_sends_no_time() {
    let (rx, radio, channels, _) = receiver(1_000);
    assert_eq!(
        rx.on_frame_received(&OUTSIDE_MAC, &frame_bytes()),
        FrameDisposition::Accepted { queued: true }
    );
    assert!(!rx.process_next().unwrap().replied);
    assert_eq!(radio.send_count(), 0);
    assert!(channels.published.try_receive().is_ok());
    assert!(channels.exchange_complete.signaled());
}

#[test]
fn full_inbound_queue_loses_only_the_new_reading() {
    let (rx, _, channels, _) = receiver(T0);
    for _ in 0..PUBLISH_DEPTH {
        channels.published.try_send(outside_sample()).unwrap();
    }
    assert_eq!(
        rx.on_frame_received(&OUTSIDE_MAC, &frame_bytes()),
        FrameDisposition::Accepted { queued: false }
    );
    assert!(rx.process_next().unwrap().replied);
    assert_eq!(channels.published.len(), PUBLISH_DEPTH);
}
