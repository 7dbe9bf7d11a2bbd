//! Fuzz target: `SensorFrame::decode` / `ClockFrame::decode`
//!
//! Arbitrary radio payloads must either decode or be rejected by length,
//! never panic. Any 17-byte payload decodes, and re-encoding it yields the
//! same bytes (floats travel bit-exact).
//!
//! cargo fuzz run fuzz_sensor_frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use wxnode::transport::frame::{CLOCK_FRAME_LEN, SENSOR_FRAME_LEN};
use wxnode::transport::{ClockFrame, SensorFrame};

fuzz_target!(|data: &[u8]| {
    match SensorFrame::decode(data) {
        Ok(frame) => {
            assert_eq!(data.len(), SENSOR_FRAME_LEN);
            assert_eq!(&frame.encode()[..], data);
            let sample = frame.into_sample();
            assert_eq!(sample.reading.timestamp, frame.timestamp);
        }
        Err(_) => assert_ne!(data.len(), SENSOR_FRAME_LEN),
    }

    match ClockFrame::decode(data) {
        Ok(clock) => assert_eq!(&clock.encode()[..], data),
        Err(_) => assert_ne!(data.len(), CLOCK_FRAME_LEN),
    }
});
