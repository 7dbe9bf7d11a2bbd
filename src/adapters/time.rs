//! ESP32 clock adapter.
//!
//! Implements [`WallClock`] for the wxnode firmware.
//!
//! - **`target_os = "espidf"`** — wall time through `gettimeofday` /
//!   `settimeofday` (survives deep sleep in the RTC domain), uptime from
//!   the ESP-IDF high-resolution timer.
//! - **`not(target_os = "espidf")`** — `std::time` with a settable offset
//!   for host-side testing and simulation.

use crate::app::ports::WallClock;

#[cfg(not(target_os = "espidf"))]
use std::sync::atomic::{AtomicI64, Ordering};

/// System clock adapter.
pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    /// Seconds added to the host clock by `set_unix`.
    #[cfg(not(target_os = "espidf"))]
    offset: AtomicI64,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            offset: AtomicI64::new(0),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn host_unix() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64)
    }
}

#[cfg(target_os = "espidf")]
impl WallClock for SystemClock {
    fn now_unix(&self) -> i64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: `tv` is a valid out-pointer; a null timezone is allowed.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec as i64
    }

    fn set_unix(&self, secs: i64) {
        let tv = esp_idf_svc::sys::timeval {
            tv_sec: secs as _,
            tv_usec: 0,
        };
        // SAFETY: `tv` outlives the call; a null timezone is allowed.
        let ret = unsafe { esp_idf_svc::sys::settimeofday(&tv, core::ptr::null()) };
        if ret != 0 {
            log::warn!("Clock: settimeofday failed ({})", ret);
        }
    }

    fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }
}

#[cfg(not(target_os = "espidf"))]
impl WallClock for SystemClock {
    fn now_unix(&self) -> i64 {
        Self::host_unix() + self.offset.load(Ordering::Acquire)
    }

    fn set_unix(&self, secs: i64) {
        self.offset.store(secs - Self::host_unix(), Ordering::Release);
    }

    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
