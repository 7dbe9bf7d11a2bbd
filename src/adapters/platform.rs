//! Power and reset adapter.
//!
//! Implements [`Platform`]. On ESP-IDF, deep sleep arms the RTC timer and
//! powers the SoC down; the next boot starts from `main`. The simulation
//! backend only counts the requests so host runs keep going.

use core::time::Duration;

use log::{error, info};

use crate::app::ports::Platform;

#[cfg(not(target_os = "espidf"))]
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Default)]
pub struct SystemPlatform {
    #[cfg(not(target_os = "espidf"))]
    sleeps: AtomicU32,
    #[cfg(not(target_os = "espidf"))]
    last_sleep_ms: AtomicU64,
    #[cfg(not(target_os = "espidf"))]
    restarts: AtomicU32,
}

impl SystemPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(target_os = "espidf")]
impl Platform for SystemPlatform {
    fn deep_sleep(&self, duration: Duration) {
        info!("Platform: deep sleep for {}s", duration.as_secs());
        // SAFETY: plain ESP-IDF calls; esp_deep_sleep_start does not return.
        unsafe {
            esp_idf_svc::sys::esp_sleep_enable_timer_wakeup(duration.as_micros() as u64);
            esp_idf_svc::sys::esp_deep_sleep_start();
        }
    }

    fn restart(&self) {
        error!("Platform: restarting");
        // SAFETY: esp_restart does not return.
        unsafe { esp_idf_svc::sys::esp_restart() };
    }
}

#[cfg(not(target_os = "espidf"))]
impl SystemPlatform {
    pub fn sleeps(&self) -> u32 {
        self.sleeps.load(Ordering::Acquire)
    }

    pub fn last_sleep(&self) -> Duration {
        Duration::from_millis(self.last_sleep_ms.load(Ordering::Acquire))
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Acquire)
    }
}

#[cfg(not(target_os = "espidf"))]
impl Platform for SystemPlatform {
    fn deep_sleep(&self, duration: Duration) {
        info!("Platform: deep sleep for {}s (simulated)", duration.as_secs());
        self.last_sleep_ms
            .store(duration.as_millis() as u64, Ordering::Release);
        self.sleeps.fetch_add(1, Ordering::AcqRel);
    }

    fn restart(&self) {
        error!("Platform: restart requested (simulated)");
        self.restarts.fetch_add(1, Ordering::AcqRel);
    }
}
