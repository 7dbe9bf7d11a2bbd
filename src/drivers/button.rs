//! Debounced push-button driver for the base node.
//!
//! Active-low momentary switch with internal pull-up, falling-edge
//! interrupt. The ISR reads the uptime, runs it through [`Debounce`], and
//! signals the idle phase's button [`Flag`]. No gesture classification:
//! every accepted press means "next screen".

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::pipeline::channels::Flag;

/// Presses closer together than this are contact bounce.
pub const DEBOUNCE_MS: u32 = 200;

/// Lock-free press filter, usable from interrupt context.
pub struct Debounce {
    last_ms: AtomicU32,
    seen: AtomicBool,
}

impl Debounce {
    pub const fn new() -> Self {
        Self {
            last_ms: AtomicU32::new(0),
            seen: AtomicBool::new(false),
        }
    }

    /// Returns `true` if an edge at `now_ms` counts as a new press.
    pub fn accept(&self, now_ms: u32) -> bool {
        if self.seen.load(Ordering::Acquire)
            && now_ms.wrapping_sub(self.last_ms.load(Ordering::Acquire)) < DEBOUNCE_MS
        {
            return false;
        }
        self.last_ms.store(now_ms, Ordering::Release);
        self.seen.store(true, Ordering::Release);
        true
    }
}

impl Default for Debounce {
    fn default() -> Self {
        Self::new()
    }
}

// ── ESP-IDF GPIO interrupt ────────────────────────────────────

#[cfg(target_os = "espidf")]
static BUTTON_DEBOUNCE: Debounce = Debounce::new();

#[cfg(target_os = "espidf")]
unsafe extern "C" fn button_gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: esp_timer_get_time is an RTC counter read; safe in ISR context.
    let now_ms = (unsafe { esp_idf_sys::esp_timer_get_time() } / 1_000) as u32;
    if BUTTON_DEBOUNCE.accept(now_ms) {
        // SAFETY: `arg` is the `&'static Flag` passed to `install`.
        let target = unsafe { &*(arg as *const Flag) };
        target.signal(());
    }
}

/// Configure `gpio` as a pulled-up input and route its falling edge to
/// `target`.
#[cfg(target_os = "espidf")]
pub fn install(gpio: i32, target: &'static Flag) -> crate::error::Result<()> {
    use esp_idf_sys::*;

    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << gpio,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
    };
    // SAFETY: `cfg` outlives the call.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(crate::error::Error::Hardware(ret));
    }

    // SAFETY: ESP_ERR_INVALID_STATE means the service is already installed.
    // The handler argument is a 'static reference, so it outlives the ISR.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(crate::error::Error::Hardware(ret));
        }
        let ret = gpio_isr_handler_add(
            gpio,
            Some(button_gpio_isr),
            target as *const Flag as *mut core::ffi::c_void,
        );
        if ret != ESP_OK as i32 {
            return Err(crate::error::Error::Hardware(ret));
        }
    }
    log::info!("button: ISR installed on GPIO{}", gpio);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn install(gpio: i32, _target: &'static Flag) -> crate::error::Result<()> {
    log::info!("button(sim): GPIO{} ISR skipped", gpio);
    Ok(())
}
