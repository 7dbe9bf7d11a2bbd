//! Battery voltage through the ESP32 ADC.
//!
//! Implements [`BatteryMonitor`]. The battery sits behind a divider on
//! GPIO36 (ADC1 channel 0); the board scale factor and the eFuse Vref
//! turn the 12-bit raw count into volts.
//!
//! On host/test: reads from a static AtomicU16 for injection.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU16, Ordering};

use crate::app::ports::BatteryMonitor;

/// Divider and attenuation scale of the LilyGo board.
const BOARD_SCALE: f32 = 6.566;
const ADC_COUNTS: f32 = 4096.0;
/// Used when the eFuse holds no Vref calibration.
pub const DEFAULT_VREF_MV: u16 = 1100;

#[cfg(not(target_os = "espidf"))]
static SIM_BATTERY_ADC: AtomicU16 = AtomicU16::new(0);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_battery_adc(raw: u16) {
    SIM_BATTERY_ADC.store(raw, Ordering::Relaxed);
}

/// Raw 12-bit count to battery volts.
pub fn raw_to_volts(raw: u16, vref_mv: u16) -> f32 {
    f32::from(raw) / ADC_COUNTS * BOARD_SCALE * (f32::from(vref_mv) / 1000.0)
}

pub struct AdcBattery {
    vref_mv: u16,
    #[cfg(target_os = "espidf")]
    handle: esp_idf_sys::adc_oneshot_unit_handle_t,
}

// SAFETY: the oneshot handle is only used from the owning task.
#[cfg(target_os = "espidf")]
unsafe impl Send for AdcBattery {}

#[cfg(target_os = "espidf")]
impl AdcBattery {
    pub fn new(vref_mv: u16) -> crate::error::Result<Self> {
        use esp_idf_sys::*;

        let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
        let init_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
            ..Default::default()
        };
        // SAFETY: `handle` is a valid out-pointer; called once at boot.
        let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut handle) };
        if ret != ESP_OK as i32 {
            return Err(crate::error::Error::Hardware(ret));
        }
        let chan_cfg = adc_oneshot_chan_cfg_t {
            atten: adc_atten_t_ADC_ATTEN_DB_12,
            bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        // SAFETY: `handle` was initialised above.
        let ret =
            unsafe { adc_oneshot_config_channel(handle, adc_channel_t_ADC_CHANNEL_0, &chan_cfg) };
        if ret != ESP_OK as i32 {
            return Err(crate::error::Error::Hardware(ret));
        }
        log::info!("battery: ADC1 CH0 configured, vref={}mV", vref_mv);
        Ok(Self { vref_mv, handle })
    }

    fn read_raw(&mut self) -> Option<u16> {
        let mut raw: i32 = 0;
        // SAFETY: the handle is valid for the lifetime of `self`.
        let ret = unsafe {
            esp_idf_sys::adc_oneshot_read(self.handle, esp_idf_sys::adc_channel_t_ADC_CHANNEL_0, &mut raw)
        };
        if ret != esp_idf_sys::ESP_OK as i32 {
            log::warn!("battery: ADC read failed (rc={})", ret);
            return None;
        }
        Some(raw as u16)
    }
}

#[cfg(not(target_os = "espidf"))]
impl AdcBattery {
    pub fn new(vref_mv: u16) -> crate::error::Result<Self> {
        Ok(Self { vref_mv })
    }

    fn read_raw(&mut self) -> Option<u16> {
        match SIM_BATTERY_ADC.load(Ordering::Relaxed) {
            0 => None,
            raw => Some(raw),
        }
    }
}

impl BatteryMonitor for AdcBattery {
    fn voltage(&mut self) -> Option<f32> {
        self.read_raw().map(|raw| raw_to_volts(raw, self.vref_mv))
    }
}
