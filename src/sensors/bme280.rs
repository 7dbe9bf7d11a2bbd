//! Bosch BME280 temperature / humidity / pressure sensor over I2C.
//!
//! Forced mode, x1 oversampling on all three channels, filter off. Each
//! `start_measurement` writes `ctrl_meas` with mode = forced; the chip
//! converts once and returns to sleep. Compensation uses the floating
//! point formulas from the datasheet, section 8.1.
//!
//! The outside node carries this sensor.

use core::time::Duration;

use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::app::ports::{SensorError, SensorSource};
use crate::reading::{RawReading, SensorId};

pub const DEFAULT_ADDRESS: u8 = 0x76;

const CHIP_ID: u8 = 0x60;

const REG_CALIB_00: u8 = 0x88;
const REG_CHIP_ID: u8 = 0xD0;
const REG_CALIB_26: u8 = 0xE1;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_STATUS: u8 = 0xF3;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_DATA: u8 = 0xF7;

const STATUS_MEASURING: u8 = 0x08;
/// osrs_t = x1, osrs_p = x1, mode = forced.
const CTRL_MEAS_FORCED: u8 = 0b001_001_01;
const CTRL_HUM_X1: u8 = 0x01;

/// Typical 8 ms at x1/x1/x1; max 9.3 ms.
const MEASURE_DELAY: Duration = Duration::from_millis(10);

/// Factory trim values read once at init.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Trim {
    t1: u16,
    t2: i16,
    t3: i16,
    p1: u16,
    p2: i16,
    p3: i16,
    p4: i16,
    p5: i16,
    p6: i16,
    p7: i16,
    p8: i16,
    p9: i16,
    h1: u8,
    h2: i16,
    h3: u8,
    h4: i16,
    h5: i16,
    h6: i8,
}

impl Trim {
    /// `a` is 0x88..=0xA1, `b` is 0xE1..=0xE7.
    fn parse(a: &[u8; 26], b: &[u8; 7]) -> Self {
        let u = |i: usize| u16::from_le_bytes([a[i], a[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([a[i], a[i + 1]]);
        Self {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p2: s(8),
            p3: s(10),
            p4: s(12),
            p5: s(14),
            p6: s(16),
            p7: s(18),
            p8: s(20),
            p9: s(22),
            h1: a[25],
            h2: i16::from_le_bytes([b[0], b[1]]),
            h3: b[2],
            h4: (i16::from(b[3] as i8) << 4) | i16::from(b[4] & 0x0F),
            h5: (i16::from(b[5] as i8) << 4) | i16::from(b[4] >> 4),
            h6: b[6] as i8,
        }
    }

    /// Returns (°C, t_fine).
    fn temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc = f64::from(adc_t);
        let t1 = f64::from(self.t1);
        let var1 = (adc / 16384.0 - t1 / 1024.0) * f64::from(self.t2);
        let d = adc / 131_072.0 - t1 / 8192.0;
        let var2 = d * d * f64::from(self.t3);
        let t_fine = var1 + var2;
        (t_fine / 5120.0, t_fine)
    }

    /// Pascals; `None` if the trim would divide by zero.
    fn pressure(&self, adc_p: i32, t_fine: f64) -> Option<f64> {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * f64::from(self.p6) / 32768.0;
        var2 += var1 * f64::from(self.p5) * 2.0;
        var2 = var2 / 4.0 + f64::from(self.p4) * 65536.0;
        var1 = (f64::from(self.p3) * var1 * var1 / 524_288.0 + f64::from(self.p2) * var1)
            / 524_288.0;
        var1 = (1.0 + var1 / 32768.0) * f64::from(self.p1);
        if var1 == 0.0 {
            return None;
        }
        let mut p = 1_048_576.0 - f64::from(adc_p);
        p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = f64::from(self.p9) * p * p / 2_147_483_648.0;
        let var2 = p * f64::from(self.p8) / 32768.0;
        Some(p + (var1 + var2 + f64::from(self.p7)) / 16.0)
    }

    fn humidity(&self, adc_h: i32, t_fine: f64) -> f64 {
        let mut h = t_fine - 76800.0;
        h = (f64::from(adc_h) - (f64::from(self.h4) * 64.0 + f64::from(self.h5) / 16384.0 * h))
            * (f64::from(self.h2) / 65536.0
                * (1.0
                    + f64::from(self.h6) / 67_108_864.0
                        * h
                        * (1.0 + f64::from(self.h3) / 67_108_864.0 * h)));
        h *= 1.0 - f64::from(self.h1) * h / 524_288.0;
        h.clamp(0.0, 100.0)
    }
}

pub struct Bme280<I2C> {
    i2c: I2C,
    address: u8,
    trim: Trim,
}

impl<I2C: I2c> Bme280<I2C> {
    /// Check the chip id, read the trim and configure humidity sampling.
    pub fn init(mut i2c: I2C, address: u8) -> Result<Self, SensorError> {
        let mut id = [0u8; 1];
        i2c.write_read(address, &[REG_CHIP_ID], &mut id)
            .map_err(|_| SensorError::Bus)?;
        if id[0] != CHIP_ID {
            warn!("BME280: unexpected chip id 0x{:02X}", id[0]);
            return Err(SensorError::Checksum);
        }

        let mut a = [0u8; 26];
        let mut b = [0u8; 7];
        i2c.write_read(address, &[REG_CALIB_00], &mut a)
            .and_then(|()| i2c.write_read(address, &[REG_CALIB_26], &mut b))
            .map_err(|_| SensorError::Bus)?;

        // ctrl_hum only latches on the next ctrl_meas write.
        i2c.write(address, &[REG_CTRL_HUM, CTRL_HUM_X1])
            .and_then(|()| i2c.write(address, &[REG_CONFIG, 0x00]))
            .map_err(|_| SensorError::Bus)?;

        info!("BME280: ready at 0x{:02X}", address);
        Ok(Self {
            i2c,
            address,
            trim: Trim::parse(&a, &b),
        })
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn measuring(&mut self) -> Result<bool, SensorError> {
        let mut status = [0u8; 1];
        self.i2c
            .write_read(self.address, &[REG_STATUS], &mut status)
            .map_err(|_| SensorError::Bus)?;
        Ok(status[0] & STATUS_MEASURING != 0)
    }
}

impl<I2C: I2c + Send> SensorSource for Bme280<I2C> {
    fn id(&self) -> SensorId {
        SensorId::Bme280
    }

    fn start_measurement(&mut self) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &[REG_CTRL_MEAS, CTRL_MEAS_FORCED])
            .map_err(|_| SensorError::Bus)
    }

    fn measurement_delay(&self) -> Duration {
        MEASURE_DELAY
    }

    fn read(&mut self) -> Result<RawReading, SensorError> {
        if self.measuring()? {
            return Err(SensorError::NotReady);
        }
        let mut d = [0u8; 8];
        self.i2c
            .write_read(self.address, &[REG_DATA], &mut d)
            .map_err(|_| SensorError::Bus)?;

        let adc_p = (i32::from(d[0]) << 12) | (i32::from(d[1]) << 4) | (i32::from(d[2]) >> 4);
        let adc_t = (i32::from(d[3]) << 12) | (i32::from(d[4]) << 4) | (i32::from(d[5]) >> 4);
        let adc_h = (i32::from(d[6]) << 8) | i32::from(d[7]);

        let (temperature, t_fine) = self.trim.temperature(adc_t);
        Ok(RawReading {
            temperature_c: temperature as f32,
            humidity_pct: self.trim.humidity(adc_h, t_fine) as f32,
            pressure_hpa: self.trim.pressure(adc_p, t_fine).map(|pa| (pa / 100.0) as f32),
        })
    }
}
