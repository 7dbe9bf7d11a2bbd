//! Sensirion SHT4x temperature / humidity sensor over I2C.
//!
//! Single-shot, high-repeatability measurement (command `0xFD`). The
//! result is six bytes: temperature word, CRC, humidity word, CRC. Each
//! word is checked with the Sensirion CRC-8 (poly 0x31, init 0xFF).
//!
//! The base node carries this sensor indoors.

use core::time::Duration;

use embedded_hal::i2c::I2c;
use log::warn;

use crate::app::ports::{SensorError, SensorSource};
use crate::reading::{RawReading, SensorId};

pub const DEFAULT_ADDRESS: u8 = 0x44;

const CMD_MEASURE_HIGH: u8 = 0xFD;
const CMD_SOFT_RESET: u8 = 0x94;

/// Datasheet max for high repeatability is 8.3 ms.
const MEASURE_DELAY: Duration = Duration::from_millis(10);

pub struct Sht4x<I2C> {
    i2c: I2C,
    address: u8,
    pending: bool,
}

impl<I2C: I2c> Sht4x<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            pending: false,
        }
    }

    pub fn soft_reset(&mut self) -> Result<(), SensorError> {
        self.pending = false;
        self.i2c
            .write(self.address, &[CMD_SOFT_RESET])
            .map_err(|_| SensorError::Bus)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c + Send> SensorSource for Sht4x<I2C> {
    fn id(&self) -> SensorId {
        SensorId::Sht4x
    }

    fn start_measurement(&mut self) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &[CMD_MEASURE_HIGH])
            .map_err(|_| SensorError::Bus)?;
        self.pending = true;
        Ok(())
    }

    fn measurement_delay(&self) -> Duration {
        MEASURE_DELAY
    }

    fn read(&mut self) -> Result<RawReading, SensorError> {
        if !self.pending {
            return Err(SensorError::NotReady);
        }
        let mut buf = [0u8; 6];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(|_| SensorError::Bus)?;
        self.pending = false;
        decode(&buf)
    }
}

/// Sensirion CRC-8 over one data word.
pub(crate) fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn decode(buf: &[u8; 6]) -> Result<RawReading, SensorError> {
    if crc8(&buf[0..2]) != buf[2] || crc8(&buf[3..5]) != buf[5] {
        warn!("SHT4x: CRC mismatch");
        return Err(SensorError::Checksum);
    }
    let t_ticks = f32::from(u16::from_be_bytes([buf[0], buf[1]]));
    let rh_ticks = f32::from(u16::from_be_bytes([buf[3], buf[4]]));
    Ok(RawReading {
        temperature_c: -45.0 + 175.0 * t_ticks / 65535.0,
        humidity_pct: (-6.0 + 125.0 * rh_ticks / 65535.0).clamp(0.0, 100.0),
        pressure_hpa: None,
    })
}
