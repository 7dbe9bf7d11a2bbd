//! I2C sensor drivers implementing [`SensorSource`](crate::app::ports::SensorSource).
//!
//! | Driver   | Node    | Measures                       |
//! |----------|---------|--------------------------------|
//! | `bme280` | outside | temperature, humidity, pressure|
//! | `sht4x`  | base    | temperature, humidity          |
//!
//! Both drivers are generic over `embedded_hal::i2c::I2c`, so on hardware
//! they sit on an `embedded-hal-bus` device sharing one ESP-IDF I2C
//! driver, and in tests on a register fake.

pub mod bme280;
pub mod sht4x;
