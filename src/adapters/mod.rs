//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements         | Connects to                 |
//! |---------------|--------------------|-----------------------------|
//! | `battery_adc` | BatteryMonitor     | ESP32 ADC1 oneshot          |
//! | `file_log`    | LogAppender        | SPIFFS through the VFS      |
//! | `log_display` | Renderer           | Serial log text panel       |
//! | `log_sink`    | EventSink          | Serial log output           |
//! | `nvs`         | ConfigPort         | NVS / in-memory store       |
//! |               | StoragePort        |                             |
//! | `platform`    | Platform           | Deep sleep, esp_restart     |
//! | `radio`       | Radio              | ESP-NOW over Wi-Fi STA      |
//! | `time`        | WallClock          | gettimeofday, esp_timer     |

pub mod battery_adc;
pub mod file_log;
pub mod log_display;
pub mod log_sink;
pub mod nvs;
pub mod platform;
pub mod radio;
pub mod time;
