//! CSV log records for the durable append log.
//!
//! One row per sample: `ts,temp,hum,press,battery`, temperature with two
//! decimals, humidity and pressure with one. Absent pressure or battery
//! leave their column empty. Samples stamped before the clock was set are
//! not logged.

use core::fmt::Write as _;
use core::time::Duration;

use log::{info, warn};

use crate::app::ports::LogAppender;
use crate::pipeline::channels::PipelineChannels;
use crate::reading::{Origin, Sample};

pub const OUTSIDE_LOG: &str = "/outside_log.csv";
pub const INSIDE_LOG: &str = "/inside_log.csv";

pub type CsvRow = heapless::String<64>;

pub fn log_path(origin: Origin) -> &'static str {
    match origin {
        Origin::Local => INSIDE_LOG,
        Origin::Remote => OUTSIDE_LOG,
    }
}

/// Multiples of ten an `i32` timestamp can hold.
const FIRST_ROUNDED: i32 = i32::MIN / 10 * 10;
const LAST_ROUNDED: i32 = i32::MAX / 10 * 10;

/// Nearest multiple of ten seconds, ties upward. Saturates at both ends
/// of the `i32` range.
pub fn round_to_10s(ts: i32) -> i32 {
    let rounded = (i64::from(ts) + 5).div_euclid(10) * 10;
    rounded.clamp(i64::from(FIRST_ROUNDED), i64::from(LAST_ROUNDED)) as i32
}

/// Format one row, or `None` when the sample's time is implausible.
pub fn csv_row(sample: &Sample) -> Option<CsvRow> {
    let r = &sample.reading;
    if !r.has_plausible_time() {
        return None;
    }
    let mut row = CsvRow::new();
    write!(
        row,
        "{},{:.2},{:.1},",
        round_to_10s(r.timestamp),
        r.temperature_c,
        r.humidity_pct
    )
    .ok()?;
    if let Some(p) = r.pressure_hpa {
        write!(row, "{:.1}", p).ok()?;
    }
    row.push(',').ok()?;
    if let Some(b) = sample.battery_pct {
        write!(row, "{}", b).ok()?;
    }
    Some(row)
}

/// Outcome of logging one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Written,
    /// Timestamp not plausible.
    Skipped,
    Failed,
}

/// Consumer of the `log` sink.
pub struct LogWriter<A: LogAppender> {
    appender: A,
}

impl<A: LogAppender> LogWriter<A> {
    pub fn new(appender: A) -> Self {
        Self { appender }
    }

    pub fn write(&mut self, sample: &Sample) -> LogOutcome {
        let Some(row) = csv_row(sample) else {
            warn!(
                "Log: implausible timestamp {}, skipping",
                sample.reading.timestamp
            );
            return LogOutcome::Skipped;
        };
        let path = log_path(sample.origin);
        match self.appender.append(path, &row) {
            Ok(()) => {
                info!("Log: {} <- {}", path, row);
                LogOutcome::Written
            }
            Err(e) => {
                warn!("Log: append to {} failed ({}), record dropped", path, e);
                LogOutcome::Failed
            }
        }
    }

    /// Write one sample taken from the `log` sink. A local sample releases
    /// the cycle's completion signal once its row was attempted.
    pub fn store(&mut self, sample: &Sample, channels: &PipelineChannels) -> LogOutcome {
        let outcome = self.write(sample);
        if sample.origin == Origin::Local {
            channels.local_done.signal(());
        }
        outcome
    }

    /// Store the next queued sample if one arrives within `timeout`.
    pub fn run_once(&mut self, channels: &PipelineChannels, timeout: Duration) -> Option<LogOutcome> {
        let sample = channels.log.take_timeout(timeout)?;
        Some(self.store(&sample, channels))
    }

    /// Long-lived task body.
    pub fn run(&mut self, channels: &PipelineChannels) {
        loop {
            let sample = channels.log.take();
            self.store(&sample, channels);
        }
    }

    pub fn appender(&self) -> &A {
        &self.appender
    }
}
