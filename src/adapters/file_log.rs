//! Filesystem log appender.
//!
//! Implements [`LogAppender`] over `std::fs`, which ESP-IDF routes through
//! its VFS layer to the mounted SPIFFS partition. Log paths are joined
//! onto a root directory (`/spiffs` on hardware, a temp dir in tests).
//!
//! Each file is rotated once it holds `max_entries` lines: it is
//! renamed to `bacMMDDYY.<name>` (local date) and the next append starts a
//! fresh file. A backup with the same name is replaced.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::app::ports::{LogAppender, StorageError, WallClock};

/// Lines kept in a log file before it is rotated.
pub const MAX_ENTRIES: usize = 50_000;

pub struct FileLogAppender {
    root: PathBuf,
    max_entries: usize,
    clock: Arc<dyn WallClock>,
    utc_offset_secs: i32,
    /// Line count per relative path, loaded lazily on first append.
    lines: HashMap<String, usize>,
}

impl FileLogAppender {
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn WallClock>, utc_offset_secs: i32) -> Self {
        Self {
            root: root.into(),
            max_entries: MAX_ENTRIES,
            clock,
            utc_offset_secs,
            lines: HashMap::new(),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn count_lines(path: &Path) -> usize {
        match fs::File::open(path) {
            Ok(f) => BufReader::new(f).lines().count(),
            Err(_) => 0,
        }
    }

    /// Backup name for `name` stamped with today's local date.
    fn backup_name(&self, name: &str) -> String {
        let local = self.clock.now_unix() + i64::from(self.utc_offset_secs);
        let (year, month, day) = civil_from_days(local.div_euclid(86_400));
        format!("bac{:02}{:02}{:02}.{}", month, day, year.rem_euclid(100), name)
    }

    fn rotate(&self, full: &Path) {
        let Some(name) = full.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let backup = full.with_file_name(self.backup_name(name));
        if backup.exists() {
            if let Err(e) = fs::remove_file(&backup) {
                warn!("LogFile: cannot remove {} ({})", backup.display(), e);
            }
        }
        match fs::rename(full, &backup) {
            Ok(()) => info!("LogFile: rotated {} to {}", full.display(), backup.display()),
            Err(e) => warn!("LogFile: rotate {} failed ({})", full.display(), e),
        }
    }
}

impl LogAppender for FileLogAppender {
    fn append(&mut self, path: &str, line: &str) -> Result<(), StorageError> {
        let full = self.resolve(path);
        let count = *self
            .lines
            .entry(path.to_owned())
            .or_insert_with(|| Self::count_lines(&full));

        let count = if count >= self.max_entries {
            self.rotate(&full);
            0
        } else {
            count
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .map_err(|e| {
                warn!("LogFile: open {} failed ({})", full.display(), e);
                StorageError::IoError
            })?;
        writeln!(file, "{}", line).map_err(|e| {
            warn!("LogFile: write {} failed ({})", full.display(), e);
            StorageError::IoError
        })?;
        self.lines.insert(path.to_owned(), count + 1);
        Ok(())
    }
}

/// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Register the SPIFFS partition under `/spiffs`, formatting it if the
/// mount fails.
#[cfg(target_os = "espidf")]
pub fn mount_spiffs() -> crate::error::Result<PathBuf> {
    use esp_idf_svc::sys::{ESP_OK, esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register};

    let conf = esp_vfs_spiffs_conf_t {
        base_path: c"/spiffs".as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: true,
    };
    // SAFETY: `conf` and its static strings outlive the call.
    let ret = unsafe { esp_vfs_spiffs_register(&conf) };
    if ret != ESP_OK as i32 {
        return Err(crate::error::Error::Hardware(ret));
    }
    info!("LogFile: SPIFFS mounted at /spiffs");
    Ok(PathBuf::from("/spiffs"))
}
