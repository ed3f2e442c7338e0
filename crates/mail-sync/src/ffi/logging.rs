//! Logging backend that forwards `log` records to the host
//!
//! Sync code logs through the `log` facade; once a callback is installed
//! the records reach the host's own logger (Logcat on Android).

use std::sync::{Arc, OnceLock, RwLock};

use log::{Level, Log, Metadata, Record, SetLoggerError};

use super::types::{FfiLogLevel, LogCallback};

/// Global storage for the FFI logger
static FFI_LOGGER: OnceLock<FfiLogger> = OnceLock::new();

/// FFI Logger that forwards to a callback when set
struct FfiLogger {
    callback: RwLock<Option<Arc<dyn LogCallback>>>,
    max_level: RwLock<Level>,
}

impl FfiLogger {
    fn new(max_level: Level) -> Self {
        Self {
            callback: RwLock::new(None),
            max_level: RwLock::new(max_level),
        }
    }

    fn set_callback(&self, callback: Option<Arc<dyn LogCallback>>) {
        if let Ok(mut guard) = self.callback.write() {
            *guard = callback;
        }
    }

    fn set_max_level(&self, level: Level) {
        if let Ok(mut guard) = self.max_level.write() {
            *guard = level;
        }
    }

    fn get_max_level(&self) -> Level {
        self.max_level.read().map(|l| *l).unwrap_or(Level::Info)
    }
}

impl Log for FfiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.get_max_level()
            && self
                .callback
                .read()
                .ok()
                .is_some_and(|cb| cb.is_some())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Ok(guard) = self.callback.read()
            && let Some(ref callback) = *guard
        {
            callback.on_log(
                FfiLogLevel::from(record.level()),
                record.target().to_string(),
                record.args().to_string(),
            );
        }
    }

    fn flush(&self) {}
}

/// Install the callback logger as the global `log` backend
///
/// Call once at startup. Until a callback is set with [`set_log_callback`],
/// records are dropped. Fails if another logger is already installed.
pub fn init_ffi_logger(max_level: Level) -> Result<(), SetLoggerError> {
    let logger = FFI_LOGGER.get_or_init(|| FfiLogger::new(max_level));
    log::set_logger(logger)?;
    log::set_max_level(max_level.to_level_filter());
    Ok(())
}

/// Replace the callback receiving log records; `None` drops them
pub fn set_log_callback(callback: Option<Arc<dyn LogCallback>>) {
    if let Some(logger) = FFI_LOGGER.get() {
        logger.set_callback(callback);
    }
}

/// Change the maximum level forwarded to the callback
pub fn set_log_level(level: Level) {
    if let Some(logger) = FFI_LOGGER.get() {
        logger.set_max_level(level);
        log::set_max_level(level.to_level_filter());
    }
}

/// Install the logger and its callback in one call from the host
///
/// Safe to call more than once; later calls only swap the callback and level.
#[uniffi::export]
pub fn initialize_logging(callback: Box<dyn LogCallback>, max_level: FfiLogLevel) {
    let level = Level::from(max_level);
    if init_ffi_logger(level).is_err() {
        set_log_level(level);
    }
    set_log_callback(Some(Arc::from(callback)));
}
