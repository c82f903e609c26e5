//! Conditional logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! The decode and session pipelines log every capture, which gets noisy when
//! polling a camera. Each module that uses these macros declares its own switch:
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info, log_warn, log_error};
//!
//! log_info!("capture {} admitted", fingerprint.short());
//! ```

/// Info-level log, skipped when the calling module sets `ENABLE_LOGS = false`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Debug-level counterpart of [`log_info!`].
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Warn-level counterpart of [`log_info!`].
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level counterpart of [`log_info!`].
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Initialise `env_logger` from `RUST_LOG`, defaulting to `Info`.
///
/// `STOCKSCAN_DEBUG=1` (or `true`) lowers the default to `Debug`.
pub fn init() {
    let debug_mode = std::env::var("STOCKSCAN_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let level = if debug_mode {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // try_init: tests and embedders may have installed a logger already
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}
