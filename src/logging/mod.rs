// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-wide logging setup.
//!
//! Everything in the crate logs through the `log` facade with the
//! `*_fmt!` macros. An application either installs `env_logger` with
//! [`init`], or reads a [`LoggingConfig`] and calls [`init_with_config`],
//! which installs an `slog` logger and bridges `log` records into it when
//! `structured` is set.

pub mod config;
pub mod structured;
#[cfg(test)]
pub mod test_logger;
mod wrapper;

pub use config::LoggingConfig;

use log::LevelFilter;
use once_cell::sync::OnceCell;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use structured::LoggerGuard;

/// Key of the logging section in a [`Config`].
pub const LOGGING_KEY: &str = "feign.logging";

static INIT: Once = Once::new();
static USING_STRUCTURED: AtomicBool = AtomicBool::new(false);
static GLOBAL_GUARD: OnceCell<LoggerGuard> = OnceCell::new();

/// Initialize `env_logger` at `level` (default `info`), unless `RUST_LOG` says
/// otherwise.
///
/// Only the first initialization in a process takes effect.
pub fn init(level: Option<LevelFilter>) {
    INIT.call_once(|| install_env_logger(level));
}

/// Initialize logging from `config`.
///
/// `level` overrides the configured level when given.
pub fn init_with_config(level: Option<LevelFilter>, config: &LoggingConfig) {
    INIT.call_once(|| {
        let level = level.unwrap_or_else(|| config.level_filter());
        if !config.structured {
            install_env_logger(Some(level));
            return;
        }

        let mut logger_config = config.to_logger_config();
        logger_config.level = structured::slog_level(level);
        let guard = structured::init_global_logger(&logger_config);
        if let Err(e) = slog_stdlog::init_with_level(level.to_level().unwrap_or(log::Level::Error)) {
            eprintln!("Failed to bridge log records into slog: {e}");
            install_env_logger(Some(level));
            return;
        }
        log::set_max_level(level);

        let _ = GLOBAL_GUARD.set(guard);
        USING_STRUCTURED.store(true, Ordering::SeqCst);
        log::info!("Structured logging initialized at level: {}", level);
    });
}

/// Initialize logging from the `feign.logging` section of `config`, falling
/// back to [`init`] when the section is missing or invalid.
pub fn init_from_config(config: &Config) {
    match config.get::<LoggingConfig>(LOGGING_KEY) {
        Ok(Some(logging)) => init_with_config(None, &logging),
        Ok(None) => init(None),
        Err(e) => {
            init(None);
            crate::warn_fmt!("Logging", "Ignoring invalid '{}' section: {}", LOGGING_KEY, e);
        }
    }
}

/// Whether log records go to the structured `slog` logger.
pub fn is_structured_logging() -> bool {
    USING_STRUCTURED.load(Ordering::SeqCst)
}

fn install_env_logger(level: Option<LevelFilter>) {
    let default = level.unwrap_or(LevelFilter::Info).as_str().to_lowercase();
    let env = env_logger::Env::default().filter_or("RUST_LOG", default);

    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_target(true)
        .try_init()
        .is_ok()
    {
        log::info!("Logging initialized at level: {}", log::max_level());
    }
}
