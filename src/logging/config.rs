// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration for logging.

use crate::logging::structured::{LogFormat, LoggerConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logging configuration, read from `feign.logging`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether to use structured logging
    #[serde(default)]
    pub structured: bool,

    /// Log format (terminal or json)
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_level")]
    pub level: String,

    /// Include source code location
    #[serde(default = "default_true")]
    pub include_location: bool,

    #[serde(default = "default_true")]
    pub include_thread_id: bool,

    /// Static fields to include in all logs
    #[serde(default)]
    pub static_fields: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_format() -> String {
    "terminal".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            structured: false,
            format: default_format(),
            level: default_level(),
            include_location: true,
            include_thread_id: true,
            static_fields: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// The configured level; unknown names mean `info`.
    pub fn level_filter(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::Info)
    }

    /// Convert to the structured logger's config.
    pub fn to_logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            format: match self.format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Terminal,
            },
            level: match self.level.to_lowercase().as_str() {
                "trace" => slog::Level::Trace,
                "debug" => slog::Level::Debug,
                "warn" => slog::Level::Warning,
                "error" => slog::Level::Error,
                "critical" => slog::Level::Critical,
                _ => slog::Level::Info,
            },
            include_location: self.include_location,
            include_thread_id: self.include_thread_id,
            static_fields: self
                .static_fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}
