// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-client properties.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use super::{Config, ConfigError, merge};
use crate::logger::LoggerConfig;
use crate::retry::{Backoff, BasicRetryPolicy};

/// Key prefix of client sections.
pub const CLIENT_PREFIX: &str = "feign.client";

/// Name of the section every client falls back to.
pub const DEFAULT_CLIENT: &str = "default";

/// Settings of one named client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProperties {
    /// Base URL requests are resolved against
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,

    /// Time allowed until the response headers arrive
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,

    /// Treat `404 Not Found` as an empty result
    #[serde(default)]
    pub decode404: bool,

    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    /// Headers added to every request
    #[serde(default)]
    pub default_headers: HashMap<String, String>,

    #[serde(default)]
    pub retry: Option<RetryProperties>,

    #[serde(default)]
    pub logger: Option<LoggerProperties>,

    #[serde(default)]
    pub interceptors: Vec<InterceptorProperties>,
}

fn default_true() -> bool {
    true
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            target: None,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            decode404: false,
            follow_redirects: true,
            default_headers: HashMap::new(),
            retry: None,
            logger: None,
            interceptors: Vec::new(),
        }
    }
}

impl ClientProperties {
    /// Read `feign.client.<name>` on top of `feign.client.default`.
    pub fn load(config: &Config, name: &str) -> Result<Self, ConfigError> {
        let defaults = config.get_raw(&format!("{CLIENT_PREFIX}.{DEFAULT_CLIENT}"))?;
        let named = if name == DEFAULT_CLIENT {
            None
        } else {
            config.get_raw(&format!("{CLIENT_PREFIX}.{name}"))?
        };

        let mut merged = defaults.unwrap_or_else(|| Value::Object(Default::default()));
        if let Some(named) = named {
            merge(&mut merged, named);
        }
        serde_json::from_value(merged).map_err(|e| {
            ConfigError::ParseError(format!("invalid properties for client '{name}': {e}"))
        })
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

/// Settings of the built-in retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryProperties {
    #[serde(default)]
    pub max_retries: usize,

    /// Delay before the first retry; `0` retries immediately
    #[serde(default)]
    pub backoff_ms: u64,

    /// Cap of an exponential backoff; without it the delay is fixed
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
}

impl RetryProperties {
    pub fn backoff(&self) -> Backoff {
        let initial = Duration::from_millis(self.backoff_ms);
        match (self.backoff_ms, self.max_backoff_ms) {
            (0, _) => Backoff::None,
            (_, Some(max)) => Backoff::Exponential {
                initial,
                max: Duration::from_millis(max),
            },
            (_, None) => Backoff::Fixed(initial),
        }
    }

    pub fn to_policy(&self) -> BasicRetryPolicy {
        BasicRetryPolicy::new(self.max_retries).with_backoff(self.backoff())
    }
}

/// Settings of the default call logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerProperties {
    #[serde(default = "default_level")]
    pub level: String,

    /// Log headers and bodies as well
    #[serde(default)]
    pub verbose: bool,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_level() -> String {
    "debug".to_string()
}

fn default_max_body_size() -> usize {
    1024
}

impl LoggerProperties {
    pub fn to_logger_config(&self) -> LoggerConfig {
        let base = if self.verbose {
            LoggerConfig::verbose()
        } else {
            LoggerConfig::default()
        };
        LoggerConfig {
            log_level: self.level.clone(),
            max_body_size: self.max_body_size,
            ..base
        }
    }
}

/// One interceptor created through the interceptor factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptorProperties {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub config: Value,
}
