// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layered client configuration
//!
//! A [`Config`] is an ordered list of [`ConfigProvider`]s; later providers
//! override earlier ones. A typical stack:
//!
//! 1. `FileConfigProvider` – `feign.{toml,json,yaml}`
//! 2. `EnvConfigProvider`  – `APP__FEIGN__CLIENT__ORDERS__TARGET=https://…`
//!
//! Object values are merged key by key across providers, so an environment
//! variable can override a single field of a client section defined in a
//! file. Any other value replaces what earlier providers returned.
//!
//! Client sections live under `feign.client.<name>`; the section
//! `feign.client.default` supplies fallbacks for every client.
//!
//! | key | type | default | description |
//! |-----|------|---------|-------------|
//! | `target`             | *url*    | –       | Base URL requests are resolved against |
//! | `connect_timeout_ms` | *int*    | –       | TCP connect timeout                    |
//! | `read_timeout_ms`    | *int*    | –       | Time allowed until response headers    |
//! | `decode404`          | *bool*   | `false` | Treat `404` as an empty result         |
//! | `follow_redirects`   | *bool*   | `true`  | Follow HTTP redirects                  |
//! | `default_headers`    | *map*    | `{}`    | Headers added to every request         |
//! | `retry`              | *object* | –       | `max_retries`, `backoff_ms`, `max_backoff_ms` |
//! | `logger`             | *object* | –       | `level`, `verbose`, `max_body_size`    |
//! | `interceptors`       | *array*  | `[]`    | `{ type, config }` interceptor entries |
//!
//! Process logging is read from `feign.logging`, see
//! [`LoggingConfig`](crate::logging::LoggingConfig).

mod client;
mod env;
pub mod error;
mod file;

#[cfg(test)]
mod tests;

pub use client::{ClientProperties, InterceptorProperties, LoggerProperties, RetryProperties};
pub use env::EnvConfigProvider;
pub use error::ConfigError;
pub use file::{FileConfigProvider, FileFormat};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// A source of configuration values. Object-safe.
pub trait ConfigProvider: Debug + Send + Sync {
    /// Whether the provider has a value for the given key.
    fn has(&self, key: &str) -> bool;

    /// Name of the provider, for diagnostics.
    fn provider_name(&self) -> &str;

    /// Raw value for a dot-separated key.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// Typed access on top of [`ConfigProvider`].
pub trait ConfigProviderExt: ConfigProvider {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get_raw(key)?
            .map(|value| deserialize(key, value))
            .transpose()
    }
}

impl<T: ConfigProvider> ConfigProviderExt for T {}

fn deserialize<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, ConfigError> {
    serde_json::from_value(value)
        .map_err(|e| ConfigError::ParseError(format!("failed to deserialize '{key}': {e}")))
}

/// Walk a dot-separated path through nested objects.
pub(crate) fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(root, |current, part| current.as_object()?.get(part))
}

/// Merge `overlay` into `base`; objects merge recursively, anything else
/// replaces.
pub(crate) fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider; it overrides every provider added before it.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn build(self) -> Config {
        Config {
            providers: self.providers,
        }
    }
}

/// Configuration assembled from several providers.
#[derive(Debug, Clone)]
pub struct Config {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// The value for `key` across all providers.
    pub fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let mut merged: Option<Value> = None;
        for provider in self.providers.iter().filter(|p| p.has(key)) {
            if let Some(value) = provider.get_raw(key)? {
                match merged.as_mut() {
                    Some(current) => merge(current, value),
                    None => merged = Some(value),
                }
            }
        }
        Ok(merged)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get_raw(key)?
            .map(|value| deserialize(key, value))
            .transpose()
    }

    pub fn get_or_default<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// A configuration backed by a single file.
    pub fn from_file(file_path: &str) -> Result<Self, ConfigError> {
        let provider = FileConfigProvider::new(file_path)?;
        Ok(Self::builder().with_provider(provider).build())
    }
}
