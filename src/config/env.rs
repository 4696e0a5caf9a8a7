// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration read from environment variables.
//!
//! `APP__FEIGN__CLIENT__ORDERS__READ_TIMEOUT_MS=500` with prefix `APP` is the
//! key `feign.client.orders.read_timeout_ms`. Segments are separated by a
//! double underscore and lower-cased, so single underscores survive inside
//! a segment. Values are parsed as JSON when possible and kept as strings
//! otherwise.

use serde_json::{Map, Value};
use std::env;

use super::{ConfigError, ConfigProvider, lookup};

const SEPARATOR: &str = "__";

/// Environment variable configuration provider.
#[derive(Debug)]
pub struct EnvConfigProvider {
    prefix: String,
    data: Value,
}

impl EnvConfigProvider {
    /// Load every variable named `<prefix>__…`.
    pub fn new(prefix: &str) -> Self {
        Self::from_vars(prefix, env::vars())
    }

    /// Build the provider from an explicit set of variables.
    pub fn from_vars<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut provider = Self {
            prefix: prefix.to_string(),
            data: Value::Object(Map::new()),
        };
        provider.load(vars);
        provider
    }

    /// Re-read the process environment.
    pub fn refresh(&mut self) {
        self.data = Value::Object(Map::new());
        self.load(env::vars());
    }

    fn load<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{}{SEPARATOR}", self.prefix);
        for (name, raw) in vars {
            let Some(path) = name.strip_prefix(&marker) else {
                continue;
            };
            let segments: Vec<String> = path
                .split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
                .collect();
            if !segments.is_empty() {
                insert(&mut self.data, &segments, parse_value(&raw));
            }
        }
    }
}

/// Place `value` at `path`, creating intermediate objects.
fn insert(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), value);
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl ConfigProvider for EnvConfigProvider {
    fn has(&self, key: &str) -> bool {
        lookup(&self.data, key).is_some()
    }

    fn provider_name(&self) -> &str {
        "env"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(lookup(&self.data, key).cloned())
    }
}
