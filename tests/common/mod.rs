// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common test utilities for the integration tests.

use reactive_feign::config::{ConfigError, ConfigProvider};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use reactive_feign::{FeignError, LogContext, ReactiveLoggerListener};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The order resource served by the test servers.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCreamOrder {
    pub id: u64,
    pub flavor: String,
    pub scoops: u32,
}

#[allow(dead_code)]
impl IceCreamOrder {
    pub fn new(id: u64, flavor: &str, scoops: u32) -> Self {
        Self {
            id,
            flavor: flavor.to_string(),
            scoops,
        }
    }

    pub fn json(&self) -> Value {
        json!({"id": self.id, "flavor": self.flavor, "scoops": self.scoops})
    }
}

/// Start a server answering `GET /icecream/orders/42` with one order.
#[allow(dead_code)]
pub async fn start_orders_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/icecream/orders/42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(IceCreamOrder::new(42, "pistachio", 2).json()),
        )
        .mount(&server)
        .await;
    server
}

/// Configuration provider over a fixed JSON document.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct TestConfigProvider {
    data: Value,
    name: String,
}

#[allow(dead_code)]
impl TestConfigProvider {
    pub fn from_json(config: Value) -> Self {
        Self {
            data: config,
            name: "test".to_string(),
        }
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.data, |current, segment| current.get(segment))
    }
}

impl ConfigProvider for TestConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.lookup(key).cloned())
    }
}

/// Listener recording the events of every call as strings.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ReactiveLoggerListener for RecordingListener {
    fn request_started(&self, ctx: &LogContext, _request: &reactive_feign::ReactiveHttpRequest) {
        self.push(format!("request {} {}", ctx.method, ctx.uri));
    }

    fn response_received(
        &self,
        _ctx: &LogContext,
        status: u16,
        _headers: &reqwest::header::HeaderMap,
        _elapsed: Duration,
    ) {
        self.push(format!("status {status}"));
    }

    fn body_element(&self, _ctx: &LogContext, element: &Value, _elapsed: Duration) {
        self.push(format!("element {element}"));
    }

    fn error_received(&self, _ctx: &LogContext, error: &FeignError, _elapsed: Duration) {
        self.push(format!("error {error}"));
    }

    fn retry_attempt(&self, method_key: &str, retry: usize, _error: &FeignError) {
        self.push(format!("retry {method_key} #{retry}"));
    }
}

/// Create a temporary configuration file for testing
#[allow(dead_code)]
pub fn create_temp_config_file(
    content: &str,
    format: &str,
) -> Result<(TempDir, String), std::io::Error> {
    let temp_dir = TempDir::new()?;
    let file_name = format!("feign.{format}");
    let file_path = temp_dir.path().join(&file_name);

    fs::write(&file_path, content)?;

    Ok((temp_dir, file_path.to_string_lossy().to_string()))
}

/// Initialize test logging once per test binary.
#[allow(dead_code)]
pub fn init_test_logging() {
    reactive_feign::logging::init(Some(log::LevelFilter::Debug));
}
