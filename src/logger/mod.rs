// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Call logging.
//!
//! [`LoggerReactiveHttpClient`] observes a call without changing it: it
//! reports the outgoing request, the arrival of the response headers, and
//! each body element as the final subscriber pulls it. It never reads the
//! body on its own, so the body is still consumed exactly once.
//!
//! Observations go to a [`ReactiveLoggerListener`]. Listener hooks are
//! isolated from the call: a hook that panics is reported and ignored.


use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use log::Level;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::core::{
    BodyStream, BoxResponse, FeignError, HttpMethod, ReactiveHttpClient, ReactiveHttpRequest,
    ReactiveHttpResponse,
};
use crate::{debug_fmt, error_fmt, info_fmt, trace_fmt, warn_fmt};

/// Identification and timing shared by every observation of one call.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Unique id of the logical call
    pub call_id: Uuid,
    /// Method tag of the client
    pub method_key: Arc<str>,
    /// HTTP method of the request
    pub method: HttpMethod,
    /// Target URI of the request
    pub uri: String,
    started: Instant,
}

impl LogContext {
    pub fn new(method_key: Arc<str>, request: &ReactiveHttpRequest) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            method_key,
            method: request.method(),
            uri: request.uri().to_string(),
            started: Instant::now(),
        }
    }

    /// Time since the request was dispatched.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Receives the observations of the logging decorator and the retry
/// decorator. Every hook defaults to doing nothing.
#[allow(unused_variables)]
pub trait ReactiveLoggerListener: Send + Sync {
    /// The request is about to be dispatched.
    fn request_started(&self, ctx: &LogContext, request: &ReactiveHttpRequest) {}

    /// The first chunk of the request body was produced.
    fn request_body(&self, ctx: &LogContext, chunk: &Bytes) {}

    /// Status and headers arrived.
    fn response_received(
        &self,
        ctx: &LogContext,
        status: u16,
        headers: &HeaderMap,
        elapsed: Duration,
    ) {
    }

    /// A body element was delivered to the subscriber.
    fn body_element(&self, ctx: &LogContext, element: &Value, elapsed: Duration) {}

    /// The call or its body failed.
    fn error_received(&self, ctx: &LogContext, error: &FeignError, elapsed: Duration) {}

    /// The retry policy allowed another attempt.
    fn retry_attempt(&self, method_key: &str, retry: usize, error: &FeignError) {}
}

/// Run a listener hook, swallowing a panic.
pub(crate) fn notify<F: FnOnce()>(hook: &str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn_fmt!("ReactiveLogger", "listener hook '{}' panicked; ignored", hook);
    }
}

/// Configuration for the default logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Whether to log request headers
    #[serde(default = "default_false")]
    pub log_request_headers: bool,

    /// Whether to log the first request body chunk
    #[serde(default = "default_false")]
    pub log_request_body: bool,

    /// Whether to log response headers
    #[serde(default = "default_false")]
    pub log_response_headers: bool,

    /// Whether to log each body element
    #[serde(default = "default_false")]
    pub log_response_body: bool,

    /// Log level to use
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum body size to log (in bytes)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_false() -> bool {
    false
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_max_body_size() -> usize {
    1024
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_request_headers: false,
            log_request_body: false,
            log_response_headers: false,
            log_response_body: false,
            log_level: default_log_level(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl LoggerConfig {
    /// Everything on: headers and bodies in both directions.
    pub fn verbose() -> Self {
        Self {
            log_request_headers: true,
            log_request_body: true,
            log_response_headers: true,
            log_response_body: true,
            ..Self::default()
        }
    }
}

/// Writes observations to the `log` facade.
#[derive(Debug, Default)]
pub struct DefaultReactiveLogger {
    config: LoggerConfig,
}

impl DefaultReactiveLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self { config }
    }

    fn level(&self) -> Level {
        match self.config.log_level.to_lowercase().as_str() {
            "error" => Level::Error,
            "warn" => Level::Warn,
            "info" => Level::Info,
            "debug" => Level::Debug,
            "trace" => Level::Trace,
            _ => Level::Debug,
        }
    }

    fn log(&self, ctx_tag: &str, message: &str) {
        match self.level() {
            Level::Error => error_fmt!("ReactiveLogger", "[{}] {}", ctx_tag, message),
            Level::Warn => warn_fmt!("ReactiveLogger", "[{}] {}", ctx_tag, message),
            Level::Info => info_fmt!("ReactiveLogger", "[{}] {}", ctx_tag, message),
            Level::Debug => debug_fmt!("ReactiveLogger", "[{}] {}", ctx_tag, message),
            Level::Trace => trace_fmt!("ReactiveLogger", "[{}] {}", ctx_tag, message),
        }
    }

    fn tag(ctx: &LogContext) -> String {
        let id = ctx.call_id.simple().to_string();
        format!("{}:{}", ctx.method_key, &id[..8])
    }

    /// One line per header; sensitive values are masked.
    fn format_headers(&self, headers: &HeaderMap) -> Vec<String> {
        headers
            .iter()
            .map(|(name, value)| {
                if value.is_sensitive() {
                    format!("{name}: ***")
                } else {
                    format!("{name}: {}", value.to_str().unwrap_or("<binary>"))
                }
            })
            .collect()
    }

    fn format_body(&self, body: &[u8]) -> String {
        if body.is_empty() {
            return "[Empty body]".to_string();
        }
        if body.len() > self.config.max_body_size {
            return format!(
                "[Body truncated, showing {}/{} bytes] {}",
                self.config.max_body_size,
                body.len(),
                String::from_utf8_lossy(&body[..self.config.max_body_size])
            );
        }
        String::from_utf8_lossy(body).to_string()
    }
}

impl ReactiveLoggerListener for DefaultReactiveLogger {
    fn request_started(&self, ctx: &LogContext, request: &ReactiveHttpRequest) {
        let tag = Self::tag(ctx);
        self.log(&tag, &format!("--> {} {}", ctx.method, ctx.uri));
        if self.config.log_request_headers {
            for line in self.format_headers(request.headers()) {
                self.log(&tag, &format!("--> {line}"));
            }
        }
    }

    fn request_body(&self, ctx: &LogContext, chunk: &Bytes) {
        if self.config.log_request_body {
            self.log(&Self::tag(ctx), &format!("--> {}", self.format_body(chunk)));
        }
    }

    fn response_received(
        &self,
        ctx: &LogContext,
        status: u16,
        headers: &HeaderMap,
        elapsed: Duration,
    ) {
        let tag = Self::tag(ctx);
        self.log(&tag, &format!("<-- {} ({}ms)", status, elapsed.as_millis()));
        if self.config.log_response_headers {
            for line in self.format_headers(headers) {
                self.log(&tag, &format!("<-- {line}"));
            }
        }
    }

    fn body_element(&self, ctx: &LogContext, element: &Value, elapsed: Duration) {
        if self.config.log_response_body {
            let encoded = serde_json::to_vec(element).unwrap_or_default();
            self.log(
                &Self::tag(ctx),
                &format!("<-- {} ({}ms)", self.format_body(&encoded), elapsed.as_millis()),
            );
        }
    }

    fn error_received(&self, ctx: &LogContext, error: &FeignError, elapsed: Duration) {
        self.log(
            &Self::tag(ctx),
            &format!("<-- ERROR {} ({}ms)", error, elapsed.as_millis()),
        );
    }

    fn retry_attempt(&self, method_key: &str, retry: usize, error: &FeignError) {
        self.log(method_key, &format!("retry #{retry} after: {error}"));
    }
}

/// Logs every call of the wrapped client.
pub struct LoggerReactiveHttpClient {
    inner: Arc<dyn ReactiveHttpClient>,
    listener: Arc<dyn ReactiveLoggerListener>,
    method_key: Arc<str>,
}

impl fmt::Debug for LoggerReactiveHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerReactiveHttpClient")
            .field("method_key", &self.method_key)
            .field("inner", &self.inner)
            .finish()
    }
}

impl LoggerReactiveHttpClient {
    pub fn new(
        inner: Arc<dyn ReactiveHttpClient>,
        listener: Arc<dyn ReactiveLoggerListener>,
        method_key: &str,
    ) -> Self {
        Self {
            inner,
            listener,
            method_key: Arc::from(method_key),
        }
    }
}

#[async_trait]
impl ReactiveHttpClient for LoggerReactiveHttpClient {
    async fn execute_request(
        &self,
        request: ReactiveHttpRequest,
    ) -> Result<BoxResponse, FeignError> {
        let ctx = Arc::new(LogContext::new(self.method_key.clone(), &request));
        notify("request_started", || {
            self.listener.request_started(&ctx, &request)
        });

        let tapped = request.body().map(|body| {
            let listener = self.listener.clone();
            let ctx = ctx.clone();
            body.tap_first(move |chunk| {
                notify("request_body", || listener.request_body(&ctx, chunk))
            })
        });
        let request = match tapped {
            Some(body) => request.with_body(body),
            None => request,
        };

        match self.inner.execute_request(request).await {
            Ok(response) => {
                let elapsed = ctx.elapsed();
                notify("response_received", || {
                    self.listener
                        .response_received(&ctx, response.status(), response.headers(), elapsed)
                });
                Ok(Box::new(LoggingResponse {
                    inner: response,
                    ctx,
                    listener: self.listener.clone(),
                }))
            }
            Err(error) => {
                let elapsed = ctx.elapsed();
                notify("error_received", || {
                    self.listener.error_received(&ctx, &error, elapsed)
                });
                Err(error)
            }
        }
    }
}

/// Taps the body of the wrapped response.
struct LoggingResponse {
    inner: BoxResponse,
    ctx: Arc<LogContext>,
    listener: Arc<dyn ReactiveLoggerListener>,
}

impl ReactiveHttpResponse for LoggingResponse {
    fn status(&self) -> u16 {
        self.inner.status()
    }

    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn body(self: Box<Self>) -> BodyStream {
        let LoggingResponse {
            inner,
            ctx,
            listener,
        } = *self;

        inner
            .body()
            .inspect(move |item| {
                let elapsed = ctx.elapsed();
                match item {
                    Ok(element) => notify("body_element", || {
                        listener.body_element(&ctx, element, elapsed)
                    }),
                    Err(error) => notify("error_received", || {
                        listener.error_received(&ctx, error, elapsed)
                    }),
                }
            })
            .boxed()
    }

    fn body_data(self: Box<Self>) -> BoxFuture<'static, Result<Bytes, FeignError>> {
        self.inner.body_data()
    }
}
