// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request interceptors
//!
//! An interceptor is a pure `request -> request` function that runs before
//! the transport on every attempt, retries included. Several interceptors
//! apply in the order given, each seeing the previous one's output.
//!
//! Built-in kinds can also be created from configuration by name:
//!
//! | type | config |
//! |------|--------|
//! | `header`     | `{ "set": { "x-api-key": "…" }, "remove": ["cookie"] }` |
//! | `basic_auth` | `{ "username": "…", "password": "…" }` |


use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::core::{BoxResponse, FeignError, ReactiveHttpClient, ReactiveHttpRequest};
use crate::{debug_fmt, error_fmt, trace_fmt};

/// Rewrites an outgoing request.
pub trait ReactiveHttpRequestInterceptor: Send + Sync {
    /// Produce the request to send in place of `request`.
    fn intercept(&self, request: ReactiveHttpRequest) -> ReactiveHttpRequest;

    /// Name used in logs.
    fn name(&self) -> &str {
        "fn"
    }
}

impl<F> ReactiveHttpRequestInterceptor for F
where
    F: Fn(ReactiveHttpRequest) -> ReactiveHttpRequest + Send + Sync,
{
    fn intercept(&self, request: ReactiveHttpRequest) -> ReactiveHttpRequest {
        self(request)
    }
}

/// Several interceptors applied in order.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn ReactiveHttpRequestInterceptor>>,
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.interceptors.iter().map(|i| i.name()))
            .finish()
    }
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, interceptor: Arc<dyn ReactiveHttpRequestInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn ReactiveHttpRequestInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl ReactiveHttpRequestInterceptor for InterceptorChain {
    fn intercept(&self, request: ReactiveHttpRequest) -> ReactiveHttpRequest {
        self.interceptors.iter().fold(request, |request, interceptor| {
            trace_fmt!("Interceptor", "applying '{}'", interceptor.name());
            interceptor.intercept(request)
        })
    }

    fn name(&self) -> &str {
        "chain"
    }
}

/// Runs an interceptor and hands the result to the wrapped client.
pub struct InterceptorReactiveHttpClient {
    inner: Arc<dyn ReactiveHttpClient>,
    interceptor: Arc<dyn ReactiveHttpRequestInterceptor>,
}

impl fmt::Debug for InterceptorReactiveHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorReactiveHttpClient")
            .field("interceptor", &self.interceptor.name())
            .field("inner", &self.inner)
            .finish()
    }
}

impl InterceptorReactiveHttpClient {
    pub fn new(
        inner: Arc<dyn ReactiveHttpClient>,
        interceptor: Arc<dyn ReactiveHttpRequestInterceptor>,
    ) -> Self {
        Self { inner, interceptor }
    }
}

#[async_trait]
impl ReactiveHttpClient for InterceptorReactiveHttpClient {
    async fn execute_request(
        &self,
        request: ReactiveHttpRequest,
    ) -> Result<BoxResponse, FeignError> {
        self.inner
            .execute_request(self.interceptor.intercept(request))
            .await
    }
}

/// Configuration for a header interceptor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeaderInterceptorConfig {
    /// Headers to add or replace
    #[serde(default)]
    pub set: HashMap<String, String>,

    /// Headers added only when the request does not carry them yet
    #[serde(default)]
    pub defaults: HashMap<String, String>,

    /// Headers to remove
    #[serde(default)]
    pub remove: Vec<String>,
}

/// Sets, defaults and removes fixed headers.
#[derive(Debug, Clone)]
pub struct HeaderInterceptor {
    set: Vec<(HeaderName, HeaderValue)>,
    defaults: Vec<(HeaderName, HeaderValue)>,
    remove: Vec<HeaderName>,
}

impl HeaderInterceptor {
    /// Validate the configured names and values.
    pub fn new(config: HeaderInterceptorConfig) -> Result<Self, FeignError> {
        let set = parse_headers(&config.set)?;
        let defaults = parse_headers(&config.defaults)?;
        let remove = config
            .remove
            .iter()
            .map(|name| HeaderName::from_bytes(name.as_bytes()).map_err(FeignError::from))
            .collect::<Result<Vec<_>, FeignError>>()?;
        Ok(Self {
            set,
            defaults,
            remove,
        })
    }

    /// An interceptor that sets a single header.
    pub fn single(name: &str, value: &str) -> Result<Self, FeignError> {
        let mut set = HashMap::new();
        set.insert(name.to_string(), value.to_string());
        Self::new(HeaderInterceptorConfig {
            set,
            ..HeaderInterceptorConfig::default()
        })
    }
}

impl ReactiveHttpRequestInterceptor for HeaderInterceptor {
    fn intercept(&self, request: ReactiveHttpRequest) -> ReactiveHttpRequest {
        let mut headers = request.headers().clone();
        for name in &self.remove {
            headers.remove(name);
        }
        for (name, value) in &self.set {
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in &self.defaults {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        request.with_headers(headers)
    }

    fn name(&self) -> &str {
        "header"
    }
}

fn parse_headers(
    headers: &HashMap<String, String>,
) -> Result<Vec<(HeaderName, HeaderValue)>, FeignError> {
    headers
        .iter()
        .map(|(name, value)| {
            Ok((
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            ))
        })
        .collect()
}

/// Configuration for a basic-auth interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

/// Sets `Authorization: Basic …` on every request.
#[derive(Debug, Clone)]
pub struct BasicAuthInterceptor {
    value: HeaderValue,
}

impl BasicAuthInterceptor {
    pub fn new(username: &str, password: &str) -> Result<Self, FeignError> {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))?;
        value.set_sensitive(true);
        Ok(Self { value })
    }
}

impl ReactiveHttpRequestInterceptor for BasicAuthInterceptor {
    fn intercept(&self, request: ReactiveHttpRequest) -> ReactiveHttpRequest {
        let mut headers = request.headers().clone();
        headers.insert(AUTHORIZATION, self.value.clone());
        request.with_headers(headers)
    }

    fn name(&self) -> &str {
        "basic_auth"
    }
}

/// Constructor signature every configurable interceptor must implement.
pub type InterceptorConstructor =
    fn(serde_json::Value) -> Result<Arc<dyn ReactiveHttpRequestInterceptor>, FeignError>;

static INTERCEPTOR_REGISTRY: Lazy<RwLock<HashMap<String, InterceptorConstructor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register an interceptor kind under a unique name, so that configuration
/// can refer to it.
///
/// ```rust
/// use reactive_feign::interceptor::register_interceptor;
/// use reactive_feign::ReactiveHttpRequest;
///
/// register_interceptor("tenant", |cfg| {
///     let tenant = cfg["id"].as_str().unwrap_or("default").to_string();
///     Ok(std::sync::Arc::new(move |request: ReactiveHttpRequest| {
///         request.clone().with_header("x-tenant", &tenant).unwrap_or(request)
///     }))
/// });
/// ```
pub fn register_interceptor(name: &str, ctor: InterceptorConstructor) {
    INTERCEPTOR_REGISTRY
        .write()
        .expect("INTERCEPTOR_REGISTRY poisoned")
        .insert(name.to_string(), ctor);
}

fn get_registered_interceptor(name: &str) -> Option<InterceptorConstructor> {
    INTERCEPTOR_REGISTRY
        .read()
        .expect("INTERCEPTOR_REGISTRY poisoned")
        .get(name)
        .copied()
}

/// Factory for creating interceptors from configuration.
#[derive(Debug)]
pub struct InterceptorFactory;

impl InterceptorFactory {
    /// Create an interceptor from its type name and configuration.
    pub fn create_interceptor(
        kind: &str,
        config: serde_json::Value,
    ) -> Result<Arc<dyn ReactiveHttpRequestInterceptor>, FeignError> {
        debug_fmt!("Interceptor", "Creating interceptor of type '{}'", kind);

        if let Some(ctor) = get_registered_interceptor(kind) {
            return ctor(config);
        }

        match kind {
            "header" => {
                let config: HeaderInterceptorConfig =
                    serde_json::from_value(config).map_err(|e| invalid_config(kind, e))?;
                Ok(Arc::new(HeaderInterceptor::new(config)?))
            }
            "basic_auth" => {
                let config: BasicAuthConfig =
                    serde_json::from_value(config).map_err(|e| invalid_config(kind, e))?;
                Ok(Arc::new(BasicAuthInterceptor::new(
                    &config.username,
                    &config.password,
                )?))
            }
            _ => {
                let err = FeignError::Configuration(format!("unknown interceptor type: {kind}"));
                error_fmt!("Interceptor", "{}", err);
                Err(err)
            }
        }
    }
}

fn invalid_config(kind: &str, e: serde_json::Error) -> FeignError {
    let err = FeignError::Configuration(format!("invalid {kind} interceptor config: {e}"));
    error_fmt!("Interceptor", "{}", err);
    err
}
