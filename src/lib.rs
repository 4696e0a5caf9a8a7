// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reactive Feign - a declarative HTTP client assembled from decorators
//!
//! A client for one method is a chain of [`ReactiveHttpClient`]s around a
//! transport. Each decorator adds exactly one concern and is configured
//! independently:
//!
//! - **Interceptors** rewrite every outgoing request (headers, auth).
//! - **Status handlers** turn error statuses into [`FeignError`]s, read
//!   lazily from the response body.
//! - **Response mappers** reinterpret responses, e.g. `404` as an empty
//!   result.
//! - **Retry** re-issues the whole call, streaming bodies included, as long
//!   as the retry policy grants permits.
//! - **Logger** observes the call and its body elements without consuming
//!   them.
//!
//! Bodies are asynchronous: a [`ResultKind::Mono`] method yields at most one
//! element, a [`ResultKind::Flux`] method a stream of them.
//!
//! # Configuration System
//!
//! Clients can be built in code or from layered configuration (files in
//! JSON, TOML or YAML, plus environment variables), see [`config`].
//!
//! ```rust,no_run
//! use reactive_feign::{BasicRetryPolicy, Backoff, HttpMethod, MethodMetadata, ReactiveFeignClient};
//! use serde::Deserialize;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Debug, Deserialize)]
//! struct Order {
//!     id: u64,
//! }
//!
//! # async fn run() -> Result<(), reactive_feign::FeignError> {
//! let client = ReactiveFeignClient::builder(MethodMetadata::mono("OrdersApi#get(u64)"))
//!     .target("http://localhost:8080/icecream")?
//!     .decode404()
//!     .retry_policy(Arc::new(
//!         BasicRetryPolicy::new(3).with_backoff(Backoff::Fixed(Duration::from_millis(100))),
//!     ))
//!     .build();
//!
//! let request = client.request(HttpMethod::Get, "/orders/42")?;
//! let order: Option<Order> = client.mono(request).await?;
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod client;
pub mod config;
pub mod core;
pub mod interceptor;
pub mod logger;
pub mod logging;
pub mod mapper;
pub mod retry;
pub mod status;
pub mod transport;

#[doc(hidden)]
pub use log as __log;

// Re-export key types at the crate root for convenience
pub use client::{ReactiveFeignBuilder, ReactiveFeignClient, TypedStream};
pub use config::{Config, ConfigError, ConfigProvider, ConfigProviderExt, ClientProperties};
pub use core::{
    BodyStream, BoxResponse, BufferedResponse, FeignError, HttpMethod, MethodMetadata,
    ReactiveHttpClient, ReactiveHttpRequest, ReactiveHttpResponse, RequestBody, ResultKind,
    TransportErrorKind,
};
pub use interceptor::{
    BasicAuthInterceptor, HeaderInterceptor, InterceptorChain, InterceptorFactory,
    ReactiveHttpRequestInterceptor,
};
pub use logger::{DefaultReactiveLogger, LogContext, LoggerConfig, ReactiveLoggerListener};
pub use mapper::{Ignore404Mapper, ResponseMapper};
pub use retry::{Backoff, BasicRetryPolicy, ReactiveRetryPolicy};
pub use status::{CompositeStatusHandler, DefaultStatusHandler, ReactiveStatusHandler, StatusHandler};
pub use transport::ReqwestHttpClient;
