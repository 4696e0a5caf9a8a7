// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use crate::client::{ReactiveFeignBuilder, ReactiveFeignClient};
    use crate::config::{ClientProperties, Config, ConfigError, ConfigProvider};
    use crate::core::{
        BoxResponse, BufferedResponse, FeignError, HttpMethod, MethodMetadata, ReactiveHttpClient,
        ReactiveHttpRequest, ResultKind, TransportErrorKind,
    };
    use crate::logger::{LogContext, ReactiveLoggerListener};
    use crate::retry::BasicRetryPolicy;
    use crate::status::StatusHandler;
    use async_trait::async_trait;
    use futures_util::TryStreamExt;
    use reqwest::header::HeaderMap;
    use serde::Deserialize;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: u64,
    }

    /// Transport that answers from a queue and records what it was sent.
    #[derive(Debug, Default)]
    struct QueueTransport {
        responses: Mutex<VecDeque<Result<BufferedResponse, FeignError>>>,
        seen: Mutex<Vec<ReactiveHttpRequest>>,
        calls: AtomicUsize,
    }

    impl QueueTransport {
        fn new(responses: Vec<Result<BufferedResponse, FeignError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReactiveHttpClient for QueueTransport {
        async fn execute_request(
            &self,
            request: ReactiveHttpRequest,
        ) -> Result<BoxResponse, FeignError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request);
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(response)) => Ok(response.into_boxed()),
                Some(Err(error)) => Err(error),
                None => Err(FeignError::transport(TransportErrorKind::Connect, "exhausted")),
            }
        }
    }

    #[derive(Default)]
    struct StatusListener {
        statuses: Mutex<Vec<u16>>,
        retries: AtomicUsize,
    }

    impl ReactiveLoggerListener for StatusListener {
        fn response_received(
            &self,
            _ctx: &LogContext,
            status: u16,
            _headers: &HeaderMap,
            _elapsed: Duration,
        ) {
            self.statuses.lock().unwrap().push(status);
        }

        fn retry_attempt(&self, _method_key: &str, _retry: usize, _error: &FeignError) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn transient() -> FeignError {
        FeignError::transport(TransportErrorKind::Connect, "connection reset")
    }

    fn order_json(kind: ResultKind) -> BufferedResponse {
        BufferedResponse::new(200, kind).with_json(&json!({"id": 42}))
    }

    fn domain_handlers(builder: ReactiveFeignBuilder) -> ReactiveFeignBuilder {
        builder
            .add_status_handler(Arc::new(StatusHandler::client_errors(|_k, s, _h, _b| {
                FeignError::Other(format!("domain error {s}"))
            })))
            .add_status_handler(Arc::new(StatusHandler::server_errors(|_k, s, _h, _b| {
                FeignError::Other(format!("server error {s}"))
            })))
    }

    fn orders_client(transport: Arc<QueueTransport>) -> ReactiveFeignBuilder {
        ReactiveFeignClient::builder(MethodMetadata::mono("OrdersApi#get(u64)"))
            .target("http://localhost:8080")
            .unwrap()
            .transport(transport)
    }

    #[tokio::test]
    async fn test_order_is_decoded() {
        let transport = QueueTransport::new(vec![Ok(order_json(ResultKind::Mono))]);
        let client = domain_handlers(orders_client(transport.clone())).build();

        let request = client.request(HttpMethod::Get, "/icecream/orders/42").unwrap();
        let order: Option<Order> = client.mono(request).await.unwrap();
        assert_eq!(order, Some(Order { id: 42 }));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].uri().as_str(), "http://localhost:8080/icecream/orders/42");
        assert_eq!(seen[0].method(), HttpMethod::Get);
    }

    #[tokio::test]
    async fn test_not_found_with_decode404_is_empty() {
        let transport = QueueTransport::new(vec![Ok(
            BufferedResponse::new(404, ResultKind::Mono).with_data("no such order"),
        )]);
        let client = orders_client(transport).decode404().build();

        let request = client.request(HttpMethod::Get, "/icecream/orders/42").unwrap();
        let order: Option<Order> = client.mono(request).await.unwrap();
        assert_eq!(order, None);
    }

    #[tokio::test]
    async fn test_not_found_without_decode404_is_status_error() {
        let transport = QueueTransport::new(vec![Ok(BufferedResponse::new(404, ResultKind::Mono))]);
        let client = orders_client(transport).build();

        let request = client.request(HttpMethod::Get, "/icecream/orders/42").unwrap();
        let err = client.mono::<Order>(request).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.to_string(),
            "status 404 reading OrdersApi#get(u64): Not Found"
        );
    }

    #[tokio::test]
    async fn test_domain_handler_is_used_before_default() {
        let transport = QueueTransport::new(vec![Ok(BufferedResponse::new(409, ResultKind::Mono))]);
        let client = domain_handlers(orders_client(transport)).build();

        let request = client.request(HttpMethod::Get, "/icecream/orders/42").unwrap();
        let err = client.mono::<Order>(request).await.unwrap_err();
        assert!(matches!(err, FeignError::Other(ref m) if m == "domain error 409"));
    }

    #[tokio::test]
    async fn test_two_transient_failures_then_success() {
        let transport = QueueTransport::new(vec![
            Err(transient()),
            Err(transient()),
            Ok(order_json(ResultKind::Mono)),
        ]);
        let listener = Arc::new(StatusListener::default());
        let client = domain_handlers(orders_client(transport.clone()))
            .retry_policy(Arc::new(BasicRetryPolicy::new(2)))
            .logger(listener.clone())
            .build();

        let request = client.request(HttpMethod::Get, "/icecream/orders/42").unwrap();
        let order: Option<Order> = client.mono(request).await.unwrap();
        assert_eq!(order, Some(Order { id: 42 }));
        assert_eq!(transport.calls(), 3);
        assert_eq!(listener.retries.load(Ordering::SeqCst), 2);
        assert_eq!(*listener.statuses.lock().unwrap(), vec![200]);
    }

    #[tokio::test]
    async fn test_decode404_is_not_retried_and_logs_rewritten_status() {
        let transport = QueueTransport::new(vec![Ok(BufferedResponse::new(404, ResultKind::Mono))]);
        let listener = Arc::new(StatusListener::default());
        let policy = BasicRetryPolicy::new(3).retry_on(|_| true);
        let client = orders_client(transport.clone())
            .decode404()
            .retry_policy(Arc::new(policy))
            .logger(listener.clone())
            .build();

        let request = client.request(HttpMethod::Get, "/icecream/orders/42").unwrap();
        let order: Option<Order> = client.mono(request).await.unwrap();
        assert_eq!(order, None);
        assert_eq!(transport.calls(), 1);
        assert_eq!(*listener.statuses.lock().unwrap(), vec![200]);
    }

    #[tokio::test]
    async fn test_interceptors_run_on_every_attempt() {
        let transport = QueueTransport::new(vec![Err(transient()), Ok(order_json(ResultKind::Mono))]);
        let client = orders_client(transport.clone())
            .add_interceptor(Arc::new(|request: ReactiveHttpRequest| {
                request.with_header("x-attempt", "1").unwrap()
            }))
            .retry_policy(Arc::new(BasicRetryPolicy::new(1)))
            .build();

        let request = client.request(HttpMethod::Get, "/icecream/orders/42").unwrap();
        client.mono::<Order>(request).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for request in seen.iter() {
            assert_eq!(request.headers().get_all("x-attempt").iter().count(), 1);
        }
    }

    #[tokio::test]
    async fn test_flux_decodes_elements() {
        let transport = QueueTransport::new(vec![Ok(BufferedResponse::new(200, ResultKind::Flux)
            .with_json(&json!([{"id": 1}, {"id": 2}])))]);
        let client = ReactiveFeignClient::builder(MethodMetadata::flux("OrdersApi#list()"))
            .target("http://localhost:8080/")
            .unwrap()
            .transport(transport)
            .build();

        let request = client.request(HttpMethod::Get, "icecream/orders").unwrap();
        let orders: Vec<Order> = client.flux(request).await.unwrap().try_collect().await.unwrap();
        assert_eq!(orders, vec![Order { id: 1 }, Order { id: 2 }]);
    }

    #[tokio::test]
    async fn test_element_type_mismatch_is_decode_error() {
        let transport = QueueTransport::new(vec![Ok(BufferedResponse::new(200, ResultKind::Mono)
            .with_json(&json!({"id": "forty-two"})))]);
        let client = orders_client(transport).build();

        let request = client.request(HttpMethod::Get, "/icecream/orders/42").unwrap();
        let err = client.mono::<Order>(request).await.unwrap_err();
        assert!(matches!(err, FeignError::Decode(_)));
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_configuration_error() {
        let client = orders_client(QueueTransport::new(vec![])).build();
        let request = client.request(HttpMethod::Get, "/icecream/orders").unwrap();
        let result = client.flux::<Order>(request).await;
        assert!(matches!(result, Err(FeignError::Configuration(_))));
    }

    #[test]
    fn test_request_resolution() {
        let client = orders_client(QueueTransport::new(vec![])).build();
        let absolute = client
            .request(HttpMethod::Delete, "https://other.example/icecream/orders/1")
            .unwrap();
        assert_eq!(absolute.uri().as_str(), "https://other.example/icecream/orders/1");

        let colon = client.request(HttpMethod::Get, "orders:search").unwrap();
        assert_eq!(colon.uri().as_str(), "http://localhost:8080/orders:search");
        assert!(matches!(
            client.request(HttpMethod::Get, "http://bad host/x"),
            Err(FeignError::InvalidRequest(_))
        ));

        let untargeted = ReactiveFeignClient::builder(MethodMetadata::mono("OrdersApi#get(u64)"))
            .transport(QueueTransport::new(vec![]))
            .build();
        assert!(matches!(
            untargeted.request(HttpMethod::Get, "/icecream/orders/1"),
            Err(FeignError::InvalidRequest(_))
        ));
        assert!(ReactiveFeignBuilder::new(MethodMetadata::mono("x")).target("not a url").is_err());
    }

    #[derive(Debug)]
    struct JsonProvider(Value);

    impl ConfigProvider for JsonProvider {
        fn has(&self, key: &str) -> bool {
            crate::config::lookup(&self.0, key).is_some()
        }

        fn provider_name(&self) -> &str {
            "json"
        }

        fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
            Ok(crate::config::lookup(&self.0, key).cloned())
        }
    }

    #[test]
    fn test_from_config_rejects_unknown_interceptor() {
        let config = Config::builder()
            .with_provider(JsonProvider(json!({"feign": {"client": {"orders": {
                "target": "http://localhost",
                "interceptors": [{"type": "does_not_exist"}]
            }}}})))
            .build();
        let result = ReactiveFeignBuilder::from_config(
            MethodMetadata::mono("OrdersApi#get(u64)"),
            &config,
            "orders",
        );
        assert!(matches!(result, Err(FeignError::Configuration(_))));
    }

    #[test]
    fn test_from_config_rejects_invalid_properties() {
        let config = Config::builder()
            .with_provider(JsonProvider(json!({"feign": {"client": {"orders": {
                "read_timeout_ms": "soon"
            }}}})))
            .build();
        let result = ReactiveFeignBuilder::from_config(
            MethodMetadata::mono("OrdersApi#get(u64)"),
            &config,
            "orders",
        );
        assert!(matches!(result, Err(FeignError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_default_headers_do_not_override_request_headers() {
        let transport = QueueTransport::new(vec![Ok(order_json(ResultKind::Mono))]);
        let mut props = ClientProperties {
            target: Some("http://localhost:8080".to_string()),
            ..ClientProperties::default()
        };
        props.default_headers.insert("x-tenant".to_string(), "gelato".to_string());
        props.default_headers.insert("x-shop".to_string(), "corner".to_string());
        let client = ReactiveFeignBuilder::from_properties(MethodMetadata::mono("OrdersApi#get(u64)"), &props)
            .unwrap()
            .transport(transport.clone())
            .build();

        let request = client
            .request(HttpMethod::Get, "/icecream/orders/42")
            .unwrap()
            .with_header("x-tenant", "sorbet")
            .unwrap();
        let order: Option<Order> = client.mono(request).await.unwrap();
        assert_eq!(order, Some(Order { id: 42 }));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].headers()["x-tenant"], "sorbet");
        assert_eq!(seen[0].headers()["x-shop"], "corner");
    }

    #[tokio::test]
    async fn test_execute_exposes_raw_response() {
        let transport = QueueTransport::new(vec![Ok(order_json(ResultKind::Mono))]);
        let client = orders_client(transport).build();
        let request = client.request(HttpMethod::Get, "/icecream/orders/42").unwrap();

        let response = client.execute(request).await.unwrap();
        assert_eq!(response.status(), 200);
        let body: Vec<Value> = response.body().try_collect().await.unwrap();
        assert_eq!(body, vec![json!({"id": 42})]);
    }
}
