// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use crate::config::{
        ClientProperties, Config, ConfigError, ConfigProvider, ConfigProviderExt,
        EnvConfigProvider, FileConfigProvider, FileFormat, RetryProperties,
    };
    use crate::retry::Backoff;
    use serde_json::{Value, json};
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Provider over a fixed JSON document.
    #[derive(Debug)]
    struct StaticProvider {
        data: Value,
    }

    impl ConfigProvider for StaticProvider {
        fn has(&self, key: &str) -> bool {
            crate::config::lookup(&self.data, key).is_some()
        }

        fn provider_name(&self) -> &str {
            "static"
        }

        fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
            Ok(crate::config::lookup(&self.data, key).cloned())
        }
    }

    fn config_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_later_providers_override_and_objects_merge() {
        let config = Config::builder()
            .with_provider(StaticProvider {
                data: json!({"feign": {"client": {"orders": {"target": "http://a", "decode404": true}}}}),
            })
            .with_provider(StaticProvider {
                data: json!({"feign": {"client": {"orders": {"target": "http://b"}}}}),
            })
            .build();

        let target: String = config.get("feign.client.orders.target").unwrap().unwrap();
        assert_eq!(target, "http://b");
        let section = config.get_raw("feign.client.orders").unwrap().unwrap();
        assert_eq!(section, json!({"target": "http://b", "decode404": true}));
        assert!(config.get_raw("feign.client.missing").unwrap().is_none());
        assert_eq!(config.get_or_default("feign.client.orders.read_timeout_ms", 30u64).unwrap(), 30);
    }

    #[test]
    fn test_type_mismatch_is_parse_error() {
        let config = Config::builder()
            .with_provider(StaticProvider {
                data: json!({"feign": {"enabled": "maybe"}}),
            })
            .build();
        assert!(matches!(
            config.get::<bool>("feign.enabled"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_file_provider_formats() {
        let json = config_file(".json", r#"{"feign": {"client": {"orders": {"target": "http://json"}}}}"#);
        let toml = config_file(".toml", "[feign.client.orders]\ntarget = \"http://toml\"\n");
        let yaml = config_file(".yaml", "feign:\n  client:\n    orders:\n      target: http://yaml\n");

        for (file, expected) in [(json, "http://json"), (toml, "http://toml"), (yaml, "http://yaml")] {
            let provider = FileConfigProvider::new(file.path().to_str().unwrap()).unwrap();
            assert!(provider.has("feign.client.orders"));
            let target: String = provider.get("feign.client.orders.target").unwrap().unwrap();
            assert_eq!(target, expected);
        }
    }

    #[test]
    fn test_file_provider_errors() {
        let unsupported = config_file(".ini", "target=x");
        assert!(FileConfigProvider::new(unsupported.path().to_str().unwrap()).is_err());
        assert!(FileConfigProvider::new("/nonexistent/feign.json").is_err());
        assert!(FileFormat::Json.parse("[1, 2]").is_err());
        assert!(FileFormat::Yaml.parse("feign: [").is_err());
    }

    #[test]
    fn test_env_provider_nests_on_double_underscore() {
        let provider = EnvConfigProvider::from_vars(
            "APP",
            vec![
                ("APP__FEIGN__CLIENT__ORDERS__READ_TIMEOUT_MS".to_string(), "500".to_string()),
                ("APP__FEIGN__CLIENT__ORDERS__TARGET".to_string(), "http://env".to_string()),
                ("APP__FEIGN__CLIENT__ORDERS__DECODE404".to_string(), "true".to_string()),
                ("OTHER__FEIGN__IGNORED".to_string(), "1".to_string()),
            ],
        );

        assert_eq!(
            provider.get_raw("feign.client.orders").unwrap().unwrap(),
            json!({"read_timeout_ms": 500, "target": "http://env", "decode404": true})
        );
        assert!(!provider.has("feign.ignored"));
    }

    #[test]
    #[serial]
    fn test_env_provider_reads_process_environment() {
        unsafe {
            env::set_var("FEIGNTEST__FEIGN__CLIENT__DEFAULT__RETRY__MAX_RETRIES", "4");
        }
        let mut provider = EnvConfigProvider::new("FEIGNTEST");
        let retries: usize = provider
            .get("feign.client.default.retry.max_retries")
            .unwrap()
            .unwrap();
        assert_eq!(retries, 4);

        unsafe {
            env::remove_var("FEIGNTEST__FEIGN__CLIENT__DEFAULT__RETRY__MAX_RETRIES");
        }
        provider.refresh();
        assert!(!provider.has("feign.client.default.retry"));
    }

    #[test]
    #[serial]
    fn test_env_overrides_single_field_of_file_section() {
        let file = config_file(
            ".yaml",
            "feign:\n  client:\n    orders:\n      target: http://file\n      read_timeout_ms: 100\n",
        );
        unsafe {
            env::set_var("FEIGNOVR__FEIGN__CLIENT__ORDERS__READ_TIMEOUT_MS", "900");
        }
        let config = Config::builder()
            .with_provider(FileConfigProvider::new(file.path().to_str().unwrap()).unwrap())
            .with_provider(EnvConfigProvider::new("FEIGNOVR"))
            .build();
        unsafe {
            env::remove_var("FEIGNOVR__FEIGN__CLIENT__ORDERS__READ_TIMEOUT_MS");
        }

        let props = ClientProperties::load(&config, "orders").unwrap();
        assert_eq!(props.target.as_deref(), Some("http://file"));
        assert_eq!(props.read_timeout(), Some(Duration::from_millis(900)));
    }

    #[test]
    fn test_client_properties_fall_back_to_default_section() {
        let config = Config::builder()
            .with_provider(StaticProvider {
                data: json!({"feign": {"client": {
                    "default": {
                        "connect_timeout_ms": 250,
                        "retry": {"max_retries": 2, "backoff_ms": 100},
                        "default_headers": {"x-tenant": "gelato"}
                    },
                    "orders": {
                        "target": "http://orders",
                        "decode404": true,
                        "retry": {"max_backoff_ms": 1000},
                        "interceptors": [{"type": "basic_auth", "config": {"username": "u", "password": "p"}}]
                    }
                }}}),
            })
            .build();

        let props = ClientProperties::load(&config, "orders").unwrap();
        assert_eq!(props.target.as_deref(), Some("http://orders"));
        assert_eq!(props.connect_timeout(), Some(Duration::from_millis(250)));
        assert!(props.decode404);
        assert!(props.follow_redirects);
        assert_eq!(props.default_headers["x-tenant"], "gelato");
        assert_eq!(
            props.retry,
            Some(RetryProperties {
                max_retries: 2,
                backoff_ms: 100,
                max_backoff_ms: Some(1000)
            })
        );
        assert_eq!(props.interceptors.len(), 1);
        assert_eq!(props.interceptors[0].kind, "basic_auth");

        let other = ClientProperties::load(&config, "flavors").unwrap();
        assert_eq!(other.target, None);
        assert!(!other.decode404);
        assert_eq!(other.retry.unwrap().max_retries, 2);
    }

    #[test]
    fn test_client_properties_without_any_section() {
        let config = Config::builder().build();
        assert_eq!(
            ClientProperties::load(&config, "orders").unwrap(),
            ClientProperties::default()
        );
    }

    #[test]
    fn test_retry_properties_backoff() {
        let mut retry = RetryProperties {
            max_retries: 3,
            backoff_ms: 0,
            max_backoff_ms: Some(500),
        };
        assert_eq!(retry.backoff(), Backoff::None);

        retry.backoff_ms = 50;
        assert_eq!(
            retry.backoff(),
            Backoff::Exponential {
                initial: Duration::from_millis(50),
                max: Duration::from_millis(500)
            }
        );

        retry.max_backoff_ms = None;
        assert_eq!(retry.backoff(), Backoff::Fixed(Duration::from_millis(50)));
        assert_eq!(retry.to_policy().max_retries(), 3);
    }
}
