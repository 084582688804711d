//! Tests for the HTTP invoker against a WireMock server
//!
//! These cover the request format, status-code mapping, and retries going
//! through the resolver to a live (mock) endpoint.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use shared_types_rs::StageName;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::MemoryConfigProvider;
    use crate::core::{capability, CapabilityCall, ClientBuilder, CredentialGroup, ToolInvoker};
    use crate::error::ServiceError;
    use crate::fallback::FallbackResolver;
    use crate::registry::ToolRegistry;
    use crate::resilience::RetryConfig;
    use crate::services::HttpToolInvoker;

    fn invoker() -> HttpToolInvoker {
        ClientBuilder::new()
            .timeout(Duration::from_secs(2))
            .build()
            .expect("failed to build HTTP invoker")
    }

    fn search_call(server: &MockServer) -> CapabilityCall {
        let mut credentials = CredentialGroup::new();
        credentials.insert("SEARCH_API_KEY".to_string(), "mock-key".to_string());
        CapabilityCall::new(capability::WEB_SEARCH, json!({ "query": "policy news" }))
            .with_endpoint(server.uri())
            .with_credentials(credentials)
    }

    #[tokio::test]
    async fn test_posts_capability_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/invoke/web_search"))
            .and(header("authorization", "Bearer mock-key"))
            .and(header("x-credential-search-api-key", "mock-key"))
            .and(body_partial_json(json!({
                "capability": "web_search",
                "arguments": { "query": "policy news" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": "policy news",
                "results": [{ "source_id": "s1", "title": "t", "url": "u", "snippet": "" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let invoker = invoker();
        let data = invoker.invoke(&search_call(&server)).await.unwrap();

        assert_eq!(data["results"][0]["source_id"], "s1");
        assert_eq!(invoker.metrics()["success_count"], "1");
    }

    #[tokio::test]
    async fn test_maps_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/invoke/web_search"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "invalid api key" })),
            )
            .mount(&server)
            .await;

        let err = invoker().invoke(&search_call(&server)).await.unwrap_err();
        assert!(matches!(err.root(), ServiceError::Authentication(m) if m == "invalid api key"));
        assert_eq!(err.status_code(), Some(401));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = invoker().invoke(&search_call(&server)).await.unwrap_err();
        assert!(matches!(err.root(), ServiceError::ExternalService(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_configuration_error() {
        let call = CapabilityCall::new(capability::STORAGE, json!({ "key": "k" }));
        let err = invoker().invoke(&call).await.unwrap_err();
        assert!(matches!(err.root(), ServiceError::Configuration(_)));
    }

    fn resolver_for(server: &MockServer, max_retries: u32) -> FallbackResolver {
        let secrets = MemoryConfigProvider::new().with("SEARCH_API_KEY", "mock-key");
        let settings = MemoryConfigProvider::new().with("web_search_endpoint", server.uri());

        let registry = ToolRegistry::builder()
            .default_capabilities()
            .endpoints_from(&settings)
            .credentials_from(&secrets)
            .primary_invoker(Arc::new(invoker()))
            .retry_config(RetryConfig {
                max_retries,
                initial_interval: Duration::from_millis(5),
                max_interval: Duration::from_millis(20),
                attempt_timeout: Some(Duration::from_secs(1)),
                ..RetryConfig::default()
            })
            .build()
            .unwrap();
        FallbackResolver::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_resolver_recovers_after_transient_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/invoke/web_search"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/invoke/web_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": "q",
                "results": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = resolver_for(&server, 2)
            .invoke(StageName::Collector, capability::WEB_SEARCH, json!({ "query": "q" }))
            .await
            .unwrap();

        assert!(!result.is_fallback());
    }

    #[tokio::test]
    async fn test_resolver_falls_back_after_exhaustion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let result = resolver_for(&server, 2)
            .invoke(StageName::Collector, capability::WEB_SEARCH, json!({ "query": "policy news" }))
            .await
            .unwrap();

        assert!(result.is_fallback());
        assert_eq!(result.data["results"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "results": [] }))
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let result = resolver_for(&server, 0)
            .invoke(StageName::Collector, capability::WEB_SEARCH, json!({ "query": "q" }))
            .await
            .unwrap();

        assert!(result.is_fallback());
    }
}
