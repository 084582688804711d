//! HTTP transport for remote capability endpoints.
//!
//! Every capability is reached the same way: `POST <endpoint>/invoke/<capability>`
//! with `{"capability": .., "arguments": ..}` as the JSON body. The first
//! credential of the group is sent as a bearer token; every credential is
//! also forwarded as an `x-credential-<name>` header so endpoints needing
//! more than one secret (client id + secret) receive all of them.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::common::{parse_error_response, InvokerMetrics};
use crate::core::{CapabilityCall, CredentialGroup, ToolInvoker};
use crate::error::{ErrorContext, Result, ServiceError};

pub struct HttpToolInvoker {
    client: Client,
    metrics: InvokerMetrics,
}

impl HttpToolInvoker {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            metrics: InvokerMetrics::default(),
        }
    }

    pub fn metrics(&self) -> HashMap<String, String> {
        self.metrics.as_map()
    }

    fn invoke_url(endpoint: &str, capability: &str) -> Result<Url> {
        let raw = format!("{}/invoke/{}", endpoint.trim_end_matches('/'), capability);
        Url::parse(&raw).map_err(|e| {
            ServiceError::configuration(format!("invalid endpoint '{}': {}", endpoint, e))
        })
    }

    fn auth_headers(credentials: &CredentialGroup) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(token) = credentials.values().next() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ServiceError::configuration(format!("invalid credential: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        for (name, secret) in credentials {
            let header = format!("x-credential-{}", name.to_lowercase().replace('_', "-"));
            let name = HeaderName::from_bytes(header.as_bytes())
                .map_err(|e| ServiceError::configuration(format!("invalid credential name: {}", e)))?;
            let value = HeaderValue::from_str(secret)
                .map_err(|e| ServiceError::configuration(format!("invalid credential: {}", e)))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }

    async fn send(&self, call: &CapabilityCall) -> Result<Value> {
        let endpoint = call.endpoint.as_deref().ok_or_else(|| {
            ServiceError::configuration(format!("no endpoint for '{}'", call.capability))
        })?;
        let url = Self::invoke_url(endpoint, &call.capability)?;
        let context = ErrorContext::for_service(&call.capability).endpoint(url.as_str());

        let response = self
            .client
            .post(url.clone())
            .headers(Self::auth_headers(&call.credentials)?)
            .json(&json!({
                "capability": call.capability,
                "arguments": call.arguments,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::from(e).with_context(context.clone()))?;

        if !response.status().is_success() {
            return Err(parse_error_response(&call.capability, url.as_str(), response).await);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ServiceError::parsing(format!("invalid response body: {}", e)).with_context(context))
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn invoke(&self, call: &CapabilityCall) -> Result<Value> {
        let started = Instant::now();
        let result = self.send(call).await;
        self.metrics.record(result.is_ok(), started.elapsed());

        debug!(
            capability = %call.capability,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "http capability call finished"
        );
        result
    }
}
