//! Builder for the HTTP tool invoker.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as ReqwestClient;

use crate::error::{Result, ServiceError};
use crate::services::http::HttpToolInvoker;

pub struct ClientBuilder {
    /// Extra headers sent with every call
    custom_headers: HashMap<String, String>,

    /// Transport-level timeout; per-attempt deadlines are applied by the resolver
    timeout: Option<Duration>,

    user_agent: Option<String>,

    compression: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            custom_headers: HashMap::new(),
            timeout: Some(Duration::from_secs(30)),
            user_agent: Some(crate::services::common::UserAgent::default().to_string()),
            compression: true,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Build the underlying reqwest client
    pub fn build_http_client(&self) -> Result<ReqwestClient> {
        let mut builder = ReqwestClient::builder().gzip(self.compression);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(ref user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }

        let mut headers = HeaderMap::new();
        for (key, value) in &self.custom_headers {
            let name = HeaderName::from_str(key)
                .map_err(|e| ServiceError::configuration(format!("invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ServiceError::configuration(format!("invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        builder
            .default_headers(headers)
            .build()
            .map_err(|e| ServiceError::configuration(format!("failed to build HTTP client: {}", e)))
    }

    pub fn build(self) -> Result<HttpToolInvoker> {
        Ok(HttpToolInvoker::new(self.build_http_client()?))
    }
}
