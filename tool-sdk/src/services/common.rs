//! Shared pieces for invoker implementations.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{ErrorContext, ServiceError};

/// User agent sent to capability endpoints
#[derive(Debug, Clone)]
pub struct UserAgent {
    pub app_name: String,
    pub version: String,
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: "research-pipeline".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: Some("tool-sdk".to_string()),
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;
        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }
        Ok(())
    }
}

/// Request counters for one invoker
#[derive(Debug, Default)]
pub struct InvokerMetrics {
    request_count: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    total_latency_ms: AtomicU64,
}

impl InvokerMetrics {
    pub fn record(&self, success: bool, latency: Duration) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn as_map(&self) -> HashMap<String, String> {
        let requests = self.request_count.load(Ordering::Relaxed);
        let latency = self.total_latency_ms.load(Ordering::Relaxed);
        let mut map = HashMap::new();
        map.insert("request_count".to_string(), requests.to_string());
        map.insert(
            "success_count".to_string(),
            self.success_count.load(Ordering::Relaxed).to_string(),
        );
        map.insert(
            "error_count".to_string(),
            self.error_count.load(Ordering::Relaxed).to_string(),
        );
        if requests > 0 {
            map.insert("avg_latency_ms".to_string(), (latency / requests).to_string());
        }
        map
    }
}

/// Turn a non-success response into a [`ServiceError`]
pub async fn parse_error_response(
    capability: &str,
    endpoint: &str,
    response: reqwest::Response,
) -> ServiceError {
    let status = response.status();
    let mut context = ErrorContext::for_service(capability).endpoint(endpoint);

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("failed to read error body: {}", e),
    };

    crate::error::mapping::map_http_error(status, &body, &mut context)
}
