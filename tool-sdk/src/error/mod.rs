//! Error handling for the Tool SDK
//!
//! Errors are grouped by how the caller should react to them:
//! - transient failures (network, timeout, rate limit, upstream 5xx, open
//!   circuit) are retried by the resilience layer
//! - permanent failures (auth, validation, parsing) are not retried
//! - capability-level failures (`CapabilityUnavailable`, `UnknownCapability`)
//!   are raised once primary and fallback are both out of options

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub mod mapping;

/// Result type for Tool SDK operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Main error type for the Tool SDK
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Network or connection errors
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Authorization errors (permission issues)
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Request validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Response parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Resource not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Circuit breaker open errors
    #[error("Circuit broken: {0}")]
    CircuitBroken(String),

    /// Upstream 5xx errors
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Non-transient error reported by the tool itself
    #[error("Tool error: {0}")]
    Tool(String),

    /// The capability is not registered for the calling role
    #[error("Unknown capability '{capability}' for role '{role}'")]
    UnknownCapability { role: String, capability: String },

    /// Primary and fallback both failed for a capability call
    #[error("Capability '{capability}' unavailable: {reason}")]
    CapabilityUnavailable { capability: String, reason: String },

    /// Errors with additional context
    #[error("{inner}")]
    WithContext {
        inner: Box<ServiceError>,
        context: ErrorContext,
    },
}

impl ServiceError {
    pub fn network(message: impl Into<String>) -> Self {
        ServiceError::Network(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ServiceError::Authentication(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        ServiceError::Authorization(message.into())
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        ServiceError::RateLimit(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        ServiceError::Parsing(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ServiceError::Timeout(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn circuit_broken(message: impl Into<String>) -> Self {
        ServiceError::CircuitBroken(message.into())
    }

    pub fn external_service(message: impl Into<String>) -> Self {
        ServiceError::ExternalService(message.into())
    }

    pub fn tool(message: impl Into<String>) -> Self {
        ServiceError::Tool(message.into())
    }

    pub fn unknown_capability(role: impl Into<String>, capability: impl Into<String>) -> Self {
        ServiceError::UnknownCapability {
            role: role.into(),
            capability: capability.into(),
        }
    }

    pub fn capability_unavailable(
        capability: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ServiceError::CapabilityUnavailable {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        ServiceError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// Add a single context key/value to an existing error.
    ///
    /// If the error already carries a context the value is merged into it
    /// instead of wrapping a second time.
    pub fn with_context_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        match self {
            ServiceError::WithContext { inner, mut context } => {
                context.add(key, value);
                ServiceError::WithContext { inner, context }
            }
            other => {
                let mut context = ErrorContext::new();
                context.add(key, value);
                other.with_context(context)
            }
        }
    }

    /// The error with all context layers removed
    pub fn root(&self) -> &ServiceError {
        match self {
            ServiceError::WithContext { inner, .. } => inner.root(),
            other => other,
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ServiceError::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        self.context().and_then(|c| c.status_code)
    }

    /// Whether the resilience layer should try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            ServiceError::Network(_)
                | ServiceError::Timeout(_)
                | ServiceError::RateLimit(_)
                | ServiceError::CircuitBroken(_)
                | ServiceError::ExternalService(_)
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Short classification used in log fields and metrics
    pub fn kind(&self) -> &'static str {
        match self.root() {
            ServiceError::Network(_) => "network",
            ServiceError::Authentication(_) => "authentication",
            ServiceError::Authorization(_) => "authorization",
            ServiceError::RateLimit(_) => "rate_limit",
            ServiceError::Validation(_) => "validation",
            ServiceError::Parsing(_) => "parsing",
            ServiceError::Configuration(_) => "configuration",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::Internal(_) => "internal",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::CircuitBroken(_) => "circuit_broken",
            ServiceError::ExternalService(_) => "external_service",
            ServiceError::Tool(_) => "tool",
            ServiceError::UnknownCapability { .. } => "unknown_capability",
            ServiceError::CapabilityUnavailable { .. } => "capability_unavailable",
            ServiceError::WithContext { .. } => "context",
        }
    }
}

/// Error context information
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Capability or service that generated the error
    pub service: String,

    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    /// HTTP status code if applicable
    pub status_code: Option<u16>,

    /// Tool-specific error code
    pub error_code: Option<String>,

    pub request_id: Option<String>,

    /// Endpoint that was called
    pub endpoint: Option<String>,

    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            service: "unknown".to_string(),
            timestamp: Some(chrono::Utc::now()),
            status_code: None,
            error_code: None,
            request_id: None,
            endpoint: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
    }

    /// Builder form of [`ErrorContext::add`]
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.add(key, value);
        self
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        let context = ErrorContext::for_service("http_invoker");

        let service_error = if err.is_timeout() {
            ServiceError::timeout(format!("request timed out: {}", err))
        } else if err.is_connect() {
            ServiceError::network(format!("connection failed: {}", err))
        } else if err.is_decode() {
            ServiceError::parsing(format!("response decode failed: {}", err))
        } else if err.is_builder() {
            ServiceError::validation(format!("invalid request: {}", err))
        } else {
            ServiceError::network(format!("http error: {}", err))
        };

        match err.status() {
            Some(status) => service_error.with_context(context.status_code(status.as_u16())),
            None => service_error.with_context(context),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::parsing(format!("JSON error: {}", err))
    }
}
