//! Core abstractions for capability calls
//!
//! - `ToolInvoker`: one transport able to execute capability calls
//! - `CapabilityCall`: a fully resolved call (capability, arguments,
//!   endpoint and credential group)
//! - `CapabilityResult`: call output tagged with where it came from
//! - `ClientBuilder`: builder for the HTTP invoker

pub mod builder;
pub use builder::ClientBuilder;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

/// Names of the capabilities known to the default registry.
pub mod capability {
    pub const WEB_SEARCH: &str = "web_search";
    pub const CONTENT_EXTRACTION: &str = "content_extraction";
    pub const ANALYSIS: &str = "analysis";
    pub const VISUALIZATION: &str = "visualization";
    pub const STORAGE: &str = "storage";
    pub const WEBHOOK_DELIVERY: &str = "webhook_delivery";
    pub const EMAIL_DELIVERY: &str = "email_delivery";
    pub const SLACK_DELIVERY: &str = "slack_delivery";
    pub const NOTION_DELIVERY: &str = "notion_delivery";
}

/// Credentials for one capability, keyed by credential name.
pub type CredentialGroup = BTreeMap<String, String>;

/// A capability invocation ready to hand to a [`ToolInvoker`].
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityCall {
    pub capability: String,
    pub arguments: Value,
    /// Primary endpoint; absent for local invocation
    pub endpoint: Option<String>,
    pub credentials: CredentialGroup,
}

impl CapabilityCall {
    pub fn new(capability: impl Into<String>, arguments: Value) -> Self {
        Self {
            capability: capability.into(),
            arguments,
            endpoint: None,
            credentials: CredentialGroup::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialGroup) -> Self {
        self.credentials = credentials;
        self
    }

    /// Look up a string argument
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// Transport that executes capability calls.
///
/// Implementations must return schema-compatible data for a capability
/// regardless of transport, so stages never care which invoker served them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Execute one capability call
    async fn invoke(&self, call: &CapabilityCall) -> Result<Value>;
}

/// Where a capability result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Primary,
    Fallback,
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSource::Primary => write!(f, "primary"),
            ResultSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// Output of a resolved capability call
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityResult {
    pub capability: String,
    pub data: Value,
    pub source: ResultSource,
}

impl CapabilityResult {
    pub fn is_fallback(&self) -> bool {
        self.source == ResultSource::Fallback
    }
}
