//! Immutable capability registry.
//!
//! Built once at startup and shared read-only afterwards. Maps each stage
//! role to its ordered capability list, and each capability to its
//! descriptor, resolved credential group and resilience state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types_rs::StageName;
use tracing::info;

use crate::config::{ConfigProvider, ConfigProviderExt, CredentialStore};
use crate::core::{CredentialGroup, ToolInvoker};
use crate::error::{Result, ServiceError};
use crate::resilience::{CircuitBreakerConfig, Resilience, RetryConfig};
use crate::services::LocalToolInvoker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Serve the call from the local stand-in invoker
    LocalStandIn,
    /// No substitute; exhaustion is reported as `CapabilityUnavailable`
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub capability_name: String,
    pub required_credentials: Vec<String>,
    pub primary_endpoint: Option<String>,
    pub fallback_strategy: FallbackStrategy,
}

impl CapabilityDescriptor {
    pub fn new(capability_name: impl Into<String>) -> Self {
        Self {
            capability_name: capability_name.into(),
            required_credentials: Vec::new(),
            primary_endpoint: None,
            fallback_strategy: FallbackStrategy::LocalStandIn,
        }
    }

    pub fn credential(mut self, name: impl Into<String>) -> Self {
        self.required_credentials.push(name.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.primary_endpoint = Some(endpoint.into());
        self
    }

    pub fn fallback(mut self, strategy: FallbackStrategy) -> Self {
        self.fallback_strategy = strategy;
        self
    }
}

/// The capabilities each role uses when nothing else is configured.
pub fn default_catalog() -> Vec<(StageName, CapabilityDescriptor)> {
    use crate::core::capability::*;

    vec![
        (StageName::Collector, CapabilityDescriptor::new(WEB_SEARCH).credential("SEARCH_API_KEY")),
        (
            StageName::Collector,
            CapabilityDescriptor::new(CONTENT_EXTRACTION).credential("FIRECRAWL_API_KEY"),
        ),
        (StageName::Processor, CapabilityDescriptor::new(ANALYSIS).credential("ANTHROPIC_API_KEY")),
        (StageName::Processor, CapabilityDescriptor::new(VISUALIZATION)),
        (StageName::Action, CapabilityDescriptor::new(STORAGE)),
        (
            StageName::Action,
            CapabilityDescriptor::new(WEBHOOK_DELIVERY).credential("N8N_WEBHOOK_URL"),
        ),
        (
            StageName::Reporter,
            CapabilityDescriptor::new(EMAIL_DELIVERY)
                .credential("GMAIL_CLIENT_ID")
                .credential("GMAIL_CLIENT_SECRET"),
        ),
        (StageName::Reporter, CapabilityDescriptor::new(SLACK_DELIVERY).credential("SLACK_BOT_TOKEN")),
        (StageName::Reporter, CapabilityDescriptor::new(NOTION_DELIVERY).credential("NOTION_API_KEY")),
    ]
}

/// A descriptor together with its runtime state
pub struct RegisteredCapability {
    pub descriptor: CapabilityDescriptor,
    pub credentials: Option<CredentialGroup>,
    pub resilience: Resilience,
}

impl fmt::Debug for RegisteredCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let credential_names = self
            .credentials
            .as_ref()
            .map(|group| group.keys().collect::<Vec<_>>());
        f.debug_struct("RegisteredCapability")
            .field("descriptor", &self.descriptor)
            .field("credentials", &credential_names)
            .field("circuit", &self.resilience.circuit_breaker_status())
            .finish()
    }
}

impl RegisteredCapability {
    /// Why the primary cannot be attempted, if it cannot
    pub fn primary_blocker(&self) -> Option<&'static str> {
        if self.credentials.is_none() {
            Some("missing credentials")
        } else if self.descriptor.primary_endpoint.is_none() {
            Some("no primary endpoint configured")
        } else {
            None
        }
    }
}

pub struct ToolRegistry {
    roles: HashMap<StageName, Vec<String>>,
    capabilities: HashMap<String, RegisteredCapability>,
    primary: Arc<dyn ToolInvoker>,
    fallback: Arc<dyn ToolInvoker>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("roles", &self.roles)
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl ToolRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Capability names registered for `role`, in registration order
    pub fn capabilities_for(&self, role: StageName) -> &[String] {
        self.roles.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_capability(&self, role: StageName, capability: &str) -> bool {
        self.capabilities_for(role).iter().any(|c| c == capability)
    }

    /// Look up a capability, checking it belongs to `role`
    pub fn lookup(&self, role: StageName, capability: &str) -> Result<&RegisteredCapability> {
        if !self.has_capability(role, capability) {
            return Err(ServiceError::unknown_capability(role.as_str(), capability));
        }
        self.capabilities
            .get(capability)
            .ok_or_else(|| ServiceError::unknown_capability(role.as_str(), capability))
    }

    pub fn descriptor(&self, capability: &str) -> Option<&CapabilityDescriptor> {
        self.capabilities.get(capability).map(|c| &c.descriptor)
    }

    pub fn primary_invoker(&self) -> &Arc<dyn ToolInvoker> {
        &self.primary
    }

    pub fn fallback_invoker(&self) -> &Arc<dyn ToolInvoker> {
        &self.fallback
    }
}

pub struct RegistryBuilder {
    entries: Vec<(StageName, CapabilityDescriptor)>,
    credentials: CredentialStore,
    primary: Option<Arc<dyn ToolInvoker>>,
    fallback: Arc<dyn ToolInvoker>,
    retry_config: RetryConfig,
    circuit_breaker_config: CircuitBreakerConfig,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            credentials: CredentialStore::new(),
            primary: None,
            fallback: Arc::new(LocalToolInvoker::new()),
            retry_config: RetryConfig::default(),
            circuit_breaker_config: CircuitBreakerConfig::default(),
        }
    }
}

impl RegistryBuilder {
    /// Register `descriptor` for `role`
    pub fn capability(mut self, role: StageName, descriptor: CapabilityDescriptor) -> Self {
        self.entries.push((role, descriptor));
        self
    }

    /// Register every entry of [`default_catalog`]
    pub fn default_capabilities(mut self) -> Self {
        self.entries.extend(default_catalog());
        self
    }

    /// Set primary endpoints from `<capability>_endpoint` settings
    pub fn endpoints_from<P: ConfigProvider + ?Sized>(mut self, settings: &P) -> Self {
        for (_, descriptor) in &mut self.entries {
            let key = format!("{}_endpoint", descriptor.capability_name);
            if let Ok(endpoint) = settings.get_string(&key) {
                if !endpoint.trim().is_empty() {
                    descriptor.primary_endpoint = Some(endpoint.trim().to_string());
                }
            }
        }
        self
    }

    /// Resolve credential groups for every registered capability
    pub fn credentials_from<P: ConfigProvider + ?Sized>(mut self, secrets: &P) -> Self {
        for (_, descriptor) in &self.entries {
            self.credentials.load(
                secrets,
                &descriptor.capability_name,
                &descriptor.required_credentials,
            );
        }
        self
    }

    pub fn credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn primary_invoker(mut self, invoker: Arc<dyn ToolInvoker>) -> Self {
        self.primary = Some(invoker);
        self
    }

    pub fn fallback_invoker(mut self, invoker: Arc<dyn ToolInvoker>) -> Self {
        self.fallback = invoker;
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker_config = config;
        self
    }

    /// Apply retry and circuit settings from configuration
    pub fn resilience_from<P: ConfigProvider + ?Sized>(mut self, settings: &P) -> Self {
        let retry = &mut self.retry_config;
        retry.max_retries = settings.get_int_or("max_retries", retry.max_retries as i64).max(0) as u32;
        retry.initial_interval = settings.get_duration_or("retry_initial", retry.initial_interval);
        retry.max_interval = settings.get_duration_or("retry_max", retry.max_interval);
        retry.attempt_timeout = Some(settings.get_duration_or(
            "call_timeout",
            retry.attempt_timeout.unwrap_or(Duration::from_secs(10)),
        ));

        let breaker = &mut self.circuit_breaker_config;
        breaker.failure_threshold = settings
            .get_int_or("circuit_failure_threshold", breaker.failure_threshold as i64)
            .max(1) as usize;
        breaker.reset_timeout = settings.get_duration_or("circuit_reset", breaker.reset_timeout);
        self
    }

    pub fn build(self) -> Result<ToolRegistry> {
        let mut roles: HashMap<StageName, Vec<String>> = HashMap::new();
        let mut capabilities: HashMap<String, RegisteredCapability> = HashMap::new();

        for (role, descriptor) in self.entries {
            let name = descriptor.capability_name.clone();
            if name.trim().is_empty() {
                return Err(ServiceError::configuration("capability name must not be empty"));
            }

            let role_caps = roles.entry(role).or_default();
            if role_caps.contains(&name) {
                return Err(ServiceError::configuration(format!(
                    "capability '{}' registered twice for role '{}'",
                    name, role
                )));
            }
            role_caps.push(name.clone());

            if let Some(existing) = capabilities.get(&name) {
                if existing.descriptor != descriptor {
                    return Err(ServiceError::configuration(format!(
                        "conflicting descriptors for capability '{}'",
                        name
                    )));
                }
                continue;
            }

            let credentials = self.credentials.group(&name).cloned();
            let resilience = Resilience::new(
                name.clone(),
                self.retry_config.clone(),
                self.circuit_breaker_config.clone(),
            );

            info!(
                capability = %name,
                role = %role,
                credentials = credentials.is_some(),
                endpoint = descriptor.primary_endpoint.as_deref().unwrap_or("-"),
                fallback = ?descriptor.fallback_strategy,
                "capability registered"
            );

            capabilities.insert(
                name,
                RegisteredCapability {
                    descriptor,
                    credentials,
                    resilience,
                },
            );
        }

        let primary = match self.primary {
            Some(primary) => primary,
            None => Arc::new(crate::client().build()?),
        };

        Ok(ToolRegistry {
            roles,
            capabilities,
            primary,
            fallback: self.fallback,
        })
    }
}
