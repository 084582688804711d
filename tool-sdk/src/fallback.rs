//! # Capability resolution with fallback
//!
//! [`FallbackResolver`] is the single place where a capability call decides
//! between the primary endpoint and the local stand-in:
//!
//! 1. missing credentials, missing endpoint or an open circuit skip the
//!    primary entirely (no network attempt);
//! 2. otherwise the primary is called with per-attempt timeouts and
//!    exponential-backoff retries on transient errors;
//! 3. when the primary is skipped or exhausted, the fallback strategy is
//!    applied; if it is absent or fails too the call yields
//!    `CapabilityUnavailable`.
//!
//! [`ToolAccess`] is the per-stage view of the resolver. It binds a role,
//! records every capability that was served by a fallback, and runs
//! independent calls concurrently.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use serde_json::Value;
use shared_types_rs::StageName;
use tracing::{debug, info, warn};

use crate::core::{CapabilityCall, CapabilityResult, ResultSource};
use crate::error::{Result, ServiceError};
use crate::registry::{FallbackStrategy, RegisteredCapability, ToolRegistry};
use crate::util::{generate_call_id, sanitize_for_logging};

#[derive(Debug, Default)]
struct ResolverMetrics {
    primary_success: AtomicU64,
    fallback_used: AtomicU64,
    unavailable: AtomicU64,
}

pub struct FallbackResolver {
    registry: Arc<ToolRegistry>,
    metrics: ResolverMetrics,
}

impl FallbackResolver {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            metrics: ResolverMetrics::default(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Resolve one capability call for `role`.
    pub async fn invoke(
        &self,
        role: StageName,
        capability: &str,
        arguments: Value,
    ) -> Result<CapabilityResult> {
        let entry = self.registry.lookup(role, capability)?;
        let call_id = generate_call_id();

        let primary_failure = match entry.primary_blocker() {
            Some(blocker) => {
                debug!(%role, capability, %call_id, blocker, "skipping primary");
                blocker.to_string()
            }
            None => match self.call_primary(entry, &arguments).await {
                Ok(data) => {
                    self.metrics.primary_success.fetch_add(1, Ordering::Relaxed);
                    return Ok(CapabilityResult {
                        capability: capability.to_string(),
                        data,
                        source: ResultSource::Primary,
                    });
                }
                Err(err) => {
                    let message = sanitize_for_logging(&err.to_string());
                    warn!(
                        %role,
                        capability,
                        %call_id,
                        error_kind = err.kind(),
                        error = %message,
                        "primary failed, falling back"
                    );
                    message
                }
            },
        };

        self.call_fallback(entry, arguments, &call_id, primary_failure).await
    }

    async fn call_primary(&self, entry: &RegisteredCapability, arguments: &Value) -> Result<Value> {
        let call = CapabilityCall::new(&entry.descriptor.capability_name, arguments.clone())
            .with_credentials(entry.credentials.clone().unwrap_or_default());
        let call = match entry.descriptor.primary_endpoint.as_deref() {
            Some(endpoint) => call.with_endpoint(endpoint),
            None => call,
        };

        let invoker = self.registry.primary_invoker();
        entry.resilience.execute(|| invoker.invoke(&call)).await
    }

    async fn call_fallback(
        &self,
        entry: &RegisteredCapability,
        arguments: Value,
        call_id: &str,
        primary_failure: String,
    ) -> Result<CapabilityResult> {
        let capability = entry.descriptor.capability_name.as_str();

        if entry.descriptor.fallback_strategy == FallbackStrategy::None {
            self.metrics.unavailable.fetch_add(1, Ordering::Relaxed);
            return Err(ServiceError::capability_unavailable(
                capability,
                format!("{}; no fallback registered", primary_failure),
            ));
        }

        let call = CapabilityCall::new(capability, arguments);
        match self.registry.fallback_invoker().invoke(&call).await {
            Ok(data) => {
                self.metrics.fallback_used.fetch_add(1, Ordering::Relaxed);
                info!(capability, call_id, reason = %primary_failure, "served by local stand-in");
                Ok(CapabilityResult {
                    capability: capability.to_string(),
                    data,
                    source: ResultSource::Fallback,
                })
            }
            Err(err) => {
                self.metrics.unavailable.fetch_add(1, Ordering::Relaxed);
                Err(ServiceError::capability_unavailable(
                    capability,
                    format!("{}; fallback failed: {}", primary_failure, err),
                ))
            }
        }
    }

    pub fn metrics(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(
            "primary_success".to_string(),
            self.metrics.primary_success.load(Ordering::Relaxed).to_string(),
        );
        map.insert(
            "fallback_used".to_string(),
            self.metrics.fallback_used.load(Ordering::Relaxed).to_string(),
        );
        map.insert(
            "unavailable".to_string(),
            self.metrics.unavailable.load(Ordering::Relaxed).to_string(),
        );
        map
    }
}

/// One call in a concurrent batch. Results are keyed by `key`, which
/// defaults to the capability name.
#[derive(Debug, Clone)]
pub struct KeyedCall {
    pub key: String,
    pub capability: String,
    pub arguments: Value,
}

impl KeyedCall {
    pub fn new(capability: impl Into<String>, arguments: Value) -> Self {
        let capability = capability.into();
        Self {
            key: capability.clone(),
            capability,
            arguments,
        }
    }

    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

/// Stage-scoped access to the resolver.
pub struct ToolAccess {
    role: StageName,
    resolver: Arc<FallbackResolver>,
    used_fallback: Mutex<BTreeSet<String>>,
}

impl ToolAccess {
    pub fn new(role: StageName, resolver: Arc<FallbackResolver>) -> Self {
        Self {
            role,
            resolver,
            used_fallback: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn role(&self) -> StageName {
        self.role
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.resolver.registry().has_capability(self.role, capability)
    }

    pub async fn invoke(&self, capability: &str, arguments: Value) -> Result<CapabilityResult> {
        let result = self.resolver.invoke(self.role, capability, arguments).await?;
        if result.is_fallback() {
            self.used_fallback
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(result.capability.clone());
        }
        Ok(result)
    }

    /// Run independent calls concurrently and join all of them.
    ///
    /// Every call completes (or fails) before this returns; the caller
    /// decides what a failure means for the stage.
    pub async fn invoke_concurrent(
        &self,
        calls: Vec<KeyedCall>,
    ) -> BTreeMap<String, Result<CapabilityResult>> {
        let futures = calls.into_iter().map(|call| async move {
            let result = self.invoke(&call.capability, call.arguments).await;
            (call.key, result)
        });

        join_all(futures).await.into_iter().collect()
    }

    /// Capabilities served by a fallback so far
    pub fn used_fallback(&self) -> BTreeSet<String> {
        self.used_fallback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
