//! Shared fixtures for the pipeline tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use orchestrator_service::{PipelineSettings, WorkflowOrchestrator};
use serde_json::Value;
use tool_sdk::{
    CapabilityCall, LocalToolInvoker, MemoryConfigProvider, RegistryBuilder, RetryConfig,
    ServiceError, ToolInvoker, ToolRegistry,
};

/// Local stand-in with injectable failures and delays.
#[derive(Default)]
pub struct ScriptedInvoker {
    local: LocalToolInvoker,
    failures: Vec<(String, Option<String>)>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call to `capability`
    pub fn fail(mut self, capability: &str) -> Self {
        self.failures.push((capability.to_string(), None));
        self
    }

    /// Fail calls to `capability` whose arguments mention `needle`
    pub fn fail_when(mut self, capability: &str, needle: &str) -> Self {
        self.failures.push((capability.to_string(), Some(needle.to_string())));
        self
    }

    pub fn delay(mut self, capability: &str, delay: Duration) -> Self {
        self.delays.insert(capability.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn should_fail(&self, call: &CapabilityCall) -> bool {
        let arguments = call.arguments.to_string();
        self.failures.iter().any(|(capability, needle)| {
            *capability == call.capability
                && needle.as_ref().map_or(true, |n| arguments.contains(n.as_str()))
        })
    }
}

#[async_trait]
impl ToolInvoker for ScriptedInvoker {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn invoke(&self, call: &CapabilityCall) -> tool_sdk::Result<Value> {
        self.calls.lock().unwrap().push(call.capability.clone());
        if let Some(delay) = self.delays.get(&call.capability) {
            tokio::time::sleep(*delay).await;
        }
        if self.should_fail(call) {
            return Err(ServiceError::tool(format!("scripted failure for {}", call.capability)));
        }
        self.local.invoke(call).await
    }
}

pub fn quick_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 1,
        initial_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(10),
        attempt_timeout: Some(Duration::from_millis(500)),
        ..RetryConfig::default()
    }
}

/// Registry with every default capability and no credentials, so every
/// call is served by `fallback`.
pub fn offline_registry(fallback: Arc<ScriptedInvoker>) -> RegistryBuilder {
    ToolRegistry::builder()
        .default_capabilities()
        .credentials_from(&MemoryConfigProvider::new())
        .primary_invoker(Arc::new(ScriptedInvoker::new()))
        .fallback_invoker(fallback)
        .retry_config(quick_retry())
}

pub fn orchestrator(registry: RegistryBuilder, settings: PipelineSettings) -> WorkflowOrchestrator {
    WorkflowOrchestrator::new(registry.build().unwrap(), settings)
}

pub fn offline_orchestrator(fallback: Arc<ScriptedInvoker>) -> WorkflowOrchestrator {
    orchestrator(offline_registry(fallback), PipelineSettings::default())
}
