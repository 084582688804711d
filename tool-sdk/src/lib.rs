//! # Tool SDK
//!
//! Capability invocation for the research pipeline.
//!
//! This crate provides:
//!
//! - `ToolInvoker`: the transport abstraction, with an HTTP implementation
//!   and deterministic local stand-ins
//! - `ToolRegistry`: the immutable role → capability map built at startup
//! - `FallbackResolver` / `ToolAccess`: primary-or-fallback resolution per call
//! - Resilience patterns (retries with backoff, circuit breakers)
//! - Configuration providers and credential groups
//! - `ServiceError`: the error taxonomy shared by all of the above

pub mod core;
pub use core::{
    capability, CapabilityCall, CapabilityResult, ClientBuilder, CredentialGroup, ResultSource,
    ToolInvoker,
};

pub mod services;
pub use services::{HttpToolInvoker, LocalToolInvoker};

pub mod error;
pub use error::{ErrorContext, Result, ServiceError};

pub mod resilience;
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, Resilience, RetryConfig, RetryExecutor};

pub mod config;
pub use config::{
    CompositeConfigProvider, ConfigProvider, ConfigProviderExt, CredentialStore, EnvConfigProvider,
    MemoryConfigProvider, ServiceConfig,
};

pub mod registry;
pub use registry::{CapabilityDescriptor, FallbackStrategy, RegistryBuilder, ToolRegistry};

pub mod fallback;
pub use fallback::{FallbackResolver, KeyedCall, ToolAccess};

pub mod util;

#[cfg(test)]
mod tests;

/// Create a new HTTP invoker builder
pub fn client() -> core::ClientBuilder {
    core::ClientBuilder::new()
}

/// Registry builder preloaded with the default capability catalog
pub fn default_registry() -> RegistryBuilder {
    ToolRegistry::builder().default_capabilities()
}
