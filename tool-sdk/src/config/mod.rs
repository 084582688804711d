//! Configuration providers
//!
//! Settings are read through [`ConfigProvider`] so the same code works
//! against the process environment, static maps in tests, or a chain of
//! both. Credentials live in [`credentials`].

pub mod credentials;

pub use credentials::CredentialStore;

use std::collections::HashMap;
use std::env;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::error::{Result, ServiceError};

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Typed accessors layered on top of [`ConfigProvider::get_string`]
pub trait ConfigProviderExt: ConfigProvider {
    fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<i64>()
            .map_err(|e| ServiceError::configuration(format!("invalid integer for {}: {}", key, e)))
    }

    fn get_float(&self, key: &str) -> Result<f64> {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<f64>()
            .map_err(|e| ServiceError::configuration(format!("invalid float for {}: {}", key, e)))
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_string(key)?;
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(ServiceError::configuration(format!(
                "invalid boolean for {}: {}",
                key, value
            ))),
        }
    }

    /// Durations accept `250ms`, `30s`, `5m`, `1h` or bare seconds.
    fn get_duration(&self, key: &str) -> Result<Duration> {
        let value = self.get_string(key)?;
        crate::util::parse_duration(&value).ok_or_else(|| {
            ServiceError::configuration(format!("invalid duration for {}: {}", key, value))
        })
    }

    /// Comma-separated list, blanks removed
    fn get_list(&self, key: &str) -> Result<Vec<String>> {
        let value = self.get_string(key)?;
        Ok(value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    fn get_float_or(&self, key: &str, default: f64) -> f64 {
        self.get_float(key).unwrap_or(default)
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    fn get_duration_or(&self, key: &str, default: Duration) -> Duration {
        self.get_duration(key).unwrap_or(default)
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    prefix: Option<String>,
    namespace: Option<String>,
}

impl EnvConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// `PREFIX_NAMESPACE_KEY`, upper-cased, non-alphanumerics as `_`
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        for part in [&self.prefix, &self.namespace].into_iter().flatten() {
            env_key.push_str(part);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));
        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => {
                ServiceError::configuration(format!("environment variable not set: {}", env_key))
            }
            env::VarError::NotUnicode(_) => ServiceError::configuration(format!(
                "environment variable is not valid unicode: {}",
                env_key
            )),
        })
    }
}

/// In-memory config provider for tests or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }

    /// Builder form of [`MemoryConfigProvider::set`]
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.set(key, value);
        self
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::configuration(format!("configuration key not found: {}", key)))
    }
}

/// Tries each provider in order and returns the first hit
#[derive(Clone, Default)]
pub struct CompositeConfigProvider {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl CompositeConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider(&mut self, provider: Arc<dyn ConfigProvider>) {
        self.providers.push(provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.add_provider(provider);
        self
    }
}

impl ConfigProvider for CompositeConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.providers
            .iter()
            .find_map(|provider| provider.get_string(key).ok())
            .ok_or_else(|| {
                ServiceError::configuration(format!("configuration key not found in any provider: {}", key))
            })
    }
}

/// Settings provider reading `PIPELINE_*` environment variables
pub static DEFAULT_PROVIDER: Lazy<Arc<EnvConfigProvider>> =
    Lazy::new(|| Arc::new(EnvConfigProvider::new().with_prefix("PIPELINE")));

/// Trait for validated configuration structs
pub trait ServiceConfig: Debug + Send + Sync {
    fn validate(&self) -> Result<()>;

    fn service_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key_format() {
        let provider = EnvConfigProvider::new().with_prefix("PIPELINE");
        assert_eq!(provider.format_key("web_search_endpoint"), "PIPELINE_WEB_SEARCH_ENDPOINT");
        assert_eq!(provider.format_key("max-sources"), "PIPELINE_MAX_SOURCES");

        let namespaced = EnvConfigProvider::new().with_prefix("A").with_namespace("B");
        assert_eq!(namespaced.format_key("key"), "A_B_KEY");
    }

    #[test]
    fn test_typed_getters() {
        let provider = MemoryConfigProvider::new()
            .with("max_sources", "7")
            .with("min_relevance", "0.25")
            .with("enabled", "yes")
            .with("call_timeout", "250ms")
            .with("report_formats", "markdown, json,,text");

        assert_eq!(provider.get_int("max_sources").unwrap(), 7);
        assert_eq!(provider.get_float("min_relevance").unwrap(), 0.25);
        assert!(provider.get_bool("enabled").unwrap());
        assert_eq!(provider.get_duration("call_timeout").unwrap(), Duration::from_millis(250));
        assert_eq!(provider.get_list("report_formats").unwrap(), vec!["markdown", "json", "text"]);
        assert_eq!(provider.get_int_or("missing", 3), 3);
    }

    #[test]
    fn test_composite_order() {
        let first = MemoryConfigProvider::new().with("key", "first");
        let second = MemoryConfigProvider::new().with("key", "second").with("other", "x");

        let provider = CompositeConfigProvider::new()
            .with_provider(Arc::new(first))
            .with_provider(Arc::new(second));

        assert_eq!(provider.get_string("key").unwrap(), "first");
        assert_eq!(provider.get_string("other").unwrap(), "x");
        assert!(provider.get_string("nope").is_err());
    }
}
