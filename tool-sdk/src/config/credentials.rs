//! Credential groups, one per capability.
//!
//! A capability whose group is incomplete simply has no entry here; the
//! resolver treats that as "use the local stand-in", never as a startup error.

use std::collections::HashMap;

use tracing::debug;

use super::ConfigProvider;
use crate::core::CredentialGroup;

#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    groups: HashMap<String, CredentialGroup>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the group for `capability` from `provider`.
    ///
    /// The group is stored only if every required credential is present
    /// and non-blank. Capabilities that need no credentials always get an
    /// empty group.
    pub fn load<P>(&mut self, provider: &P, capability: &str, required: &[String]) -> bool
    where
        P: ConfigProvider + ?Sized,
    {
        let mut group = CredentialGroup::new();
        for name in required {
            match provider.get_string(name) {
                Ok(value) if !value.trim().is_empty() => {
                    group.insert(name.clone(), value);
                }
                _ => {
                    debug!(capability, credential = %name, "credential missing");
                    self.groups.remove(capability);
                    return false;
                }
            }
        }

        self.groups.insert(capability.to_string(), group);
        true
    }

    /// Insert a group directly
    pub fn insert(&mut self, capability: impl Into<String>, group: CredentialGroup) {
        self.groups.insert(capability.into(), group);
    }

    pub fn group(&self, capability: &str) -> Option<&CredentialGroup> {
        self.groups.get(capability)
    }

    pub fn is_configured(&self, capability: &str) -> bool {
        self.groups.contains_key(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigProvider;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_complete_group_is_stored() {
        let provider = MemoryConfigProvider::new()
            .with("GMAIL_CLIENT_ID", "id")
            .with("GMAIL_CLIENT_SECRET", "secret");
        let mut store = CredentialStore::new();

        assert!(store.load(&provider, "email_delivery", &names(&["GMAIL_CLIENT_ID", "GMAIL_CLIENT_SECRET"])));
        assert_eq!(store.group("email_delivery").map(|g| g.len()), Some(2));
    }

    #[test]
    fn test_partial_or_blank_group_is_absent() {
        let provider = MemoryConfigProvider::new()
            .with("GMAIL_CLIENT_ID", "id")
            .with("SLACK_BOT_TOKEN", "  ");
        let mut store = CredentialStore::new();

        assert!(!store.load(&provider, "email_delivery", &names(&["GMAIL_CLIENT_ID", "GMAIL_CLIENT_SECRET"])));
        assert!(!store.load(&provider, "slack_delivery", &names(&["SLACK_BOT_TOKEN"])));
        assert!(!store.is_configured("email_delivery"));
    }

    #[test]
    fn test_no_requirements_means_configured() {
        let mut store = CredentialStore::new();
        assert!(store.load(&MemoryConfigProvider::new(), "storage", &[]));
        assert!(store.group("storage").unwrap().is_empty());
    }
}
