use std::collections::HashMap;

use parking_lot::RwLock;

/// Fixed identifier of the text-generation API key.
pub const API_KEY_SECRET: &str = "roast_vault.api_key";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret backend unavailable: {0}")]
    Unavailable(String),
}

/// Opaque holder for secret strings. Kept apart from the content store so no
/// export path can reach it.
pub trait SecretStore: Send + Sync {
    /// # Errors
    /// Returns an error when the backend cannot be queried.
    fn secret(&self, key: &str) -> Result<Option<String>, SecretError>;

    /// # Errors
    /// Returns an error when the backend cannot store the value.
    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretError>;

    /// # Errors
    /// Returns an error when the backend cannot remove the value.
    fn remove_secret(&self, key: &str) -> Result<(), SecretError>;
}

#[derive(Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<String, String>>,
}

impl SecretStore for MemorySecretStore {
    fn secret(&self, key: &str) -> Result<Option<String>, SecretError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_secret(&self, key: &str) -> Result<(), SecretError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_and_removes() -> Result<(), SecretError> {
        let store = MemorySecretStore::default();
        assert_eq!(store.secret(API_KEY_SECRET)?, None);
        store.set_secret(API_KEY_SECRET, "sk-test")?;
        assert_eq!(store.secret(API_KEY_SECRET)?.as_deref(), Some("sk-test"));
        store.remove_secret(API_KEY_SECRET)?;
        assert_eq!(store.secret(API_KEY_SECRET)?, None);
        Ok(())
    }
}
