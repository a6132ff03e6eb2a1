use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use roast_vault_store_sqlite::{StoreCaps, DEFAULT_BULK_CAP, DEFAULT_SINGLE_ITEM_CAP};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_EXPORT_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_RECOVERY_LOG_CAPACITY: usize = 50;
pub const DEFAULT_RECOVERY_LOG_FILE: &str = "roast_vault_recovery.json";

/// Runtime knobs for the data lifecycle. Every field is optional in YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VaultConfig {
    pub single_item_cap: usize,
    pub bulk_cap: usize,
    pub max_export_bytes: u64,
    pub recovery_log_capacity: usize,
    pub recovery_log_path: Option<PathBuf>,
    pub app_version: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            single_item_cap: DEFAULT_SINGLE_ITEM_CAP,
            bulk_cap: DEFAULT_BULK_CAP,
            max_export_bytes: DEFAULT_MAX_EXPORT_BYTES,
            recovery_log_capacity: DEFAULT_RECOVERY_LOG_CAPACITY,
            recovery_log_path: None,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl VaultConfig {
    /// Read a YAML config file.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or is not valid YAML for this shape.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    /// # Errors
    /// Returns an error when `raw` is not valid YAML for this shape.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("failed to parse YAML config")?;
        Ok(config.normalized())
    }

    /// The bulk cap never sits below the single-item cap.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.bulk_cap = self.bulk_cap.max(self.single_item_cap);
        self
    }

    #[must_use]
    pub fn store_caps(&self) -> StoreCaps {
        StoreCaps { single_item_cap: self.single_item_cap, bulk_cap: self.bulk_cap }
    }

    /// Recovery log location, defaulting to a file next to `db_path`.
    #[must_use]
    pub fn recovery_log_path_for(&self, db_path: &Path) -> PathBuf {
        if let Some(path) = &self.recovery_log_path {
            return path.clone();
        }
        match db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(DEFAULT_RECOVERY_LOG_FILE),
            _ => PathBuf::from(DEFAULT_RECOVERY_LOG_FILE),
        }
    }
}
