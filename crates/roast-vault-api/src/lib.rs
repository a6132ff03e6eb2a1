//! Export, import and recovery services over a roast content store.

pub mod anonymize;
pub mod cancel;
pub mod config;
pub mod export;
pub mod import;
pub mod progress;
pub mod recovery_log;
pub mod secrets;
pub mod tasks;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use roast_vault_store_sqlite::ContentStore;

pub use cancel::CancellationToken;
pub use config::VaultConfig;
pub use export::{
    ExportEngine, ExportOptions, ExportSummary, FilesystemSpace, FixedSpace, SpaceProbe,
};
pub use import::{
    read_boundary_file, ImportEngine, ImportOptions, ImportPreview, ImportReport, ImportStrategy,
};
pub use progress::{ProgressReporter, ProgressSender};
pub use recovery_log::{RecoveryAdvisor, RecoveryLogEntry};
pub use secrets::{MemorySecretStore, SecretStore, API_KEY_SECRET};
pub use tasks::{spawn_export, spawn_import, TaskHandle};

/// A content store wired to its export and import engines and a shared
/// recovery advisor.
pub struct RoastVault {
    store: Arc<ContentStore>,
    advisor: Arc<RecoveryAdvisor>,
    export: Arc<ExportEngine>,
    import: Arc<ImportEngine>,
    config: VaultConfig,
}

impl RoastVault {
    /// Open the SQLite store at `db_path`, with the recovery log placed per `config`.
    ///
    /// # Errors
    /// Returns an error when the store cannot be opened or loaded.
    pub fn open(db_path: &Path, config: &VaultConfig) -> Result<Self> {
        let store = ContentStore::open(db_path, config.store_caps())
            .with_context(|| format!("failed to open roast vault at {}", db_path.display()))?;
        let advisor = RecoveryAdvisor::open(
            &config.recovery_log_path_for(db_path),
            config.recovery_log_capacity,
        );
        Ok(Self::assemble(Arc::new(store), Arc::new(advisor), config))
    }

    /// In-memory vault with an in-memory recovery log.
    ///
    /// # Errors
    /// Returns an error when the store cannot be created.
    pub fn in_memory(config: &VaultConfig) -> Result<Self> {
        let store = ContentStore::in_memory(config.store_caps())?;
        let advisor = RecoveryAdvisor::in_memory(config.recovery_log_capacity);
        Ok(Self::assemble(Arc::new(store), Arc::new(advisor), config))
    }

    fn assemble(store: Arc<ContentStore>, advisor: Arc<RecoveryAdvisor>, config: &VaultConfig) -> Self {
        let export = ExportEngine::new(Arc::clone(&store), config.clone())
            .with_advisor(Arc::clone(&advisor));
        let import = ImportEngine::new(Arc::clone(&store)).with_advisor(Arc::clone(&advisor));
        Self {
            store,
            advisor,
            export: Arc::new(export),
            import: Arc::new(import),
            config: config.clone(),
        }
    }

    /// Replace the free-space probe used by exports.
    #[must_use]
    pub fn with_space_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        let export = ExportEngine::new(Arc::clone(&self.store), self.config.clone())
            .with_advisor(Arc::clone(&self.advisor))
            .with_space_probe(probe);
        self.export = Arc::new(export);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    #[must_use]
    pub fn advisor(&self) -> &Arc<RecoveryAdvisor> {
        &self.advisor
    }

    #[must_use]
    pub fn exporter(&self) -> &Arc<ExportEngine> {
        &self.export
    }

    #[must_use]
    pub fn importer(&self) -> &Arc<ImportEngine> {
        &self.import
    }
}
