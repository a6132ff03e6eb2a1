//! Export pipeline: store contents to a sealed snapshot file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use roast_vault_core::codec::seal;
use roast_vault_core::validation::validate_snapshot_with_items;
use roast_vault_core::{
    ApiConfiguration, DeviceInfo, ExportSnapshot, LifecycleError, Operation, OperationContext,
    Phase, SnapshotMetadata, Statistics, CURRENT_DATA_VERSION,
};
use roast_vault_store_sqlite::ContentStore;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::anonymize::anonymize_item;
use crate::cancel::CancellationToken;
use crate::config::VaultConfig;
use crate::progress::{ProgressReporter, ProgressSender};
use crate::recovery_log::RecoveryAdvisor;

const ITEM_PROGRESS_STRIDE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub include_api_configuration: bool,
    pub include_device_info: bool,
    pub include_statistics: bool,
    pub anonymize_data: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_api_configuration: true,
            include_device_info: true,
            include_statistics: true,
            anonymize_data: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub bytes: u64,
    pub checksum: String,
    pub total_roasts: usize,
    pub total_favorites: usize,
}

/// Free space reported for a destination directory, when known.
pub trait SpaceProbe: Send + Sync {
    fn available_bytes(&self, dir: &Path) -> Option<u64>;
}

/// Free space as reported by the filesystem holding the directory. A directory
/// that cannot be queried reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemSpace;

impl SpaceProbe for FilesystemSpace {
    fn available_bytes(&self, dir: &Path) -> Option<u64> {
        match fs4::available_space(dir) {
            Ok(available) => Some(available),
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "free space unavailable");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedSpace(pub u64);

impl SpaceProbe for FixedSpace {
    fn available_bytes(&self, _dir: &Path) -> Option<u64> {
        Some(self.0)
    }
}

pub struct ExportEngine {
    store: Arc<ContentStore>,
    config: VaultConfig,
    space: Arc<dyn SpaceProbe>,
    advisor: Option<Arc<RecoveryAdvisor>>,
}

impl ExportEngine {
    #[must_use]
    pub fn new(store: Arc<ContentStore>, config: VaultConfig) -> Self {
        Self { store, config, space: Arc::new(FilesystemSpace), advisor: None }
    }

    #[must_use]
    pub fn with_space_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.space = probe;
        self
    }

    #[must_use]
    pub fn with_advisor(mut self, advisor: Arc<RecoveryAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Build and seal a snapshot without writing it anywhere.
    ///
    /// # Errors
    /// Returns `ValidationFailed` when the store contents fail pre-flight
    /// validation, or a format error when serialization fails.
    pub fn build_snapshot(&self, options: ExportOptions) -> Result<ExportSnapshot, LifecycleError> {
        let mut reporter = ProgressReporter::new(Operation::Export, None);
        self.assemble(options, &mut reporter, &CancellationToken::new())
            .map(|(snapshot, _)| snapshot)
    }

    /// Run the full export and write the sealed document to `destination`.
    ///
    /// The file appears at `destination` only when complete; on failure no
    /// partial file is left behind.
    ///
    /// # Errors
    /// Returns the first stage failure: validation, size ceiling, free space,
    /// file I/O, or `Cancelled` when `cancel` fires before writing.
    pub fn export_snapshot(
        &self,
        options: ExportOptions,
        destination: &Path,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<ExportSummary, LifecycleError> {
        let mut reporter = ProgressReporter::new(Operation::Export, progress);
        let result = self.run(options, destination, &mut reporter, cancel);
        if let Err(err) = &result {
            let (processed, total) = reporter.items();
            let context = OperationContext::new(Operation::Export, reporter.phase())
                .with_progress(processed, total);
            if let Some(advisor) = &self.advisor {
                advisor.advise(err, &context);
            }
            reporter.failed(err.to_string());
        }
        result
    }

    fn run(
        &self,
        options: ExportOptions,
        destination: &Path,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ExportSummary, LifecycleError> {
        let (snapshot, bytes) = self.assemble(options, reporter, cancel)?;
        let size = u64::try_from(bytes.len())
            .map_err(|_| LifecycleError::Internal("payload length overflow".to_string()))?;

        cancel.check(Phase::CheckingSize)?;
        reporter.stage(Phase::CheckingSize, "Checking size");
        if size > self.config.max_export_bytes {
            return Err(LifecycleError::InsufficientStorage {
                required: size,
                available: self.config.max_export_bytes,
            });
        }
        let dir = parent_dir(destination);
        if let Some(available) = self.space.available_bytes(dir) {
            let required = size.saturating_mul(2);
            if available < required {
                return Err(LifecycleError::InsufficientStorage { required, available });
            }
        }

        cancel.check(Phase::Writing)?;
        reporter.stage(Phase::Writing, format!("Writing {size} bytes"));
        write_atomically(destination, &bytes)?;

        let checksum = snapshot.checksum.clone().unwrap_or_default();
        let summary = ExportSummary {
            path: destination.to_path_buf(),
            bytes: size,
            checksum,
            total_roasts: snapshot.metadata.total_roasts,
            total_favorites: snapshot.metadata.total_favorites,
        };
        info!(path = %destination.display(), bytes = size, "export written");
        reporter.completed(
            format!(
                "Exported {} roast(s) and {} favorite(s)",
                summary.total_roasts, summary.total_favorites
            ),
            None,
        );
        Ok(summary)
    }

    /// Stages up to and including serialization.
    fn assemble(
        &self,
        options: ExportOptions,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(ExportSnapshot, Vec<u8>), LifecycleError> {
        cancel.check(Phase::Preparing)?;
        reporter.stage(Phase::Preparing, "Preparing export");

        cancel.check(Phase::CollectingData)?;
        reporter.stage(Phase::CollectingData, "Collecting data");
        let roasts = self.store.roasts();
        let mut preferences = self.store.preferences();

        cancel.check(Phase::ProcessingRoasts)?;
        reporter.stage(Phase::ProcessingRoasts, format!("Processing {} roast(s)", roasts.len()));
        let total = roasts.len();
        let end = Phase::CollectingFavorites.start_fraction();
        let mut items = Vec::with_capacity(total);
        for (index, item) in roasts.into_iter().enumerate() {
            items.push(if options.anonymize_data { anonymize_item(item) } else { item });
            if (index + 1) % ITEM_PROGRESS_STRIDE == 0 {
                reporter.advance(Phase::ProcessingRoasts, end, index + 1, total);
            }
        }
        reporter.advance(Phase::ProcessingRoasts, end, total, total);

        cancel.check(Phase::CollectingFavorites)?;
        reporter.stage(Phase::CollectingFavorites, "Collecting favorites");
        let favorites = ExportSnapshot::favorite_ids(&items);

        cancel.check(Phase::GeneratingMetadata)?;
        reporter.stage(Phase::GeneratingMetadata, "Generating metadata");
        if !options.include_api_configuration {
            preferences.api_configuration = ApiConfiguration::default();
        }
        let now = OffsetDateTime::now_utc();
        let metadata = SnapshotMetadata {
            app_version: self.config.app_version.clone(),
            data_version: CURRENT_DATA_VERSION,
            export_date: now,
            total_roasts: items.len(),
            total_favorites: favorites.len(),
            device_info: options
                .include_device_info
                .then(|| DeviceInfo::current(&self.config.app_version)),
        };
        let statistics = options.include_statistics.then(|| Statistics::from_items(&items));
        let mut snapshot = ExportSnapshot {
            metadata,
            user_preferences: preferences,
            roast_history: items,
            favorites,
            statistics,
            checksum: None,
        };

        let errors = validate_snapshot_with_items(&snapshot, now);
        if !errors.is_empty() {
            return Err(LifecycleError::ValidationFailed(errors));
        }

        cancel.check(Phase::Serializing)?;
        reporter.stage(Phase::Serializing, "Serializing");
        let bytes = seal(&mut snapshot)?;
        debug!(bytes = bytes.len(), "export sealed");
        Ok((snapshot, bytes))
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Map an I/O failure at `path` onto the resource error taxonomy.
pub(crate) fn io_error(path: &Path, err: &std::io::Error) -> LifecycleError {
    let path_text = path.display().to_string();
    match err.kind() {
        std::io::ErrorKind::NotFound => LifecycleError::FileNotFound { path: path_text },
        std::io::ErrorKind::PermissionDenied => LifecycleError::PermissionDenied { path: path_text },
        _ => LifecycleError::FileWrite { path: path_text, reason: err.to_string() },
    }
}

fn write_atomically(destination: &Path, bytes: &[u8]) -> Result<(), LifecycleError> {
    let dir = parent_dir(destination);
    let mut temp = NamedTempFile::new_in(dir).map_err(|err| io_error(dir, &err))?;
    temp.write_all(bytes).map_err(|err| io_error(destination, &err))?;
    temp.as_file().sync_all().map_err(|err| io_error(destination, &err))?;
    temp.persist(destination).map_err(|err| io_error(destination, &err.error))?;
    Ok(())
}
