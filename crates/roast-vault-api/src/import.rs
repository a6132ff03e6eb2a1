//! Import pipeline: untrusted export documents merged into the content store.
//!
//! Structural failures (unparseable input, checksum mismatch, unsupported
//! version) abort before the store is touched. Per-roast validation failures
//! are skipped and counted until they exceed `max_errors_allowed`, at which
//! point the whole import aborts. Preference, roast and favorite edits are
//! staged in one store transaction and committed together.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use roast_vault_core::codec::verify_document;
use roast_vault_core::migration::data_version;
use roast_vault_core::validation::{validate_item_at, validate_snapshot};
use roast_vault_core::{
    ExportSnapshot, LifecycleError, Operation, OperationContext, Phase, ProgressCounts, RoastId,
    SchemaMigrator, SnapshotMetadata, ValidationError, CURRENT_DATA_VERSION, MIN_IMPORT_VERSION,
};
use roast_vault_store_sqlite::{ContentStore, StoreTransaction, Upsert};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::progress::{ProgressReporter, ProgressSender};
use crate::recovery_log::RecoveryAdvisor;

const ITEM_PROGRESS_STRIDE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStrategy {
    Merge,
    Replace,
}

impl ImportStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Replace => "replace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    pub strategy: ImportStrategy,
    pub validate_data: bool,
    pub skip_duplicates: bool,
    pub preserve_existing_favorites: bool,
    pub allow_partial_import: bool,
    pub max_errors_allowed: usize,
}

impl ImportOptions {
    #[must_use]
    pub fn merge() -> Self {
        Self {
            strategy: ImportStrategy::Merge,
            validate_data: true,
            skip_duplicates: true,
            preserve_existing_favorites: true,
            allow_partial_import: true,
            max_errors_allowed: 10,
        }
    }

    #[must_use]
    pub fn replace() -> Self {
        Self {
            strategy: ImportStrategy::Replace,
            validate_data: true,
            skip_duplicates: false,
            preserve_existing_favorites: false,
            allow_partial_import: true,
            max_errors_allowed: 10,
        }
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::merge()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<ValidationError>,
    pub summary: String,
    pub migrated_from: Option<u32>,
    pub checksum_verified: bool,
    pub favorites_reasserted: usize,
}

impl ImportReport {
    #[must_use]
    pub fn counts(&self) -> ProgressCounts {
        ProgressCounts { succeeded: self.succeeded, skipped: self.skipped, failed: self.failed }
    }
}

/// Dry-run result of [`ImportEngine::preview_import`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPreview {
    pub metadata: SnapshotMetadata,
    pub new_items: usize,
    pub duplicate_items: usize,
    pub invalid_items: usize,
    pub warnings: Vec<String>,
    pub is_compatible: bool,
}

#[derive(Default)]
struct MergeTally {
    succeeded: usize,
    skipped: usize,
    failed: usize,
    errors: Vec<ValidationError>,
    favorites_reasserted: usize,
}

pub struct ImportEngine {
    store: Arc<ContentStore>,
    migrator: SchemaMigrator,
    advisor: Option<Arc<RecoveryAdvisor>>,
}

impl ImportEngine {
    #[must_use]
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store, migrator: SchemaMigrator::new(), advisor: None }
    }

    #[must_use]
    pub fn with_migrator(mut self, migrator: SchemaMigrator) -> Self {
        self.migrator = migrator;
        self
    }

    #[must_use]
    pub fn with_advisor(mut self, advisor: Arc<RecoveryAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Inspect `bytes` against the current store without mutating anything.
    ///
    /// # Errors
    /// Returns `InvalidFormat` when the document cannot be parsed or decoded.
    pub fn preview_import(&self, bytes: &[u8]) -> Result<ImportPreview, LifecycleError> {
        let document = parse_document(bytes)?;
        let mut warnings = Vec::new();
        let mut is_compatible = true;

        match verify_document(&document) {
            Ok(true) => {}
            Ok(false) => warnings.push("export carries no checksum; integrity is unverified".to_string()),
            Err(err) => {
                is_compatible = false;
                warnings.push(err.to_string());
            }
        }

        let version = data_version(&document)?;
        let document = match self.upgrade(version, &document) {
            Ok((upgraded, Some(from))) => {
                warnings.push(format!(
                    "data version {from} will be migrated to {CURRENT_DATA_VERSION}"
                ));
                upgraded
            }
            Ok((upgraded, None)) => upgraded,
            Err(err) => {
                is_compatible = false;
                warnings.push(err.to_string());
                document
            }
        };

        let snapshot = decode_snapshot(document)?;
        warnings.extend(validate_snapshot(&snapshot).iter().map(ToString::to_string));

        let existing: HashSet<RoastId> = self.store.roasts().iter().map(|item| item.id).collect();
        let now = OffsetDateTime::now_utc();
        let (mut new_items, mut duplicate_items, mut invalid_items) = (0, 0, 0);
        for (index, item) in snapshot.roast_history.iter().enumerate() {
            if !validate_item_at(item, &format!("roastHistory[{index}]"), now).is_empty() {
                invalid_items += 1;
            } else if existing.contains(&item.id) {
                duplicate_items += 1;
            } else {
                new_items += 1;
            }
        }

        Ok(ImportPreview {
            metadata: snapshot.metadata,
            new_items,
            duplicate_items,
            invalid_items,
            warnings,
            is_compatible,
        })
    }

    /// Read `path` and import it.
    ///
    /// # Errors
    /// Returns `FileNotFound` or `PermissionDenied` when the file cannot be
    /// read, otherwise as [`Self::import_data`].
    pub fn import_file(
        &self,
        path: &Path,
        options: ImportOptions,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, LifecycleError> {
        let bytes = read_boundary_file(path)?;
        self.import_data(&bytes, options, progress, cancel)
    }

    /// Run the import pipeline over `bytes`.
    ///
    /// # Errors
    /// Returns a structural error (`InvalidFormat`, `ChecksumMismatch`,
    /// `UnsupportedVersion`, migration errors) before any mutation,
    /// `ValidationFailed` or `TooManyErrors` for semantic failures,
    /// `Cancelled` when `cancel` fires before the commit, and `Storage` when
    /// the commit cannot be made durable.
    pub fn import_data(
        &self,
        bytes: &[u8],
        options: ImportOptions,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, LifecycleError> {
        let mut reporter = ProgressReporter::new(Operation::Import, progress);
        let result = self.run(bytes, options, &mut reporter, cancel);
        if let Err(err) = &result {
            let (processed, total) = reporter.items();
            let context = OperationContext::new(Operation::Import, reporter.phase())
                .with_progress(processed, total);
            if let Some(advisor) = &self.advisor {
                advisor.advise(err, &context);
            } else {
                warn!(phase = reporter.phase().as_str(), code = err.code(), error = %err, "import failed");
            }
            reporter.failed(err.to_string());
        }
        result
    }

    fn run(
        &self,
        bytes: &[u8],
        options: ImportOptions,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, LifecycleError> {
        cancel.check(Phase::Validating)?;
        reporter.stage(Phase::Validating, "Reading export");
        let document = parse_document(bytes)?;

        cancel.check(Phase::VerifyingChecksum)?;
        reporter.stage(Phase::VerifyingChecksum, "Verifying checksum");
        let checksum_verified = verify_document(&document)?;
        if !checksum_verified {
            warn!("import document carries no checksum");
        }

        cancel.check(Phase::CheckingVersion)?;
        reporter.stage(Phase::CheckingVersion, "Checking data version");
        let version = data_version(&document)?;
        check_version_window(version)?;
        let (document, migrated_from) = if version < CURRENT_DATA_VERSION {
            cancel.check(Phase::Migrating)?;
            reporter.stage(
                Phase::Migrating,
                format!("Migrating from version {version} to {CURRENT_DATA_VERSION}"),
            );
            self.upgrade(version, &document)?
        } else {
            (document, None)
        };
        let snapshot = decode_snapshot(document)?;

        cancel.check(Phase::ValidatingData)?;
        reporter.stage(Phase::ValidatingData, "Validating data");
        if options.validate_data {
            let errors = validate_snapshot(&snapshot);
            if !errors.is_empty() {
                return Err(LifecycleError::ValidationFailed(errors));
            }
        }

        cancel.check(Phase::MergingPreferences)?;
        let tally = self
            .store
            .transaction(|tx| stage_merge(tx, snapshot, options, reporter, cancel))?;

        let summary = format!(
            "Imported {} roast(s): {} skipped, {} failed",
            tally.succeeded, tally.skipped, tally.failed
        );
        let report = ImportReport {
            succeeded: tally.succeeded,
            skipped: tally.skipped,
            failed: tally.failed,
            errors: tally.errors,
            summary,
            migrated_from,
            checksum_verified,
            favorites_reasserted: tally.favorites_reasserted,
        };
        info!(
            strategy = options.strategy.as_str(),
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "import committed"
        );
        reporter.completed(report.summary.clone(), Some(report.counts()));
        Ok(report)
    }

    /// Migrate `document` to the current version when it is older. Returns
    /// the document and the version it was migrated from.
    fn upgrade(&self, version: u32, document: &Value) -> Result<(Value, Option<u32>), LifecycleError> {
        check_version_window(version)?;
        if version == CURRENT_DATA_VERSION {
            return Ok((document.clone(), None));
        }
        let migrated = self.migrator.migrate(version, CURRENT_DATA_VERSION, document)?;
        Ok((migrated, Some(version)))
    }
}

/// Stages 5 to 7 against the staged store copy. Returning `Err` discards
/// every staged edit.
fn stage_merge(
    tx: &mut StoreTransaction,
    snapshot: ExportSnapshot,
    options: ImportOptions,
    reporter: &mut ProgressReporter,
    cancel: &CancellationToken,
) -> Result<MergeTally, LifecycleError> {
    let ExportSnapshot { user_preferences, roast_history, favorites, .. } = snapshot;
    let mut tally = MergeTally::default();

    reporter.stage(Phase::MergingPreferences, "Merging preferences");
    tx.stage_preferences(user_preferences);

    cancel.check(Phase::MergingRoasts)?;
    reporter.stage(Phase::MergingRoasts, format!("Merging {} roast(s)", roast_history.len()));
    if options.strategy == ImportStrategy::Replace {
        tx.roasts_mut().clear();
    }
    let pre_existing: HashSet<RoastId> = tx.roasts().items().iter().map(|item| item.id).collect();
    let mut inserted: HashSet<RoastId> = HashSet::new();
    let (overwrite, sorted) = match options.strategy {
        ImportStrategy::Replace => (true, false),
        ImportStrategy::Merge => (!options.skip_duplicates, true),
    };

    let now = OffsetDateTime::now_utc();
    let total = roast_history.len();
    let end = Phase::ReconcilingFavorites.start_fraction();
    for (index, item) in roast_history.into_iter().enumerate() {
        if options.validate_data {
            let errors = validate_item_at(&item, &format!("roastHistory[{index}]"), now);
            if !errors.is_empty() {
                tally.failed += 1;
                tally.errors.extend(errors);
                if !options.allow_partial_import {
                    return Err(LifecycleError::ValidationFailed(tally.errors));
                }
                if tally.failed > options.max_errors_allowed {
                    return Err(LifecycleError::TooManyErrors {
                        threshold: options.max_errors_allowed,
                        errors: tally.errors,
                    });
                }
                continue;
            }
        }

        let id = item.id;
        match tx.roasts_mut().upsert(item, overwrite, sorted) {
            Upsert::Inserted => {
                inserted.insert(id);
                tally.succeeded += 1;
            }
            Upsert::Overwritten => tally.succeeded += 1,
            Upsert::Skipped => tally.skipped += 1,
        }
        if (index + 1) % ITEM_PROGRESS_STRIDE == 0 {
            reporter.advance(Phase::MergingRoasts, end, index + 1, total);
        }
    }
    reporter.advance(Phase::MergingRoasts, end, total, total);

    cancel.check(Phase::ReconcilingFavorites)?;
    reporter.stage(Phase::ReconcilingFavorites, "Reconciling favorites");
    if options.preserve_existing_favorites {
        for id in favorites {
            if inserted.contains(&id) || !pre_existing.contains(&id) {
                continue;
            }
            if tx.roasts_mut().set_favorite(id, true) == Some(false) {
                tally.favorites_reasserted += 1;
            }
        }
    }

    cancel.check(Phase::Saving)?;
    reporter.stage(Phase::Saving, "Saving");
    Ok(tally)
}

fn check_version_window(version: u32) -> Result<(), LifecycleError> {
    if !(MIN_IMPORT_VERSION..=CURRENT_DATA_VERSION).contains(&version) {
        return Err(LifecycleError::UnsupportedVersion {
            found: version,
            min: MIN_IMPORT_VERSION,
            max: CURRENT_DATA_VERSION,
        });
    }
    Ok(())
}

fn parse_document(bytes: &[u8]) -> Result<Value, LifecycleError> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|err| LifecycleError::InvalidFormat(format!("not a JSON document: {err}")))?;
    if !document.is_object() {
        return Err(LifecycleError::InvalidFormat("export MUST be a JSON object".to_string()));
    }
    Ok(document)
}

fn decode_snapshot(document: Value) -> Result<ExportSnapshot, LifecycleError> {
    serde_json::from_value(document)
        .map_err(|err| LifecycleError::InvalidFormat(format!("export does not match schema: {err}")))
}

/// Read an export file from outside the store.
///
/// # Errors
/// Returns `FileNotFound` or `PermissionDenied` for those I/O failures and
/// `Storage` for any other read error.
pub fn read_boundary_file(path: &Path) -> Result<Vec<u8>, LifecycleError> {
    std::fs::read(path).map_err(|err| {
        let path = path.display().to_string();
        match err.kind() {
            std::io::ErrorKind::NotFound => LifecycleError::FileNotFound { path },
            std::io::ErrorKind::PermissionDenied => LifecycleError::PermissionDenied { path },
            _ => LifecycleError::Storage(format!("failed to read {path}: {err}")),
        }
    })
}
