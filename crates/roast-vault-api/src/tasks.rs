use std::path::PathBuf;
use std::sync::Arc;

use roast_vault_core::{LifecycleError, ProgressEvent};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;

use crate::cancel::CancellationToken;
use crate::export::{ExportEngine, ExportOptions, ExportSummary};
use crate::import::{ImportEngine, ImportOptions, ImportReport};

/// A pipeline running on the blocking pool. Drain `events` until it closes,
/// then [`Self::finish`].
pub struct TaskHandle<T> {
    pub events: UnboundedReceiver<ProgressEvent>,
    pub cancel: CancellationToken,
    join: JoinHandle<Result<T, LifecycleError>>,
}

impl<T> TaskHandle<T> {
    /// # Errors
    /// Returns the pipeline's error, or `Internal` when the task panicked.
    pub async fn finish(self) -> Result<T, LifecycleError> {
        self.join
            .await
            .map_err(|err| LifecycleError::Internal(format!("task join error: {err}")))?
    }
}

/// Run an export off the caller's context. Must be called within a Tokio runtime.
#[must_use]
pub fn spawn_export(
    engine: Arc<ExportEngine>,
    options: ExportOptions,
    destination: PathBuf,
) -> TaskHandle<ExportSummary> {
    let (tx, events) = unbounded_channel();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let join = tokio::task::spawn_blocking(move || {
        engine.export_snapshot(options, &destination, Some(tx), &token)
    });
    TaskHandle { events, cancel, join }
}

/// Run an import off the caller's context. Must be called within a Tokio runtime.
#[must_use]
pub fn spawn_import(
    engine: Arc<ImportEngine>,
    bytes: Vec<u8>,
    options: ImportOptions,
) -> TaskHandle<ImportReport> {
    let (tx, events) = unbounded_channel();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let join = tokio::task::spawn_blocking(move || {
        engine.import_data(&bytes, options, Some(tx), &token)
    });
    TaskHandle { events, cancel, join }
}
