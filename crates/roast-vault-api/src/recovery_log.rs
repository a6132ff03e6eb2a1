//! Recovery advice with a persisted ring buffer of recent failures.
//!
//! The log lives in its own JSON file, apart from the content store, so it
//! stays readable when the store itself is what failed.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use roast_vault_core::{
    recovery_options, ErrorKind, LifecycleError, Operation, OperationContext, Phase,
    RecoveryOption,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryLogEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub operation: Operation,
    pub phase: Phase,
    pub error_code: String,
    pub error_kind: ErrorKind,
    pub message: String,
    pub items_processed: usize,
    pub items_total: usize,
    pub options: Vec<RecoveryOption>,
}

pub struct RecoveryAdvisor {
    path: Option<PathBuf>,
    capacity: usize,
    entries: Mutex<VecDeque<RecoveryLogEntry>>,
}

impl RecoveryAdvisor {
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self { path: None, capacity: capacity.max(1), entries: Mutex::new(VecDeque::new()) }
    }

    /// Advisor persisting to `path`. An unreadable or corrupt log starts empty.
    #[must_use]
    pub fn open(path: &Path, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<VecDeque<RecoveryLogEntry>>(&bytes) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "recovery log is corrupt; starting empty");
                    VecDeque::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => VecDeque::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "recovery log unreadable; starting empty");
                VecDeque::new()
            }
        };
        while entries.len() > capacity {
            entries.pop_front();
        }
        Self { path: Some(path.to_path_buf()), capacity, entries: Mutex::new(entries) }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<RecoveryLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Log `error`, record it, and return the recovery options for it.
    pub fn advise(&self, err: &LifecycleError, context: &OperationContext) -> Vec<RecoveryOption> {
        let options = recovery_options(err, context);
        let kind = err.kind();
        match kind {
            ErrorKind::Internal | ErrorKind::Transient => error!(
                operation = context.operation.as_str(),
                phase = context.phase.as_str(),
                code = err.code(),
                processed = context.items_processed,
                total = context.items_total,
                error = %err,
                "operation failed"
            ),
            _ => warn!(
                operation = context.operation.as_str(),
                phase = context.phase.as_str(),
                code = err.code(),
                processed = context.items_processed,
                total = context.items_total,
                error = %err,
                "operation failed"
            ),
        }

        let entry = RecoveryLogEntry {
            timestamp: context.timestamp,
            operation: context.operation,
            phase: context.phase,
            error_code: err.code().to_string(),
            error_kind: kind,
            message: err.to_string(),
            items_processed: context.items_processed,
            items_total: context.items_total,
            options: options.clone(),
        };

        let snapshot: Vec<RecoveryLogEntry> = {
            let mut entries = self.entries.lock();
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
            entries.iter().cloned().collect()
        };

        if let Some(path) = &self.path {
            if let Err(err) = write_log(path, &snapshot) {
                warn!(path = %path.display(), error = %err, "failed to persist recovery log");
            }
        }
        options
    }
}

fn write_log(path: &Path, entries: &[RecoveryLogEntry]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let bytes = serde_json::to_vec_pretty(entries)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(&bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use ulid::Ulid;

    fn context() -> OperationContext {
        OperationContext::new(Operation::Import, Phase::MergingRoasts).with_progress(3, 9)
    }

    #[test]
    fn ring_buffer_keeps_most_recent_entries() {
        let advisor = RecoveryAdvisor::in_memory(2);
        for version in 5..8 {
            advisor.advise(
                &LifecycleError::UnsupportedVersion { found: version, min: 1, max: 4 },
                &context(),
            );
        }
        let entries = advisor.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].message.contains("version 6"));
        assert!(entries[1].message.contains("version 7"));
    }

    #[test]
    fn advise_returns_options_with_one_recommendation() {
        let advisor = RecoveryAdvisor::in_memory(4);
        let options = advisor.advise(&LifecycleError::Storage("disk".into()), &context());
        assert_eq!(options.iter().filter(|option| option.is_recommended).count(), 1);
        assert_eq!(advisor.entries()[0].items_processed, 3);
    }

    #[test]
    fn log_survives_reopen() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("roastvault-recovery-{}", Ulid::new()));
        let path = dir.join("nested").join("recovery.json");
        {
            let advisor = RecoveryAdvisor::open(&path, 3);
            advisor.advise(&LifecycleError::Internal("bug".into()), &context());
            advisor.advise(&LifecycleError::Cancelled { phase: Phase::Saving }, &context());
        }
        let reopened = RecoveryAdvisor::open(&path, 3);
        let codes: Vec<String> =
            reopened.entries().into_iter().map(|entry| entry.error_code).collect();
        assert_eq!(codes, vec!["INTERNAL_ERROR", "CANCELLED_BY_USER"]);

        std::fs::write(&path, b"not json")?;
        assert!(RecoveryAdvisor::open(&path, 3).entries().is_empty());

        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("failed to cleanup temp dir {}", dir.display()))?;
        Ok(())
    }
}
