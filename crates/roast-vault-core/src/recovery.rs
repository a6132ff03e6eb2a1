use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::progress::{Operation, Phase};
use crate::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Skip,
    Abort,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOption {
    pub action: RecoveryAction,
    pub title: String,
    pub description: String,
    pub is_recommended: bool,
}

impl RecoveryOption {
    fn new(action: RecoveryAction, title: &str, description: impl Into<String>) -> Self {
        Self { action, title: title.to_string(), description: description.into(), is_recommended: false }
    }

    fn recommended(mut self) -> Self {
        self.is_recommended = true;
        self
    }
}

/// Where an operation stood when it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    pub operation: Operation,
    pub phase: Phase,
    pub items_processed: usize,
    pub items_total: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl OperationContext {
    #[must_use]
    pub fn new(operation: Operation, phase: Phase) -> Self {
        Self {
            operation,
            phase,
            items_processed: 0,
            items_total: 0,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, items_processed: usize, items_total: usize) -> Self {
        self.items_processed = items_processed;
        self.items_total = items_total;
        self
    }
}

/// Ordered recovery options for `error`. Exactly one option is recommended;
/// internal errors offer only abort.
#[must_use]
pub fn recovery_options(error: &LifecycleError, context: &OperationContext) -> Vec<RecoveryOption> {
    use RecoveryAction::{Abort, Fallback, Retry, Skip};

    let abort = |description: &str| RecoveryOption::new(Abort, "Cancel", description);
    let operation = context.operation.as_str();

    match error {
        LifecycleError::InvalidFormat(_)
        | LifecycleError::UnsupportedMigrationPath { .. }
        | LifecycleError::MigrationFailed { .. } => vec![
            RecoveryOption::new(Retry, "Choose another file", "Select a different export file."),
            abort("Keep the current data unchanged.").recommended(),
        ],
        LifecycleError::ChecksumMismatch { .. } => vec![
            abort("The file may have been altered; nothing was imported.").recommended(),
            RecoveryOption::new(
                Retry,
                "Export again",
                "Create a fresh export on the original device and import that file.",
            ),
        ],
        LifecycleError::UnsupportedVersion { found, max, .. } => vec![
            abort(
                format!(
                    "Data version {found} is outside the supported range (up to {max}). \
                     Update the app first."
                )
                .as_str(),
            )
            .recommended(),
        ],
        LifecycleError::ValidationFailed(errors) => vec![
            RecoveryOption::new(
                Fallback,
                "Import without validation",
                format!("Ignore {} validation finding(s) and import as-is.", errors.len()),
            ),
            abort("Fix the export file before importing.").recommended(),
        ],
        LifecycleError::TooManyErrors { threshold, errors } => vec![
            RecoveryOption::new(
                Skip,
                "Import valid roasts only",
                format!(
                    "Raise the error limit above {threshold} and skip the {} invalid roast(s).",
                    errors.len()
                ),
            ),
            abort("Nothing was imported.").recommended(),
        ],
        LifecycleError::InsufficientStorage { required, .. } => vec![
            RecoveryOption::new(
                Retry,
                "Free up space",
                format!("Make at least {required} bytes available and try again."),
            )
            .recommended(),
            RecoveryOption::new(
                Fallback,
                "Export less data",
                "Export again without statistics and device information.",
            ),
            abort("Stop the export."),
        ],
        LifecycleError::FileWrite { .. } | LifecycleError::PermissionDenied { .. } => vec![
            RecoveryOption::new(Retry, "Try again", format!("Retry the {operation}."))
                .recommended(),
            RecoveryOption::new(Fallback, "Choose another location", "Pick a different file."),
            abort("Stop without changes."),
        ],
        LifecycleError::FileNotFound { .. } => vec![
            RecoveryOption::new(Retry, "Choose the file again", "The file may have moved.")
                .recommended(),
            abort("Stop without changes."),
        ],
        LifecycleError::Storage(_) => {
            let description = if context.items_processed > 0 {
                format!(
                    "Retry the {operation}; {} of {} item(s) were processed before the failure.",
                    context.items_processed, context.items_total
                )
            } else {
                format!("Retry the {operation}.")
            };
            vec![
                RecoveryOption::new(Retry, "Try again", description).recommended(),
                abort("Stop and keep the current data."),
            ]
        }
        LifecycleError::Cancelled { phase } => vec![
            RecoveryOption::new(
                Retry,
                "Start again",
                format!("The {operation} stopped during {phase}."),
            )
            .recommended(),
            abort("Leave it cancelled."),
        ],
        LifecycleError::Internal(_) => vec![abort("An unexpected error occurred.").recommended()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{ValidationError, ValidationValue};

    fn all_errors() -> Vec<LifecycleError> {
        let finding = ValidationError::new("f", ValidationValue::Absent, "r");
        vec![
            LifecycleError::InvalidFormat("x".into()),
            LifecycleError::UnsupportedVersion { found: 9, min: 1, max: 4 },
            LifecycleError::UnsupportedMigrationPath { from: 1, to: 12 },
            LifecycleError::MigrationFailed { version: 3, reason: "x".into() },
            LifecycleError::ChecksumMismatch { expected: "a".into(), actual: "b".into() },
            LifecycleError::ValidationFailed(vec![finding.clone()]),
            LifecycleError::TooManyErrors { threshold: 10, errors: vec![finding] },
            LifecycleError::InsufficientStorage { required: 10, available: 1 },
            LifecycleError::FileWrite { path: "p".into(), reason: "r".into() },
            LifecycleError::PermissionDenied { path: "p".into() },
            LifecycleError::FileNotFound { path: "p".into() },
            LifecycleError::Storage("io".into()),
            LifecycleError::Cancelled { phase: Phase::MergingRoasts },
            LifecycleError::Internal("bug".into()),
        ]
    }

    #[test]
    fn exactly_one_option_is_recommended() {
        let context = OperationContext::new(Operation::Import, Phase::MergingRoasts);
        for error in all_errors() {
            let options = recovery_options(&error, &context);
            let recommended = options.iter().filter(|option| option.is_recommended).count();
            assert_eq!(recommended, 1, "{error:?} -> {options:?}");
        }
    }

    #[test]
    fn internal_error_offers_only_abort() {
        let context = OperationContext::new(Operation::Export, Phase::Writing);
        let options = recovery_options(&LifecycleError::Internal("bug".into()), &context);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].action, RecoveryAction::Abort);
    }

    #[test]
    fn transient_failure_mentions_progress() {
        let context =
            OperationContext::new(Operation::Import, Phase::Saving).with_progress(40, 120);
        let options = recovery_options(&LifecycleError::Storage("disk".into()), &context);
        assert_eq!(options[0].action, RecoveryAction::Retry);
        assert!(options[0].description.contains("40 of 120"));
    }
}
