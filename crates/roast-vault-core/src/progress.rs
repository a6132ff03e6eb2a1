use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Export,
    Import,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::Import => "import",
        }
    }
}

/// Stage of an export or import pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preparing,
    CollectingData,
    ProcessingRoasts,
    CollectingFavorites,
    GeneratingMetadata,
    Serializing,
    CheckingSize,
    Writing,
    Validating,
    VerifyingChecksum,
    CheckingVersion,
    Migrating,
    ValidatingData,
    MergingPreferences,
    MergingRoasts,
    ReconcilingFavorites,
    Saving,
    Completed,
    Failed,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::CollectingData => "collecting_data",
            Self::ProcessingRoasts => "processing_roasts",
            Self::CollectingFavorites => "collecting_favorites",
            Self::GeneratingMetadata => "generating_metadata",
            Self::Serializing => "serializing",
            Self::CheckingSize => "checking_size",
            Self::Writing => "writing",
            Self::Validating => "validating",
            Self::VerifyingChecksum => "verifying_checksum",
            Self::CheckingVersion => "checking_version",
            Self::Migrating => "migrating",
            Self::ValidatingData => "validating_data",
            Self::MergingPreferences => "merging_preferences",
            Self::MergingRoasts => "merging_roasts",
            Self::ReconcilingFavorites => "reconciling_favorites",
            Self::Saving => "saving",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Fraction reported when the stage starts.
    #[must_use]
    pub fn start_fraction(self) -> f64 {
        match self {
            Self::Preparing | Self::Failed => 0.0,
            Self::CollectingData => 0.1,
            Self::ProcessingRoasts => 0.2,
            Self::CollectingFavorites => 0.6,
            Self::GeneratingMetadata => 0.7,
            Self::Serializing => 0.8,
            Self::CheckingSize => 0.85,
            Self::Writing => 0.9,
            Self::Validating => 0.05,
            Self::VerifyingChecksum => 0.15,
            Self::CheckingVersion => 0.25,
            Self::Migrating => 0.3,
            Self::ValidatingData => 0.4,
            Self::MergingPreferences => 0.5,
            Self::MergingRoasts => 0.55,
            Self::ReconcilingFavorites => 0.88,
            Self::Saving => 0.95,
            Self::Completed => 1.0,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProgressCounts {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub operation: Operation,
    pub phase: Phase,
    pub fraction: f64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<ProgressCounts>,
}

/// Linear interpolation inside a stage's fraction range.
#[must_use]
pub fn interpolate(start: f64, end: f64, done: usize, total: usize) -> f64 {
    if total == 0 {
        return end;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = done.min(total) as f64 / total as f64;
    start + (end - start) * ratio
}
