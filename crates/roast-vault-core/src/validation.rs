//! Structural and semantic checks shared by export pre-flight and import.
//!
//! Every rule returns the full list of findings; an empty list means valid.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::model::{is_recognized_language, spice_in_range, RoastId, RoastItem};
use crate::snapshot::ExportSnapshot;

/// Creation timestamps may run this far ahead of the local clock.
pub const FUTURE_GRACE: Duration = Duration::days(1);

/// Offending value of a [`ValidationError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ValidationValue {
    Text(String),
    Integer(i64),
    Date(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    Identifier(RoastId),
    Absent,
}

impl fmt::Display for ValidationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Date(value) => write!(f, "{value}"),
            Self::Identifier(id) => write!(f, "{id}"),
            Self::Absent => write!(f, "<absent>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub value: ValidationValue,
    pub reason: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, value: ValidationValue, reason: impl Into<String>) -> Self {
        Self { field: field.into(), value, reason: reason.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (value: {})", self.field, self.reason, self.value)
    }
}

/// Item-level rules for a roast located at `field_prefix`.
#[must_use]
pub fn validate_item_at(
    item: &RoastItem,
    field_prefix: &str,
    now: OffsetDateTime,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if item.content.trim().is_empty() {
        errors.push(ValidationError::new(
            format!("{field_prefix}.content"),
            ValidationValue::Text(item.content.clone()),
            "content MUST be non-empty",
        ));
    }

    if !spice_in_range(item.spice_level) {
        errors.push(ValidationError::new(
            format!("{field_prefix}.spiceLevel"),
            ValidationValue::Integer(i64::from(item.spice_level)),
            "spiceLevel MUST be within 1..=5",
        ));
    }

    if item.created_at > now + FUTURE_GRACE {
        errors.push(ValidationError::new(
            format!("{field_prefix}.createdAt"),
            ValidationValue::Date(item.created_at),
            "createdAt MUST NOT be more than one day in the future",
        ));
    }

    errors
}

#[must_use]
pub fn validate_item(item: &RoastItem, now: OffsetDateTime) -> Vec<ValidationError> {
    validate_item_at(item, &format!("roast[{}]", item.id), now)
}

/// Snapshot-level rules. Items are not inspected individually.
#[must_use]
pub fn validate_snapshot(snapshot: &ExportSnapshot) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let metadata = &snapshot.metadata;

    if metadata.app_version.trim().is_empty() {
        errors.push(ValidationError::new(
            "metadata.appVersion",
            ValidationValue::Text(metadata.app_version.clone()),
            "appVersion MUST be non-empty",
        ));
    }

    if metadata.total_roasts != snapshot.roast_history.len() {
        errors.push(ValidationError::new(
            "metadata.totalRoasts",
            ValidationValue::Integer(count_value(metadata.total_roasts)),
            format!(
                "declared roast count {} does not match {} roasts in roastHistory",
                metadata.total_roasts,
                snapshot.roast_history.len()
            ),
        ));
    }

    if metadata.total_favorites != snapshot.favorites.len() {
        errors.push(ValidationError::new(
            "metadata.totalFavorites",
            ValidationValue::Integer(count_value(metadata.total_favorites)),
            format!(
                "declared favorite count {} does not match {} favorites",
                metadata.total_favorites,
                snapshot.favorites.len()
            ),
        ));
    }

    let known: BTreeSet<RoastId> = snapshot.roast_history.iter().map(|item| item.id).collect();
    for (index, id) in snapshot.favorites.iter().enumerate() {
        if !known.contains(id) {
            errors.push(ValidationError::new(
                format!("favorites[{index}]"),
                ValidationValue::Identifier(*id),
                "favorite does not reference a roast in roastHistory",
            ));
        }
    }

    let preferences = &snapshot.user_preferences;
    if !is_recognized_language(&preferences.preferred_language) {
        errors.push(ValidationError::new(
            "userPreferences.preferredLanguage",
            ValidationValue::Text(preferences.preferred_language.clone()),
            "preferredLanguage MUST be a recognized language code",
        ));
    }

    if !spice_in_range(preferences.default_spice_level) {
        errors.push(ValidationError::new(
            "userPreferences.defaultSpiceLevel",
            ValidationValue::Integer(i64::from(preferences.default_spice_level)),
            "defaultSpiceLevel MUST be within 1..=5",
        ));
    }

    if preferences.preferred_categories.is_empty() {
        errors.push(ValidationError::new(
            "userPreferences.preferredCategories",
            ValidationValue::Absent,
            "preferredCategories MUST contain at least one category",
        ));
    }

    errors
}

/// Snapshot-level rules followed by item-level rules for every roast.
#[must_use]
pub fn validate_snapshot_with_items(
    snapshot: &ExportSnapshot,
    now: OffsetDateTime,
) -> Vec<ValidationError> {
    let mut errors = validate_snapshot(snapshot);
    for (index, item) in snapshot.roast_history.iter().enumerate() {
        errors.extend(validate_item_at(item, &format!("roastHistory[{index}]"), now));
    }
    errors
}

fn count_value(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
