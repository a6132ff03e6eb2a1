//! Forward migration of export documents between data versions.
//!
//! Steps are registered per target version. Versions without a registered
//! step advance with the identity transform.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::codec::CHECKSUM_FIELD;
use crate::model::{Category, LANGUAGE_VIETNAMESE};
use crate::LifecycleError;

pub const CURRENT_DATA_VERSION: u32 = 4;
pub const MIN_IMPORT_VERSION: u32 = 1;
pub const MAX_MIGRATION_VERSION: u32 = 10;

/// Transform applied when a document advances to the step's version.
pub type MigrationStep = fn(&mut Map<String, Value>) -> Result<(), String>;

#[derive(Debug, Clone)]
pub struct SchemaMigrator {
    steps: BTreeMap<u32, MigrationStep>,
    ceiling: u32,
}

impl Default for SchemaMigrator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaMigrator {
    /// Migrator with every built-in step registered.
    #[must_use]
    pub fn new() -> Self {
        Self::empty(MAX_MIGRATION_VERSION)
            .with_step(2, default_item_fields)
            .with_step(3, backfill_favorites_and_categories)
    }

    #[must_use]
    pub fn empty(ceiling: u32) -> Self {
        Self { steps: BTreeMap::new(), ceiling }
    }

    #[must_use]
    pub fn with_step(mut self, version: u32, step: MigrationStep) -> Self {
        self.steps.insert(version, step);
        self
    }

    #[must_use]
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// True iff `from < to` and both versions are inside `1..=ceiling`.
    #[must_use]
    pub fn can_migrate(&self, from: u32, to: u32) -> bool {
        let window = MIN_IMPORT_VERSION..=self.ceiling;
        from < to && window.contains(&from) && window.contains(&to)
    }

    /// Advance `payload` from `from` to `to`, one version at a time.
    ///
    /// The input is left untouched; the result is only returned when every
    /// step succeeds. Any checksum on the result is cleared.
    ///
    /// # Errors
    /// Returns `UnsupportedMigrationPath` outside the supported window and
    /// `MigrationFailed` naming the first version whose step failed.
    pub fn migrate(&self, from: u32, to: u32, payload: &Value) -> Result<Value, LifecycleError> {
        if !self.can_migrate(from, to) {
            return Err(LifecycleError::UnsupportedMigrationPath { from, to });
        }

        let mut working = payload.clone();
        let Value::Object(document) = &mut working else {
            return Err(LifecycleError::MigrationFailed {
                version: from + 1,
                reason: "document MUST be a JSON object".to_string(),
            });
        };

        for version in (from + 1)..=to {
            if let Some(step) = self.steps.get(&version) {
                step(document)
                    .map_err(|reason| LifecycleError::MigrationFailed { version, reason })?;
                debug!(version, "applied data migration step");
            }
            stamp_version(document, version)
                .map_err(|reason| LifecycleError::MigrationFailed { version, reason })?;
        }

        document.remove(CHECKSUM_FIELD);
        info!(from, to, "migrated export document");
        Ok(working)
    }
}

/// Read `metadata.dataVersion` from a parsed document.
///
/// # Errors
/// Returns a format error when the field is missing or not a positive integer.
pub fn data_version(document: &Value) -> Result<u32, LifecycleError> {
    let raw = document
        .get("metadata")
        .and_then(|metadata| metadata.get("dataVersion"))
        .ok_or_else(|| {
            LifecycleError::InvalidFormat("metadata.dataVersion MUST be provided".to_string())
        })?;
    raw.as_u64()
        .and_then(|version| u32::try_from(version).ok())
        .ok_or_else(|| {
            LifecycleError::InvalidFormat(format!(
                "metadata.dataVersion MUST be a positive integer, found {raw}"
            ))
        })
}

fn stamp_version(document: &mut Map<String, Value>, version: u32) -> Result<(), String> {
    let metadata = object_field(document, "metadata")?;
    metadata.insert("dataVersion".to_string(), json!(version));
    Ok(())
}

fn object_field<'a>(
    document: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Map<String, Value>, String> {
    document
        .get_mut(key)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| format!("{key} MUST be an object"))
}

fn roast_array<'a>(document: &'a mut Map<String, Value>) -> Result<&'a mut Vec<Value>, String> {
    document
        .entry("roastHistory")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| "roastHistory MUST be an array".to_string())
}

/// v2: every roast carries a language tag and an explicit favorite flag.
fn default_item_fields(document: &mut Map<String, Value>) -> Result<(), String> {
    let language = document
        .get("userPreferences")
        .and_then(|preferences| preferences.get("preferredLanguage"))
        .and_then(Value::as_str)
        .unwrap_or(LANGUAGE_VIETNAMESE)
        .to_string();

    for (index, item) in roast_array(document)?.iter_mut().enumerate() {
        let item = item
            .as_object_mut()
            .ok_or_else(|| format!("roastHistory[{index}] MUST be an object"))?;
        item.entry("language").or_insert_with(|| json!(language));
        item.entry("isFavorite").or_insert(json!(false));
    }
    Ok(())
}

/// v3: explicit favorites list, preferred categories and favorite count.
fn backfill_favorites_and_categories(document: &mut Map<String, Value>) -> Result<(), String> {
    if !document.contains_key("favorites") {
        let favorites: Vec<Value> = roast_array(document)?
            .iter()
            .filter(|item| item.get("isFavorite").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|item| item.get("id").cloned())
            .collect();
        document.insert("favorites".to_string(), Value::Array(favorites));
    }

    let favorite_count = document.get("favorites").and_then(Value::as_array).map_or(0, Vec::len);

    if let Some(preferences) = document.get_mut("userPreferences").and_then(Value::as_object_mut)
    {
        preferences.entry("preferredCategories").or_insert_with(|| {
            Value::Array(Category::ALL.iter().map(|category| json!(category.as_str())).collect())
        });
    }

    let metadata = object_field(document, "metadata")?;
    metadata.entry("totalFavorites").or_insert(json!(favorite_count));
    Ok(())
}
