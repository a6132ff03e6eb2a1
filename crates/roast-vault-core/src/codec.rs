//! Canonical serialization and SHA-256 digests for export documents.
//!
//! The canonical form is pretty-printed JSON with object keys sorted at every
//! depth, so logically equal documents always hash identically regardless of
//! how they were built.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::snapshot::ExportSnapshot;
use crate::LifecycleError;

pub const CHECKSUM_FIELD: &str = "checksum";

/// Rebuild `value` with object keys in sorted order at every depth.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|left, right| left.0.cmp(right.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                sorted.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// # Errors
/// Returns a format error when `value` cannot be represented as JSON.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, LifecycleError> {
    let value = serde_json::to_value(value)
        .map_err(|err| LifecycleError::InvalidFormat(format!("failed to encode document: {err}")))?;
    serde_json::to_vec_pretty(&canonicalize(&value)).map_err(|err| {
        LifecycleError::InvalidFormat(format!("failed to serialize canonical document: {err}"))
    })
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Digest of `document` with its top-level checksum field removed.
///
/// # Errors
/// Returns a format error when the document cannot be re-serialized.
pub fn document_digest(document: &Value) -> Result<String, LifecycleError> {
    let mut stripped = document.clone();
    if let Value::Object(map) = &mut stripped {
        map.remove(CHECKSUM_FIELD);
    }
    Ok(digest(&canonical_bytes(&stripped)?))
}

/// Compute the checksum of `snapshot`, embed it, and return the canonical
/// document bytes ready for the boundary write.
///
/// # Errors
/// Returns a format error when the snapshot cannot be serialized.
pub fn seal(snapshot: &mut ExportSnapshot) -> Result<Vec<u8>, LifecycleError> {
    snapshot.checksum = None;
    let unsealed = canonical_bytes(snapshot)?;
    snapshot.checksum = Some(digest(&unsealed));
    canonical_bytes(snapshot)
}

/// Check `payload` against `expected`.
///
/// The payload must already be in canonical form; any re-encoding of the same
/// data, or a change to any byte outside the checksum value, fails.
#[must_use]
pub fn verify(payload: &[u8], expected: &str) -> bool {
    let Ok(document) = serde_json::from_slice::<Value>(payload) else {
        return false;
    };
    match canonical_bytes(&document) {
        Ok(reencoded) if reencoded == payload => {}
        _ => return false,
    }
    document_digest(&document).is_ok_and(|actual| actual == expected)
}

/// Verify the embedded checksum of a parsed document, if it carries one.
///
/// Returns `Ok(false)` when the document has no checksum to check.
///
/// # Errors
/// Returns `ChecksumMismatch` when the recomputed digest differs, and a format
/// error when the checksum field is not a string.
pub fn verify_document(document: &Value) -> Result<bool, LifecycleError> {
    let expected = match document.get(CHECKSUM_FIELD) {
        None | Some(Value::Null) => return Ok(false),
        Some(Value::String(expected)) => expected.clone(),
        Some(other) => {
            return Err(LifecycleError::InvalidFormat(format!(
                "checksum MUST be a string, found {other}"
            )))
        }
    };

    let actual = document_digest(document)?;
    if actual != expected {
        return Err(LifecycleError::ChecksumMismatch { expected, actual });
    }
    Ok(true)
}
