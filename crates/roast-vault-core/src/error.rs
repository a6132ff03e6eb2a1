//! Error taxonomy shared by the export, import and migration pipelines.
//!
//! Every error maps to an [`ErrorKind`], a stable code for callers that
//! branch on failures, and a localized description plus recovery hint that
//! the UI renders as-is.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::progress::Phase;
use crate::validation::ValidationError;

/// Failure class. Structural and resource failures abort immediately;
/// semantic per-item failures are recoverable up to a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Structural,
    Semantic,
    Resource,
    Transient,
    UserInitiated,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => write!(f, "structural"),
            Self::Semantic => write!(f, "semantic"),
            Self::Resource => write!(f, "resource"),
            Self::Transient => write!(f, "transient"),
            Self::UserInitiated => write!(f, "user_initiated"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Stable error codes. Format: AREA_SPECIFIC_ERROR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode;

impl ErrorCode {
    pub const INVALID_FORMAT: &'static str = "IMPORT_INVALID_FORMAT";
    pub const UNSUPPORTED_VERSION: &'static str = "IMPORT_UNSUPPORTED_VERSION";
    pub const UNSUPPORTED_MIGRATION_PATH: &'static str = "MIGRATION_UNSUPPORTED_PATH";
    pub const MIGRATION_FAILED: &'static str = "MIGRATION_STEP_FAILED";
    pub const CHECKSUM_MISMATCH: &'static str = "IMPORT_CHECKSUM_MISMATCH";

    pub const VALIDATION_FAILED: &'static str = "VALIDATION_FAILED";
    pub const TOO_MANY_ERRORS: &'static str = "IMPORT_TOO_MANY_ERRORS";

    pub const INSUFFICIENT_STORAGE: &'static str = "IO_INSUFFICIENT_STORAGE";
    pub const FILE_WRITE: &'static str = "IO_WRITE_ERROR";
    pub const PERMISSION_DENIED: &'static str = "IO_PERMISSION_DENIED";
    pub const FILE_NOT_FOUND: &'static str = "IO_FILE_NOT_FOUND";

    pub const STORAGE: &'static str = "STORAGE_UNAVAILABLE";
    pub const CANCELLED: &'static str = "CANCELLED_BY_USER";
    pub const INTERNAL: &'static str = "INTERNAL_ERROR";
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid export format: {0}")]
    InvalidFormat(String),
    #[error("unsupported data version {found}; supported range is {min}..={max}")]
    UnsupportedVersion { found: u32, min: u32, max: u32 },
    #[error("no migration path from version {from} to version {to}")]
    UnsupportedMigrationPath { from: u32, to: u32 },
    #[error("migration to version {version} failed: {reason}")]
    MigrationFailed { version: u32, reason: String },
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("validation failed with {} error(s)", .0.len())]
    ValidationFailed(Vec<ValidationError>),
    #[error("import aborted after {} item error(s); at most {threshold} allowed", .errors.len())]
    TooManyErrors { threshold: usize, errors: Vec<ValidationError> },
    #[error("insufficient storage: {required} bytes required, {available} bytes available")]
    InsufficientStorage { required: u64, available: u64 },
    #[error("failed to write {path}: {reason}")]
    FileWrite { path: String, reason: String },
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },
    #[error("file not found: {path}")]
    FileNotFound { path: String },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("operation cancelled during {phase}")]
    Cancelled { phase: Phase },
    #[error("internal error: {0}")]
    Internal(String),
}

impl LifecycleError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat(_)
            | Self::UnsupportedVersion { .. }
            | Self::UnsupportedMigrationPath { .. }
            | Self::MigrationFailed { .. }
            | Self::ChecksumMismatch { .. } => ErrorKind::Structural,
            Self::ValidationFailed(_) | Self::TooManyErrors { .. } => ErrorKind::Semantic,
            Self::InsufficientStorage { .. }
            | Self::FileWrite { .. }
            | Self::PermissionDenied { .. }
            | Self::FileNotFound { .. } => ErrorKind::Resource,
            Self::Storage(_) => ErrorKind::Transient,
            Self::Cancelled { .. } => ErrorKind::UserInitiated,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat(_) => ErrorCode::INVALID_FORMAT,
            Self::UnsupportedVersion { .. } => ErrorCode::UNSUPPORTED_VERSION,
            Self::UnsupportedMigrationPath { .. } => ErrorCode::UNSUPPORTED_MIGRATION_PATH,
            Self::MigrationFailed { .. } => ErrorCode::MIGRATION_FAILED,
            Self::ChecksumMismatch { .. } => ErrorCode::CHECKSUM_MISMATCH,
            Self::ValidationFailed(_) => ErrorCode::VALIDATION_FAILED,
            Self::TooManyErrors { .. } => ErrorCode::TOO_MANY_ERRORS,
            Self::InsufficientStorage { .. } => ErrorCode::INSUFFICIENT_STORAGE,
            Self::FileWrite { .. } => ErrorCode::FILE_WRITE,
            Self::PermissionDenied { .. } => ErrorCode::PERMISSION_DENIED,
            Self::FileNotFound { .. } => ErrorCode::FILE_NOT_FOUND,
            Self::Storage(_) => ErrorCode::STORAGE,
            Self::Cancelled { .. } => ErrorCode::CANCELLED,
            Self::Internal(_) => ErrorCode::INTERNAL,
        }
    }

    /// Item-level errors collected while the error was raised, if any.
    #[must_use]
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::ValidationFailed(errors) | Self::TooManyErrors { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Human-readable description for the given locale.
    #[must_use]
    pub fn description(&self, locale: Locale) -> String {
        match (locale, self) {
            (Locale::En, Self::InvalidFormat(_)) => {
                "The file is not a valid roast export.".to_string()
            }
            (Locale::Vi, Self::InvalidFormat(_)) => {
                "Tệp không phải là bản xuất dữ liệu hợp lệ.".to_string()
            }
            (Locale::En, Self::UnsupportedVersion { found, .. }) => {
                format!("This export uses data version {found}, which this app cannot read.")
            }
            (Locale::Vi, Self::UnsupportedVersion { found, .. }) => {
                format!("Bản xuất dùng phiên bản dữ liệu {found}, ứng dụng không đọc được.")
            }
            (Locale::En, Self::UnsupportedMigrationPath { from, to }) => {
                format!("Data version {from} cannot be upgraded to version {to}.")
            }
            (Locale::Vi, Self::UnsupportedMigrationPath { from, to }) => {
                format!("Không thể nâng cấp dữ liệu từ phiên bản {from} lên {to}.")
            }
            (Locale::En, Self::MigrationFailed { version, .. }) => {
                format!("Upgrading the data to version {version} failed.")
            }
            (Locale::Vi, Self::MigrationFailed { version, .. }) => {
                format!("Nâng cấp dữ liệu lên phiên bản {version} thất bại.")
            }
            (Locale::En, Self::ChecksumMismatch { .. }) => {
                "The file was modified or corrupted after it was exported.".to_string()
            }
            (Locale::Vi, Self::ChecksumMismatch { .. }) => {
                "Tệp đã bị chỉnh sửa hoặc hỏng sau khi xuất.".to_string()
            }
            (Locale::En, Self::ValidationFailed(errors)) => {
                format!("The export contains {} invalid field(s).", errors.len())
            }
            (Locale::Vi, Self::ValidationFailed(errors)) => {
                format!("Bản xuất có {} trường không hợp lệ.", errors.len())
            }
            (Locale::En, Self::TooManyErrors { errors, .. }) => {
                format!("Import stopped after {} invalid roasts.", errors.len())
            }
            (Locale::Vi, Self::TooManyErrors { errors, .. }) => {
                format!("Đã dừng nhập sau {} mục không hợp lệ.", errors.len())
            }
            (Locale::En, Self::InsufficientStorage { .. }) => {
                "There is not enough storage space to save the export.".to_string()
            }
            (Locale::Vi, Self::InsufficientStorage { .. }) => {
                "Không đủ dung lượng để lưu bản xuất.".to_string()
            }
            (Locale::En, Self::FileWrite { .. }) => "The file could not be written.".to_string(),
            (Locale::Vi, Self::FileWrite { .. }) => "Không thể ghi tệp.".to_string(),
            (Locale::En, Self::PermissionDenied { .. }) => {
                "Permission to access the file was denied.".to_string()
            }
            (Locale::Vi, Self::PermissionDenied { .. }) => {
                "Không có quyền truy cập tệp.".to_string()
            }
            (Locale::En, Self::FileNotFound { .. }) => "The file could not be found.".to_string(),
            (Locale::Vi, Self::FileNotFound { .. }) => "Không tìm thấy tệp.".to_string(),
            (Locale::En, Self::Storage(_)) => "Local storage is temporarily unavailable.".to_string(),
            (Locale::Vi, Self::Storage(_)) => "Bộ nhớ cục bộ tạm thời không khả dụng.".to_string(),
            (Locale::En, Self::Cancelled { .. }) => "The operation was cancelled.".to_string(),
            (Locale::Vi, Self::Cancelled { .. }) => "Thao tác đã bị hủy.".to_string(),
            (Locale::En, Self::Internal(_)) => "An unexpected error occurred.".to_string(),
            (Locale::Vi, Self::Internal(_)) => "Đã xảy ra lỗi không mong muốn.".to_string(),
        }
    }

    /// Suggested next step for the common failures.
    #[must_use]
    pub fn recovery_suggestion(&self, locale: Locale) -> Option<&'static str> {
        let suggestion = match (locale, self.kind(), self) {
            (Locale::En, _, Self::ChecksumMismatch { .. }) => {
                "Export the data again from the original device."
            }
            (Locale::Vi, _, Self::ChecksumMismatch { .. }) => {
                "Hãy xuất lại dữ liệu từ thiết bị gốc."
            }
            (Locale::En, _, Self::UnsupportedVersion { .. }) => {
                "Update the app to the latest version and try again."
            }
            (Locale::Vi, _, Self::UnsupportedVersion { .. }) => {
                "Hãy cập nhật ứng dụng lên phiên bản mới nhất rồi thử lại."
            }
            (Locale::En, _, Self::InsufficientStorage { .. }) => {
                "Free up some space on the device and try again."
            }
            (Locale::Vi, _, Self::InsufficientStorage { .. }) => {
                "Hãy giải phóng dung lượng thiết bị rồi thử lại."
            }
            (Locale::En, ErrorKind::Semantic, _) => {
                "Check the export file or import it without validation."
            }
            (Locale::Vi, ErrorKind::Semantic, _) => {
                "Hãy kiểm tra tệp xuất hoặc nhập mà không kiểm tra dữ liệu."
            }
            (Locale::En, ErrorKind::Resource, _) => "Choose another file or location.",
            (Locale::Vi, ErrorKind::Resource, _) => "Hãy chọn tệp hoặc vị trí khác.",
            (Locale::En, ErrorKind::Transient, _) => "Wait a moment and try again.",
            (Locale::Vi, ErrorKind::Transient, _) => "Hãy đợi một lát rồi thử lại.",
            _ => return None,
        };
        Some(suggestion)
    }
}

/// UI language used for error descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Vi,
    En,
}

impl Locale {
    /// Map a preference language code, falling back to Vietnamese.
    #[must_use]
    pub fn from_language(code: &str) -> Self {
        if code.eq_ignore_ascii_case(crate::model::LANGUAGE_ENGLISH) {
            Self::En
        } else {
            Self::Vi
        }
    }
}

/// Serializable summary handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorReport {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub validation_errors: Vec<ValidationError>,
}

impl ErrorReport {
    #[must_use]
    pub fn new(error: &LifecycleError, locale: Locale) -> Self {
        Self {
            code: error.code().to_string(),
            kind: error.kind(),
            message: error.to_string(),
            description: error.description(locale),
            suggestion: error.recovery_suggestion(locale).map(str::to_string),
            validation_errors: error.validation_errors().to_vec(),
        }
    }
}
