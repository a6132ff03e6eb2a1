//! Domain model and pure transforms for the roast data lifecycle: validation
//! rules, the integrity codec, the schema migrator, and the error and
//! recovery taxonomy.

pub mod codec;
pub mod error;
pub mod migration;
pub mod model;
pub mod progress;
pub mod recovery;
pub mod snapshot;
pub mod validation;

pub use error::{ErrorCode, ErrorKind, ErrorReport, LifecycleError, Locale};
pub use migration::{SchemaMigrator, CURRENT_DATA_VERSION, MAX_MIGRATION_VERSION, MIN_IMPORT_VERSION};
pub use model::{
    ApiConfiguration, Category, NotificationFrequency, Preferences, RoastId, RoastItem, Streak,
    StreakOutcome,
};
pub use progress::{Operation, Phase, ProgressCounts, ProgressEvent};
pub use recovery::{recovery_options, OperationContext, RecoveryAction, RecoveryOption};
pub use snapshot::{DeviceInfo, ExportSnapshot, SnapshotMetadata, Statistics};
pub use validation::{ValidationError, ValidationValue};
