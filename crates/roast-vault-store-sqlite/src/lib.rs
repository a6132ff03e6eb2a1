//! Content Store for roast history, preferences and streak state.
//!
//! Each singleton key has its own cache behind a reader-writer lock, so a
//! write to one key never blocks readers of another. Writes go through to a
//! [`KeyValueBackend`] synchronously; a failed durable write keeps the
//! updated in-memory value and is reported as
//! [`StoreError::NotDurablySaved`].

mod backend;
mod merge;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use roast_vault_core::validation::validate_item;
use roast_vault_core::{
    LifecycleError, Preferences, RoastId, RoastItem, Streak, StreakOutcome, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing::{debug, error, warn};

pub use backend::{KeyValueBackend, MemoryBackend, SchemaStatus, SqliteBackend};
pub use merge::{MergeOutcome, MergeStrategy, Upsert, WorkingSet};

pub const ROAST_HISTORY_KEY: &str = "roast_history";
pub const PREFERENCES_KEY: &str = "user_preferences";
pub const STREAK_KEY: &str = "streak_data";

const RESERVED_KEYS: [&str; 3] = [ROAST_HISTORY_KEY, PREFERENCES_KEY, STREAK_KEY];

pub const DEFAULT_SINGLE_ITEM_CAP: usize = 100;
pub const DEFAULT_BULK_CAP: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to {action} `{key}`: {source:#}")]
    Backend {
        key: String,
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("stored value for `{key}` is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{key}` was updated in memory but not durably saved: {detail}")]
    NotDurablySaved { key: String, detail: String },
    #[error("roast rejected with {} validation error(s)", .0.len())]
    InvalidItem(Vec<ValidationError>),
    #[error("`{0}` is managed by the content store and cannot be accessed generically")]
    ReservedKey(String),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidItem(errors) => Self::ValidationFailed(errors),
            StoreError::Corrupt { .. } => Self::Internal(err.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Caps on the roast collection length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCaps {
    pub single_item_cap: usize,
    pub bulk_cap: usize,
}

impl Default for StoreCaps {
    fn default() -> Self {
        Self { single_item_cap: DEFAULT_SINGLE_ITEM_CAP, bulk_cap: DEFAULT_BULK_CAP }
    }
}

/// Mutation notice delivered to the store's subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    RoastInserted { id: RoastId },
    RoastsMerged { strategy: MergeStrategy, outcome: MergeOutcome },
    FavoriteToggled { id: RoastId, is_favorite: bool },
    FavoritesUpdated { changed: usize },
    RoastDeleted { id: RoastId },
    RoastsCleared { removed: usize },
    TransactionCommitted { roasts: usize, preferences_replaced: bool },
    PreferencesSaved,
    StreakUpdated { outcome: StreakOutcome, current_streak: u32 },
    StreakReset,
    ValueSet { key: String },
    ValueDeleted { key: String },
    PersistenceFailed { key: String, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&StoreChange) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvalidItem {
    pub id: RoastId,
    pub errors: Vec<ValidationError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityScan {
    pub total_items: usize,
    pub duplicate_ids: Vec<RoastId>,
    pub invalid_items: Vec<InvalidItem>,
    pub backend_ok: bool,
}

impl IntegrityScan {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.duplicate_ids.is_empty() && self.invalid_items.is_empty() && self.backend_ok
    }
}

/// Staged roast and preference edits applied atomically by
/// [`ContentStore::transaction`].
pub struct StoreTransaction {
    roasts: WorkingSet,
    preferences: Option<Preferences>,
}

impl StoreTransaction {
    #[must_use]
    pub fn roasts(&self) -> &WorkingSet {
        &self.roasts
    }

    pub fn roasts_mut(&mut self) -> &mut WorkingSet {
        &mut self.roasts
    }

    pub fn stage_preferences(&mut self, preferences: Preferences) {
        self.preferences = Some(preferences);
    }
}

pub struct ContentStore {
    backend: Box<dyn KeyValueBackend>,
    caps: StoreCaps,
    roasts: RwLock<Vec<RoastItem>>,
    preferences: RwLock<Preferences>,
    streak: RwLock<Streak>,
    observers: RwLock<Vec<(SubscriptionId, Observer)>>,
    next_subscription: AtomicU64,
}

impl ContentStore {
    /// Open a SQLite-backed store at `path`, migrating its schema.
    ///
    /// # Errors
    /// Returns an error when the file cannot be opened, migrated or decoded.
    pub fn open(path: &Path, caps: StoreCaps) -> Result<Self, StoreError> {
        let backend = SqliteBackend::open(path)
            .and_then(|backend| backend.migrate().map(|()| backend))
            .map_err(|source| StoreError::Backend {
                key: path.display().to_string(),
                action: "open",
                source,
            })?;
        Self::with_backend(Box::new(backend), caps)
    }

    /// Store over a process-local backend.
    ///
    /// # Errors
    /// Never fails for a fresh backend; kept fallible to match [`Self::with_backend`].
    pub fn in_memory(caps: StoreCaps) -> Result<Self, StoreError> {
        Self::with_backend(Box::<MemoryBackend>::default(), caps)
    }

    /// Load every cached key from `backend`.
    ///
    /// # Errors
    /// Returns an error when a stored value cannot be read or decoded.
    pub fn with_backend(
        backend: Box<dyn KeyValueBackend>,
        caps: StoreCaps,
    ) -> Result<Self, StoreError> {
        let roasts: Vec<RoastItem> =
            load(backend.as_ref(), ROAST_HISTORY_KEY)?.unwrap_or_default();
        let preferences: Preferences =
            load(backend.as_ref(), PREFERENCES_KEY)?.unwrap_or_default();
        let streak: Streak = load(backend.as_ref(), STREAK_KEY)?.unwrap_or_default();

        Ok(Self {
            backend,
            caps,
            roasts: RwLock::new(roasts),
            preferences: RwLock::new(preferences),
            streak: RwLock::new(streak),
            observers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn caps(&self) -> StoreCaps {
        self.caps
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    // ---- generic key-value access ----

    /// # Errors
    /// Returns an error for reserved keys or when the value cannot be read or decoded.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        reject_reserved(key)?;
        load(self.backend.as_ref(), key)
    }

    /// # Errors
    /// Returns an error for reserved keys or when the value cannot be saved.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        reject_reserved(key)?;
        let bytes = encode(key, value)?;
        self.backend.write(key, &bytes).map_err(|source| StoreError::Backend {
            key: key.to_string(),
            action: "write",
            source,
        })?;
        self.notify(&StoreChange::ValueSet { key: key.to_string() });
        Ok(())
    }

    /// # Errors
    /// Returns an error for reserved keys or when the key cannot be removed.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        reject_reserved(key)?;
        self.backend.remove(key).map_err(|source| StoreError::Backend {
            key: key.to_string(),
            action: "delete",
            source,
        })?;
        self.notify(&StoreChange::ValueDeleted { key: key.to_string() });
        Ok(())
    }

    // ---- roast history ----

    #[must_use]
    pub fn roasts(&self) -> Vec<RoastItem> {
        self.roasts.read().clone()
    }

    #[must_use]
    pub fn roast(&self, id: RoastId) -> Option<RoastItem> {
        self.roasts.read().iter().find(|item| item.id == id).cloned()
    }

    #[must_use]
    pub fn roast_count(&self) -> usize {
        self.roasts.read().len()
    }

    #[must_use]
    pub fn favorites(&self) -> Vec<RoastItem> {
        self.roasts.read().iter().filter(|item| item.is_favorite).cloned().collect()
    }

    /// Insert a freshly generated roast, newest first.
    ///
    /// The collection is trimmed to the single-item cap, or to its current
    /// length when a bulk import already took it past that cap.
    ///
    /// # Errors
    /// Returns `InvalidItem` for a structurally invalid roast and
    /// `NotDurablySaved` when the write-back fails.
    pub fn insert_roast(&self, item: RoastItem) -> Result<(), StoreError> {
        let errors = validate_item(&item, OffsetDateTime::now_utc());
        if !errors.is_empty() {
            return Err(StoreError::InvalidItem(errors));
        }

        let id = item.id;
        let persisted = {
            let mut roasts = self.roasts.write();
            let cap = self.caps.single_item_cap.max(roasts.len());
            roasts.retain(|existing| existing.id != id);
            roasts.insert(0, item);
            roasts.truncate(cap);
            self.persist(ROAST_HISTORY_KEY, &*roasts)
        };
        self.finish(StoreChange::RoastInserted { id }, ROAST_HISTORY_KEY, persisted)
    }

    /// Flip the favorite flag of `id`. An unknown id leaves the store unchanged.
    ///
    /// # Errors
    /// Returns `NotDurablySaved` when the write-back fails.
    pub fn toggle_favorite(&self, id: RoastId) -> Result<Option<bool>, StoreError> {
        let (is_favorite, persisted) = {
            let mut roasts = self.roasts.write();
            let Some(item) = roasts.iter_mut().find(|item| item.id == id) else {
                warn!(%id, "toggle favorite: roast not found");
                return Ok(None);
            };
            item.is_favorite = !item.is_favorite;
            let is_favorite = item.is_favorite;
            (is_favorite, self.persist(ROAST_HISTORY_KEY, &*roasts))
        };
        self.finish(StoreChange::FavoriteToggled { id, is_favorite }, ROAST_HISTORY_KEY, persisted)?;
        Ok(Some(is_favorite))
    }

    /// Set the favorite flag on every listed roast. Returns how many changed.
    ///
    /// # Errors
    /// Returns `NotDurablySaved` when the write-back fails.
    pub fn set_favorites(&self, ids: &[RoastId], is_favorite: bool) -> Result<usize, StoreError> {
        let (changed, persisted) = {
            let mut roasts = self.roasts.write();
            let mut changed = 0;
            for item in roasts.iter_mut().filter(|item| ids.contains(&item.id)) {
                if item.is_favorite != is_favorite {
                    item.is_favorite = is_favorite;
                    changed += 1;
                }
            }
            if changed == 0 {
                return Ok(0);
            }
            (changed, self.persist(ROAST_HISTORY_KEY, &*roasts))
        };
        self.finish(StoreChange::FavoritesUpdated { changed }, ROAST_HISTORY_KEY, persisted)?;
        Ok(changed)
    }

    /// # Errors
    /// Returns `NotDurablySaved` when the write-back fails.
    pub fn delete_roast(&self, id: RoastId) -> Result<bool, StoreError> {
        let persisted = {
            let mut roasts = self.roasts.write();
            let before = roasts.len();
            roasts.retain(|item| item.id != id);
            if roasts.len() == before {
                debug!(%id, "delete roast: roast not found");
                return Ok(false);
            }
            self.persist(ROAST_HISTORY_KEY, &*roasts)
        };
        self.finish(StoreChange::RoastDeleted { id }, ROAST_HISTORY_KEY, persisted)?;
        Ok(true)
    }

    /// Remove every roast. Returns how many were removed.
    ///
    /// # Errors
    /// Returns `NotDurablySaved` when the write-back fails.
    pub fn clear_roasts(&self) -> Result<usize, StoreError> {
        let (removed, persisted) = {
            let mut roasts = self.roasts.write();
            let removed = roasts.len();
            roasts.clear();
            (removed, self.persist(ROAST_HISTORY_KEY, &*roasts))
        };
        self.finish(StoreChange::RoastsCleared { removed }, ROAST_HISTORY_KEY, persisted)?;
        Ok(removed)
    }

    /// Merge `items` with `strategy`, capped at the bulk cap.
    ///
    /// # Errors
    /// Returns `NotDurablySaved` when the write-back fails.
    pub fn merge_roasts(
        &self,
        items: Vec<RoastItem>,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome, StoreError> {
        let (outcome, persisted) = {
            let mut roasts = self.roasts.write();
            let mut working = WorkingSet::new(std::mem::take(&mut *roasts));
            let mut outcome = working.merge(items, strategy);
            let (merged, dropped) = working.finish(self.caps.bulk_cap);
            outcome.dropped_by_cap = dropped;
            *roasts = merged;
            (outcome, self.persist(ROAST_HISTORY_KEY, &*roasts))
        };
        self.finish(StoreChange::RoastsMerged { strategy, outcome }, ROAST_HISTORY_KEY, persisted)?;
        Ok(outcome)
    }

    /// Run `f` against a staged copy of the roast history and commit its
    /// edits, plus any staged preferences, in one durable write when it
    /// returns `Ok`. On `Err` nothing changes.
    ///
    /// The roast lock is held for the duration of `f`; `f` must not call back
    /// into roast operations on this store.
    ///
    /// # Errors
    /// Returns the closure's error, or `NotDurablySaved` converted into `E`
    /// when the commit cannot be written.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut roasts = self.roasts.write();
        let mut tx = StoreTransaction { roasts: WorkingSet::new(roasts.clone()), preferences: None };
        let value = f(&mut tx)?;

        let (items, dropped) = tx.roasts.finish(self.caps.bulk_cap);
        if dropped > 0 {
            debug!(dropped, "transaction trimmed roasts to bulk cap");
        }
        let mut entries = vec![(ROAST_HISTORY_KEY, encode(ROAST_HISTORY_KEY, &items)?)];
        let preferences_replaced = tx.preferences.is_some();
        let mut preferences_guard = None;
        if let Some(preferences) = tx.preferences {
            entries.push((PREFERENCES_KEY, encode(PREFERENCES_KEY, &preferences)?));
            let mut guard = self.preferences.write();
            *guard = preferences;
            preferences_guard = Some(guard);
        }
        let count = items.len();
        *roasts = items;

        let persisted = self.backend.write_batch(&entries).map_err(|source| StoreError::Backend {
            key: ROAST_HISTORY_KEY.to_string(),
            action: "commit",
            source,
        });
        drop(preferences_guard);
        drop(roasts);

        self.finish(
            StoreChange::TransactionCommitted { roasts: count, preferences_replaced },
            ROAST_HISTORY_KEY,
            persisted,
        )?;
        Ok(value)
    }

    /// Report duplicate ids and structurally invalid roasts without mutating.
    #[must_use]
    pub fn integrity_scan(&self) -> IntegrityScan {
        let now = OffsetDateTime::now_utc();
        let roasts = self.roasts.read();
        let mut seen = std::collections::HashSet::new();
        let mut duplicate_ids = Vec::new();
        let mut invalid_items = Vec::new();

        for item in roasts.iter() {
            if !seen.insert(item.id) && !duplicate_ids.contains(&item.id) {
                duplicate_ids.push(item.id);
            }
            let errors = validate_item(item, now);
            if !errors.is_empty() {
                invalid_items.push(InvalidItem { id: item.id, errors });
            }
        }

        let backend_ok = match self.backend.quick_check() {
            Ok(ok) => ok,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "backend health probe failed");
                false
            }
        };

        IntegrityScan { total_items: roasts.len(), duplicate_ids, invalid_items, backend_ok }
    }

    // ---- preferences ----

    #[must_use]
    pub fn preferences(&self) -> Preferences {
        self.preferences.read().clone()
    }

    /// Replace the preferences wholesale.
    ///
    /// # Errors
    /// Returns `NotDurablySaved` when the write-back fails.
    pub fn save_preferences(&self, preferences: Preferences) -> Result<(), StoreError> {
        let persisted = {
            let mut current = self.preferences.write();
            *current = preferences;
            self.persist(PREFERENCES_KEY, &*current)
        };
        self.finish(StoreChange::PreferencesSaved, PREFERENCES_KEY, persisted)
    }

    // ---- streak ----

    #[must_use]
    pub fn streak(&self) -> Streak {
        self.streak.read().clone()
    }

    /// Register activity for `today`.
    ///
    /// # Errors
    /// Returns `NotDurablySaved` when the write-back fails.
    pub fn check_streak(&self, today: Date) -> Result<(Streak, StreakOutcome), StoreError> {
        let (snapshot, outcome, persisted) = {
            let mut streak = self.streak.write();
            let outcome = streak.register_activity(today);
            if outcome == StreakOutcome::AlreadyCounted {
                return Ok((streak.clone(), outcome));
            }
            (streak.clone(), outcome, self.persist(STREAK_KEY, &*streak))
        };
        self.finish(
            StoreChange::StreakUpdated { outcome, current_streak: snapshot.current_streak },
            STREAK_KEY,
            persisted,
        )?;
        Ok((snapshot, outcome))
    }

    /// # Errors
    /// Returns `NotDurablySaved` when the write-back fails.
    pub fn reset_streak(&self) -> Result<(), StoreError> {
        let persisted = {
            let mut streak = self.streak.write();
            *streak = Streak::default();
            self.persist(STREAK_KEY, &*streak)
        };
        self.finish(StoreChange::StreakReset, STREAK_KEY, persisted)
    }

    // ---- internals ----

    fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = encode(key, value)?;
        self.backend.write(key, &bytes).map_err(|source| StoreError::Backend {
            key: key.to_string(),
            action: "write",
            source,
        })
    }

    /// Notify `change`, then surface a failed write-back as `NotDurablySaved`.
    fn finish(
        &self,
        change: StoreChange,
        key: &str,
        persisted: Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.notify(&change);
        match persisted {
            Ok(()) => Ok(()),
            Err(err) => {
                let detail = err.to_string();
                error!(key, error = %detail, "in-memory state updated but durable write failed");
                self.notify(&StoreChange::PersistenceFailed {
                    key: key.to_string(),
                    detail: detail.clone(),
                });
                Err(StoreError::NotDurablySaved { key: key.to_string(), detail })
            }
        }
    }

    fn notify(&self, change: &StoreChange) {
        let observers: Vec<Observer> =
            self.observers.read().iter().map(|(_, observer)| Arc::clone(observer)).collect();
        for observer in observers {
            observer(change);
        }
    }
}

fn reject_reserved(key: &str) -> Result<(), StoreError> {
    if RESERVED_KEYS.contains(&key) {
        return Err(StoreError::ReservedKey(key.to_string()));
    }
    Ok(())
}

fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|source| StoreError::Encode { key: key.to_string(), source })
}

fn load<T: DeserializeOwned>(
    backend: &dyn KeyValueBackend,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(bytes) = backend.read(key).map_err(|source| StoreError::Backend {
        key: key.to_string(),
        action: "read",
        source,
    })?
    else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt { key: key.to_string(), source })
}


#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use anyhow::{anyhow, Context, Result};
    use parking_lot::Mutex;
    use roast_vault_core::Category;
    use time::{Duration, Month};
    use ulid::Ulid;

    use super::*;

    struct FailingBackend;

    impl KeyValueBackend for FailingBackend {
        fn read(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn write(&self, key: &str, _value: &[u8]) -> anyhow::Result<()> {
            Err(anyhow!("disk full while writing {key}"))
        }

        fn remove(&self, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn roast(content: &str) -> RoastItem {
        RoastItem::new(content, Category::Deadline, 3)
    }

    fn small_caps() -> StoreCaps {
        StoreCaps { single_item_cap: 5, bulk_cap: 10 }
    }

    fn recorder(store: &ContentStore) -> (SubscriptionId, Arc<Mutex<Vec<StoreChange>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = store.subscribe(move |change| sink.lock().push(change.clone()));
        (id, seen)
    }

    fn date(day: u8) -> Date {
        match Date::from_calendar_date(2024, Month::May, day) {
            Ok(date) => date,
            Err(err) => panic!("invalid fixture date: {err}"),
        }
    }

    // Test IDs: TCS-001
    #[test]
    fn insert_keeps_newest_first_within_single_item_cap() -> Result<()> {
        let store = ContentStore::in_memory(small_caps())?;
        for index in 0..12 {
            store.insert_roast(roast(&format!("roast {index}")))?;
            assert!(store.roast_count() <= 5);
        }
        let contents: Vec<String> = store.roasts().into_iter().map(|item| item.content).collect();
        assert_eq!(contents, vec!["roast 11", "roast 10", "roast 9", "roast 8", "roast 7"]);
        Ok(())
    }

    // Test IDs: TCS-002
    #[test]
    fn single_insert_does_not_shrink_bulk_imported_history() -> Result<()> {
        let store = ContentStore::in_memory(small_caps())?;
        store.merge_roasts((0..8).map(|i| roast(&format!("bulk {i}"))).collect(), MergeStrategy::Append)?;
        assert_eq!(store.roast_count(), 8);

        store.insert_roast(roast("fresh"))?;
        assert_eq!(store.roast_count(), 8);
        assert_eq!(store.roasts()[0].content, "fresh");
        Ok(())
    }

    // Test IDs: TCS-003
    #[test]
    fn bulk_merge_is_capped() -> Result<()> {
        let store = ContentStore::in_memory(small_caps())?;
        let outcome = store
            .merge_roasts((0..25).map(|i| roast(&format!("bulk {i}"))).collect(), MergeStrategy::MergeSkipDuplicates)?;
        assert_eq!(outcome.inserted, 25);
        assert_eq!(outcome.dropped_by_cap, 15);
        assert_eq!(store.roast_count(), 10);
        Ok(())
    }

    // Test IDs: TCS-004
    #[test]
    fn invalid_roast_is_rejected_without_mutation() -> Result<()> {
        let store = ContentStore::in_memory(StoreCaps::default())?;
        let Err(StoreError::InvalidItem(errors)) =
            store.insert_roast(RoastItem::new("", Category::Boss, 9))
        else {
            return Err(anyhow!("expected invalid item rejection"));
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(store.roast_count(), 0);
        Ok(())
    }

    // Test IDs: TCS-005
    #[test]
    fn toggle_favorite_on_unknown_id_is_a_silent_no_op() -> Result<()> {
        let store = ContentStore::in_memory(StoreCaps::default())?;
        store.insert_roast(roast("kept"))?;
        let before = store.roasts();
        let (_, seen) = recorder(&store);

        assert_eq!(store.toggle_favorite(RoastId::new())?, None);
        assert_eq!(store.roasts(), before);
        assert!(seen.lock().is_empty());
        Ok(())
    }

    // Test IDs: TCS-006
    #[test]
    fn observers_see_mutations_until_unsubscribed() -> Result<()> {
        let store = ContentStore::in_memory(StoreCaps::default())?;
        let (subscription, seen) = recorder(&store);

        let item = roast("fav me");
        let id = item.id;
        store.insert_roast(item)?;
        assert_eq!(store.toggle_favorite(id)?, Some(true));
        assert_eq!(store.set_favorites(&[id], false)?, 1);
        assert!(store.delete_roast(id)?);

        assert_eq!(
            *seen.lock(),
            vec![
                StoreChange::RoastInserted { id },
                StoreChange::FavoriteToggled { id, is_favorite: true },
                StoreChange::FavoritesUpdated { changed: 1 },
                StoreChange::RoastDeleted { id },
            ]
        );

        assert!(store.unsubscribe(subscription));
        store.clear_roasts()?;
        assert_eq!(seen.lock().len(), 4);
        Ok(())
    }

    // Test IDs: TCS-007
    #[test]
    fn failed_transaction_leaves_store_untouched() -> Result<()> {
        let store = ContentStore::in_memory(StoreCaps::default())?;
        store.insert_roast(roast("original"))?;
        let before = store.roasts();

        let result: Result<(), StoreError> = store.transaction(|tx| {
            tx.roasts_mut().merge(vec![roast("staged")], MergeStrategy::Append);
            tx.stage_preferences(Preferences { default_spice_level: 5, ..Preferences::default() });
            Err(StoreError::ReservedKey("abort".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.roasts(), before);
        assert_eq!(store.preferences(), Preferences::default());
        Ok(())
    }

    // Test IDs: TCS-008
    #[test]
    fn committed_transaction_replaces_roasts_and_preferences() -> Result<()> {
        let store = ContentStore::in_memory(StoreCaps::default())?;
        store.insert_roast(roast("original"))?;
        let (_, seen) = recorder(&store);

        let preferences = Preferences { preferred_language: "en".to_string(), ..Preferences::default() };
        let staged = preferences.clone();
        let outcome = store.transaction::<_, StoreError, _>(move |tx| {
            let outcome = tx.roasts_mut().merge(vec![roast("a"), roast("b")], MergeStrategy::Replace);
            tx.stage_preferences(staged);
            Ok(outcome)
        })?;

        assert_eq!(outcome.inserted, 2);
        assert_eq!(store.roast_count(), 2);
        assert_eq!(store.preferences(), preferences);
        assert_eq!(
            *seen.lock(),
            vec![StoreChange::TransactionCommitted { roasts: 2, preferences_replaced: true }]
        );
        Ok(())
    }

    // Test IDs: TCS-009
    #[test]
    fn integrity_scan_reports_duplicates_and_invalid_items() -> Result<()> {
        let good = roast("good");
        let mut bad = roast("bad");
        bad.spice_level = 9;
        let blob = serde_json::to_vec(&vec![good.clone(), bad.clone(), good.clone()])?;

        let backend = MemoryBackend::default();
        backend.write(ROAST_HISTORY_KEY, &blob)?;
        let store = ContentStore::with_backend(Box::new(backend), StoreCaps::default())?;

        let scan = store.integrity_scan();
        assert_eq!(scan.total_items, 3);
        assert_eq!(scan.duplicate_ids, vec![good.id]);
        assert_eq!(scan.invalid_items.len(), 1);
        assert_eq!(scan.invalid_items[0].id, bad.id);
        assert!(!scan.is_clean());
        assert_eq!(store.roast_count(), 3);
        Ok(())
    }

    // Test IDs: TCS-010
    #[test]
    fn failed_write_back_keeps_memory_and_signals() -> Result<()> {
        let store = ContentStore::with_backend(Box::new(FailingBackend), StoreCaps::default())?;
        let (_, seen) = recorder(&store);
        let item = roast("volatile");
        let id = item.id;

        let Err(StoreError::NotDurablySaved { key, detail }) = store.insert_roast(item) else {
            return Err(anyhow!("expected not-durably-saved signal"));
        };
        assert_eq!(key, ROAST_HISTORY_KEY);
        assert!(detail.contains("disk full"));
        assert_eq!(store.roast_count(), 1);

        let changes = seen.lock().clone();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], StoreChange::RoastInserted { id });
        assert!(matches!(changes[1], StoreChange::PersistenceFailed { .. }));
        Ok(())
    }

    // Test IDs: TCS-011
    #[test]
    fn generic_values_round_trip_and_reserved_keys_are_guarded() -> Result<()> {
        let store = ContentStore::in_memory(StoreCaps::default())?;
        store.set("onboarding_seen", &true)?;
        assert_eq!(store.get::<bool>("onboarding_seen")?, Some(true));
        store.delete("onboarding_seen")?;
        assert_eq!(store.get::<bool>("onboarding_seen")?, None);

        assert!(matches!(store.set(STREAK_KEY, &1), Err(StoreError::ReservedKey(_))));
        assert!(matches!(store.get::<Streak>(STREAK_KEY), Err(StoreError::ReservedKey(_))));
        Ok(())
    }

    // Test IDs: TCS-012
    #[test]
    fn streak_check_persists_and_reset_restores_zero_state() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("roastvault-streak-{}", Ulid::new()));
        fs::create_dir_all(&dir)?;
        let path = dir.join("store.sqlite3");
        {
            let store = ContentStore::open(&path, StoreCaps::default())?;
            assert_eq!(store.check_streak(date(1))?.1, StreakOutcome::Restarted);
            assert_eq!(store.check_streak(date(2))?.1, StreakOutcome::Extended);
            assert_eq!(store.check_streak(date(2))?.1, StreakOutcome::AlreadyCounted);
        }
        {
            let store = ContentStore::open(&path, StoreCaps::default())?;
            assert_eq!(store.streak().current_streak, 2);
            store.reset_streak()?;
            assert_eq!(store.streak(), Streak::default());
        }
        let store = ContentStore::open(&path, StoreCaps::default())?;
        assert_eq!(store.streak(), Streak::default());
        drop(store);

        fs::remove_dir_all(&dir)
            .with_context(|| format!("failed to cleanup temp dir {}", dir.display()))?;
        Ok(())
    }

    // Test IDs: TCS-013
    #[test]
    fn roasts_and_preferences_survive_reopen() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("roastvault-reopen-{}", Ulid::new()));
        fs::create_dir_all(&dir)?;
        let path = dir.join("store.sqlite3");
        let mut item = roast("persisted");
        item.created_at -= Duration::hours(1);
        {
            let store = ContentStore::open(&path, StoreCaps::default())?;
            store.insert_roast(item.clone())?;
            store.save_preferences(Preferences { safety_filter_enabled: false, ..Preferences::default() })?;
        }
        let store = ContentStore::open(&path, StoreCaps::default())?;
        assert_eq!(store.roasts(), vec![item]);
        assert!(!store.preferences().safety_filter_enabled);
        drop(store);

        fs::remove_dir_all(&dir)
            .with_context(|| format!("failed to cleanup temp dir {}", dir.display()))?;
        Ok(())
    }

    // Test IDs: TCS-014
    #[test]
    fn concurrent_writers_and_readers_preserve_integrity() -> Result<()> {
        let store = Arc::new(ContentStore::in_memory(StoreCaps::default())?);
        let writer_threads = 4;
        let writes_per_thread = 20;
        let mut handles = Vec::new();

        for writer in 0..writer_threads {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || -> Result<()> {
                for index in 0..writes_per_thread {
                    store.insert_roast(roast(&format!("writer {writer} #{index}")))?;
                }
                Ok(())
            }));
        }

        for _ in 0..2 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || -> Result<()> {
                for _ in 0..50 {
                    let _ = store.preferences();
                    let _ = store.roasts();
                }
                Ok(())
            }));
        }

        for handle in handles {
            let Ok(thread_result) = handle.join() else {
                return Err(anyhow!("concurrency thread panicked"));
            };
            thread_result?;
        }

        assert_eq!(store.roast_count(), writer_threads * writes_per_thread);
        assert!(store.integrity_scan().is_clean());
        Ok(())
    }
}
