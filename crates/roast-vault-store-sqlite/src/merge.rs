use std::collections::HashMap;

use roast_vault_core::{RoastId, RoastItem};
use serde::{Deserialize, Serialize};

/// How incoming roasts combine with the existing collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Add every incoming roast; an existing roast with the same id is overwritten.
    Append,
    /// Discard existing roasts and adopt the incoming list in order.
    Replace,
    /// Add incoming roasts whose id is not already present.
    MergeSkipDuplicates,
}

impl MergeStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
            Self::MergeSkipDuplicates => "merge-skip-duplicates",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub overwritten: usize,
    pub skipped: usize,
    pub dropped_by_cap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Overwritten,
    Skipped,
}

/// Ordered roast collection with an id index, used for staged edits.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    items: Vec<RoastItem>,
    positions: HashMap<RoastId, usize>,
    needs_sort: bool,
}

impl WorkingSet {
    #[must_use]
    pub fn new(items: Vec<RoastItem>) -> Self {
        let mut set = Self { items, positions: HashMap::new(), needs_sort: false };
        set.reindex();
        set
    }

    fn reindex(&mut self) {
        self.positions.clear();
        for (index, item) in self.items.iter().enumerate() {
            self.positions.entry(item.id).or_insert(index);
        }
    }

    #[must_use]
    pub fn items(&self) -> &[RoastItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: RoastId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.positions.clear();
        self.needs_sort = false;
    }

    /// Insert `item`, or overwrite the roast with the same id in place when
    /// `overwrite` is set. With `sorted`, the collection is re-ordered newest
    /// first when finished.
    pub fn upsert(&mut self, item: RoastItem, overwrite: bool, sorted: bool) -> Upsert {
        if let Some(&position) = self.positions.get(&item.id) {
            if !overwrite {
                return Upsert::Skipped;
            }
            self.items[position] = item;
            self.needs_sort |= sorted;
            return Upsert::Overwritten;
        }

        self.positions.insert(item.id, self.items.len());
        self.items.push(item);
        self.needs_sort |= sorted;
        Upsert::Inserted
    }

    /// Set the favorite flag of `id`. Returns the previous flag, or `None`
    /// when the roast is absent.
    pub fn set_favorite(&mut self, id: RoastId, is_favorite: bool) -> Option<bool> {
        let position = *self.positions.get(&id)?;
        let item = &mut self.items[position];
        let previous = item.is_favorite;
        item.is_favorite = is_favorite;
        Some(previous)
    }

    /// Apply `strategy` to every incoming roast in order.
    pub fn merge(&mut self, incoming: Vec<RoastItem>, strategy: MergeStrategy) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        if strategy == MergeStrategy::Replace {
            self.clear();
        }

        for item in incoming {
            let result = match strategy {
                MergeStrategy::Append => self.upsert(item, true, true),
                MergeStrategy::Replace => self.upsert(item, true, false),
                MergeStrategy::MergeSkipDuplicates => self.upsert(item, false, true),
            };
            match result {
                Upsert::Inserted => outcome.inserted += 1,
                Upsert::Overwritten => outcome.overwritten += 1,
                Upsert::Skipped => outcome.skipped += 1,
            }
        }
        outcome
    }

    /// Finish staged edits: newest first when a sorted merge happened, then
    /// cap the length. Returns the items and how many were dropped.
    #[must_use]
    pub fn finish(mut self, cap: usize) -> (Vec<RoastItem>, usize) {
        if self.needs_sort {
            self.items.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        }
        let dropped = self.items.len().saturating_sub(cap);
        self.items.truncate(cap);
        (self.items, dropped)
    }
}
