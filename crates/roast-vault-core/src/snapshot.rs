use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{Category, Preferences, RoastId, RoastItem};

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub platform: String,
    pub architecture: String,
    pub app_build: String,
}

impl DeviceInfo {
    #[must_use]
    pub fn current(app_build: &str) -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            app_build: app_build.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub app_version: String,
    pub data_version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub export_date: OffsetDateTime,
    pub total_roasts: usize,
    pub total_favorites: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub category_counts: BTreeMap<Category, usize>,
    pub average_spice_level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_popular_category: Option<Category>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub oldest_roast_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub newest_roast_date: Option<OffsetDateTime>,
}

impl Statistics {
    /// Aggregate counts over `items`. The mean spice level is rounded to two
    /// decimals so the value survives a text round trip unchanged.
    #[must_use]
    pub fn from_items(items: &[RoastItem]) -> Self {
        let mut category_counts = BTreeMap::new();
        let mut spice_total = 0_i64;
        for item in items {
            *category_counts.entry(item.category).or_insert(0_usize) += 1;
            spice_total += i64::from(item.spice_level);
        }

        let mut most_popular_category = None;
        let mut best = 0_usize;
        for (category, count) in &category_counts {
            if *count > best {
                best = *count;
                most_popular_category = Some(*category);
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let average_spice_level = if items.is_empty() {
            0.0
        } else {
            let mean = spice_total as f64 / items.len() as f64;
            (mean * 100.0).round() / 100.0
        };

        Self {
            category_counts,
            average_spice_level,
            most_popular_category,
            oldest_roast_date: items.iter().map(|item| item.created_at).min(),
            newest_roast_date: items.iter().map(|item| item.created_at).max(),
        }
    }
}

/// The self-describing document exchanged at the export boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    pub metadata: SnapshotMetadata,
    pub user_preferences: Preferences,
    pub roast_history: Vec<RoastItem>,
    #[serde(default)]
    pub favorites: Vec<RoastId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ExportSnapshot {
    /// Ids of favorited items, in history order.
    #[must_use]
    pub fn favorite_ids(items: &[RoastItem]) -> Vec<RoastId> {
        items.iter().filter(|item| item.is_favorite).map(|item| item.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn item(category: Category, spice_level: i32, offset_days: i64) -> RoastItem {
        let mut item = RoastItem::new("Sếp bảo deadline là hôm qua", category, spice_level);
        item.created_at = OffsetDateTime::UNIX_EPOCH + Duration::days(19_000 + offset_days);
        item
    }

    #[test]
    fn statistics_aggregate_counts_mean_and_bounds() {
        let items = vec![
            item(Category::Boss, 5, 2),
            item(Category::Boss, 2, 0),
            item(Category::Email, 3, 1),
        ];
        let stats = Statistics::from_items(&items);
        assert_eq!(stats.category_counts.get(&Category::Boss), Some(&2));
        assert_eq!(stats.most_popular_category, Some(Category::Boss));
        assert!((stats.average_spice_level - 3.33).abs() < f64::EPSILON);
        assert_eq!(stats.oldest_roast_date, Some(items[1].created_at));
        assert_eq!(stats.newest_roast_date, Some(items[0].created_at));
    }

    #[test]
    fn statistics_of_empty_history_are_zeroed() {
        let stats = Statistics::from_items(&[]);
        assert!(stats.category_counts.is_empty());
        assert!(stats.most_popular_category.is_none());
        assert!(stats.average_spice_level.abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_uses_camel_case_wire_names() -> Result<(), serde_json::Error> {
        let items = vec![item(Category::MondayMorning, 4, 0)];
        let snapshot = ExportSnapshot {
            metadata: SnapshotMetadata {
                app_version: "1.2.0".to_string(),
                data_version: 4,
                export_date: OffsetDateTime::UNIX_EPOCH,
                total_roasts: 1,
                total_favorites: 0,
                device_info: None,
            },
            user_preferences: Preferences::default(),
            favorites: ExportSnapshot::favorite_ids(&items),
            statistics: Some(Statistics::from_items(&items)),
            roast_history: items,
            checksum: None,
        };

        let value = serde_json::to_value(&snapshot)?;
        assert!(value.get("roastHistory").is_some());
        assert!(value.get("checksum").is_none());
        assert_eq!(value["metadata"]["dataVersion"], 4);
        assert_eq!(value["roastHistory"][0]["category"], "mondayMorning");
        assert_eq!(value["statistics"]["categoryCounts"]["mondayMorning"], 1);
        Ok(())
    }
}
