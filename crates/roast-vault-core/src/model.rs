use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime};
use ulid::Ulid;

use crate::LifecycleError;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

pub const LANGUAGE_VIETNAMESE: &str = "vi";
pub const LANGUAGE_ENGLISH: &str = "en";
pub const RECOGNIZED_LANGUAGES: [&str; 2] = [LANGUAGE_VIETNAMESE, LANGUAGE_ENGLISH];

pub const MIN_SPICE_LEVEL: i32 = 1;
pub const MAX_SPICE_LEVEL: i32 = 5;

#[must_use]
pub fn is_recognized_language(code: &str) -> bool {
    RECOGNIZED_LANGUAGES.contains(&code)
}

#[must_use]
pub fn spice_in_range(level: i32) -> bool {
    (MIN_SPICE_LEVEL..=MAX_SPICE_LEVEL).contains(&level)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RoastId(pub Ulid);

impl RoastId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a textual ULID.
    ///
    /// # Errors
    /// Returns a format error when `raw` is not a valid ULID.
    pub fn parse(raw: &str) -> Result<Self, LifecycleError> {
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|err| LifecycleError::InvalidFormat(format!("invalid roast id `{raw}`: {err}")))
    }
}

impl Default for RoastId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoastId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Deadline,
    Meeting,
    Boss,
    Colleague,
    Overtime,
    Salary,
    Email,
    MondayMorning,
}

impl Category {
    pub const ALL: [Self; 8] = [
        Self::Deadline,
        Self::Meeting,
        Self::Boss,
        Self::Colleague,
        Self::Overtime,
        Self::Salary,
        Self::Email,
        Self::MondayMorning,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deadline => "deadline",
            Self::Meeting => "meeting",
            Self::Boss => "boss",
            Self::Colleague => "colleague",
            Self::Overtime => "overtime",
            Self::Salary => "salary",
            Self::Email => "email",
            Self::MondayMorning => "mondayMorning",
        }
    }

    /// # Errors
    /// Returns a format error when `raw` names no known category.
    pub fn parse(raw: &str) -> Result<Self, LifecycleError> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(raw))
            .ok_or_else(|| LifecycleError::InvalidFormat(format!("unknown category: {raw}")))
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single generated roast. The id never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoastItem {
    pub id: RoastId,
    pub content: String,
    pub category: Category,
    pub spice_level: i32,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub is_favorite: bool,
}

impl RoastItem {
    #[must_use]
    pub fn new(content: impl Into<String>, category: Category, spice_level: i32) -> Self {
        Self {
            id: RoastId::new(),
            content: content.into(),
            category,
            spice_level,
            language: default_language(),
            created_at: OffsetDateTime::now_utc(),
            is_favorite: false,
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

fn default_language() -> String {
    LANGUAGE_VIETNAMESE.to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub enum NotificationFrequency {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

impl NotificationFrequency {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

/// Endpoint and model of the text-generation service. The secret key is held by
/// a separate secret store and has no field here.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfiguration {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub model: String,
}

impl ApiConfiguration {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoint.is_empty() && self.model.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_language")]
    pub preferred_language: String,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub notification_frequency: NotificationFrequency,
    #[serde(default = "default_category")]
    pub default_category: Category,
    #[serde(default = "default_spice")]
    pub default_spice_level: i32,
    #[serde(default = "all_categories")]
    pub preferred_categories: BTreeSet<Category>,
    #[serde(default = "default_true")]
    pub safety_filter_enabled: bool,
    #[serde(default)]
    pub api_configuration: ApiConfiguration,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            preferred_language: default_language(),
            notifications_enabled: true,
            notification_frequency: NotificationFrequency::Daily,
            default_category: default_category(),
            default_spice_level: default_spice(),
            preferred_categories: all_categories(),
            safety_filter_enabled: true,
            api_configuration: ApiConfiguration::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_category() -> Category {
    Category::Deadline
}

fn default_spice() -> i32 {
    3
}

#[must_use]
pub fn all_categories() -> BTreeSet<Category> {
    Category::ALL.into_iter().collect()
}

/// Daily engagement record.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Streak {
    pub current_streak: u32,
    pub longest_streak: u32,
    #[serde(default, with = "iso_date::option")]
    pub last_active_date: Option<Date>,
    #[serde(default, with = "iso_date::option")]
    pub streak_start_date: Option<Date>,
    pub freeze_available: bool,
    #[serde(default, with = "iso_date::option")]
    pub freeze_used_date: Option<Date>,
    pub total_active_days: u32,
}

impl Default for Streak {
    fn default() -> Self {
        Self {
            current_streak: 0,
            longest_streak: 0,
            last_active_date: None,
            streak_start_date: None,
            freeze_available: true,
            freeze_used_date: None,
            total_active_days: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StreakOutcome {
    AlreadyCounted,
    Extended,
    FreezeConsumed,
    Restarted,
}

impl Streak {
    /// Record activity on `today`. Mutates at most once per calendar day.
    pub fn register_activity(&mut self, today: Date) -> StreakOutcome {
        let outcome = match self.last_active_date {
            Some(last) if last >= today => return StreakOutcome::AlreadyCounted,
            Some(last) if today - last == Duration::days(1) => {
                self.current_streak += 1;
                StreakOutcome::Extended
            }
            Some(last) if today - last == Duration::days(2) && self.freeze_available => {
                self.freeze_available = false;
                self.freeze_used_date = today.previous_day();
                self.current_streak += 1;
                StreakOutcome::FreezeConsumed
            }
            _ => {
                self.current_streak = 1;
                self.streak_start_date = Some(today);
                StreakOutcome::Restarted
            }
        };

        self.last_active_date = Some(today);
        self.total_active_days += 1;
        self.longest_streak = self.longest_streak.max(self.current_streak);
        outcome
    }
}
