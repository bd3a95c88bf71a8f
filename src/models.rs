//! Persisted data models for questline.
//!
//! Uses String for IDs and timestamps for maximum compatibility with clients:
//! ids are opaque (uuid v4 for new records), instants are RFC 3339 with
//! millisecond precision, calendar dates are `YYYY-MM-DD`. All ordering
//! comparisons go through parsed chrono values, never raw strings.

use serde::{Deserialize, Serialize};

/// Collection names used with the record store.
pub mod collections {
    pub const TASKS: &str = "tasks";
    pub const HABITS: &str = "habits";
    pub const HABIT_LOGS: &str = "habit_logs";
    pub const EVENTS: &str = "events";
    pub const QUEST_LIBRARY: &str = "quest_library";
    pub const ASSIGNED_QUESTS: &str = "assigned_quests";
    pub const SUMMARIES: &str = "summaries";
    pub const META: &str = "meta";
}

/// Singleton record keys within the `meta` collection.
pub const META_KEY: &str = "meta";
pub const SETTINGS_KEY: &str = "settings";

/// A one-off task worth points when completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub points: i64,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    pub created_at: String,
}

/// How a habit's daily completion is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitKind {
    /// Done or not done; any count >= 1 is full credit.
    #[default]
    Binary,
    /// Counted toward a target; partial credit is proportional, floored.
    Counter,
}

/// A recurring habit scheduled on specific weekdays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub name: String,
    pub kind: HabitKind,
    /// Target count per day (counter habits; binary habits ignore it).
    #[serde(default = "default_target")]
    pub target: i64,
    pub points: i64,
    /// Lowercase weekday names this habit applies to, e.g. ["monday", "friday"].
    pub schedule: Vec<String>,
    pub created_at: String,
}

fn default_target() -> i64 {
    1
}

/// Per-day progress for one habit. One log per habit per calendar day,
/// created lazily on first interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitLog {
    pub habit_id: String,
    /// Calendar day this log belongs to (`YYYY-MM-DD`).
    pub date: String,
    pub count: i64,
    /// Set when `count` first reaches the habit's completion threshold.
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl HabitLog {
    /// Storage key: composite of habit id and day.
    pub fn key(habit_id: &str, date: &str) -> String {
        format!("{habit_id}:{date}")
    }
}

/// A calendar event, optionally worth points when marked done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub starts_at: String,
    pub ends_at: String,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub points_enabled: bool,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub completed_at: Option<String>,
    pub created_at: String,
}

/// A quest template in the library. Never scored directly; assignment
/// instantiates it per day or week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestTemplate {
    pub id: String,
    pub title: String,
    pub points: i64,
    pub active: bool,
    pub created_at: String,
}

/// Whether an assignment covers a single day or a whole week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestKind {
    Daily,
    Weekly,
}

/// A quest instance produced by the assignment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedQuest {
    pub id: String,
    /// References a `QuestTemplate`; the referent may have been deleted,
    /// in which case this assignment scores nothing.
    pub quest_id: String,
    pub kind: QuestKind,
    /// The day for daily quests, the week-start day for weekly quests.
    pub date: String,
    pub multiplier: f64,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// Cached score record for one day. Purely derived: recomputed wholesale
/// whenever a contributing entity changes, never hand-edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: String,
    pub total_points: i64,
    pub goal_met: bool,
}

/// Singleton lifecycle record. `last_rollover` is the sole source of truth
/// for "has today's rollover already happened".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub streak: i64,
    pub best_streak: i64,
    #[serde(default)]
    pub last_rollover: Option<String>,
    #[serde(default)]
    pub last_week_start: Option<String>,
}

/// How many weekly quests get assigned each week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeeklyMode {
    /// Always `weekly_count`.
    #[default]
    Fixed,
    /// A uniform random integer in `[weekly_min, weekly_max]`.
    Range,
}

/// Singleton user settings. User-editable, so out-of-range values are
/// normalized on read rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub daily_goal: i64,
    pub daily_quest_count: usize,
    /// Lowercase weekday name the week starts on ("monday" or "sunday").
    pub week_starts_on: String,
    pub weekly_mode: WeeklyMode,
    pub weekly_count: usize,
    pub weekly_min: usize,
    pub weekly_max: usize,
    pub weekly_multiplier: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daily_goal: 100,
            daily_quest_count: 3,
            week_starts_on: "monday".to_string(),
            weekly_mode: WeeklyMode::Fixed,
            weekly_count: 3,
            weekly_min: 2,
            weekly_max: 4,
            weekly_multiplier: 2.0,
        }
    }
}

// ---- Request payloads (API layer) ----

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub points: i64,
    #[serde(default)]
    pub due_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
    /// `Some(None)` clears the due date, `None` leaves it untouched.
    #[serde(default, with = "double_option")]
    pub due_at: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHabitRequest {
    pub name: String,
    #[serde(default)]
    pub kind: HabitKind,
    #[serde(default = "default_target")]
    pub target: i64,
    pub points: i64,
    pub schedule: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateHabitRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: Option<HabitKind>,
    #[serde(default)]
    pub target: Option<i64>,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub schedule: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogHabitRequest {
    /// Defaults to today when omitted.
    #[serde(default)]
    pub date: Option<String>,
    /// Absolute count to record; omitted means "increment by one".
    #[serde(default)]
    pub count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub starts_at: String,
    pub ends_at: String,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub points_enabled: bool,
    #[serde(default)]
    pub points: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEventRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub starts_at: Option<String>,
    #[serde(default)]
    pub ends_at: Option<String>,
    #[serde(default)]
    pub all_day: Option<bool>,
    #[serde(default, with = "double_option")]
    pub color: Option<Option<String>>,
    #[serde(default)]
    pub points_enabled: Option<bool>,
    #[serde(default)]
    pub points: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuestRequest {
    pub title: String,
    pub points: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateQuestRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Streak info returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct StreakInfo {
    pub streak: i64,
    pub best_streak: i64,
}

/// Summed score over an inclusive date range.
#[derive(Debug, Clone, Serialize)]
pub struct RangeStats {
    pub start: String,
    pub end: String,
    pub total_points: i64,
    pub days_goal_met: i64,
    pub days: Vec<DaySummary>,
}

/// Distinguishes "field absent" from "field explicitly null" in PATCH-style
/// payloads.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(de).map(Some)
    }
}
