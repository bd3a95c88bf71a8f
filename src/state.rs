//! In-memory application state.
//!
//! A full mirror of the record store, loaded once at boot and written
//! through on every mutation. The store stays authoritative: the engine
//! persists first and only then applies the change here.

use anyhow::Result;
use std::collections::HashMap;

use crate::clock;
use crate::db::Database;
use crate::models::{
    AssignedQuest, DaySummary, Event, Habit, HabitKind, HabitLog, Meta, QuestTemplate,
    SETTINGS_KEY, META_KEY, Settings, Task, collections,
};

#[derive(Debug, Default)]
pub struct AppData {
    pub tasks: HashMap<String, Task>,
    pub habits: HashMap<String, Habit>,
    /// Keyed by `HabitLog::key` (habit id + day).
    pub habit_logs: HashMap<String, HabitLog>,
    pub events: HashMap<String, Event>,
    pub quest_library: HashMap<String, QuestTemplate>,
    pub assigned_quests: HashMap<String, AssignedQuest>,
    /// Keyed by day.
    pub summaries: HashMap<String, DaySummary>,
    pub meta: Meta,
    pub settings: Settings,
}

impl AppData {
    /// Load every collection plus both singletons. Missing singletons are
    /// created with defaults (first boot).
    pub fn load(db: &Database) -> Result<Self> {
        let mut data = Self::default();

        for task in db.all::<Task>(collections::TASKS)? {
            data.tasks.insert(task.id.clone(), task);
        }
        for habit in db.all::<Habit>(collections::HABITS)? {
            data.habits.insert(habit.id.clone(), habit);
        }
        for log in db.all::<HabitLog>(collections::HABIT_LOGS)? {
            data.habit_logs
                .insert(HabitLog::key(&log.habit_id, &log.date), log);
        }
        for event in db.all::<Event>(collections::EVENTS)? {
            data.events.insert(event.id.clone(), event);
        }
        for quest in db.all::<QuestTemplate>(collections::QUEST_LIBRARY)? {
            data.quest_library.insert(quest.id.clone(), quest);
        }
        for assigned in db.all::<AssignedQuest>(collections::ASSIGNED_QUESTS)? {
            data.assigned_quests.insert(assigned.id.clone(), assigned);
        }
        for summary in db.all::<DaySummary>(collections::SUMMARIES)? {
            data.summaries.insert(summary.date.clone(), summary);
        }

        match db.get::<Meta>(collections::META, META_KEY)? {
            Some(meta) => data.meta = meta,
            None => db.set(collections::META, META_KEY, &data.meta)?,
        }
        match db.get::<Settings>(collections::META, SETTINGS_KEY)? {
            Some(settings) => data.settings = settings,
            None => db.set(collections::META, SETTINGS_KEY, &data.settings)?,
        }

        Ok(data)
    }

    /// Habits whose schedule includes the weekday of `date`.
    pub fn scheduled_habits(&self, date: &str) -> Vec<&Habit> {
        self.habits
            .values()
            .filter(|h| clock::schedule_includes(&h.schedule, date))
            .collect()
    }

    /// Active quest template ids, the sampling pool for assignment.
    pub fn active_quest_ids(&self) -> Vec<String> {
        self.quest_library
            .values()
            .filter(|q| q.active)
            .map(|q| q.id.clone())
            .collect()
    }
}

/// The count at which a habit's day counts as complete. Binary habits need
/// one; counter habits need their target, treated as 1 when misconfigured.
pub fn habit_threshold(habit: &Habit) -> i64 {
    match habit.kind {
        HabitKind::Binary => 1,
        HabitKind::Counter => habit.target.max(1),
    }
}
