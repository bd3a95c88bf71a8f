//! The questline engine: rollover controller, summary cache, and every
//! mutation entry point.
//!
//! One `Mutex<AppData>` serializes all mutations, so the periodic tick and
//! the API can both call [`Engine::ensure_rollover`] freely; whichever
//! caller runs first transitions the day and later callers land in the
//! same-day no-op path. Every mutation persists to the record store before
//! touching the in-memory mirror, so a failed write never leaves memory
//! ahead of disk.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeSet;
use std::sync::Mutex;
use uuid::Uuid;

use crate::clock;
use crate::db::Database;
use crate::models::{
    AssignedQuest, CreateEventRequest, CreateHabitRequest, CreateQuestRequest, CreateTaskRequest,
    DaySummary, Event, Habit, HabitLog, LogHabitRequest, META_KEY, Meta, QuestKind, QuestTemplate,
    RangeStats, SETTINGS_KEY, Settings, StreakInfo, Task, UpdateEventRequest, UpdateHabitRequest,
    UpdateQuestRequest, UpdateTaskRequest, collections,
};
use crate::quests;
use crate::scoring;
use crate::state::{AppData, habit_threshold};

/// Engine error taxonomy. Missing referents during scoring are not errors;
/// they are skips handled inside the scoring engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The record store did not complete a read or write. In-memory state
    /// was not advanced past the failed write.
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),
}

pub type EngineResult<T> = Result<T, Error>;

pub struct Engine {
    db: Database,
    data: Mutex<AppData>,
    rng: Mutex<StdRng>,
}

impl Engine {
    /// Load all collections into memory without running rollover.
    pub fn new(db: Database) -> EngineResult<Self> {
        let data = AppData::load(&db)?;
        Ok(Self {
            db,
            data: Mutex::new(data),
            rng: Mutex::new(StdRng::from_os_rng()),
        })
    }

    /// Load state and run rollover once, the normal startup path.
    pub fn boot(db: Database) -> EngineResult<Self> {
        let engine = Self::new(db)?;
        engine.ensure_rollover()?;
        Ok(engine)
    }

    // ---- Rollover controller ----

    /// Idempotent rollover entry point. Callable any time; a second call
    /// before the next wall-clock day change only refreshes today's summary.
    pub fn ensure_rollover(&self) -> EngineResult<()> {
        self.rollover_at(&clock::today_key())
    }

    fn rollover_at(&self, today: &str) -> EngineResult<()> {
        let data = &mut *self.data.lock().unwrap();
        let this_week = clock::week_start_key(today, &data.settings.week_starts_on)
            .ok_or_else(|| Error::InvalidDate(today.to_string()))?;

        match data.meta.last_rollover.clone() {
            None => {
                tracing::info!(date = %today, "first run, assigning initial quests");
                self.assign_daily(data, today)?;
                self.assign_weekly(data, &this_week)?;

                let mut meta = data.meta.clone();
                meta.last_rollover = Some(today.to_string());
                meta.last_week_start = Some(this_week);
                self.db.set(collections::META, META_KEY, &meta)?;
                data.meta = meta;

                self.upsert_summary(data, today)?;
            }
            Some(last) if last == today => {
                self.upsert_summary(data, today)?;
            }
            Some(prev) => {
                // Finalize the single immediately-previous processed day.
                // Days skipped while the app was closed get no summary or
                // streak evaluation; the streak resets once.
                let finalized = self.upsert_summary(data, &prev)?;
                let habits_done = scoring::all_scheduled_habits_complete(data, &prev);

                let mut meta = data.meta.clone();
                if finalized.goal_met && habits_done {
                    meta.streak += 1;
                    meta.best_streak = meta.best_streak.max(meta.streak);
                } else {
                    meta.streak = 0;
                }
                tracing::info!(
                    finalized = %prev,
                    total = finalized.total_points,
                    goal_met = finalized.goal_met,
                    habits_done,
                    streak = meta.streak,
                    "day rolled over"
                );

                self.assign_daily(data, today)?;
                self.upsert_summary(data, today)?;

                let last_week = meta
                    .last_week_start
                    .clone()
                    .or_else(|| clock::week_start_key(&prev, &data.settings.week_starts_on));
                if last_week.as_deref() != Some(this_week.as_str()) {
                    self.assign_weekly(data, &this_week)?;
                }
                meta.last_week_start = Some(this_week);
                meta.last_rollover = Some(today.to_string());
                self.db.set(collections::META, META_KEY, &meta)?;
                data.meta = meta;
            }
        }
        Ok(())
    }

    fn assign_daily(&self, data: &mut AppData, date: &str) -> EngineResult<()> {
        let assigned = quests::build_daily(data, date, &mut *self.rng.lock().unwrap());
        self.persist_assignments(data, assigned, "daily", date)
    }

    fn assign_weekly(&self, data: &mut AppData, week_start: &str) -> EngineResult<()> {
        let assigned = quests::build_weekly(data, week_start, &mut *self.rng.lock().unwrap());
        self.persist_assignments(data, assigned, "weekly", week_start)
    }

    fn persist_assignments(
        &self,
        data: &mut AppData,
        assigned: Vec<AssignedQuest>,
        kind: &str,
        date: &str,
    ) -> EngineResult<()> {
        tracing::info!(kind, date, count = assigned.len(), "assigned quests");
        let batch: Vec<(String, AssignedQuest)> =
            assigned.into_iter().map(|a| (a.id.clone(), a)).collect();
        self.db.bulk_set(collections::ASSIGNED_QUESTS, &batch)?;
        for (id, a) in batch {
            data.assigned_quests.insert(id, a);
        }
        Ok(())
    }

    // ---- Summary cache ----

    fn upsert_summary(&self, data: &mut AppData, date: &str) -> EngineResult<DaySummary> {
        let summary = scoring::compute_day_totals(data, date);
        self.db.set(collections::SUMMARIES, date, &summary)?;
        data.summaries.insert(date.to_string(), summary.clone());
        Ok(summary)
    }

    /// Recompute and persist the summary for `date`.
    pub fn upsert_day_summary(&self, date: &str) -> EngineResult<DaySummary> {
        check_day(date)?;
        let data = &mut *self.data.lock().unwrap();
        self.upsert_summary(data, date)
    }

    /// Live recomputation, no cache read or write.
    pub fn compute_day_totals(&self, date: &str) -> EngineResult<DaySummary> {
        check_day(date)?;
        let data = self.data.lock().unwrap();
        Ok(scoring::compute_day_totals(&data, date))
    }

    /// Cached summary when present, live recomputation otherwise (days from
    /// before first use have no cached record but are still queryable).
    pub fn day_summary(&self, date: &str) -> EngineResult<DaySummary> {
        check_day(date)?;
        let data = self.data.lock().unwrap();
        Ok(match data.summaries.get(date) {
            Some(cached) => cached.clone(),
            None => scoring::compute_day_totals(&data, date),
        })
    }

    /// Inclusive range aggregation over per-day summaries.
    pub fn range_stats(&self, start: &str, end: &str) -> EngineResult<RangeStats> {
        let first =
            clock::parse_day(start).ok_or_else(|| Error::InvalidDate(start.to_string()))?;
        let last = clock::parse_day(end).ok_or_else(|| Error::InvalidDate(end.to_string()))?;

        let data = self.data.lock().unwrap();
        let mut days = Vec::new();
        let mut day = first;
        while day <= last {
            let key = day.format("%Y-%m-%d").to_string();
            let summary = match data.summaries.get(&key) {
                Some(cached) => cached.clone(),
                None => scoring::compute_day_totals(&data, &key),
            };
            days.push(summary);
            day += chrono::Duration::days(1);
        }

        Ok(RangeStats {
            start: start.to_string(),
            end: end.to_string(),
            total_points: days.iter().map(|d| d.total_points).sum(),
            days_goal_met: days.iter().filter(|d| d.goal_met).count() as i64,
            days,
        })
    }

    // ---- Tasks ----

    pub fn tasks(&self) -> Vec<Task> {
        self.data.lock().unwrap().tasks.values().cloned().collect()
    }

    pub fn create_task(&self, req: CreateTaskRequest) -> EngineResult<Task> {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: req.title,
            points: req.points,
            due_at: req.due_at,
            completed_at: None,
            created_at: clock::now_stamp(),
        };
        let data = &mut *self.data.lock().unwrap();
        self.db.set(collections::TASKS, &task.id, &task)?;
        data.tasks.insert(task.id.clone(), task.clone());
        self.upsert_summary(data, &clock::today_key())?;
        Ok(task)
    }

    pub fn update_task(&self, id: &str, req: UpdateTaskRequest) -> EngineResult<Task> {
        let data = &mut *self.data.lock().unwrap();
        let mut task = data
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        if let Some(title) = req.title {
            task.title = title;
        }
        if let Some(points) = req.points {
            task.points = points;
        }
        if let Some(due_at) = req.due_at {
            task.due_at = due_at;
        }
        self.db.set(collections::TASKS, id, &task)?;
        data.tasks.insert(id.to_string(), task.clone());
        self.upsert_summary(data, &affected_day(task.completed_at.as_deref()))?;
        Ok(task)
    }

    /// Idempotent completion toggle: completing a completed task clears the
    /// completion again.
    pub fn toggle_task(&self, id: &str) -> EngineResult<Task> {
        let data = &mut *self.data.lock().unwrap();
        let mut task = data
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        let was = task.completed_at.take();
        if was.is_none() {
            task.completed_at = Some(clock::now_stamp());
        }
        self.db.set(collections::TASKS, id, &task)?;
        data.tasks.insert(id.to_string(), task.clone());
        // Refresh whichever day gained or lost the completion.
        self.upsert_summary(data, &affected_day(was.as_deref()))?;
        Ok(task)
    }

    pub fn delete_task(&self, id: &str) -> EngineResult<()> {
        let data = &mut *self.data.lock().unwrap();
        let task = data
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        self.db.delete(collections::TASKS, id)?;
        data.tasks.remove(id);
        self.upsert_summary(data, &affected_day(task.completed_at.as_deref()))?;
        Ok(())
    }

    // ---- Habits ----

    pub fn habits(&self) -> Vec<Habit> {
        self.data.lock().unwrap().habits.values().cloned().collect()
    }

    pub fn create_habit(&self, req: CreateHabitRequest) -> EngineResult<Habit> {
        let habit = Habit {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            kind: req.kind,
            target: req.target.max(1),
            points: req.points,
            schedule: normalize_schedule(req.schedule),
            created_at: clock::now_stamp(),
        };
        let data = &mut *self.data.lock().unwrap();
        self.db.set(collections::HABITS, &habit.id, &habit)?;
        data.habits.insert(habit.id.clone(), habit.clone());
        self.upsert_summary(data, &clock::today_key())?;
        Ok(habit)
    }

    pub fn update_habit(&self, id: &str, req: UpdateHabitRequest) -> EngineResult<Habit> {
        let data = &mut *self.data.lock().unwrap();
        let mut habit = data
            .habits
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("habit {id}")))?;
        if let Some(name) = req.name {
            habit.name = name;
        }
        if let Some(kind) = req.kind {
            habit.kind = kind;
        }
        if let Some(target) = req.target {
            habit.target = target.max(1);
        }
        if let Some(points) = req.points {
            habit.points = points;
        }
        if let Some(schedule) = req.schedule {
            habit.schedule = normalize_schedule(schedule);
        }
        self.db.set(collections::HABITS, id, &habit)?;
        data.habits.insert(id.to_string(), habit.clone());

        // Scoring rules changed for every day this habit was logged.
        let dates: BTreeSet<String> = data
            .habit_logs
            .values()
            .filter(|l| l.habit_id == id)
            .map(|l| l.date.clone())
            .collect();
        for date in dates {
            self.upsert_summary(data, &date)?;
        }
        self.upsert_summary(data, &clock::today_key())?;
        Ok(habit)
    }

    /// Deletes a habit and cascades deletion of all its daily logs.
    pub fn delete_habit(&self, id: &str) -> EngineResult<()> {
        let data = &mut *self.data.lock().unwrap();
        if !data.habits.contains_key(id) {
            return Err(Error::NotFound(format!("habit {id}")));
        }
        let log_keys: Vec<String> = data
            .habit_logs
            .iter()
            .filter(|(_, l)| l.habit_id == id)
            .map(|(k, _)| k.clone())
            .collect();
        let dates: BTreeSet<String> = data
            .habit_logs
            .values()
            .filter(|l| l.habit_id == id)
            .map(|l| l.date.clone())
            .collect();

        self.db.bulk_delete(collections::HABIT_LOGS, &log_keys)?;
        self.db.delete(collections::HABITS, id)?;
        for key in &log_keys {
            data.habit_logs.remove(key);
        }
        data.habits.remove(id);

        for date in dates {
            self.upsert_summary(data, &date)?;
        }
        self.upsert_summary(data, &clock::today_key())?;
        Ok(())
    }

    /// Record progress for one habit on one day. The log is created lazily
    /// on first interaction; counts clamp to `[0, threshold]` and the
    /// completion stamp follows the threshold crossing in both directions.
    pub fn log_habit(&self, habit_id: &str, req: LogHabitRequest) -> EngineResult<HabitLog> {
        let date = req.date.unwrap_or_else(clock::today_key);
        check_day(&date)?;

        let data = &mut *self.data.lock().unwrap();
        let habit = data
            .habits
            .get(habit_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("habit {habit_id}")))?;
        let threshold = habit_threshold(&habit);

        let key = HabitLog::key(habit_id, &date);
        let mut log = data.habit_logs.get(&key).cloned().unwrap_or(HabitLog {
            habit_id: habit_id.to_string(),
            date: date.clone(),
            count: 0,
            completed_at: None,
        });

        let requested = req.count.unwrap_or(log.count + 1);
        log.count = requested.clamp(0, threshold);
        if log.count >= threshold {
            if log.completed_at.is_none() {
                log.completed_at = Some(clock::now_stamp());
            }
        } else {
            log.completed_at = None;
        }

        self.db.set(collections::HABIT_LOGS, &key, &log)?;
        data.habit_logs.insert(key, log.clone());
        self.upsert_summary(data, &date)?;
        Ok(log)
    }

    pub fn habit_logs_for(&self, date: &str) -> Vec<HabitLog> {
        self.data
            .lock()
            .unwrap()
            .habit_logs
            .values()
            .filter(|l| l.date == date)
            .cloned()
            .collect()
    }

    // ---- Events ----

    pub fn events(&self) -> Vec<Event> {
        self.data.lock().unwrap().events.values().cloned().collect()
    }

    pub fn create_event(&self, req: CreateEventRequest) -> EngineResult<Event> {
        let event = Event {
            id: Uuid::new_v4().to_string(),
            title: req.title,
            starts_at: req.starts_at,
            ends_at: req.ends_at,
            all_day: req.all_day,
            color: req.color,
            points_enabled: req.points_enabled,
            points: req.points,
            completed_at: None,
            created_at: clock::now_stamp(),
        };
        let data = &mut *self.data.lock().unwrap();
        self.db.set(collections::EVENTS, &event.id, &event)?;
        data.events.insert(event.id.clone(), event.clone());
        self.upsert_summary(data, &clock::today_key())?;
        Ok(event)
    }

    pub fn update_event(&self, id: &str, req: UpdateEventRequest) -> EngineResult<Event> {
        let data = &mut *self.data.lock().unwrap();
        let mut event = data
            .events
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("event {id}")))?;
        if let Some(title) = req.title {
            event.title = title;
        }
        if let Some(starts_at) = req.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(ends_at) = req.ends_at {
            event.ends_at = ends_at;
        }
        if let Some(all_day) = req.all_day {
            event.all_day = all_day;
        }
        if let Some(color) = req.color {
            event.color = color;
        }
        if let Some(points_enabled) = req.points_enabled {
            event.points_enabled = points_enabled;
        }
        if let Some(points) = req.points {
            event.points = points;
        }
        self.db.set(collections::EVENTS, id, &event)?;
        data.events.insert(id.to_string(), event.clone());
        self.upsert_summary(data, &affected_day(event.completed_at.as_deref()))?;
        Ok(event)
    }

    pub fn toggle_event(&self, id: &str) -> EngineResult<Event> {
        let data = &mut *self.data.lock().unwrap();
        let mut event = data
            .events
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("event {id}")))?;
        let was = event.completed_at.take();
        if was.is_none() {
            event.completed_at = Some(clock::now_stamp());
        }
        self.db.set(collections::EVENTS, id, &event)?;
        data.events.insert(id.to_string(), event.clone());
        self.upsert_summary(data, &affected_day(was.as_deref()))?;
        Ok(event)
    }

    pub fn delete_event(&self, id: &str) -> EngineResult<()> {
        let data = &mut *self.data.lock().unwrap();
        let event = data
            .events
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("event {id}")))?;
        self.db.delete(collections::EVENTS, id)?;
        data.events.remove(id);
        self.upsert_summary(data, &affected_day(event.completed_at.as_deref()))?;
        Ok(())
    }

    // ---- Quest library & assignments ----

    pub fn quest_library(&self) -> Vec<QuestTemplate> {
        self.data
            .lock()
            .unwrap()
            .quest_library
            .values()
            .cloned()
            .collect()
    }

    pub fn create_quest(&self, req: CreateQuestRequest) -> EngineResult<QuestTemplate> {
        let quest = QuestTemplate {
            id: Uuid::new_v4().to_string(),
            title: req.title,
            points: req.points,
            active: req.active,
            created_at: clock::now_stamp(),
        };
        let data = &mut *self.data.lock().unwrap();
        self.db.set(collections::QUEST_LIBRARY, &quest.id, &quest)?;
        data.quest_library.insert(quest.id.clone(), quest.clone());
        Ok(quest)
    }

    pub fn update_quest(&self, id: &str, req: UpdateQuestRequest) -> EngineResult<QuestTemplate> {
        let data = &mut *self.data.lock().unwrap();
        let mut quest = data
            .quest_library
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("quest {id}")))?;
        if let Some(title) = req.title {
            quest.title = title;
        }
        if let Some(points) = req.points {
            quest.points = points;
        }
        if let Some(active) = req.active {
            quest.active = active;
        }
        self.db.set(collections::QUEST_LIBRARY, id, &quest)?;
        data.quest_library.insert(id.to_string(), quest.clone());
        for date in completed_assignment_days(data, id) {
            self.upsert_summary(data, &date)?;
        }
        Ok(quest)
    }

    /// Removes a template. Assignments referencing it stay in history but
    /// score nothing from then on.
    pub fn delete_quest(&self, id: &str) -> EngineResult<()> {
        let data = &mut *self.data.lock().unwrap();
        if !data.quest_library.contains_key(id) {
            return Err(Error::NotFound(format!("quest {id}")));
        }
        let affected = completed_assignment_days(data, id);
        self.db.delete(collections::QUEST_LIBRARY, id)?;
        data.quest_library.remove(id);
        for date in affected {
            self.upsert_summary(data, &date)?;
        }
        Ok(())
    }

    /// Assignments visible on `date`: that day's dailies plus the weeklies
    /// of the week containing it.
    pub fn assigned_for(&self, date: &str) -> EngineResult<Vec<AssignedQuest>> {
        check_day(date)?;
        let data = self.data.lock().unwrap();
        let week = clock::week_start_key(date, &data.settings.week_starts_on)
            .ok_or_else(|| Error::InvalidDate(date.to_string()))?;
        Ok(data
            .assigned_quests
            .values()
            .filter(|a| match a.kind {
                QuestKind::Daily => a.date == date,
                QuestKind::Weekly => a.date == week,
            })
            .cloned()
            .collect())
    }

    pub fn toggle_assigned_quest(&self, id: &str) -> EngineResult<AssignedQuest> {
        let data = &mut *self.data.lock().unwrap();
        let mut assigned = data
            .assigned_quests
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("assigned quest {id}")))?;
        let was = assigned.completed_at.take();
        if was.is_none() {
            assigned.completed_at = Some(clock::now_stamp());
        }
        self.db.set(collections::ASSIGNED_QUESTS, id, &assigned)?;
        data.assigned_quests.insert(id.to_string(), assigned.clone());
        self.upsert_summary(data, &affected_day(was.as_deref()))?;
        Ok(assigned)
    }

    // ---- Settings & meta ----

    pub fn settings(&self) -> Settings {
        self.data.lock().unwrap().settings.clone()
    }

    pub fn update_settings(&self, settings: Settings) -> EngineResult<Settings> {
        let data = &mut *self.data.lock().unwrap();
        self.db.set(collections::META, SETTINGS_KEY, &settings)?;
        data.settings = settings.clone();
        // The goal threshold may have moved; today's cached goal_met must
        // follow it.
        self.upsert_summary(data, &clock::today_key())?;
        Ok(settings)
    }

    pub fn streak(&self) -> StreakInfo {
        let data = self.data.lock().unwrap();
        StreakInfo {
            streak: data.meta.streak,
            best_streak: data.meta.best_streak,
        }
    }

    pub fn meta(&self) -> Meta {
        self.data.lock().unwrap().meta.clone()
    }
}

fn check_day(date: &str) -> EngineResult<()> {
    clock::parse_day(date)
        .map(|_| ())
        .ok_or_else(|| Error::InvalidDate(date.to_string()))
}

/// The day whose summary a completion mutation touched: the old completion
/// day when one was cleared, today otherwise.
fn affected_day(previous_completion: Option<&str>) -> String {
    previous_completion
        .and_then(clock::day_of)
        .unwrap_or_else(clock::today_key)
}

/// Days on which a completed assignment of this template contributed points.
fn completed_assignment_days(data: &AppData, quest_id: &str) -> BTreeSet<String> {
    data.assigned_quests
        .values()
        .filter(|a| a.quest_id == quest_id)
        .filter_map(|a| a.completed_at.as_deref())
        .filter_map(clock::day_of)
        .collect()
}

/// Lowercase, dedup, and drop unknown weekday names. An empty result means
/// the habit applies every day; misconfiguration is normalized, not fatal.
fn normalize_schedule(schedule: Vec<String>) -> Vec<String> {
    const DAYS: [&str; 7] = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ];
    let mut out: Vec<String> = DAYS
        .iter()
        .filter(|d| schedule.iter().any(|s| s.eq_ignore_ascii_case(d)))
        .map(|d| d.to_string())
        .collect();
    if out.is_empty() {
        out = DAYS.iter().map(|d| d.to_string()).collect();
    }
    out
}
