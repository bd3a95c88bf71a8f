//! Day scoring and the habit-completion streak check.
//!
//! Both functions are pure over [`AppData`]: re-callable any number of
//! times, identical output for identical state. Cached summaries are
//! produced from here and never trusted without recomputation.

use crate::clock;
use crate::models::{DaySummary, HabitKind};
use crate::state::{AppData, habit_threshold};

/// Total points contributed by every completable item on `date`.
///
/// Items referencing entities that no longer exist are skipped, never an
/// error. Totals are integers; partial habit credit is floored.
pub fn compute_day_totals(data: &AppData, date: &str) -> DaySummary {
    let mut total: i64 = 0;

    for task in data.tasks.values() {
        let Some(completed_at) = task.completed_at.as_deref() else {
            continue;
        };
        if !clock::within_day(completed_at, date) {
            continue;
        }
        // Completed after the due instant scores nothing, though the task
        // stays "completed" for display.
        let overdue = match task.due_at.as_deref().and_then(clock::parse_instant) {
            Some(due) => clock::parse_instant(completed_at).is_some_and(|done| done > due),
            None => false,
        };
        if !overdue {
            total += task.points;
        }
    }

    for log in data.habit_logs.values().filter(|l| l.date == date) {
        let Some(habit) = data.habits.get(&log.habit_id) else {
            continue;
        };
        if !clock::schedule_includes(&habit.schedule, date) {
            continue;
        }
        match habit.kind {
            HabitKind::Binary => {
                if log.count >= 1 {
                    total += habit.points;
                }
            }
            HabitKind::Counter => {
                let target = habit.target.max(1);
                let done = log.count.clamp(0, target);
                total += habit.points * done / target;
            }
        }
    }

    for event in data.events.values() {
        if !event.points_enabled {
            continue;
        }
        if let Some(completed_at) = event.completed_at.as_deref()
            && clock::within_day(completed_at, date)
        {
            total += event.points;
        }
    }

    for assigned in data.assigned_quests.values() {
        let Some(completed_at) = assigned.completed_at.as_deref() else {
            continue;
        };
        if !clock::within_day(completed_at, date) {
            continue;
        }
        let Some(template) = data.quest_library.get(&assigned.quest_id) else {
            continue;
        };
        total += (template.points as f64 * assigned.multiplier).floor() as i64;
    }

    DaySummary {
        date: date.to_string(),
        total_points: total,
        goal_met: total >= data.settings.daily_goal,
    }
}

/// True when every habit scheduled for the weekday of `date` has a log at
/// or above its completion threshold. Days with nothing scheduled pass.
pub fn all_scheduled_habits_complete(data: &AppData, date: &str) -> bool {
    data.scheduled_habits(date).into_iter().all(|habit| {
        data.habit_logs
            .get(&crate::models::HabitLog::key(&habit.id, date))
            .is_some_and(|log| log.count >= habit_threshold(habit))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssignedQuest, Event, Habit, HabitLog, QuestKind, QuestTemplate, Task};

    const DAY: &str = "2025-06-11"; // a Wednesday
    const NOON: &str = "2025-06-11T12:00:00.000Z";

    fn data() -> AppData {
        AppData::default()
    }

    fn task(id: &str, points: i64, due_at: Option<&str>, completed_at: Option<&str>) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_string(),
            points,
            due_at: due_at.map(String::from),
            completed_at: completed_at.map(String::from),
            created_at: "2025-06-01T08:00:00.000Z".to_string(),
        }
    }

    fn habit(id: &str, kind: HabitKind, target: i64, points: i64) -> Habit {
        Habit {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            target,
            points,
            schedule: vec!["wednesday".to_string()],
            created_at: "2025-06-01T08:00:00.000Z".to_string(),
        }
    }

    fn log(habit_id: &str, count: i64) -> HabitLog {
        HabitLog {
            habit_id: habit_id.to_string(),
            date: DAY.to_string(),
            count,
            completed_at: None,
        }
    }

    fn add_log(data: &mut AppData, log: HabitLog) {
        data.habit_logs
            .insert(HabitLog::key(&log.habit_id, &log.date), log);
    }

    #[test]
    fn task_completed_on_time_scores_full_points() {
        let mut d = data();
        d.tasks.insert(
            "t".into(),
            task("t", 60, Some("2025-06-11T18:00:00.000Z"), Some(NOON)),
        );
        assert_eq!(compute_day_totals(&d, DAY).total_points, 60);
    }

    #[test]
    fn overdue_completion_scores_zero() {
        // Goal 50, one 60-point task completed two hours past due: total 0.
        let mut d = data();
        d.settings.daily_goal = 50;
        d.tasks.insert(
            "t".into(),
            task(
                "t",
                60,
                Some("2025-06-11T18:00:00.000Z"),
                Some("2025-06-11T20:00:00.000Z"),
            ),
        );
        let summary = compute_day_totals(&d, DAY);
        assert_eq!(summary.total_points, 0);
        assert!(!summary.goal_met);
    }

    #[test]
    fn task_completed_on_other_day_not_counted() {
        let mut d = data();
        d.tasks.insert(
            "t".into(),
            task("t", 60, None, Some("2025-06-10T12:00:00.000Z")),
        );
        assert_eq!(compute_day_totals(&d, DAY).total_points, 0);
    }

    #[test]
    fn counter_habit_partial_credit_floors() {
        let mut d = data();
        d.habits
            .insert("h".into(), habit("h", HabitKind::Counter, 3, 10));
        add_log(&mut d, log("h", 1));
        // 1/3 of 10, floored
        assert_eq!(compute_day_totals(&d, DAY).total_points, 3);
    }

    #[test]
    fn counter_habit_monotonic_and_exact_at_target() {
        let mut d = data();
        d.habits
            .insert("h".into(), habit("h", HabitKind::Counter, 4, 10));
        let mut prev = 0;
        for count in 0..=4 {
            add_log(&mut d, log("h", count));
            let total = compute_day_totals(&d, DAY).total_points;
            assert!(total >= prev, "score dropped at count {count}");
            prev = total;
        }
        assert_eq!(prev, 10);
        // Counting past target never over-scores
        add_log(&mut d, log("h", 99));
        assert_eq!(compute_day_totals(&d, DAY).total_points, 10);
    }

    #[test]
    fn counter_habit_bad_target_treated_as_one() {
        let mut d = data();
        d.habits
            .insert("h".into(), habit("h", HabitKind::Counter, 0, 10));
        add_log(&mut d, log("h", 1));
        assert_eq!(compute_day_totals(&d, DAY).total_points, 10);
    }

    #[test]
    fn unscheduled_weekday_scores_nothing() {
        let mut d = data();
        let mut h = habit("h", HabitKind::Binary, 1, 20);
        h.schedule = vec!["friday".to_string()];
        d.habits.insert("h".into(), h);
        add_log(&mut d, log("h", 1));
        assert_eq!(compute_day_totals(&d, DAY).total_points, 0);
    }

    #[test]
    fn orphan_habit_log_is_skipped() {
        let mut d = data();
        add_log(&mut d, log("gone", 5));
        assert_eq!(compute_day_totals(&d, DAY).total_points, 0);
    }

    #[test]
    fn binary_habit_plus_event_meets_goal() {
        let mut d = data();
        d.settings.daily_goal = 50;
        d.habits
            .insert("h".into(), habit("h", HabitKind::Binary, 1, 20));
        add_log(&mut d, log("h", 1));
        d.events.insert(
            "e".into(),
            Event {
                id: "e".into(),
                title: "dentist".into(),
                starts_at: "2025-06-11T09:00:00.000Z".into(),
                ends_at: "2025-06-11T10:00:00.000Z".into(),
                all_day: false,
                color: None,
                points_enabled: true,
                points: 40,
                completed_at: Some(NOON.into()),
                created_at: "2025-06-01T08:00:00.000Z".into(),
            },
        );
        let summary = compute_day_totals(&d, DAY);
        assert_eq!(summary.total_points, 60);
        assert!(summary.goal_met);
    }

    #[test]
    fn event_without_points_enabled_is_ignored() {
        let mut d = data();
        d.events.insert(
            "e".into(),
            Event {
                id: "e".into(),
                title: "lunch".into(),
                starts_at: NOON.into(),
                ends_at: NOON.into(),
                all_day: false,
                color: None,
                points_enabled: false,
                points: 40,
                completed_at: Some(NOON.into()),
                created_at: NOON.into(),
            },
        );
        assert_eq!(compute_day_totals(&d, DAY).total_points, 0);
    }

    #[test]
    fn assigned_quest_applies_multiplier_floored() {
        let mut d = data();
        d.quest_library.insert(
            "q".into(),
            QuestTemplate {
                id: "q".into(),
                title: "q".into(),
                points: 15,
                active: true,
                created_at: NOON.into(),
            },
        );
        d.assigned_quests.insert(
            "a".into(),
            AssignedQuest {
                id: "a".into(),
                quest_id: "q".into(),
                kind: QuestKind::Weekly,
                date: "2025-06-09".into(),
                multiplier: 1.5,
                completed_at: Some(NOON.into()),
            },
        );
        // floor(15 * 1.5) = 22
        assert_eq!(compute_day_totals(&d, DAY).total_points, 22);
    }

    #[test]
    fn assigned_quest_with_deleted_template_is_skipped() {
        let mut d = data();
        d.assigned_quests.insert(
            "a".into(),
            AssignedQuest {
                id: "a".into(),
                quest_id: "gone".into(),
                kind: QuestKind::Daily,
                date: DAY.into(),
                multiplier: 1.0,
                completed_at: Some(NOON.into()),
            },
        );
        assert_eq!(compute_day_totals(&d, DAY).total_points, 0);
    }

    #[test]
    fn recompute_is_side_effect_free() {
        let mut d = data();
        d.habits
            .insert("h".into(), habit("h", HabitKind::Counter, 3, 10));
        add_log(&mut d, log("h", 2));
        let first = compute_day_totals(&d, DAY);
        let second = compute_day_totals(&d, DAY);
        assert_eq!(first, second);
    }

    #[test]
    fn habits_complete_when_none_scheduled() {
        let d = data();
        assert!(all_scheduled_habits_complete(&d, DAY));
    }

    #[test]
    fn habits_complete_requires_every_scheduled_log() {
        let mut d = data();
        d.habits
            .insert("a".into(), habit("a", HabitKind::Binary, 1, 5));
        d.habits
            .insert("b".into(), habit("b", HabitKind::Counter, 3, 5));
        add_log(&mut d, log("a", 1));
        // b has no log at all
        assert!(!all_scheduled_habits_complete(&d, DAY));

        add_log(&mut d, log("b", 2));
        // b is under target
        assert!(!all_scheduled_habits_complete(&d, DAY));

        add_log(&mut d, log("b", 3));
        assert!(all_scheduled_habits_complete(&d, DAY));
    }
}
