//! Quest assignment: uniform sampling of active library templates into
//! daily/weekly assignment instances.
//!
//! The random source is passed in so callers (and tests) control seeding.
//! Assignment is additive; prior days' and weeks' assignments are history
//! and never touched.

use rand::Rng;
use uuid::Uuid;

use crate::models::{AssignedQuest, QuestKind, Settings, WeeklyMode};
use crate::state::AppData;

/// Multiplier carried by every daily assignment.
pub const DAILY_MULTIPLIER: f64 = 1.0;

/// Uniform sample without replacement: Fisher–Yates shuffle of a copied id
/// vec, then take the first `n`. Requesting more than the pool holds just
/// returns the whole pool in shuffled order.
pub fn sample_ids(pool: &[String], n: usize, rng: &mut impl Rng) -> Vec<String> {
    let mut ids = pool.to_vec();
    for i in (1..ids.len()).rev() {
        let j = rng.random_range(0..=i);
        ids.swap(i, j);
    }
    ids.truncate(n.min(ids.len()));
    ids
}

/// How many weekly quests to assign this week. Range mode draws a uniform
/// integer from `[weekly_min, weekly_max]` inclusive; a reversed range is
/// normalized rather than rejected.
pub fn weekly_target_count(settings: &Settings, rng: &mut impl Rng) -> usize {
    match settings.weekly_mode {
        WeeklyMode::Fixed => settings.weekly_count,
        WeeklyMode::Range => {
            let (lo, hi) = if settings.weekly_min <= settings.weekly_max {
                (settings.weekly_min, settings.weekly_max)
            } else {
                (settings.weekly_max, settings.weekly_min)
            };
            rng.random_range(lo..=hi)
        }
    }
}

/// Build the daily assignments for `date`. May be empty (empty pool or a
/// configured count of zero).
pub fn build_daily(data: &AppData, date: &str, rng: &mut impl Rng) -> Vec<AssignedQuest> {
    let pool = data.active_quest_ids();
    sample_ids(&pool, data.settings.daily_quest_count, rng)
        .into_iter()
        .map(|quest_id| AssignedQuest {
            id: Uuid::new_v4().to_string(),
            quest_id,
            kind: QuestKind::Daily,
            date: date.to_string(),
            multiplier: DAILY_MULTIPLIER,
            completed_at: None,
        })
        .collect()
}

/// Build the weekly assignments for the week starting at `week_start`,
/// carrying the configured reward multiplier.
pub fn build_weekly(data: &AppData, week_start: &str, rng: &mut impl Rng) -> Vec<AssignedQuest> {
    let pool = data.active_quest_ids();
    let count = weekly_target_count(&data.settings, rng);
    sample_ids(&pool, count, rng)
        .into_iter()
        .map(|quest_id| AssignedQuest {
            id: Uuid::new_v4().to_string(),
            quest_id,
            kind: QuestKind::Weekly,
            date: week_start.to_string(),
            multiplier: data.settings.weekly_multiplier,
            completed_at: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestTemplate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn pool(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("q{i}")).collect()
    }

    fn data_with_templates(n: usize, active: usize) -> AppData {
        let mut data = AppData::default();
        for i in 0..n {
            let id = format!("q{i}");
            data.quest_library.insert(
                id.clone(),
                QuestTemplate {
                    id,
                    title: format!("quest {i}"),
                    points: 10,
                    active: i < active,
                    created_at: "2025-06-01T08:00:00.000Z".to_string(),
                },
            );
        }
        data
    }

    #[test]
    fn sample_never_repeats_and_never_exceeds_pool() {
        let pool = pool(5);
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = sample_ids(&pool, 8, &mut rng);
            assert_eq!(picked.len(), 5);
            let unique: HashSet<_> = picked.iter().collect();
            assert_eq!(unique.len(), picked.len());
        }
    }

    #[test]
    fn sample_is_deterministic_for_a_seed() {
        let pool = pool(10);
        let a = sample_ids(&pool, 4, &mut StdRng::seed_from_u64(42));
        let b = sample_ids(&pool, 4, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn sample_from_empty_pool_is_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample_ids(&[], 3, &mut rng).is_empty());
    }

    #[test]
    fn sample_zero_is_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample_ids(&pool(5), 0, &mut rng).is_empty());
    }

    #[test]
    fn daily_assignments_use_unit_multiplier_and_active_pool_only() {
        let mut data = data_with_templates(6, 4);
        data.settings.daily_quest_count = 10;
        let mut rng = StdRng::seed_from_u64(7);
        let assigned = build_daily(&data, "2025-06-11", &mut rng);
        // only 4 active templates exist
        assert_eq!(assigned.len(), 4);
        for a in &assigned {
            assert_eq!(a.kind, QuestKind::Daily);
            assert_eq!(a.date, "2025-06-11");
            assert!((a.multiplier - 1.0).abs() < f64::EPSILON);
            assert!(a.completed_at.is_none());
            assert!(data.quest_library[&a.quest_id].active);
        }
    }

    #[test]
    fn weekly_range_mode_stays_in_bounds() {
        let mut data = data_with_templates(10, 10);
        data.settings.weekly_mode = WeeklyMode::Range;
        data.settings.weekly_min = 2;
        data.settings.weekly_max = 4;
        data.settings.weekly_multiplier = 2.5;
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let assigned = build_weekly(&data, "2025-06-09", &mut rng);
            assert!((2..=4).contains(&assigned.len()), "got {}", assigned.len());
            for a in &assigned {
                assert_eq!(a.kind, QuestKind::Weekly);
                assert_eq!(a.date, "2025-06-09");
                assert!((a.multiplier - 2.5).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn weekly_range_reversed_bounds_are_normalized() {
        let mut settings = Settings::default();
        settings.weekly_mode = WeeklyMode::Range;
        settings.weekly_min = 5;
        settings.weekly_max = 2;
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let n = weekly_target_count(&settings, &mut rng);
            assert!((2..=5).contains(&n));
        }
    }

    #[test]
    fn weekly_fixed_mode_clamps_to_pool() {
        let mut data = data_with_templates(2, 2);
        data.settings.weekly_mode = WeeklyMode::Fixed;
        data.settings.weekly_count = 6;
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(build_weekly(&data, "2025-06-09", &mut rng).len(), 2);
    }
}
