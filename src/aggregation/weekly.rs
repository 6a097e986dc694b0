//! Weekly aggregation: daily_stats rows -> one `weekly_stats` row.

use chrono::NaiveDate;

use super::{completion_rate, longest_streak};
use crate::db::{stats, StatsDb, WeeklyStats};
use crate::error::AppError;
use crate::period::week_bounds;

/// Recompute and upsert the weekly stats row for the Monday-start week
/// containing `date`.
///
/// An empty week still writes a row: all-zero totals with empty best/worst
/// days, so readers can distinguish "computed, nothing happened" from
/// "never computed".
pub fn aggregate_weekly(
    db: &StatsDb,
    user_id: &str,
    date: NaiveDate,
) -> Result<WeeklyStats, AppError> {
    let (week_start, week_end) = week_bounds(date);
    let days = stats::daily_stats_in_range(db, user_id, &week_start, &week_end)?;

    let row = if days.is_empty() {
        WeeklyStats {
            user_id: user_id.to_string(),
            week_start,
            week_end,
            avg_focus_score: 0,
            total_sleep_hours: 0.0,
            total_steps: 0,
            total_workouts: 0,
            total_pages_read: 0,
            total_meditation_minutes: 0,
            goal_completion_rate: 0,
            best_day: String::new(),
            worst_day: String::new(),
            longest_streak: 0,
        }
    } else {
        let avg_focus = (days.iter().map(|d| d.focus_score).sum::<i64>() as f64
            / days.len() as f64)
            .round() as i64;

        let goals_completed: i64 = days.iter().map(|d| d.goals_completed).sum();
        let goals_total: i64 = days.iter().map(|d| d.goals_total).sum();

        // One decimal place, so float drift never shows up in the UI
        let sleep_total: f64 = days.iter().map(|d| d.sleep_hours).sum();
        let sleep_total = (sleep_total * 10.0).round() / 10.0;

        // Stable sort: ties keep chronological order, so the earlier day wins
        let mut by_focus: Vec<&crate::db::DailyStats> = days.iter().collect();
        by_focus.sort_by(|a, b| b.focus_score.cmp(&a.focus_score));
        let best_day = by_focus.first().map(|d| d.date.clone()).unwrap_or_default();
        let worst_day = by_focus.last().map(|d| d.date.clone()).unwrap_or_default();

        WeeklyStats {
            user_id: user_id.to_string(),
            week_start,
            week_end,
            avg_focus_score: avg_focus,
            total_sleep_hours: sleep_total,
            total_steps: days.iter().map(|d| d.steps).sum(),
            total_workouts: days.iter().map(|d| d.workouts_completed).sum(),
            total_pages_read: days.iter().map(|d| d.pages_read).sum(),
            total_meditation_minutes: days.iter().map(|d| d.meditation_minutes).sum(),
            goal_completion_rate: completion_rate(goals_completed, goals_total),
            best_day,
            worst_day,
            longest_streak: longest_streak(&days),
        }
    };

    stats::upsert_weekly_stats(db, &row)?;
    log::debug!(
        "Aggregated weekly stats for {} ({} to {})",
        user_id,
        row.week_start,
        row.week_end
    );
    Ok(row)
}
