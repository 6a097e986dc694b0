//! Monthly aggregation: daily_stats rows -> one `monthly_stats` row.

use super::{completion_rate, longest_streak};
use crate::db::{stats, MonthlyStats, StatsDb};
use crate::error::AppError;
use crate::period::month_bounds;

/// Recompute and upsert the monthly stats row for a YYYY-MM key.
///
/// As with weeks, an empty month writes an all-zero row.
pub fn aggregate_monthly(
    db: &StatsDb,
    user_id: &str,
    month: &str,
) -> Result<MonthlyStats, AppError> {
    let (first_day, last_day) = month_bounds(month)?;
    let days = stats::daily_stats_in_range(db, user_id, &first_day, &last_day)?;

    let row = if days.is_empty() {
        MonthlyStats {
            user_id: user_id.to_string(),
            month: month.to_string(),
            avg_focus_score: 0,
            total_workouts: 0,
            total_pages_read: 0,
            total_meditation_minutes: 0,
            goal_completion_rate: 0,
            longest_streak: 0,
        }
    } else {
        let avg_focus = (days.iter().map(|d| d.focus_score).sum::<i64>() as f64
            / days.len() as f64)
            .round() as i64;

        let goals_completed: i64 = days.iter().map(|d| d.goals_completed).sum();
        let goals_total: i64 = days.iter().map(|d| d.goals_total).sum();

        MonthlyStats {
            user_id: user_id.to_string(),
            month: month.to_string(),
            avg_focus_score: avg_focus,
            total_workouts: days.iter().map(|d| d.workouts_completed).sum(),
            total_pages_read: days.iter().map(|d| d.pages_read).sum(),
            total_meditation_minutes: days.iter().map(|d| d.meditation_minutes).sum(),
            goal_completion_rate: completion_rate(goals_completed, goals_total),
            longest_streak: longest_streak(&days),
        }
    };

    stats::upsert_monthly_stats(db, &row)?;
    log::debug!("Aggregated monthly stats for {} ({})", user_id, month);
    Ok(row)
}
