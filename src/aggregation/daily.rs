//! Daily aggregation: raw activity tables -> one `daily_stats` row.

use chrono::{DateTime, Utc};

use crate::db::{activity, stats, users, DailyStats, StatsDb};
use crate::error::AppError;
use crate::score::focus_score;

/// Recompute and upsert the daily stats row for (user, date).
///
/// Missing health data defaults to zero sleep and zero steps; the streak
/// column mirrors the written-back `user_streaks` value at computation time.
pub fn aggregate_daily(
    db: &StatsDb,
    user_id: &str,
    date: &str,
    now: DateTime<Utc>,
) -> Result<DailyStats, AppError> {
    let meditation_minutes = activity::meditation_minutes_for(db, user_id, date)?;
    let pages_read = activity::pages_read_for(db, user_id, date)?;
    let (goals_completed, goals_total) = activity::task_counts_for(db, user_id, date)?;
    let workouts_completed = activity::workouts_for(db, user_id, date)?;
    let (sleep_hours, steps) = activity::health_for(db, user_id, date)?.unwrap_or((0.0, 0));
    let streak_days = users::get_streak(db, user_id)?;

    let score = focus_score(goals_completed, goals_total, meditation_minutes, sleep_hours);

    let row = DailyStats {
        user_id: user_id.to_string(),
        date: date.to_string(),
        focus_score: score as i64,
        sleep_hours,
        steps,
        workouts_completed,
        pages_read,
        meditation_minutes,
        goals_completed,
        goals_total,
        streak_days,
        updated_at: now.to_rfc3339(),
    };

    stats::upsert_daily_stats(db, &row)?;
    log::debug!(
        "Aggregated daily stats for {} on {}: focus {}",
        user_id,
        date,
        score
    );
    Ok(row)
}
