//! Materialized stats tables: daily, weekly, monthly.
//!
//! Aggregators write here with full-row upserts; the callable surface reads
//! back by key or as recent windows.

use rusqlite::{params, OptionalExtension};

use super::types::{DailyStats, DbError, MonthlyStats, WeeklyStats};
use super::StatsDb;

pub fn upsert_daily_stats(db: &StatsDb, stats: &DailyStats) -> Result<(), DbError> {
    db.conn().execute(
        "INSERT INTO daily_stats (user_id, date, focus_score, sleep_hours, steps,
           workouts_completed, pages_read, meditation_minutes, goals_completed,
           goals_total, streak_days, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(user_id, date) DO UPDATE SET
           focus_score = excluded.focus_score,
           sleep_hours = excluded.sleep_hours,
           steps = excluded.steps,
           workouts_completed = excluded.workouts_completed,
           pages_read = excluded.pages_read,
           meditation_minutes = excluded.meditation_minutes,
           goals_completed = excluded.goals_completed,
           goals_total = excluded.goals_total,
           streak_days = excluded.streak_days,
           updated_at = excluded.updated_at",
        params![
            stats.user_id,
            stats.date,
            stats.focus_score,
            stats.sleep_hours,
            stats.steps,
            stats.workouts_completed,
            stats.pages_read,
            stats.meditation_minutes,
            stats.goals_completed,
            stats.goals_total,
            stats.streak_days,
            stats.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_daily_stats(
    db: &StatsDb,
    user_id: &str,
    date: &str,
) -> Result<Option<DailyStats>, DbError> {
    let row = db
        .conn()
        .query_row(
            &format!("{} WHERE user_id = ?1 AND date = ?2", DAILY_SELECT),
            params![user_id, date],
            row_to_daily,
        )
        .optional()?;
    Ok(row)
}

/// Daily rows in [start, end] inclusive, ordered by date ascending.
pub fn daily_stats_in_range(
    db: &StatsDb,
    user_id: &str,
    start: &str,
    end: &str,
) -> Result<Vec<DailyStats>, DbError> {
    let mut stmt = db.conn().prepare(&format!(
        "{} WHERE user_id = ?1 AND date >= ?2 AND date <= ?3 ORDER BY date",
        DAILY_SELECT
    ))?;
    let rows = stmt.query_map(params![user_id, start, end], row_to_daily)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

/// Most recent `limit` daily rows, newest first.
pub fn recent_daily_stats(
    db: &StatsDb,
    user_id: &str,
    limit: usize,
) -> Result<Vec<DailyStats>, DbError> {
    let mut stmt = db.conn().prepare(&format!(
        "{} WHERE user_id = ?1 ORDER BY date DESC LIMIT ?2",
        DAILY_SELECT
    ))?;
    let rows = stmt.query_map(params![user_id, limit as i64], row_to_daily)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

pub fn upsert_weekly_stats(db: &StatsDb, stats: &WeeklyStats) -> Result<(), DbError> {
    db.conn().execute(
        "INSERT INTO weekly_stats (user_id, week_start, week_end, avg_focus_score,
           total_sleep_hours, total_steps, total_workouts, total_pages_read,
           total_meditation_minutes, goal_completion_rate, best_day, worst_day,
           longest_streak)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(user_id, week_start) DO UPDATE SET
           week_end = excluded.week_end,
           avg_focus_score = excluded.avg_focus_score,
           total_sleep_hours = excluded.total_sleep_hours,
           total_steps = excluded.total_steps,
           total_workouts = excluded.total_workouts,
           total_pages_read = excluded.total_pages_read,
           total_meditation_minutes = excluded.total_meditation_minutes,
           goal_completion_rate = excluded.goal_completion_rate,
           best_day = excluded.best_day,
           worst_day = excluded.worst_day,
           longest_streak = excluded.longest_streak",
        params![
            stats.user_id,
            stats.week_start,
            stats.week_end,
            stats.avg_focus_score,
            stats.total_sleep_hours,
            stats.total_steps,
            stats.total_workouts,
            stats.total_pages_read,
            stats.total_meditation_minutes,
            stats.goal_completion_rate,
            stats.best_day,
            stats.worst_day,
            stats.longest_streak,
        ],
    )?;
    Ok(())
}

pub fn get_weekly_stats(
    db: &StatsDb,
    user_id: &str,
    week_start: &str,
) -> Result<Option<WeeklyStats>, DbError> {
    let row = db
        .conn()
        .query_row(
            &format!("{} WHERE user_id = ?1 AND week_start = ?2", WEEKLY_SELECT),
            params![user_id, week_start],
            row_to_weekly,
        )
        .optional()?;
    Ok(row)
}

pub fn recent_weekly_stats(
    db: &StatsDb,
    user_id: &str,
    limit: usize,
) -> Result<Vec<WeeklyStats>, DbError> {
    let mut stmt = db.conn().prepare(&format!(
        "{} WHERE user_id = ?1 ORDER BY week_start DESC LIMIT ?2",
        WEEKLY_SELECT
    ))?;
    let rows = stmt.query_map(params![user_id, limit as i64], row_to_weekly)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

pub fn upsert_monthly_stats(db: &StatsDb, stats: &MonthlyStats) -> Result<(), DbError> {
    db.conn().execute(
        "INSERT INTO monthly_stats (user_id, month, avg_focus_score, total_workouts,
           total_pages_read, total_meditation_minutes, goal_completion_rate,
           longest_streak)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(user_id, month) DO UPDATE SET
           avg_focus_score = excluded.avg_focus_score,
           total_workouts = excluded.total_workouts,
           total_pages_read = excluded.total_pages_read,
           total_meditation_minutes = excluded.total_meditation_minutes,
           goal_completion_rate = excluded.goal_completion_rate,
           longest_streak = excluded.longest_streak",
        params![
            stats.user_id,
            stats.month,
            stats.avg_focus_score,
            stats.total_workouts,
            stats.total_pages_read,
            stats.total_meditation_minutes,
            stats.goal_completion_rate,
            stats.longest_streak,
        ],
    )?;
    Ok(())
}

pub fn get_monthly_stats(
    db: &StatsDb,
    user_id: &str,
    month: &str,
) -> Result<Option<MonthlyStats>, DbError> {
    let row = db
        .conn()
        .query_row(
            &format!("{} WHERE user_id = ?1 AND month = ?2", MONTHLY_SELECT),
            params![user_id, month],
            row_to_monthly,
        )
        .optional()?;
    Ok(row)
}

pub fn recent_monthly_stats(
    db: &StatsDb,
    user_id: &str,
    limit: usize,
) -> Result<Vec<MonthlyStats>, DbError> {
    let mut stmt = db.conn().prepare(&format!(
        "{} WHERE user_id = ?1 ORDER BY month DESC LIMIT ?2",
        MONTHLY_SELECT
    ))?;
    let rows = stmt.query_map(params![user_id, limit as i64], row_to_monthly)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

/// Distinct users with a daily_stats row in [start, end]. Feeds the weekly
/// and monthly rollup jobs.
pub fn users_with_daily_stats_between(
    db: &StatsDb,
    start: &str,
    end: &str,
) -> Result<Vec<String>, DbError> {
    let mut stmt = db.conn().prepare(
        "SELECT DISTINCT user_id FROM daily_stats
         WHERE date >= ?1 AND date <= ?2 ORDER BY user_id",
    )?;
    let rows = stmt.query_map(params![start, end], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

const DAILY_SELECT: &str = "SELECT user_id, date, focus_score, sleep_hours, steps,
    workouts_completed, pages_read, meditation_minutes, goals_completed,
    goals_total, streak_days, updated_at FROM daily_stats";

const WEEKLY_SELECT: &str = "SELECT user_id, week_start, week_end, avg_focus_score,
    total_sleep_hours, total_steps, total_workouts, total_pages_read,
    total_meditation_minutes, goal_completion_rate, best_day, worst_day,
    longest_streak FROM weekly_stats";

const MONTHLY_SELECT: &str = "SELECT user_id, month, avg_focus_score, total_workouts,
    total_pages_read, total_meditation_minutes, goal_completion_rate,
    longest_streak FROM monthly_stats";

fn row_to_daily(row: &rusqlite::Row) -> rusqlite::Result<DailyStats> {
    Ok(DailyStats {
        user_id: row.get(0)?,
        date: row.get(1)?,
        focus_score: row.get(2)?,
        sleep_hours: row.get(3)?,
        steps: row.get(4)?,
        workouts_completed: row.get(5)?,
        pages_read: row.get(6)?,
        meditation_minutes: row.get(7)?,
        goals_completed: row.get(8)?,
        goals_total: row.get(9)?,
        streak_days: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn row_to_weekly(row: &rusqlite::Row) -> rusqlite::Result<WeeklyStats> {
    Ok(WeeklyStats {
        user_id: row.get(0)?,
        week_start: row.get(1)?,
        week_end: row.get(2)?,
        avg_focus_score: row.get(3)?,
        total_sleep_hours: row.get(4)?,
        total_steps: row.get(5)?,
        total_workouts: row.get(6)?,
        total_pages_read: row.get(7)?,
        total_meditation_minutes: row.get(8)?,
        goal_completion_rate: row.get(9)?,
        best_day: row.get(10)?,
        worst_day: row.get(11)?,
        longest_streak: row.get(12)?,
    })
}

fn row_to_monthly(row: &rusqlite::Row) -> rusqlite::Result<MonthlyStats> {
    Ok(MonthlyStats {
        user_id: row.get(0)?,
        month: row.get(1)?,
        avg_focus_score: row.get(2)?,
        total_workouts: row.get(3)?,
        total_pages_read: row.get(4)?,
        total_meditation_minutes: row.get(5)?,
        goal_completion_rate: row.get(6)?,
        longest_streak: row.get(7)?,
    })
}
