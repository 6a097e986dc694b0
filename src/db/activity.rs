//! Raw activity tables: meditation, reading, tasks, workouts, health samples.
//!
//! These are the source of truth the aggregators read from. Writers insert
//! rows here and bump the per-user counters in `user_state` separately.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::types::{DailyTask, DbError};
use super::StatsDb;

/// Record a completed meditation session. Returns the new row id.
pub fn insert_meditation_session(
    db: &StatsDb,
    user_id: &str,
    date: &str,
    duration_minutes: i64,
) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();
    db.conn().execute(
        "INSERT INTO meditation_sessions (id, user_id, date, duration_minutes)
         VALUES (?1, ?2, ?3, ?4)",
        params![id, user_id, date, duration_minutes],
    )?;
    Ok(id)
}

/// Record a reading session. Returns the new row id.
pub fn insert_reading_session(
    db: &StatsDb,
    user_id: &str,
    date: &str,
    pages_read: i64,
) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();
    db.conn().execute(
        "INSERT INTO reading_sessions (id, user_id, date, pages_read)
         VALUES (?1, ?2, ?3, ?4)",
        params![id, user_id, date, pages_read],
    )?;
    Ok(id)
}

/// Record a completed workout. Returns the new row id.
pub fn insert_workout_session(db: &StatsDb, user_id: &str, date: &str) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();
    db.conn().execute(
        "INSERT INTO workout_sessions (id, user_id, date) VALUES (?1, ?2, ?3)",
        params![id, user_id, date],
    )?;
    Ok(id)
}

/// Create a daily task (a "goal" for the given day). Returns the new row id.
pub fn insert_daily_task(
    db: &StatsDb,
    user_id: &str,
    date: &str,
    title: &str,
    now: &str,
) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();
    db.conn().execute(
        "INSERT INTO daily_tasks (id, user_id, date, title, completed, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![id, user_id, date, title, now],
    )?;
    Ok(id)
}

/// Flip a task's completed flag. Returns the task row if it exists.
pub fn set_task_completed(
    db: &StatsDb,
    user_id: &str,
    task_id: &str,
    completed: bool,
    now: &str,
) -> Result<Option<DailyTask>, DbError> {
    let changed = db.conn().execute(
        "UPDATE daily_tasks SET completed = ?1, updated_at = ?2
         WHERE id = ?3 AND user_id = ?4",
        params![completed as i64, now, task_id, user_id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_task(db, user_id, task_id)
}

pub fn get_task(db: &StatsDb, user_id: &str, task_id: &str) -> Result<Option<DailyTask>, DbError> {
    let task = db
        .conn()
        .query_row(
            "SELECT id, user_id, date, title, completed, updated_at
             FROM daily_tasks WHERE id = ?1 AND user_id = ?2",
            params![task_id, user_id],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

/// Upsert the day's health sample (sleep and steps arrive together).
pub fn upsert_health_sample(
    db: &StatsDb,
    user_id: &str,
    date: &str,
    sleep_hours: f64,
    steps: i64,
) -> Result<(), DbError> {
    db.conn().execute(
        "INSERT INTO health_samples (user_id, date, sleep_hours, steps)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, date) DO UPDATE SET
           sleep_hours = excluded.sleep_hours,
           steps = excluded.steps",
        params![user_id, date, sleep_hours, steps],
    )?;
    Ok(())
}

/// Total meditation minutes logged on `date`.
pub fn meditation_minutes_for(db: &StatsDb, user_id: &str, date: &str) -> Result<i64, DbError> {
    let total = db.conn().query_row(
        "SELECT COALESCE(SUM(duration_minutes), 0) FROM meditation_sessions
         WHERE user_id = ?1 AND date = ?2",
        params![user_id, date],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Total pages read on `date`.
pub fn pages_read_for(db: &StatsDb, user_id: &str, date: &str) -> Result<i64, DbError> {
    let total = db.conn().query_row(
        "SELECT COALESCE(SUM(pages_read), 0) FROM reading_sessions
         WHERE user_id = ?1 AND date = ?2",
        params![user_id, date],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// (completed, total) task counts for `date`.
pub fn task_counts_for(db: &StatsDb, user_id: &str, date: &str) -> Result<(i64, i64), DbError> {
    let counts = db.conn().query_row(
        "SELECT COALESCE(SUM(completed), 0), COUNT(*) FROM daily_tasks
         WHERE user_id = ?1 AND date = ?2",
        params![user_id, date],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(counts)
}

/// Number of workouts completed on `date`.
pub fn workouts_for(db: &StatsDb, user_id: &str, date: &str) -> Result<i64, DbError> {
    let total = db.conn().query_row(
        "SELECT COUNT(*) FROM workout_sessions WHERE user_id = ?1 AND date = ?2",
        params![user_id, date],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Health sample for `date`: (sleep_hours, steps), or None if nothing synced.
pub fn health_for(db: &StatsDb, user_id: &str, date: &str) -> Result<Option<(f64, i64)>, DbError> {
    let sample = db
        .conn()
        .query_row(
            "SELECT sleep_hours, steps FROM health_samples
             WHERE user_id = ?1 AND date = ?2",
            params![user_id, date],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(sample)
}

/// Tasks created on or after `since_date`, newest first. Feeds the
/// goal-suggestion prompt.
pub fn tasks_since(
    db: &StatsDb,
    user_id: &str,
    since_date: &str,
) -> Result<Vec<DailyTask>, DbError> {
    let mut stmt = db.conn().prepare(
        "SELECT id, user_id, date, title, completed, updated_at
         FROM daily_tasks WHERE user_id = ?1 AND date >= ?2
         ORDER BY date DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![user_id, since_date], row_to_task)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

/// Open tasks older than `cutoff_date` and untouched since then.
/// Used to detect stalled goals.
pub fn stalled_tasks(
    db: &StatsDb,
    user_id: &str,
    cutoff_date: &str,
) -> Result<Vec<DailyTask>, DbError> {
    let mut stmt = db.conn().prepare(
        "SELECT id, user_id, date, title, completed, updated_at
         FROM daily_tasks
         WHERE user_id = ?1 AND completed = 0
           AND date <= ?2 AND date(updated_at) <= ?2
         ORDER BY date",
    )?;
    let rows = stmt.query_map(params![user_id, cutoff_date], row_to_task)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

/// Oldest open task, used as "top priority" in nudges.
pub fn first_incomplete_task(db: &StatsDb, user_id: &str) -> Result<Option<DailyTask>, DbError> {
    let task = db
        .conn()
        .query_row(
            "SELECT id, user_id, date, title, completed, updated_at
             FROM daily_tasks WHERE user_id = ?1 AND completed = 0
             ORDER BY date, rowid LIMIT 1",
            params![user_id],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<DailyTask> {
    Ok(DailyTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: row.get(2)?,
        title: row.get(3)?,
        completed: row.get::<_, i64>(4)? != 0,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;

    #[test]
    fn test_meditation_sum() {
        let db = test_db();
        insert_meditation_session(&db, "u1", "2025-06-02", 10).unwrap();
        insert_meditation_session(&db, "u1", "2025-06-02", 15).unwrap();
        insert_meditation_session(&db, "u1", "2025-06-03", 5).unwrap();

        assert_eq!(meditation_minutes_for(&db, "u1", "2025-06-02").unwrap(), 25);
        assert_eq!(meditation_minutes_for(&db, "u1", "2025-06-03").unwrap(), 5);
        assert_eq!(meditation_minutes_for(&db, "u2", "2025-06-02").unwrap(), 0);
    }

    #[test]
    fn test_task_counts_and_completion() {
        let db = test_db();
        let a = insert_daily_task(&db, "u1", "2025-06-02", "Write report", "2025-06-02T08:00:00Z")
            .unwrap();
        insert_daily_task(&db, "u1", "2025-06-02", "Review PRs", "2025-06-02T08:00:00Z").unwrap();

        assert_eq!(task_counts_for(&db, "u1", "2025-06-02").unwrap(), (0, 2));

        let task = set_task_completed(&db, "u1", &a, true, "2025-06-02T12:00:00Z")
            .unwrap()
            .expect("task exists");
        assert!(task.completed);
        assert_eq!(task_counts_for(&db, "u1", "2025-06-02").unwrap(), (1, 2));

        // Unknown task id
        let missing = set_task_completed(&db, "u1", "nope", true, "2025-06-02T12:00:00Z").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_health_sample_upsert() {
        let db = test_db();
        assert!(health_for(&db, "u1", "2025-06-02").unwrap().is_none());

        upsert_health_sample(&db, "u1", "2025-06-02", 7.5, 8000).unwrap();
        upsert_health_sample(&db, "u1", "2025-06-02", 8.0, 9500).unwrap();

        let (sleep, steps) = health_for(&db, "u1", "2025-06-02").unwrap().unwrap();
        assert_eq!(sleep, 8.0);
        assert_eq!(steps, 9500);
    }

    #[test]
    fn test_stalled_tasks() {
        let db = test_db();
        // Old and untouched
        insert_daily_task(&db, "u1", "2025-06-01", "Old goal", "2025-06-01T08:00:00Z").unwrap();
        // Old but recently touched
        let touched =
            insert_daily_task(&db, "u1", "2025-06-01", "Active goal", "2025-06-01T08:00:00Z")
                .unwrap();
        db.conn()
            .execute(
                "UPDATE daily_tasks SET updated_at = '2025-06-05T10:00:00Z' WHERE id = ?1",
                [&touched],
            )
            .unwrap();
        // Recent
        insert_daily_task(&db, "u1", "2025-06-05", "New goal", "2025-06-05T08:00:00Z").unwrap();

        let stalled = stalled_tasks(&db, "u1", "2025-06-02").unwrap();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].title, "Old goal");
    }
}
