//! Per-user state: streak counters, today's running tallies, device tokens,
//! and the internal notification inbox.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::types::{DbError, NotificationRecord, UserState};
use super::StatsDb;

/// Fetch the user's counter row, creating a zeroed one if absent.
pub fn ensure_user_state(db: &StatsDb, user_id: &str, now: &str) -> Result<UserState, DbError> {
    db.conn().execute(
        "INSERT INTO user_state (user_id, updated_at) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO NOTHING",
        params![user_id, now],
    )?;
    get_user_state(db, user_id)?.ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
}

pub fn get_user_state(db: &StatsDb, user_id: &str) -> Result<Option<UserState>, DbError> {
    let row = db
        .conn()
        .query_row(
            "SELECT user_id, current_streak, last_active_date, today_session_count,
               today_meditation_minutes, today_workout_count, today_goals_total,
               today_goals_completed, morning_notification, updated_at
             FROM user_state WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserState {
                    user_id: row.get(0)?,
                    current_streak: row.get(1)?,
                    last_active_date: row.get(2)?,
                    today_session_count: row.get(3)?,
                    today_meditation_minutes: row.get(4)?,
                    today_workout_count: row.get(5)?,
                    today_goals_total: row.get(6)?,
                    today_goals_completed: row.get(7)?,
                    morning_notification: row.get::<_, i64>(8)? != 0,
                    updated_at: row.get(9)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Apply the streak transition for a qualifying activity on `today`.
///
/// First touch of the day: streak continues (+1) if the last active date was
/// yesterday, otherwise resets to 1. Repeat touches on the same day leave the
/// streak untouched. Returns the streak value after the transition.
pub fn record_activity_touch(
    db: &StatsDb,
    user_id: &str,
    today: &str,
    yesterday: &str,
    now: &str,
) -> Result<i64, DbError> {
    let state = ensure_user_state(db, user_id, now)?;

    if state.last_active_date.as_deref() == Some(today) {
        return Ok(state.current_streak);
    }

    let new_streak = if state.last_active_date.as_deref() == Some(yesterday) {
        state.current_streak + 1
    } else {
        1
    };

    db.conn().execute(
        "UPDATE user_state SET current_streak = ?1, last_active_date = ?2, updated_at = ?3
         WHERE user_id = ?4",
        params![new_streak, today, now, user_id],
    )?;
    Ok(new_streak)
}

/// Single-statement counter bump on `user_state`. `column` must be one of the
/// today_* counter names.
fn bump_counter(
    db: &StatsDb,
    user_id: &str,
    column: &str,
    delta: i64,
    now: &str,
) -> Result<(), DbError> {
    ensure_user_state(db, user_id, now)?;
    let sql = format!(
        "UPDATE user_state SET {col} = MAX(0, {col} + ?1), updated_at = ?2 WHERE user_id = ?3",
        col = column
    );
    db.conn().execute(&sql, params![delta, now, user_id])?;
    Ok(())
}

pub fn bump_session_count(db: &StatsDb, user_id: &str, now: &str) -> Result<(), DbError> {
    bump_counter(db, user_id, "today_session_count", 1, now)
}

pub fn bump_meditation_minutes(
    db: &StatsDb,
    user_id: &str,
    minutes: i64,
    now: &str,
) -> Result<(), DbError> {
    bump_counter(db, user_id, "today_meditation_minutes", minutes, now)
}

pub fn bump_workout_count(db: &StatsDb, user_id: &str, now: &str) -> Result<(), DbError> {
    bump_counter(db, user_id, "today_workout_count", 1, now)
}

pub fn bump_goals_total(db: &StatsDb, user_id: &str, delta: i64, now: &str) -> Result<(), DbError> {
    bump_counter(db, user_id, "today_goals_total", delta, now)
}

pub fn bump_goals_completed(
    db: &StatsDb,
    user_id: &str,
    delta: i64,
    now: &str,
) -> Result<(), DbError> {
    bump_counter(db, user_id, "today_goals_completed", delta, now)
}

/// Zero the today_* counters for one user. Streak fields are untouched.
pub fn reset_today_counters(db: &StatsDb, user_id: &str, now: &str) -> Result<(), DbError> {
    db.conn().execute(
        "UPDATE user_state SET today_session_count = 0, today_meditation_minutes = 0,
           today_workout_count = 0, today_goals_total = 0, today_goals_completed = 0,
           updated_at = ?1
         WHERE user_id = ?2",
        params![now, user_id],
    )?;
    Ok(())
}

/// Users whose last qualifying activity was on `date`. Feeds the end-of-day job.
pub fn users_active_on(db: &StatsDb, date: &str) -> Result<Vec<String>, DbError> {
    let mut stmt = db
        .conn()
        .prepare("SELECT user_id FROM user_state WHERE last_active_date = ?1 ORDER BY user_id")?;
    let rows = stmt.query_map(params![date], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

/// All known users (anyone with a state row).
pub fn all_users(db: &StatsDb) -> Result<Vec<String>, DbError> {
    let mut stmt = db
        .conn()
        .prepare("SELECT user_id FROM user_state ORDER BY user_id")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

/// Users who opted in to the morning boost.
pub fn users_with_morning_notification(db: &StatsDb) -> Result<Vec<String>, DbError> {
    let mut stmt = db.conn().prepare(
        "SELECT user_id FROM user_state WHERE morning_notification = 1 ORDER BY user_id",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

/// Nightly write-back of the streak counter to the relational table.
pub fn upsert_user_streak(
    db: &StatsDb,
    user_id: &str,
    current_streak: i64,
    last_active_date: Option<&str>,
    now: &str,
) -> Result<(), DbError> {
    db.conn().execute(
        "INSERT INTO user_streaks (user_id, current_streak, last_active_date, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
           current_streak = excluded.current_streak,
           last_active_date = excluded.last_active_date,
           updated_at = excluded.updated_at",
        params![user_id, current_streak, last_active_date, now],
    )?;
    Ok(())
}

/// Read the written-back streak. Aggregators read this, not the live counter.
pub fn get_streak(db: &StatsDb, user_id: &str) -> Result<i64, DbError> {
    let streak = db
        .conn()
        .query_row(
            "SELECT current_streak FROM user_streaks WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(streak.unwrap_or(0))
}

pub fn add_device_token(db: &StatsDb, user_id: &str, token: &str) -> Result<(), DbError> {
    db.conn().execute(
        "INSERT INTO device_tokens (user_id, token) VALUES (?1, ?2)
         ON CONFLICT(user_id, token) DO NOTHING",
        params![user_id, token],
    )?;
    Ok(())
}

pub fn device_tokens(db: &StatsDb, user_id: &str) -> Result<Vec<String>, DbError> {
    let mut stmt = db
        .conn()
        .prepare("SELECT token FROM device_tokens WHERE user_id = ?1 ORDER BY created_at")?;
    let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

/// Drop tokens FCM reported as invalid or unregistered.
pub fn remove_device_tokens(db: &StatsDb, user_id: &str, tokens: &[String]) -> Result<(), DbError> {
    for token in tokens {
        db.conn().execute(
            "DELETE FROM device_tokens WHERE user_id = ?1 AND token = ?2",
            params![user_id, token],
        )?;
    }
    Ok(())
}

/// Append to the internal notification inbox. Returns the new row id.
pub fn insert_notification(
    db: &StatsDb,
    user_id: &str,
    kind: &str,
    message: &str,
    metadata_json: Option<&str>,
    now: &str,
) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();
    db.conn().execute(
        "INSERT INTO notifications (id, user_id, kind, message, metadata_json, read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![id, user_id, kind, message, metadata_json, now],
    )?;
    Ok(id)
}

pub fn recent_notifications(
    db: &StatsDb,
    user_id: &str,
    limit: usize,
) -> Result<Vec<NotificationRecord>, DbError> {
    let mut stmt = db.conn().prepare(
        "SELECT id, user_id, kind, message, metadata_json, read, created_at
         FROM notifications WHERE user_id = ?1
         ORDER BY created_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit as i64], |row| {
        Ok(NotificationRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            message: row.get(3)?,
            metadata_json: row.get(4)?,
            read: row.get::<_, i64>(5)? != 0,
            created_at: row.get(6)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;

    const NOW: &str = "2025-06-02T12:00:00Z";

    #[test]
    fn test_streak_continues_from_yesterday() {
        let db = test_db();
        let s = record_activity_touch(&db, "u1", "2025-06-01", "2025-05-31", NOW).unwrap();
        assert_eq!(s, 1);

        let s = record_activity_touch(&db, "u1", "2025-06-02", "2025-06-01", NOW).unwrap();
        assert_eq!(s, 2);

        // Same-day repeat: untouched
        let s = record_activity_touch(&db, "u1", "2025-06-02", "2025-06-01", NOW).unwrap();
        assert_eq!(s, 2);
    }

    #[test]
    fn test_streak_resets_after_gap() {
        let db = test_db();
        record_activity_touch(&db, "u1", "2025-06-01", "2025-05-31", NOW).unwrap();
        record_activity_touch(&db, "u1", "2025-06-02", "2025-06-01", NOW).unwrap();

        // Gap: next touch is June 5th, yesterday was the 4th
        let s = record_activity_touch(&db, "u1", "2025-06-05", "2025-06-04", NOW).unwrap();
        assert_eq!(s, 1);
    }

    #[test]
    fn test_counters_bump_and_reset() {
        let db = test_db();
        bump_meditation_minutes(&db, "u1", 15, NOW).unwrap();
        bump_meditation_minutes(&db, "u1", 10, NOW).unwrap();
        bump_goals_total(&db, "u1", 1, NOW).unwrap();
        bump_goals_completed(&db, "u1", 1, NOW).unwrap();

        let state = get_user_state(&db, "u1").unwrap().unwrap();
        assert_eq!(state.today_meditation_minutes, 25);
        assert_eq!(state.today_goals_total, 1);
        assert_eq!(state.today_goals_completed, 1);

        // Decrement clamps at zero
        bump_goals_completed(&db, "u1", -5, NOW).unwrap();
        let state = get_user_state(&db, "u1").unwrap().unwrap();
        assert_eq!(state.today_goals_completed, 0);

        reset_today_counters(&db, "u1", NOW).unwrap();
        let state = get_user_state(&db, "u1").unwrap().unwrap();
        assert_eq!(state.today_meditation_minutes, 0);
        assert_eq!(state.today_goals_total, 0);
    }

    #[test]
    fn test_reset_preserves_streak() {
        let db = test_db();
        record_activity_touch(&db, "u1", "2025-06-02", "2025-06-01", NOW).unwrap();
        reset_today_counters(&db, "u1", NOW).unwrap();

        let state = get_user_state(&db, "u1").unwrap().unwrap();
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.last_active_date.as_deref(), Some("2025-06-02"));
    }

    #[test]
    fn test_device_token_lifecycle() {
        let db = test_db();
        add_device_token(&db, "u1", "tok-a").unwrap();
        add_device_token(&db, "u1", "tok-b").unwrap();
        add_device_token(&db, "u1", "tok-a").unwrap(); // duplicate ignored

        assert_eq!(device_tokens(&db, "u1").unwrap().len(), 2);

        remove_device_tokens(&db, "u1", &["tok-a".to_string()]).unwrap();
        assert_eq!(device_tokens(&db, "u1").unwrap(), vec!["tok-b".to_string()]);
    }

    #[test]
    fn test_streak_write_back() {
        let db = test_db();
        assert_eq!(get_streak(&db, "u1").unwrap(), 0);

        upsert_user_streak(&db, "u1", 7, Some("2025-06-02"), NOW).unwrap();
        assert_eq!(get_streak(&db, "u1").unwrap(), 7);

        upsert_user_streak(&db, "u1", 8, Some("2025-06-03"), NOW).unwrap();
        assert_eq!(get_streak(&db, "u1").unwrap(), 8);
    }
}
