//! Insight cache queries.
//!
//! Cache matching is structural: (user_id, kind, period_start) plus a
//! not-expired check against the caller-supplied `now`. Dismissal is a soft
//! delete that sets `expires_at` to now.

use rusqlite::{params, OptionalExtension};

use super::types::{DbError, Insight, InsightKind};
use super::StatsDb;

pub fn insert_insight(db: &StatsDb, insight: &Insight) -> Result<(), DbError> {
    db.conn().execute(
        "INSERT INTO insights (id, user_id, kind, content, period_start, period_end,
           metadata_json, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            insight.id,
            insight.user_id,
            insight.kind.as_str(),
            insight.content,
            insight.period_start,
            insight.period_end,
            insight.metadata_json,
            insight.created_at,
            insight.expires_at,
        ],
    )?;
    Ok(())
}

/// Find an unexpired insight for an exact period. Newest wins when the
/// check-then-insert race has left duplicates behind.
pub fn find_cached_for_period(
    db: &StatsDb,
    user_id: &str,
    kind: InsightKind,
    period_start: &str,
    now: &str,
) -> Result<Option<Insight>, DbError> {
    let row = db
        .conn()
        .query_row(
            &format!(
                "{} WHERE user_id = ?1 AND kind = ?2 AND period_start = ?3
                   AND (expires_at IS NULL OR expires_at > ?4)
                 ORDER BY created_at DESC LIMIT 1",
                INSIGHT_SELECT
            ),
            params![user_id, kind.as_str(), period_start, now],
            row_to_insight,
        )
        .optional()?;
    Ok(row)
}

/// Find the newest unexpired insight of `kind` created at or after `since`.
/// Used for the goal-suggestion freshness window, which is keyed on
/// creation time rather than a calendar period.
pub fn find_recent(
    db: &StatsDb,
    user_id: &str,
    kind: InsightKind,
    since: &str,
    now: &str,
) -> Result<Option<Insight>, DbError> {
    let row = db
        .conn()
        .query_row(
            &format!(
                "{} WHERE user_id = ?1 AND kind = ?2 AND created_at >= ?3
                   AND (expires_at IS NULL OR expires_at > ?4)
                 ORDER BY created_at DESC LIMIT 1",
                INSIGHT_SELECT
            ),
            params![user_id, kind.as_str(), since, now],
            row_to_insight,
        )
        .optional()?;
    Ok(row)
}

/// The newest unexpired insight of each requested kind.
pub fn latest_of_kind(
    db: &StatsDb,
    user_id: &str,
    kind: InsightKind,
    now: &str,
) -> Result<Option<Insight>, DbError> {
    let row = db
        .conn()
        .query_row(
            &format!(
                "{} WHERE user_id = ?1 AND kind = ?2
                   AND (expires_at IS NULL OR expires_at > ?3)
                 ORDER BY created_at DESC LIMIT 1",
                INSIGHT_SELECT
            ),
            params![user_id, kind.as_str(), now],
            row_to_insight,
        )
        .optional()?;
    Ok(row)
}

/// Soft-delete: expire the insight immediately. Returns false if the id
/// doesn't exist or belongs to another user.
pub fn dismiss(db: &StatsDb, user_id: &str, insight_id: &str, now: &str) -> Result<bool, DbError> {
    let changed = db.conn().execute(
        "UPDATE insights SET expires_at = ?1 WHERE id = ?2 AND user_id = ?3",
        params![now, insight_id, user_id],
    )?;
    Ok(changed > 0)
}

const INSIGHT_SELECT: &str = "SELECT id, user_id, kind, content, period_start, period_end,
    metadata_json, created_at, expires_at FROM insights";

fn row_to_insight(row: &rusqlite::Row) -> rusqlite::Result<Insight> {
    let kind_str: String = row.get(2)?;
    let kind = InsightKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown insight kind: {}", kind_str).into(),
        )
    })?;
    Ok(Insight {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind,
        content: row.get(3)?,
        period_start: row.get(4)?,
        period_end: row.get(5)?,
        metadata_json: row.get(6)?,
        created_at: row.get(7)?,
        expires_at: row.get(8)?,
    })
}
