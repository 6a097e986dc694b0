//! Callable service surface.
//!
//! Typed request/response functions the daemon exposes to clients. Every
//! entry point validates its arguments before touching the database, and
//! maps failures onto the `AppError` categories the RPC layer reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::ai::TextGenerator;
use crate::aggregation::{aggregate_daily, aggregate_monthly, aggregate_weekly};
use crate::db::{
    stats, users, DailyStats, Insight, InsightKind, MonthlyStats, StatsDb, WeeklyStats,
};
use crate::error::AppError;
use crate::insights;
use crate::notify;
use crate::period::{date_str, parse_date, week_bounds};
use crate::push::{NotificationPayload, PushSender};

const DEFAULT_LIMIT: usize = 7;
const MAX_LIMIT: usize = 100;

/// Which stats window to read, by key or as a recent list.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StatsRequest {
    #[serde(rename_all = "camelCase")]
    Daily {
        date: Option<String>,
        limit: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    Weekly {
        week_start: Option<String>,
        limit: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    Monthly {
        month: Option<String>,
        limit: Option<usize>,
    },
}

/// Stats rows, newest first for list queries. A keyed lookup that finds
/// nothing returns an empty list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatsResponse {
    Daily(Vec<DailyStats>),
    Weekly(Vec<WeeklyStats>),
    Monthly(Vec<MonthlyStats>),
}

fn effective_limit(limit: Option<usize>) -> Result<usize, AppError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(AppError::InvalidArgument(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    Ok(limit)
}

fn require_user(user_id: &str) -> Result<(), AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::InvalidArgument("user_id is required".to_string()));
    }
    Ok(())
}

/// Read pre-aggregated stats.
pub async fn get_aggregated_stats(
    db: &Mutex<StatsDb>,
    user_id: &str,
    request: &StatsRequest,
) -> Result<StatsResponse, AppError> {
    require_user(user_id)?;

    match request {
        StatsRequest::Daily { date, limit } => {
            let limit = effective_limit(*limit)?;
            if let Some(date) = date {
                parse_date(date)?;
                let db = db.lock().await;
                let row = stats::get_daily_stats(&db, user_id, date)?;
                Ok(StatsResponse::Daily(row.into_iter().collect()))
            } else {
                let db = db.lock().await;
                Ok(StatsResponse::Daily(stats::recent_daily_stats(
                    &db, user_id, limit,
                )?))
            }
        }
        StatsRequest::Weekly { week_start, limit } => {
            let limit = effective_limit(*limit)?;
            if let Some(week_start) = week_start {
                parse_date(week_start)?;
                let db = db.lock().await;
                let row = stats::get_weekly_stats(&db, user_id, week_start)?;
                Ok(StatsResponse::Weekly(row.into_iter().collect()))
            } else {
                let db = db.lock().await;
                Ok(StatsResponse::Weekly(stats::recent_weekly_stats(
                    &db, user_id, limit,
                )?))
            }
        }
        StatsRequest::Monthly { month, limit } => {
            let limit = effective_limit(*limit)?;
            if let Some(month) = month {
                crate::period::month_bounds(month)?;
                let db = db.lock().await;
                let row = stats::get_monthly_stats(&db, user_id, month)?;
                Ok(StatsResponse::Monthly(row.into_iter().collect()))
            } else {
                let db = db.lock().await;
                Ok(StatsResponse::Monthly(stats::recent_monthly_stats(
                    &db, user_id, limit,
                )?))
            }
        }
    }
}

/// Real-time view of today: re-runs the daily aggregation against the raw
/// tables so the reply is never stale.
pub async fn get_today_stats(
    db: &Mutex<StatsDb>,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<DailyStats, AppError> {
    require_user(user_id)?;
    let today = date_str(now);
    let db = db.lock().await;
    aggregate_daily(&db, user_id, &today, now)
}

/// Recompute one day from the raw tables.
pub async fn aggregate_daily_on_demand(
    db: &Mutex<StatsDb>,
    user_id: &str,
    date: &str,
    now: DateTime<Utc>,
) -> Result<DailyStats, AppError> {
    require_user(user_id)?;
    parse_date(date)?;
    let db = db.lock().await;
    aggregate_daily(&db, user_id, date, now)
}

/// Recompute the week containing `date` from its daily rows.
pub async fn aggregate_weekly_on_demand(
    db: &Mutex<StatsDb>,
    user_id: &str,
    date: &str,
) -> Result<WeeklyStats, AppError> {
    require_user(user_id)?;
    let date = parse_date(date)?;
    let db = db.lock().await;
    aggregate_weekly(&db, user_id, date)
}

/// Recompute one month (`YYYY-MM`) from its daily rows.
pub async fn aggregate_monthly_on_demand(
    db: &Mutex<StatsDb>,
    user_id: &str,
    month: &str,
) -> Result<MonthlyStats, AppError> {
    require_user(user_id)?;
    let db = db.lock().await;
    aggregate_monthly(&db, user_id, month)
}

/// Which comparison window to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonKind {
    Weekly,
    Monthly,
}

/// Deltas between the two most recent windows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatChanges {
    pub focus_score: i64,
    pub goal_completion_rate: i64,
    pub workouts: i64,
}

/// Current-vs-previous window. `changes` is present only when both exist.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison<T> {
    pub current: Option<T>,
    pub previous: Option<T>,
    pub changes: Option<StatChanges>,
}

/// Compare the two most recent weekly or monthly windows.
pub async fn get_comparative_stats(
    db: &Mutex<StatsDb>,
    user_id: &str,
    kind: ComparisonKind,
) -> Result<serde_json::Value, AppError> {
    require_user(user_id)?;
    let db = db.lock().await;

    match kind {
        ComparisonKind::Weekly => {
            let mut rows = stats::recent_weekly_stats(&db, user_id, 2)?;
            let current = if rows.is_empty() { None } else { Some(rows.remove(0)) };
            let previous = rows.pop();
            let changes = match (&current, &previous) {
                (Some(c), Some(p)) => Some(StatChanges {
                    focus_score: c.avg_focus_score - p.avg_focus_score,
                    goal_completion_rate: c.goal_completion_rate - p.goal_completion_rate,
                    workouts: c.total_workouts - p.total_workouts,
                }),
                _ => None,
            };
            let comparison = Comparison {
                current,
                previous,
                changes,
            };
            serde_json::to_value(&comparison)
                .map_err(|e| AppError::Internal(format!("serialization failed: {}", e)))
        }
        ComparisonKind::Monthly => {
            let mut rows = stats::recent_monthly_stats(&db, user_id, 2)?;
            let current = if rows.is_empty() { None } else { Some(rows.remove(0)) };
            let previous = rows.pop();
            let changes = match (&current, &previous) {
                (Some(c), Some(p)) => Some(StatChanges {
                    focus_score: c.avg_focus_score - p.avg_focus_score,
                    goal_completion_rate: c.goal_completion_rate - p.goal_completion_rate,
                    workouts: c.total_workouts - p.total_workouts,
                }),
                _ => None,
            };
            let comparison = Comparison {
                current,
                previous,
                changes,
            };
            serde_json::to_value(&comparison)
                .map_err(|e| AppError::Internal(format!("serialization failed: {}", e)))
        }
    }
}

/// A request for one insight kind, with optional period overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRequest {
    pub kind: InsightKind,
    pub date: Option<String>,
    pub week_start: Option<String>,
    pub week_end: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

/// The served insight plus whether it came from cache.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightResponse {
    pub insight: Insight,
    pub cached: bool,
}

/// Fetch (generating on a cache miss) one insight.
pub async fn get_insight(
    db: &Mutex<StatsDb>,
    generator: &dyn TextGenerator,
    user_id: &str,
    request: &InsightRequest,
    now: DateTime<Utc>,
) -> Result<InsightResponse, AppError> {
    require_user(user_id)?;

    // Validate period arguments before any generation work
    if let Some(date) = &request.date {
        parse_date(date)?;
    }
    if let Some(week_start) = &request.week_start {
        parse_date(week_start)?;
    }

    let result = match request.kind {
        InsightKind::DailySummary => {
            let date = request.date.clone().unwrap_or_else(|| date_str(now));
            insights::generate_daily_summary(
                db,
                generator,
                user_id,
                &date,
                request.force_refresh,
                now,
            )
            .await?
        }
        InsightKind::WeeklyReview => {
            let (default_start, default_end) = week_bounds(now.date_naive());
            let week_start = request.week_start.clone().unwrap_or(default_start);
            let week_end = request.week_end.clone().unwrap_or(default_end);
            insights::generate_weekly_review(
                db,
                generator,
                user_id,
                &week_start,
                &week_end,
                request.force_refresh,
                now,
            )
            .await?
        }
        InsightKind::GoalSuggestion => {
            insights::generate_goal_suggestions(db, generator, user_id, request.force_refresh, now)
                .await?
        }
    };

    Ok(InsightResponse {
        insight: result.insight,
        cached: result.cached,
    })
}

/// Newest unexpired insight of each kind.
pub async fn get_latest_insights(
    db: &Mutex<StatsDb>,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Insight>, AppError> {
    require_user(user_id)?;
    let db = db.lock().await;
    insights::latest_insights(&db, user_id, now)
}

/// Expire an insight so it never serves again.
pub async fn dismiss_insight(
    db: &Mutex<StatsDb>,
    user_id: &str,
    insight_id: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    require_user(user_id)?;
    if insight_id.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "insight_id is required".to_string(),
        ));
    }
    let db = db.lock().await;
    insights::dismiss_insight(&db, user_id, insight_id, now)
}

/// Register a device token for push delivery.
pub async fn register_device_token(
    db: &Mutex<StatsDb>,
    user_id: &str,
    token: &str,
) -> Result<(), AppError> {
    require_user(user_id)?;
    if token.trim().is_empty() {
        return Err(AppError::InvalidArgument("token is required".to_string()));
    }
    let db = db.lock().await;
    users::add_device_token(&db, user_id, token)?;
    Ok(())
}

/// Deliver a test push to all of the user's devices.
pub async fn send_test_push(
    db: &Mutex<StatsDb>,
    push: &dyn PushSender,
    user_id: &str,
) -> Result<(), AppError> {
    require_user(user_id)?;
    let has_tokens = {
        let db = db.lock().await;
        !users::device_tokens(&db, user_id)?.is_empty()
    };
    if !has_tokens {
        return Err(AppError::FailedPrecondition(
            "no device tokens registered".to_string(),
        ));
    }

    let payload = NotificationPayload::new(
        "Test Notification",
        "Push delivery is working!",
        "test",
        "/",
    );
    notify::send_user_push(db, push, user_id, &payload).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::test_utils::CannedGenerator;
    use crate::db::test_utils::test_db;
    use crate::events;
    use crate::push::test_utils::RecordingSender;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().expect("timestamp")
    }

    #[tokio::test]
    async fn test_rejects_blank_user() {
        let db = Mutex::new(test_db());
        let result = get_today_stats(&db, "  ", at("2025-06-02T12:00:00Z")).await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_rejects_bad_date_before_io() {
        let db = Mutex::new(test_db());
        let request = StatsRequest::Daily {
            date: Some("junk".to_string()),
            limit: None,
        };
        let result = get_aggregated_stats(&db, "u1", &request).await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_rejects_zero_limit() {
        let db = Mutex::new(test_db());
        let request = StatsRequest::Weekly {
            week_start: None,
            limit: Some(0),
        };
        let result = get_aggregated_stats(&db, "u1", &request).await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_today_stats_reflect_live_activity() {
        let db = Mutex::new(test_db());
        let push = RecordingSender::new();
        let now = at("2025-06-02T12:00:00Z");

        events::record_meditation(&db, &push, "u1", 20, now).await.unwrap();
        let today = get_today_stats(&db, "u1", now).await.unwrap();
        assert_eq!(today.meditation_minutes, 20);

        events::record_meditation(&db, &push, "u1", 10, now).await.unwrap();
        let today = get_today_stats(&db, "u1", now).await.unwrap();
        assert_eq!(today.meditation_minutes, 30);
    }

    #[tokio::test]
    async fn test_keyed_daily_lookup() {
        let db = Mutex::new(test_db());
        let push = RecordingSender::new();
        let now = at("2025-06-02T12:00:00Z");
        events::record_workout(&db, &push, "u1", now).await.unwrap();

        let request = StatsRequest::Daily {
            date: Some("2025-06-02".to_string()),
            limit: None,
        };
        match get_aggregated_stats(&db, "u1", &request).await.unwrap() {
            StatsResponse::Daily(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].workouts_completed, 1);
            }
            other => panic!("expected daily rows, got {:?}", other),
        }

        // Missing key: empty, not an error
        let request = StatsRequest::Daily {
            date: Some("2025-06-03".to_string()),
            limit: None,
        };
        match get_aggregated_stats(&db, "u1", &request).await.unwrap() {
            StatsResponse::Daily(rows) => assert!(rows.is_empty()),
            other => panic!("expected daily rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_on_demand_weekly_writes_sentinel() {
        let db = Mutex::new(test_db());
        let week = aggregate_weekly_on_demand(&db, "u1", "2025-06-04").await.unwrap();
        assert_eq!(week.week_start, "2025-06-02");
        assert_eq!(week.avg_focus_score, 0);
        assert_eq!(week.best_day, "");

        let result = aggregate_weekly_on_demand(&db, "u1", "nope").await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_comparative_stats_changes() {
        let db = Mutex::new(test_db());
        {
            let guard = db.lock().await;
            for (start, end, score, rate, workouts) in [
                ("2025-05-26", "2025-06-01", 60, 50, 2),
                ("2025-06-02", "2025-06-08", 75, 80, 4),
            ] {
                stats::upsert_weekly_stats(
                    &guard,
                    &WeeklyStats {
                        user_id: "u1".to_string(),
                        week_start: start.to_string(),
                        week_end: end.to_string(),
                        avg_focus_score: score,
                        total_sleep_hours: 49.0,
                        total_steps: 50000,
                        total_workouts: workouts,
                        total_pages_read: 100,
                        total_meditation_minutes: 140,
                        goal_completion_rate: rate,
                        best_day: start.to_string(),
                        worst_day: end.to_string(),
                        longest_streak: 3,
                    },
                )
                .unwrap();
            }
        }

        let value = get_comparative_stats(&db, "u1", ComparisonKind::Weekly)
            .await
            .unwrap();
        let changes = &value["changes"];
        assert_eq!(changes["focusScore"], 15);
        assert_eq!(changes["goalCompletionRate"], 30);
        assert_eq!(changes["workouts"], 2);
    }

    #[tokio::test]
    async fn test_insight_request_defaults_to_today() {
        let db = Mutex::new(test_db());
        let push = RecordingSender::new();
        let generator = CannedGenerator::new("Nice work today.");
        let now = at("2025-06-02T21:00:00Z");
        events::record_meditation(&db, &push, "u1", 15, now).await.unwrap();

        let request = InsightRequest {
            kind: InsightKind::DailySummary,
            date: None,
            week_start: None,
            week_end: None,
            force_refresh: false,
        };
        let response = get_insight(&db, &generator, "u1", &request, now).await.unwrap();
        assert!(!response.cached);
        assert_eq!(
            response.insight.period_start.as_deref(),
            Some("2025-06-02")
        );
    }

    #[tokio::test]
    async fn test_send_test_push_requires_tokens() {
        let db = Mutex::new(test_db());
        let push = RecordingSender::new();

        let result = send_test_push(&db, &push, "u1").await;
        assert!(matches!(result, Err(AppError::FailedPrecondition(_))));

        register_device_token(&db, "u1", "tok").await.unwrap();
        send_test_push(&db, &push, "u1").await.unwrap();
        assert_eq!(push.sent_payloads().len(), 1);
    }
}
