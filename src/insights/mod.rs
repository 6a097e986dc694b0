//! AI insight generation and caching.
//!
//! Every generated artifact lands in the `insights` table with an expiry.
//! Reads check the cache first (keyed on kind plus period); generation only
//! runs on a miss or an explicit force-refresh. The database lock is released
//! while the model call is in flight, so a slow generation never blocks other
//! writers. Dismissal soft-deletes by expiring the row immediately.

pub mod prompts;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ai::{GenerationRequest, ModelTier, TextGenerator};
use crate::db::{activity, insights as insight_db, stats, Insight, InsightKind, StatsDb};
use crate::error::AppError;
use crate::period::{date_str, DATE_FMT};

/// Generation temperature shared by all insight kinds.
const TEMPERATURE: f64 = 0.7;

impl InsightKind {
    /// How long a generated artifact stays servable from cache.
    pub fn ttl(&self) -> Duration {
        match self {
            InsightKind::DailySummary => Duration::days(7),
            InsightKind::WeeklyReview => Duration::days(30),
            InsightKind::GoalSuggestion => Duration::hours(12),
        }
    }

    /// Output token cap, for cost control.
    pub fn token_budget(&self) -> u32 {
        match self {
            InsightKind::DailySummary => 500,
            InsightKind::WeeklyReview => 1000,
            InsightKind::GoalSuggestion => 300,
        }
    }

    pub fn tier(&self) -> ModelTier {
        match self {
            InsightKind::WeeklyReview => ModelTier::Deep,
            _ => ModelTier::Flash,
        }
    }
}

/// An insight plus whether it was served from cache.
#[derive(Debug, Clone)]
pub struct InsightResult {
    pub insight: Insight,
    pub cached: bool,
}

/// Generate (or serve from cache) the daily summary for one date.
///
/// Errors with NotFound if no daily stats row exists for the date.
pub async fn generate_daily_summary(
    db: &Mutex<StatsDb>,
    generator: &dyn TextGenerator,
    user_id: &str,
    date: &str,
    force_refresh: bool,
    now: DateTime<Utc>,
) -> Result<InsightResult, AppError> {
    let kind = InsightKind::DailySummary;
    let now_str = now.to_rfc3339();

    let day_stats = {
        let db = db.lock().await;
        if !force_refresh {
            if let Some(existing) =
                insight_db::find_cached_for_period(&db, user_id, kind, date, &now_str)?
            {
                return Ok(InsightResult {
                    insight: existing,
                    cached: true,
                });
            }
        }
        stats::get_daily_stats(&db, user_id, date)?
            .ok_or_else(|| AppError::NotFound("No stats available for this date".to_string()))?
    };

    let content = generator
        .generate(&GenerationRequest {
            tier: kind.tier(),
            prompt: prompts::daily_summary_prompt(&day_stats),
            max_output_tokens: kind.token_budget(),
            temperature: TEMPERATURE,
        })
        .await?;

    let metadata = json!({
        "date": date,
        "focusScore": day_stats.focus_score,
        "goalsCompleted": day_stats.goals_completed,
        "goalsTotal": day_stats.goals_total,
    });

    let db = db.lock().await;
    let insight = store_insight(&db, user_id, kind, content, Some(date), None, metadata, now)?;
    Ok(InsightResult {
        insight,
        cached: false,
    })
}

/// Generate (or serve from cache) the weekly review for a week window.
///
/// Errors with NotFound if the week has no daily stats at all.
pub async fn generate_weekly_review(
    db: &Mutex<StatsDb>,
    generator: &dyn TextGenerator,
    user_id: &str,
    week_start: &str,
    week_end: &str,
    force_refresh: bool,
    now: DateTime<Utc>,
) -> Result<InsightResult, AppError> {
    let kind = InsightKind::WeeklyReview;
    let now_str = now.to_rfc3339();

    let days = {
        let db = db.lock().await;
        if !force_refresh {
            if let Some(existing) =
                insight_db::find_cached_for_period(&db, user_id, kind, week_start, &now_str)?
            {
                return Ok(InsightResult {
                    insight: existing,
                    cached: true,
                });
            }
        }
        let days = stats::daily_stats_in_range(&db, user_id, week_start, week_end)?;
        if days.is_empty() {
            return Err(AppError::NotFound(
                "No data available for this week".to_string(),
            ));
        }
        days
    };

    let content = generator
        .generate(&GenerationRequest {
            tier: kind.tier(),
            prompt: prompts::weekly_review_prompt(week_start, week_end, &days),
            max_output_tokens: kind.token_budget(),
            temperature: TEMPERATURE,
        })
        .await?;

    let metadata = json!({
        "weekStart": week_start,
        "weekEnd": week_end,
        "daysAnalyzed": days.len(),
    });

    let db = db.lock().await;
    let insight = store_insight(
        &db,
        user_id,
        kind,
        content,
        Some(week_start),
        Some(week_end),
        metadata,
        now,
    )?;
    Ok(InsightResult {
        insight,
        cached: false,
    })
}

/// Generate (or serve from cache) goal suggestions.
///
/// The cache window is creation-time based: any unexpired suggestion from the
/// last 12 hours is a hit. A user with no recent goals gets a canned starter
/// message (1-day expiry, no model call).
pub async fn generate_goal_suggestions(
    db: &Mutex<StatsDb>,
    generator: &dyn TextGenerator,
    user_id: &str,
    force_refresh: bool,
    now: DateTime<Utc>,
) -> Result<InsightResult, AppError> {
    let kind = InsightKind::GoalSuggestion;
    let now_str = now.to_rfc3339();
    let two_weeks_ago = (now - Duration::days(14))
        .date_naive()
        .format(DATE_FMT)
        .to_string();

    let (goals, progress) = {
        let db = db.lock().await;
        if !force_refresh {
            let since = (now - Duration::hours(12)).to_rfc3339();
            if let Some(existing) = insight_db::find_recent(&db, user_id, kind, &since, &now_str)? {
                return Ok(InsightResult {
                    insight: existing,
                    cached: true,
                });
            }
        }

        let goals = activity::tasks_since(&db, user_id, &two_weeks_ago)?;

        if goals.is_empty() {
            let content = "You haven't set any goals recently. Start with one small, specific goal \
                           today - something you can complete in the next few hours. Small wins \
                           build momentum!";
            let insight = Insight {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                kind,
                content: content.to_string(),
                period_start: Some(date_str(now)),
                period_end: None,
                metadata_json: Some(json!({ "goalCount": 0 }).to_string()),
                created_at: now.to_rfc3339(),
                expires_at: Some((now + Duration::days(1)).to_rfc3339()),
            };
            insight_db::insert_insight(&db, &insight)?;
            return Ok(InsightResult {
                insight,
                cached: false,
            });
        }

        let progress: Vec<_> = stats::recent_daily_stats(&db, user_id, 7)?
            .into_iter()
            .filter(|d| d.date >= two_weeks_ago)
            .collect();
        (goals, progress)
    };

    let three_days_ago = (now - Duration::days(3))
        .date_naive()
        .format(DATE_FMT)
        .to_string();
    let stalled = goals
        .iter()
        .filter(|g| !g.completed && g.date < three_days_ago)
        .count();
    let completed = goals.iter().filter(|g| g.completed).count();
    let completion_rate = ((completed as f64 / goals.len() as f64) * 100.0).round() as i64;

    // Cap the prompt at the 10 most recent goals
    let prompt_goals = &goals[..goals.len().min(10)];

    let content = generator
        .generate(&GenerationRequest {
            tier: kind.tier(),
            prompt: prompts::goal_suggestion_prompt(prompt_goals, &progress),
            max_output_tokens: kind.token_budget(),
            temperature: TEMPERATURE,
        })
        .await?;

    let metadata = json!({
        "totalGoals": goals.len(),
        "stalledGoals": stalled,
        "completionRate": completion_rate,
    });

    let db = db.lock().await;
    let insight = store_insight(
        &db,
        user_id,
        kind,
        content,
        Some(date_str(now).as_str()),
        None,
        metadata,
        now,
    )?;
    Ok(InsightResult {
        insight,
        cached: false,
    })
}

/// Expire an insight immediately so it never serves again.
pub fn dismiss_insight(
    db: &StatsDb,
    user_id: &str,
    insight_id: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let dismissed = insight_db::dismiss(db, user_id, insight_id, &now.to_rfc3339())?;
    if !dismissed {
        return Err(AppError::NotFound(format!(
            "insight {} not found",
            insight_id
        )));
    }
    Ok(())
}

/// The newest unexpired insight of each kind, for the home feed.
pub fn latest_insights(
    db: &StatsDb,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Insight>, AppError> {
    let now_str = now.to_rfc3339();
    let mut out = Vec::new();
    for kind in InsightKind::ALL {
        if let Some(insight) = insight_db::latest_of_kind(db, user_id, kind, &now_str)? {
            out.push(insight);
        }
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn store_insight(
    db: &StatsDb,
    user_id: &str,
    kind: InsightKind,
    content: String,
    period_start: Option<&str>,
    period_end: Option<&str>,
    metadata: serde_json::Value,
    now: DateTime<Utc>,
) -> Result<Insight, AppError> {
    let insight = Insight {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind,
        content,
        period_start: period_start.map(|s| s.to_string()),
        period_end: period_end.map(|s| s.to_string()),
        metadata_json: Some(metadata.to_string()),
        created_at: now.to_rfc3339(),
        expires_at: Some((now + kind.ttl()).to_rfc3339()),
    };
    insight_db::insert_insight(db, &insight)?;
    Ok(insight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::test_utils::{CannedGenerator, FailingGenerator};
    use crate::db::test_utils::test_db;
    use crate::db::DailyStats;

    fn now() -> DateTime<Utc> {
        "2025-06-02T23:30:00Z".parse().expect("timestamp")
    }

    fn seed_daily(db: &StatsDb, date: &str) {
        stats::upsert_daily_stats(
            db,
            &DailyStats {
                user_id: "u1".to_string(),
                date: date.to_string(),
                focus_score: 70,
                sleep_hours: 7.5,
                steps: 8000,
                workouts_completed: 1,
                pages_read: 10,
                meditation_minutes: 15,
                goals_completed: 2,
                goals_total: 3,
                streak_days: 4,
                updated_at: "2025-06-02T23:00:00Z".to_string(),
            },
        )
        .expect("seed daily stats");
    }

    #[tokio::test]
    async fn test_daily_summary_generates_then_caches() {
        let db = test_db();
        seed_daily(&db, "2025-06-02");
        let db = Mutex::new(db);
        let generator = CannedGenerator::new("Great day!");

        let first = generate_daily_summary(&db, &generator, "u1", "2025-06-02", false, now())
            .await
            .unwrap();
        assert!(!first.cached);
        assert_eq!(first.insight.content, "Great day!");
        assert_eq!(generator.call_count(), 1);

        let second = generate_daily_summary(&db, &generator, "u1", "2025-06-02", false, now())
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.insight.id, first.insight.id);
        assert_eq!(generator.call_count(), 1, "cache hit must not call the model");
    }

    #[tokio::test]
    async fn test_daily_summary_regenerates_after_expiry() {
        let db = test_db();
        seed_daily(&db, "2025-06-02");
        let db = Mutex::new(db);
        let generator = CannedGenerator::new("Great day!");

        generate_daily_summary(&db, &generator, "u1", "2025-06-02", false, now())
            .await
            .unwrap();

        // Eight days on, past the 7-day expiry: the cache must not serve
        let later = now() + Duration::days(8);
        let second = generate_daily_summary(&db, &generator, "u1", "2025-06-02", false, later)
            .await
            .unwrap();
        assert!(!second.cached);
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_daily_summary_force_refresh_bypasses_cache() {
        let db = test_db();
        seed_daily(&db, "2025-06-02");
        let db = Mutex::new(db);
        let generator = CannedGenerator::new("Fresh take");

        generate_daily_summary(&db, &generator, "u1", "2025-06-02", false, now())
            .await
            .unwrap();
        let refreshed = generate_daily_summary(&db, &generator, "u1", "2025-06-02", true, now())
            .await
            .unwrap();
        assert!(!refreshed.cached);
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_daily_summary_requires_stats() {
        let db = Mutex::new(test_db());
        let generator = CannedGenerator::new("unused");

        let result = generate_daily_summary(&db, &generator, "u1", "2025-06-02", false, now()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_stores_nothing() {
        let db = test_db();
        seed_daily(&db, "2025-06-02");
        let db = Mutex::new(db);
        let generator = FailingGenerator;

        let result = generate_daily_summary(&db, &generator, "u1", "2025-06-02", false, now()).await;
        assert!(matches!(result, Err(AppError::Ai(_))));

        let guard = db.lock().await;
        assert!(latest_insights(&guard, "u1", now()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_db_lock_is_free_during_generation() {
        use std::sync::Arc;

        use async_trait::async_trait;
        use crate::ai::AiError;

        // Takes the shared db lock inside the model call; this only returns
        // if the caller released its guard first
        struct StatsPeekingGenerator {
            db: Arc<Mutex<StatsDb>>,
        }

        #[async_trait]
        impl TextGenerator for StatsPeekingGenerator {
            async fn generate(&self, _request: &GenerationRequest) -> Result<String, AiError> {
                let guard = self.db.lock().await;
                let _ = guard.conn();
                Ok("Lock was free.".to_string())
            }
        }

        let db = test_db();
        seed_daily(&db, "2025-06-02");
        let db = Arc::new(Mutex::new(db));
        let generator = StatsPeekingGenerator { db: db.clone() };

        let result = generate_daily_summary(&db, &generator, "u1", "2025-06-02", false, now())
            .await
            .unwrap();
        assert!(!result.cached);
        assert_eq!(result.insight.content, "Lock was free.");
    }

    #[tokio::test]
    async fn test_weekly_review_uses_period_key() {
        let db = test_db();
        seed_daily(&db, "2025-06-02");
        seed_daily(&db, "2025-06-03");
        let generator = CannedGenerator::new("Solid week.");

        let db = Mutex::new(db);
        let first = generate_weekly_review(
            &db,
            &generator,
            "u1",
            "2025-06-02",
            "2025-06-08",
            false,
            now(),
        )
        .await
        .unwrap();
        assert!(!first.cached);

        // Same week: cache hit
        let again = generate_weekly_review(
            &db,
            &generator,
            "u1",
            "2025-06-02",
            "2025-06-08",
            false,
            now(),
        )
        .await
        .unwrap();
        assert!(again.cached);

        // Different week with data: regenerates
        {
            let guard = db.lock().await;
            seed_daily(&guard, "2025-06-09");
        }
        let other = generate_weekly_review(
            &db,
            &generator,
            "u1",
            "2025-06-09",
            "2025-06-15",
            false,
            now(),
        )
        .await
        .unwrap();
        assert!(!other.cached);
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_goal_suggestions_canned_for_new_users() {
        let db = Mutex::new(test_db());
        let generator = CannedGenerator::new("unused");

        let result = generate_goal_suggestions(&db, &generator, "u1", false, now())
            .await
            .unwrap();
        assert!(!result.cached);
        assert!(result.insight.content.contains("Small wins"));
        assert_eq!(generator.call_count(), 0, "no goals means no model call");

        // 1-day expiry, not the usual 12 hours
        let expires = result.insight.expires_at.expect("expiry set");
        assert!(expires.starts_with("2025-06-03T23:30"));
    }

    #[tokio::test]
    async fn test_goal_suggestions_twelve_hour_window() {
        let db = test_db();
        activity::insert_daily_task(&db, "u1", "2025-06-01", "Read more", "2025-06-01T08:00:00Z")
            .unwrap();
        let db = Mutex::new(db);
        let generator = CannedGenerator::new("Break it down.");

        let first = generate_goal_suggestions(&db, &generator, "u1", false, now())
            .await
            .unwrap();
        assert!(!first.cached);

        // Six hours later: still within the window
        let later = now() + Duration::hours(6);
        let second = generate_goal_suggestions(&db, &generator, "u1", false, later)
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_dismiss_hides_insight() {
        let db = test_db();
        seed_daily(&db, "2025-06-02");
        let db = Mutex::new(db);
        let generator = CannedGenerator::new("Nice.");

        let result = generate_daily_summary(&db, &generator, "u1", "2025-06-02", false, now())
            .await
            .unwrap();

        let guard = db.lock().await;
        dismiss_insight(&guard, "u1", &result.insight.id, now()).unwrap();

        let latest = latest_insights(&guard, "u1", now() + Duration::seconds(1)).unwrap();
        assert!(latest.is_empty());

        // Dismissing twice is fine; dismissing a stranger's id is NotFound
        let err = dismiss_insight(&guard, "u1", "missing-id", now());
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }
}
