//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// One row per (user, date) in `daily_stats`. A pure materialized view:
/// recomputed wholesale on every aggregation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub user_id: String,
    pub date: String,
    pub focus_score: i64,
    pub sleep_hours: f64,
    pub steps: i64,
    pub workouts_completed: i64,
    pub pages_read: i64,
    pub meditation_minutes: i64,
    pub goals_completed: i64,
    pub goals_total: i64,
    pub streak_days: i64,
    pub updated_at: String,
}

/// One row per (user, week_start) in `weekly_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub user_id: String,
    pub week_start: String,
    pub week_end: String,
    pub avg_focus_score: i64,
    pub total_sleep_hours: f64,
    pub total_steps: i64,
    pub total_workouts: i64,
    pub total_pages_read: i64,
    pub total_meditation_minutes: i64,
    pub goal_completion_rate: i64,
    pub best_day: String,
    pub worst_day: String,
    pub longest_streak: i64,
}

/// One row per (user, month) in `monthly_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStats {
    pub user_id: String,
    pub month: String,
    pub avg_focus_score: i64,
    pub total_workouts: i64,
    pub total_pages_read: i64,
    pub total_meditation_minutes: i64,
    pub goal_completion_rate: i64,
    pub longest_streak: i64,
}

/// Kind of AI-generated insight. Stored as a snake_case string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    DailySummary,
    WeeklyReview,
    GoalSuggestion,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::DailySummary => "daily_summary",
            InsightKind::WeeklyReview => "weekly_review",
            InsightKind::GoalSuggestion => "goal_suggestion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily_summary" => Some(InsightKind::DailySummary),
            "weekly_review" => Some(InsightKind::WeeklyReview),
            "goal_suggestion" => Some(InsightKind::GoalSuggestion),
            _ => None,
        }
    }

    pub const ALL: [InsightKind; 3] = [
        InsightKind::DailySummary,
        InsightKind::WeeklyReview,
        InsightKind::GoalSuggestion,
    ];
}

/// A cached AI-generated text artifact. The cache key is the structured
/// (user_id, kind, period_start[, period_end]) triple; `metadata_json`
/// carries display-only extras and never participates in matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    pub user_id: String,
    pub kind: InsightKind,
    pub content: String,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
    pub metadata_json: Option<String>,
    pub created_at: String,
    pub expires_at: Option<String>,
}

/// Per-user running counters, reset nightly by the end-of-day job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub user_id: String,
    pub current_streak: i64,
    pub last_active_date: Option<String>,
    pub today_session_count: i64,
    pub today_meditation_minutes: i64,
    pub today_workout_count: i64,
    pub today_goals_total: i64,
    pub today_goals_completed: i64,
    pub morning_notification: bool,
    pub updated_at: String,
}

/// A row from `daily_tasks` (the "goals" of a given day).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTask {
    pub id: String,
    pub user_id: String,
    pub date: String,
    pub title: String,
    pub completed: bool,
    pub updated_at: String,
}

/// An internal notification row (the in-app inbox, distinct from push).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub metadata_json: Option<String>,
    pub read: bool,
    pub created_at: String,
}
