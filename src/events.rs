//! Activity ingest and event triggers.
//!
//! Each recorder inserts the raw row, bumps the live counters, applies the
//! streak transition, and re-aggregates the day, all under one lock hold.
//! Pushes go out after the lock is released; a failed push never fails the
//! write that triggered it.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::aggregation::aggregate_daily;
use crate::ai::TextGenerator;
use crate::db::{activity, users, DailyStats, DailyTask, StatsDb};
use crate::error::AppError;
use crate::insights::generate_goal_suggestions;
use crate::notify;
use crate::period::{date_str, yesterday_str};
use crate::push::{NotificationPayload, PushSender};

/// Streak lengths that earn a celebration push.
const STREAK_MILESTONES: [i64; 5] = [3, 7, 14, 21, 30];

/// Open-goal count above which the overload nudge fires.
const GOAL_OVERLOAD_THRESHOLD: i64 = 8;

/// Record a meditation session and roll the day up.
pub async fn record_meditation(
    db: &Mutex<StatsDb>,
    push: &dyn PushSender,
    user_id: &str,
    duration_minutes: i64,
    now: DateTime<Utc>,
) -> Result<DailyStats, AppError> {
    if duration_minutes <= 0 {
        return Err(AppError::InvalidArgument(
            "duration_minutes must be positive".to_string(),
        ));
    }

    let today = date_str(now);
    let (stats, milestone) = {
        let db = db.lock().await;
        let now_str = now.to_rfc3339();
        activity::insert_meditation_session(&db, user_id, &today, duration_minutes)?;
        users::bump_session_count(&db, user_id, &now_str)?;
        users::bump_meditation_minutes(&db, user_id, duration_minutes, &now_str)?;
        let milestone = apply_streak_touch(&db, user_id, now)?;
        let stats = aggregate_daily(&db, user_id, &today, now)?;
        (stats, milestone)
    };

    deliver(db, push, user_id, milestone, now).await;
    Ok(stats)
}

/// Record a reading session and roll the day up.
pub async fn record_reading(
    db: &Mutex<StatsDb>,
    push: &dyn PushSender,
    user_id: &str,
    pages_read: i64,
    now: DateTime<Utc>,
) -> Result<DailyStats, AppError> {
    if pages_read <= 0 {
        return Err(AppError::InvalidArgument(
            "pages_read must be positive".to_string(),
        ));
    }

    let today = date_str(now);
    let (stats, milestone) = {
        let db = db.lock().await;
        let now_str = now.to_rfc3339();
        activity::insert_reading_session(&db, user_id, &today, pages_read)?;
        users::bump_session_count(&db, user_id, &now_str)?;
        let milestone = apply_streak_touch(&db, user_id, now)?;
        let stats = aggregate_daily(&db, user_id, &today, now)?;
        (stats, milestone)
    };

    deliver(db, push, user_id, milestone, now).await;
    Ok(stats)
}

/// Record a completed workout and roll the day up.
pub async fn record_workout(
    db: &Mutex<StatsDb>,
    push: &dyn PushSender,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<DailyStats, AppError> {
    let today = date_str(now);
    let (stats, milestone) = {
        let db = db.lock().await;
        let now_str = now.to_rfc3339();
        activity::insert_workout_session(&db, user_id, &today)?;
        users::bump_session_count(&db, user_id, &now_str)?;
        users::bump_workout_count(&db, user_id, &now_str)?;
        let milestone = apply_streak_touch(&db, user_id, now)?;
        let stats = aggregate_daily(&db, user_id, &today, now)?;
        (stats, milestone)
    };

    deliver(db, push, user_id, milestone, now).await;
    Ok(stats)
}

/// Store the day's health sample (sleep, steps) and roll the day up.
/// Health syncs are passive and never touch the streak.
pub async fn record_health_sample(
    db: &Mutex<StatsDb>,
    user_id: &str,
    sleep_hours: f64,
    steps: i64,
    now: DateTime<Utc>,
) -> Result<DailyStats, AppError> {
    if sleep_hours < 0.0 || steps < 0 {
        return Err(AppError::InvalidArgument(
            "sleep_hours and steps must be non-negative".to_string(),
        ));
    }

    let today = date_str(now);
    let db = db.lock().await;
    activity::upsert_health_sample(&db, user_id, &today, sleep_hours, steps)?;
    Ok(aggregate_daily(&db, user_id, &today, now)?)
}

/// Create a daily task (goal). Fires the overload nudge, and goal
/// suggestions, when the open-goal count climbs too high.
pub async fn create_task(
    db: &Mutex<StatsDb>,
    push: &dyn PushSender,
    generator: &dyn TextGenerator,
    user_id: &str,
    title: &str,
    now: DateTime<Utc>,
) -> Result<DailyTask, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::InvalidArgument("title must not be empty".to_string()));
    }

    let today = date_str(now);
    let (task, overloaded) = {
        let db = db.lock().await;
        let now_str = now.to_rfc3339();
        let id = activity::insert_daily_task(&db, user_id, &today, title, &now_str)?;
        users::bump_goals_total(&db, user_id, 1, &now_str)?;
        aggregate_daily(&db, user_id, &today, now)?;

        let state = users::ensure_user_state(&db, user_id, &now_str)?;
        let overloaded =
            state.today_goals_total - state.today_goals_completed > GOAL_OVERLOAD_THRESHOLD;
        if overloaded {
            notify::record_internal(
                &db,
                user_id,
                "goal_overload",
                "You have many open goals. Consider prioritizing a few key ones.",
                None,
                now,
            );
        }

        let task = activity::get_task(&db, user_id, &id)?
            .ok_or_else(|| AppError::Internal(format!("task {} vanished after insert", id)))?;
        (task, overloaded)
    };

    if overloaded {
        notify::send_user_push(db, push, user_id, &notify::goal_overload()).await;
        if let Err(e) = generate_goal_suggestions(db, generator, user_id, false, now).await {
            log::warn!("Goal suggestions after overload failed for {}: {}", user_id, e);
        }
    }

    Ok(task)
}

/// Flip a task's completion state. Completion bumps the counters, applies
/// the streak transition, and may fire the all-done celebration.
pub async fn set_task_completion(
    db: &Mutex<StatsDb>,
    push: &dyn PushSender,
    user_id: &str,
    task_id: &str,
    completed: bool,
    now: DateTime<Utc>,
) -> Result<DailyTask, AppError> {
    let (task, pushes) = {
        let db = db.lock().await;
        let now_str = now.to_rfc3339();

        let before = activity::get_task(&db, user_id, task_id)?
            .ok_or_else(|| AppError::NotFound(format!("task {} not found", task_id)))?;

        let task = activity::set_task_completed(&db, user_id, task_id, completed, &now_str)?
            .ok_or_else(|| AppError::NotFound(format!("task {} not found", task_id)))?;

        let mut pushes: Vec<NotificationPayload> = Vec::new();

        if !before.completed && completed {
            users::bump_goals_completed(&db, user_id, 1, &now_str)?;
            if let Some(milestone) = apply_streak_touch(&db, user_id, now)? {
                pushes.push(notify::streak_milestone(milestone));
                notify::record_internal(
                    &db,
                    user_id,
                    "streak_milestone",
                    &format!("{}-day streak!", milestone),
                    None,
                    now,
                );
            }

            let state = users::ensure_user_state(&db, user_id, &now_str)?;
            if state.today_goals_total > 0
                && state.today_goals_completed >= state.today_goals_total
            {
                pushes.push(notify::all_completed());
            }
        } else if before.completed && !completed {
            users::bump_goals_completed(&db, user_id, -1, &now_str)?;
        }

        aggregate_daily(&db, user_id, &task.date, now)?;
        (task, pushes)
    };

    for payload in &pushes {
        notify::send_user_push(db, push, user_id, payload).await;
    }
    Ok(task)
}

/// Apply the streak transition for today's activity. Returns the new streak
/// value when it just landed on a milestone.
fn apply_streak_touch(
    db: &StatsDb,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<i64>, AppError> {
    let before = users::get_user_state(db, user_id)?
        .map(|s| (s.current_streak, s.last_active_date))
        .unwrap_or((0, None));
    let today = date_str(now);

    let streak =
        users::record_activity_touch(db, user_id, &today, &yesterday_str(now), &now.to_rfc3339())?;

    // Milestone fires only on the transition, not on repeat same-day touches
    let transitioned = before.1.as_deref() != Some(today.as_str());
    if transitioned && STREAK_MILESTONES.contains(&streak) {
        Ok(Some(streak))
    } else {
        Ok(None)
    }
}

async fn deliver(
    db: &Mutex<StatsDb>,
    push: &dyn PushSender,
    user_id: &str,
    milestone: Option<i64>,
    now: DateTime<Utc>,
) {
    if let Some(days) = milestone {
        {
            let guard = db.lock().await;
            notify::record_internal(
                &guard,
                user_id,
                "streak_milestone",
                &format!("{}-day streak!", days),
                None,
                now,
            );
        }
        notify::send_user_push(db, push, user_id, &notify::streak_milestone(days)).await;
    }
}
