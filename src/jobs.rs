//! The five scheduled job pipelines.
//!
//! Every pipeline iterates its user set with per-user isolation: one user's
//! failure is logged and the loop moves on, so a bad row never starves the
//! rest of the batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::aggregation::{aggregate_daily, aggregate_monthly, aggregate_weekly};
use crate::db::{activity, stats, users};
use crate::error::AppError;
use crate::insights::{
    generate_daily_summary, generate_goal_suggestions, generate_weekly_review,
};
use crate::notify;
use crate::period::{date_str, previous_month_key, week_bounds, DATE_FMT};
use crate::scheduler::{JobId, Trigger};
use crate::state::AppState;

/// Dispatch one scheduler message.
pub async fn run_job(state: &Arc<AppState>, job: JobId, trigger: Trigger, now: DateTime<Utc>) {
    log::info!("Running job '{}' ({:?})", job.name(), trigger);
    let result = match job {
        JobId::EndOfDay => end_of_day(state, now).await,
        JobId::MorningCheck => morning_check(state, now).await,
        JobId::MiddayNudge => midday_nudge(state, now).await,
        JobId::EndOfWeek => end_of_week(state, now).await,
        JobId::EndOfMonth => end_of_month(state, now).await,
    };
    match result {
        Ok(()) => log::info!("Job '{}' completed", job.name()),
        Err(e) => log::error!("Job '{}' failed: {}", job.name(), e),
    }
}

/// Finalize the day for every user active today: re-aggregate, generate the
/// daily summary, check stalled goals, write back the streak, reset counters.
pub async fn end_of_day(state: &Arc<AppState>, now: DateTime<Utc>) -> Result<(), AppError> {
    let today = date_str(now);
    let user_ids = {
        let db = state.db.lock().await;
        users::users_active_on(&db, &today)?
    };
    log::info!(
        "End-of-day processing for {} ({} active users)",
        today,
        user_ids.len()
    );

    for user_id in user_ids {
        if let Err(e) = end_of_day_for_user(state, &user_id, &today, now).await {
            log::error!("End-of-day failed for user {}: {}", user_id, e);
        }
    }
    Ok(())
}

async fn end_of_day_for_user(
    state: &Arc<AppState>,
    user_id: &str,
    today: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    {
        let db = state.db.lock().await;
        aggregate_daily(&db, user_id, today, now)?;
    }

    // The summary generation takes the lock itself and drops it around the
    // model call
    if let Err(e) =
        generate_daily_summary(&state.db, state.generator.as_ref(), user_id, today, false, now)
            .await
    {
        log::warn!("Daily summary failed for {}: {}", user_id, e);
    }

    let stalled_count = {
        let db = state.db.lock().await;
        let cutoff = (now - Duration::days(3))
            .date_naive()
            .format(DATE_FMT)
            .to_string();
        let stalled = activity::stalled_tasks(&db, user_id, &cutoff)?;
        if !stalled.is_empty() {
            let ids: Vec<&str> = stalled.iter().map(|t| t.id.as_str()).collect();
            notify::record_internal(
                &db,
                user_id,
                "stalled_goals",
                &format!(
                    "You have {} goals that haven't been updated in a while. \
                     Need help breaking them down?",
                    stalled.len()
                ),
                Some(&json!({ "stalledGoalIds": ids }).to_string()),
                now,
            );
        }
        stalled.len()
    };

    if stalled_count > 0 {
        if let Err(e) =
            generate_goal_suggestions(&state.db, state.generator.as_ref(), user_id, false, now)
                .await
        {
            log::warn!("Goal suggestions failed for {}: {}", user_id, e);
        }
        notify::send_user_push(
            &state.db,
            state.push.as_ref(),
            user_id,
            &notify::stalled_goal(stalled_count),
        )
        .await;
    }
    notify::send_user_push(
        &state.db,
        state.push.as_ref(),
        user_id,
        &notify::daily_summary_ready(),
    )
    .await;

    {
        let db = state.db.lock().await;
        let user_state = users::ensure_user_state(&db, user_id, &now.to_rfc3339())?;
        users::upsert_user_streak(
            &db,
            user_id,
            user_state.current_streak,
            Some(today),
            &now.to_rfc3339(),
        )?;
        users::reset_today_counters(&db, user_id, &now.to_rfc3339())?;
    }
    Ok(())
}

/// Morning boost: ping opted-in users with their top open task.
pub async fn morning_check(state: &Arc<AppState>, _now: DateTime<Utc>) -> Result<(), AppError> {
    let user_ids = {
        let db = state.db.lock().await;
        users::users_with_morning_notification(&db)?
    };

    for user_id in user_ids {
        let top_task = {
            let db = state.db.lock().await;
            match activity::first_incomplete_task(&db, &user_id) {
                Ok(task) => task
                    .map(|t| t.title)
                    .unwrap_or_else(|| "Setting your priorities".to_string()),
                Err(e) => {
                    log::error!("Morning check failed for user {}: {}", user_id, e);
                    continue;
                }
            }
        };
        notify::send_user_push(
            &state.db,
            state.push.as_ref(),
            &user_id,
            &notify::morning_boost(&top_task),
        )
        .await;
    }
    Ok(())
}

/// Midday nudge: users with no plan get the fresh-start nudge, users with an
/// unfinished plan get pointed at their next open task.
pub async fn midday_nudge(state: &Arc<AppState>, _now: DateTime<Utc>) -> Result<(), AppError> {
    let user_ids = {
        let db = state.db.lock().await;
        users::all_users(&db)?
    };

    for user_id in user_ids {
        let payload = {
            let db = state.db.lock().await;
            let user_state = match users::get_user_state(&db, &user_id) {
                Ok(Some(s)) => s,
                Ok(None) => continue,
                Err(e) => {
                    log::error!("Midday nudge failed for user {}: {}", user_id, e);
                    continue;
                }
            };

            if user_state.today_goals_total == 0 {
                Some(notify::empty_plan())
            } else if user_state.today_goals_completed < user_state.today_goals_total {
                match activity::first_incomplete_task(&db, &user_id) {
                    Ok(Some(task)) => Some(notify::incomplete_plan(&task.title)),
                    Ok(None) => None,
                    Err(e) => {
                        log::error!("Midday nudge failed for user {}: {}", user_id, e);
                        None
                    }
                }
            } else {
                None
            }
        };

        if let Some(payload) = payload {
            notify::send_user_push(&state.db, state.push.as_ref(), &user_id, &payload).await;
        }
    }
    Ok(())
}

/// Weekly rollup: aggregate the current week and generate the AI review for
/// every user with daily stats in the window.
pub async fn end_of_week(state: &Arc<AppState>, now: DateTime<Utc>) -> Result<(), AppError> {
    let (week_start, week_end) = week_bounds(now.date_naive());
    let user_ids = {
        let db = state.db.lock().await;
        stats::users_with_daily_stats_between(&db, &week_start, &week_end)?
    };
    log::info!(
        "End-of-week processing for {} to {} ({} users)",
        week_start,
        week_end,
        user_ids.len()
    );

    for user_id in user_ids {
        let processed = {
            let db = state.db.lock().await;
            match aggregate_weekly(&db, &user_id, now.date_naive()) {
                Ok(weekly) => {
                    notify::record_internal(
                        &db,
                        &user_id,
                        "weekly_review",
                        "Your weekly review is ready! See how you did this week.",
                        Some(
                            &json!({
                                "avgFocusScore": weekly.avg_focus_score,
                                "goalCompletionRate": weekly.goal_completion_rate,
                            })
                            .to_string(),
                        ),
                        now,
                    );
                    true
                }
                Err(e) => {
                    log::error!("End-of-week failed for user {}: {}", user_id, e);
                    false
                }
            }
        };

        if processed {
            if let Err(e) = generate_weekly_review(
                &state.db,
                state.generator.as_ref(),
                &user_id,
                &week_start,
                &week_end,
                false,
                now,
            )
            .await
            {
                log::warn!("Weekly review failed for {}: {}", user_id, e);
            }
            notify::send_user_push(
                &state.db,
                state.push.as_ref(),
                &user_id,
                &notify::weekly_review_ready(),
            )
            .await;
        }
    }
    Ok(())
}

/// Monthly rollup: on the 1st, aggregate the month that just ended.
pub async fn end_of_month(state: &Arc<AppState>, now: DateTime<Utc>) -> Result<(), AppError> {
    let month = previous_month_key(now.date_naive());
    let (month_start, month_end) = crate::period::month_bounds(&month)?;
    let user_ids = {
        let db = state.db.lock().await;
        stats::users_with_daily_stats_between(&db, &month_start, &month_end)?
    };
    log::info!(
        "End-of-month processing for {} ({} users)",
        month,
        user_ids.len()
    );

    for user_id in user_ids {
        let processed = {
            let db = state.db.lock().await;
            match aggregate_monthly(&db, &user_id, &month) {
                Ok(monthly) => {
                    notify::record_internal(
                        &db,
                        &user_id,
                        "monthly_recap",
                        &format!("Your {} recap is ready!", month),
                        Some(
                            &json!({
                                "avgFocusScore": monthly.avg_focus_score,
                                "totalWorkouts": monthly.total_workouts,
                                "longestStreak": monthly.longest_streak,
                            })
                            .to_string(),
                        ),
                        now,
                    );
                    true
                }
                Err(e) => {
                    log::error!("End-of-month failed for user {}: {}", user_id, e);
                    false
                }
            }
        };

        if processed {
            notify::send_user_push(
                &state.db,
                state.push.as_ref(),
                &user_id,
                &notify::monthly_recap_ready(&month),
            )
            .await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::test_utils::CannedGenerator;
    use crate::config::Config;
    use crate::db::test_utils::test_db;
    use crate::events;
    use crate::push::test_utils::RecordingSender;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().expect("timestamp")
    }

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(
            Config::default(),
            test_db(),
            Arc::new(CannedGenerator::new("Generated text.")),
            Arc::new(RecordingSender::new()),
        ))
    }

    async fn seed_active_user(state: &Arc<AppState>, now: DateTime<Utc>) {
        {
            let db = state.db.lock().await;
            users::add_device_token(&db, "u1", "tok").unwrap();
        }
        events::record_meditation(&state.db, state.push.as_ref(), "u1", 20, now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_end_of_day_finalizes_and_resets() {
        let state = test_state();
        let now = at("2025-06-02T23:30:00Z");
        seed_active_user(&state, now).await;

        end_of_day(&state, now).await.unwrap();

        let db = state.db.lock().await;
        // Counters reset, streak written back
        let user_state = users::get_user_state(&db, "u1").unwrap().unwrap();
        assert_eq!(user_state.today_session_count, 0);
        assert_eq!(user_state.today_meditation_minutes, 0);
        assert_eq!(users::get_streak(&db, "u1").unwrap(), 1);

        // Daily summary insight landed
        let latest = crate::insights::latest_insights(&db, "u1", now).unwrap();
        assert!(!latest.is_empty());

        // Stats row exists for the day
        assert!(stats::get_daily_stats(&db, "u1", "2025-06-02")
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_end_of_day_skips_inactive_users() {
        let state = test_state();
        let now = at("2025-06-02T23:30:00Z");
        {
            let db = state.db.lock().await;
            // Known user, but last active two days ago
            users::ensure_user_state(&db, "idle", "2025-05-31T12:00:00Z").unwrap();
            db.conn()
                .execute(
                    "UPDATE user_state SET last_active_date = '2025-05-31' WHERE user_id = 'idle'",
                    [],
                )
                .unwrap();
        }

        end_of_day(&state, now).await.unwrap();

        let db = state.db.lock().await;
        assert!(stats::get_daily_stats(&db, "idle", "2025-06-02")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_midday_nudge_empty_vs_incomplete() {
        let state = test_state();
        let now = at("2025-06-02T14:00:00Z");
        let sender = Arc::new(RecordingSender::new());
        let state = Arc::new(AppState::new(
            Config::default(),
            test_db(),
            state.generator.clone(),
            sender.clone(),
        ));
        {
            let db = state.db.lock().await;
            users::add_device_token(&db, "planless", "tok-a").unwrap();
            users::add_device_token(&db, "behind", "tok-b").unwrap();
            users::ensure_user_state(&db, "planless", "2025-06-02T09:00:00Z").unwrap();
        }
        events::create_task(
            &state.db,
            state.push.as_ref(),
            state.generator.as_ref(),
            "behind",
            "Finish the report",
            now,
        )
        .await
        .unwrap();

        midday_nudge(&state, now).await.unwrap();

        let kinds: Vec<String> = sender
            .sent_payloads()
            .iter()
            .map(|p| p.kind().to_string())
            .collect();
        assert!(kinds.contains(&"empty_plan".to_string()));
        assert!(kinds.contains(&"incomplete_action".to_string()));
    }

    #[tokio::test]
    async fn test_end_of_week_rolls_up_active_users() {
        let state = test_state();
        // Sunday evening; activity happened Monday of the same week
        let monday = at("2025-06-02T10:00:00Z");
        let sunday = at("2025-06-08T21:00:00Z");
        seed_active_user(&state, monday).await;

        end_of_week(&state, sunday).await.unwrap();

        let db = state.db.lock().await;
        let weekly = stats::get_weekly_stats(&db, "u1", "2025-06-02")
            .unwrap()
            .expect("weekly row");
        assert_eq!(weekly.total_meditation_minutes, 20);

        let inbox = users::recent_notifications(&db, "u1", 10).unwrap();
        assert!(inbox.iter().any(|n| n.kind == "weekly_review"));
    }

    #[tokio::test]
    async fn test_end_of_month_targets_previous_month() {
        let state = test_state();
        // Activity in June; job runs July 1st
        let june = at("2025-06-15T10:00:00Z");
        let july_first = at("2025-07-01T06:00:00Z");
        seed_active_user(&state, june).await;

        end_of_month(&state, july_first).await.unwrap();

        let db = state.db.lock().await;
        let monthly = stats::get_monthly_stats(&db, "u1", "2025-06")
            .unwrap()
            .expect("monthly row");
        assert_eq!(monthly.total_meditation_minutes, 20);

        // July itself was not aggregated
        assert!(stats::get_monthly_stats(&db, "u1", "2025-07")
            .unwrap()
            .is_none());
    }
}
