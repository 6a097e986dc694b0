//! Notification templates and fan-out.
//!
//! Delivery never propagates errors to the caller: a failed push is logged
//! and swallowed so triggers and jobs keep running. Invalid tokens reported
//! by the sender are removed on the spot.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::{users, StatsDb};
use crate::push::{NotificationPayload, PushSender};

pub fn incomplete_plan(activity_name: &str) -> NotificationPayload {
    NotificationPayload::new(
        "Action Required!",
        &format!(
            "You planned \"{}\" but it's yet to be completed. Ready to crush it?",
            activity_name
        ),
        "incomplete_action",
        "/section/daily-tasks",
    )
}

pub fn empty_plan() -> NotificationPayload {
    NotificationPayload::new(
        "Fresh Start!",
        "You haven't planned anything for today. A quick plan helps you stay focused!",
        "empty_plan",
        "/section/daily-tasks",
    )
}

pub fn all_completed() -> NotificationPayload {
    NotificationPayload::new(
        "Mission Accomplished!",
        "Incredible! You've completed all your activities for today. Time to relax!",
        "all_completed",
        "/dashboard",
    )
}

pub fn streak_milestone(days: i64) -> NotificationPayload {
    NotificationPayload::new(
        "You're on Fire!",
        &format!("{}-day streak! Your consistency is inspiring. Keep going!", days),
        "streak",
        "/profile",
    )
}

pub fn goal_overload() -> NotificationPayload {
    NotificationPayload::new(
        "Focus Check!",
        "You have many active goals. Focus on the top 3 to make real progress.",
        "overload",
        "/goals",
    )
}

pub fn stalled_goal(count: usize) -> NotificationPayload {
    NotificationPayload::new(
        "Need a Hand?",
        &format!(
            "You have {} goals that haven't moved in 3 days. Let's break them down.",
            count
        ),
        "stalled",
        "/goals",
    )
}

pub fn morning_boost(top_task: &str) -> NotificationPayload {
    NotificationPayload::new(
        "Today's Mission",
        &format!("Your top priority is: {}. Let's make it happen!", top_task),
        "morning_boost",
        "/section/daily-tasks",
    )
}

pub fn daily_summary_ready() -> NotificationPayload {
    NotificationPayload::new(
        "Daily Summary Ready",
        "Your day is wrapped up. See today's summary and focus score!",
        "daily_summary",
        "/section/daily-stats",
    )
}

pub fn weekly_review_ready() -> NotificationPayload {
    NotificationPayload::new(
        "Weekly Stats are In!",
        "Your weekly productivity review is ready. See how you performed!",
        "weekly_review",
        "/section/weekly-stats",
    )
}

pub fn monthly_recap_ready(month: &str) -> NotificationPayload {
    NotificationPayload::new(
        "Monthly Recap",
        &format!("Your {} recap is ready. See how the month stacked up!", month),
        "monthly_recap",
        "/section/monthly-stats",
    )
}

/// Send a push to every device the user has registered.
///
/// Tokens are read under the lock, the network send happens with the lock
/// released, and the lock is re-taken only if invalid tokens need cleanup.
/// All failures are logged, never returned.
pub async fn send_user_push(
    db: &Mutex<StatsDb>,
    push: &dyn PushSender,
    user_id: &str,
    payload: &NotificationPayload,
) {
    let tokens = {
        let db = db.lock().await;
        match users::device_tokens(&db, user_id) {
            Ok(tokens) => tokens,
            Err(e) => {
                log::error!("Failed to load device tokens for {}: {}", user_id, e);
                return;
            }
        }
    };

    if tokens.is_empty() {
        log::debug!("No device tokens for user {}", user_id);
        return;
    }

    let outcome = match push.send(&tokens, payload).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Push delivery failed for {}: {}", user_id, e);
            return;
        }
    };

    log::info!(
        "Sent {} notifications to user {} ({})",
        outcome.success_count,
        user_id,
        payload.kind()
    );

    if !outcome.invalid_tokens.is_empty() {
        log::info!(
            "Cleaning up {} invalid tokens for user {}",
            outcome.invalid_tokens.len(),
            user_id
        );
        let db = db.lock().await;
        if let Err(e) = users::remove_device_tokens(&db, user_id, &outcome.invalid_tokens) {
            log::error!("Failed to remove invalid tokens for {}: {}", user_id, e);
        }
    }
}

/// Append to the in-app inbox, logging instead of failing.
pub fn record_internal(
    db: &StatsDb,
    user_id: &str,
    kind: &str,
    message: &str,
    metadata_json: Option<&str>,
    now: DateTime<Utc>,
) {
    if let Err(e) =
        users::insert_notification(db, user_id, kind, message, metadata_json, &now.to_rfc3339())
    {
        log::error!("Failed to record notification for {}: {}", user_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::push::test_utils::RecordingSender;

    #[tokio::test]
    async fn test_send_skips_users_without_tokens() {
        let db = Mutex::new(test_db());
        let sender = RecordingSender::new();

        send_user_push(&db, &sender, "u1", &empty_plan()).await;
        assert!(sender.sent_payloads().is_empty());
    }

    #[tokio::test]
    async fn test_send_cleans_up_invalid_tokens() {
        let db = Mutex::new(test_db());
        {
            let guard = db.lock().await;
            users::add_device_token(&guard, "u1", "good-token").unwrap();
            users::add_device_token(&guard, "u1", "dead-token").unwrap();
        }
        let sender = RecordingSender::with_invalid_tokens(&["dead-token"]);

        send_user_push(&db, &sender, "u1", &all_completed()).await;

        assert_eq!(sender.sent_payloads().len(), 1);
        let guard = db.lock().await;
        assert_eq!(
            users::device_tokens(&guard, "u1").unwrap(),
            vec!["good-token".to_string()]
        );
    }

    #[test]
    fn test_templates_carry_routing_data() {
        let p = streak_milestone(7);
        assert!(p.body.contains("7-day streak"));
        assert_eq!(p.kind(), "streak");
        assert_eq!(p.data.get("redirect").map(|s| s.as_str()), Some("/profile"));

        assert_eq!(stalled_goal(3).kind(), "stalled");
        assert_eq!(monthly_recap_ready("2025-05").kind(), "monthly_recap");
    }
}
