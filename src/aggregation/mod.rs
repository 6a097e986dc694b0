//! Stats aggregation pipelines.
//!
//! Each aggregator recomputes its window wholesale from the layer below
//! (daily from raw activity, weekly/monthly from daily rows) and upserts the
//! result, so re-runs are idempotent.

mod daily;
mod monthly;
mod weekly;

pub use daily::aggregate_daily;
pub use monthly::aggregate_monthly;
pub use weekly::aggregate_weekly;

use crate::db::DailyStats;

/// Longest run of consecutive active days in a window. A day counts as
/// active when it completed at least one goal or one workout. Rows must be
/// in ascending date order; gaps in the row sequence break the run.
pub(crate) fn longest_streak(days: &[DailyStats]) -> i64 {
    let mut longest = 0i64;
    let mut current = 0i64;
    for day in days {
        if day.goals_completed > 0 || day.workouts_completed > 0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Percentage of goals completed across a window, rounded; 0 when no goals.
pub(crate) fn completion_rate(completed: i64, total: i64) -> i64 {
    if total > 0 {
        ((completed as f64 / total as f64) * 100.0).round() as i64
    } else {
        0
    }
}
