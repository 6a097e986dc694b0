//! Focus score computation.
//!
//! A 0-100 composite of goal completion (40 points), meditation (20 points),
//! and sleep quality (40 points). Purely arithmetic; no I/O.

/// Compute the daily focus score.
///
/// Components:
/// - Goals: completion ratio scaled to 40 points (0 when no goals were set).
/// - Meditation: minutes against a 20-minute target, scaled to 20 points.
/// - Sleep: 7-9h earns the full 40, over 9h earns 35, 6-7h earns 30,
///   anything shorter earns 5 points per hour.
pub fn focus_score(
    goals_completed: i64,
    goals_total: i64,
    meditation_minutes: i64,
    sleep_hours: f64,
) -> u8 {
    let goal_score = if goals_total > 0 {
        (goals_completed as f64 / goals_total as f64) * 40.0
    } else {
        0.0
    };

    let meditation_score = (meditation_minutes as f64 / 20.0).min(1.0) * 20.0;

    let sleep_score = if (7.0..=9.0).contains(&sleep_hours) {
        40.0
    } else if sleep_hours > 9.0 {
        35.0
    } else if sleep_hours >= 6.0 {
        30.0
    } else {
        (sleep_hours * 5.0).max(0.0)
    };

    let total = (goal_score + meditation_score + sleep_score).round();
    total.min(100.0) as u8
}
