//! Prompt templates and formatting for insight generation.

use crate::db::{DailyStats, DailyTask};

const DAILY_SUMMARY_TEMPLATE: &str = "You are a supportive productivity coach. Based on the following daily stats, \n\
provide a brief, encouraging summary of the user's day. Be specific but concise.\n\
Focus on achievements first, then gentle suggestions for improvement.\n\
\n\
Stats for {{date}}:\n\
- Focus Score: {{focusScore}}/100\n\
- Sleep: {{sleepHours}} hours\n\
- Steps: {{steps}}\n\
- Workouts: {{workoutsCompleted}}\n\
- Pages Read: {{pagesRead}}\n\
- Meditation: {{meditationMinutes}} minutes\n\
- Goals Completed: {{goalsCompleted}}/{{goalsTotal}}\n\
\n\
Provide a 2-3 sentence summary. Be warm and human.";

const WEEKLY_REVIEW_TEMPLATE: &str = "You are a thoughtful productivity analyst. Analyze this week's performance \n\
and provide actionable insights.\n\
\n\
Week: {{weekStart}} to {{weekEnd}}\n\
\n\
Daily Breakdown:\n\
{{dailyData}}\n\
\n\
Provide:\n\
1. Top 2 strengths this week\n\
2. Top 2 areas for improvement\n\
3. One specific, actionable suggestion for next week\n\
\n\
Keep the total response under 200 words. Be encouraging but honest.";

const GOAL_SUGGESTION_TEMPLATE: &str = "You are a goal-setting expert. Based on the user's current goals and progress,\n\
suggest ways to optimize their approach.\n\
\n\
Current Goals:\n\
{{goals}}\n\
\n\
Recent Progress:\n\
{{progress}}\n\
\n\
Provide:\n\
1. Any goals that seem stalled (if applicable)\n\
2. Suggested breakdown of complex goals\n\
3. One motivational insight\n\
\n\
Keep response under 100 words. Be practical and supportive.";

pub fn daily_summary_prompt(stats: &DailyStats) -> String {
    DAILY_SUMMARY_TEMPLATE
        .replace("{{date}}", &stats.date)
        .replace("{{focusScore}}", &stats.focus_score.to_string())
        .replace("{{sleepHours}}", &stats.sleep_hours.to_string())
        .replace("{{steps}}", &stats.steps.to_string())
        .replace("{{workoutsCompleted}}", &stats.workouts_completed.to_string())
        .replace("{{pagesRead}}", &stats.pages_read.to_string())
        .replace("{{meditationMinutes}}", &stats.meditation_minutes.to_string())
        .replace("{{goalsCompleted}}", &stats.goals_completed.to_string())
        .replace("{{goalsTotal}}", &stats.goals_total.to_string())
}

pub fn weekly_review_prompt(week_start: &str, week_end: &str, days: &[DailyStats]) -> String {
    let daily_data = days
        .iter()
        .map(|d| {
            format!(
                "- {}: Focus {}, Sleep {}h, Goals {}/{}",
                d.date, d.focus_score, d.sleep_hours, d.goals_completed, d.goals_total
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    WEEKLY_REVIEW_TEMPLATE
        .replace("{{weekStart}}", week_start)
        .replace("{{weekEnd}}", week_end)
        .replace("{{dailyData}}", &daily_data)
}

pub fn goal_suggestion_prompt(goals: &[DailyTask], progress: &[DailyStats]) -> String {
    let goals_str = goals
        .iter()
        .map(|g| {
            format!(
                "- \"{}\" ({}, Set: {})",
                g.title,
                if g.completed { "Done" } else { "Pending" },
                g.date
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let progress_str = if progress.is_empty() {
        "No recent data".to_string()
    } else {
        progress
            .iter()
            .map(|s| {
                format!(
                    "- {}: {}/{} goals completed",
                    s.date, s.goals_completed, s.goals_total
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    GOAL_SUGGESTION_TEMPLATE
        .replace("{{goals}}", &goals_str)
        .replace("{{progress}}", &progress_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_prompt_fills_every_placeholder() {
        let stats = DailyStats {
            user_id: "u1".to_string(),
            date: "2025-06-02".to_string(),
            focus_score: 85,
            sleep_hours: 7.5,
            steps: 9000,
            workouts_completed: 1,
            pages_read: 20,
            meditation_minutes: 15,
            goals_completed: 3,
            goals_total: 4,
            streak_days: 5,
            updated_at: String::new(),
        };

        let prompt = daily_summary_prompt(&stats);
        assert!(!prompt.contains("{{"), "unfilled placeholder: {}", prompt);
        assert!(prompt.contains("Focus Score: 85/100"));
        assert!(prompt.contains("Goals Completed: 3/4"));
    }

    #[test]
    fn test_goal_prompt_handles_empty_progress() {
        let goals = vec![DailyTask {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            date: "2025-06-02".to_string(),
            title: "Finish draft".to_string(),
            completed: false,
            updated_at: String::new(),
        }];

        let prompt = goal_suggestion_prompt(&goals, &[]);
        assert!(prompt.contains("\"Finish draft\" (Pending"));
        assert!(prompt.contains("No recent data"));
    }
}
