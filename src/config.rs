//! Configuration loading for the daemon.
//!
//! Config lives at `~/.momentum/config.json`. Schedules are cron entries
//! with a timezone, one per scheduled job. Secrets (Gemini API key, FCM
//! server key) are read from the environment and fail fast at first use.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Environment variable holding the FCM server key.
pub const FCM_SERVER_KEY_VAR: &str = "FCM_SERVER_KEY";

/// A single cron schedule entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
}

impl ScheduleEntry {
    fn utc(cron: &str) -> Self {
        Self {
            enabled: true,
            cron: cron.to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

/// Cron schedules for the five background jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedules {
    #[serde(default = "default_end_of_day")]
    pub end_of_day: ScheduleEntry,
    #[serde(default = "default_morning_check")]
    pub morning_check: ScheduleEntry,
    #[serde(default = "default_midday_nudge")]
    pub midday_nudge: ScheduleEntry,
    #[serde(default = "default_end_of_week")]
    pub end_of_week: ScheduleEntry,
    #[serde(default = "default_end_of_month")]
    pub end_of_month: ScheduleEntry,
}

fn default_end_of_day() -> ScheduleEntry {
    ScheduleEntry::utc("30 23 * * *")
}
fn default_morning_check() -> ScheduleEntry {
    ScheduleEntry::utc("0 8 * * *")
}
fn default_midday_nudge() -> ScheduleEntry {
    ScheduleEntry::utc("0 14 * * *")
}
fn default_end_of_week() -> ScheduleEntry {
    // Sunday evening
    ScheduleEntry::utc("0 21 * * 0")
}
fn default_end_of_month() -> ScheduleEntry {
    // 1st of the month, rolls up the previous month
    ScheduleEntry::utc("0 6 1 * *")
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            end_of_day: default_end_of_day(),
            morning_check: default_morning_check(),
            midday_nudge: default_midday_nudge(),
            end_of_week: default_end_of_week(),
            end_of_month: default_end_of_month(),
        }
    }
}

/// Model names for the two generation tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiModels {
    /// Fast, cost-effective model for daily summaries and goal suggestions.
    #[serde(default = "default_flash_model")]
    pub flash: String,
    /// Deeper model for weekly analysis.
    #[serde(default = "default_deep_model")]
    pub deep: String,
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
}

fn default_flash_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_deep_model() -> String {
    "gemini-1.5-pro".to_string()
}
fn default_ai_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

impl Default for AiModels {
    fn default() -> Self {
        Self {
            flash: default_flash_model(),
            deep: default_deep_model(),
            base_url: default_ai_base_url(),
        }
    }
}

/// Push delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_fcm_endpoint")]
    pub endpoint: String,
}

fn default_true() -> bool {
    true
}
fn default_fcm_endpoint() -> String {
    "https://fcm.googleapis.com/fcm/send".to_string()
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_fcm_endpoint(),
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Database file path. Defaults to `~/.momentum/momentum.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub schedules: Schedules,
    #[serde(default)]
    pub ai: AiModels,
    #[serde(default)]
    pub push: PushConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            schedules: Schedules::default(),
            ai: AiModels::default(),
            push: PushConfig::default(),
        }
    }
}

/// Get the canonical config file path (~/.momentum/config.json).
pub fn config_path() -> Result<PathBuf, AppError> {
    let home = dirs::home_dir()
        .ok_or_else(|| AppError::Configuration("Could not find home directory".to_string()))?;
    Ok(home.join(".momentum").join("config.json"))
}

/// Load configuration from disk. A missing file yields the defaults.
pub fn load_config() -> Result<Config, AppError> {
    let path = config_path()?;

    if !path.exists() {
        log::info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| AppError::Configuration(format!("Failed to read config: {}", e)))?;

    serde_json::from_str(&content)
        .map_err(|e| AppError::Configuration(format!("Failed to parse config: {}", e)))
}

/// Read the Gemini API key from the environment.
pub fn gemini_api_key() -> Result<String, AppError> {
    std::env::var(GEMINI_API_KEY_VAR)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Configuration(format!("{} is not set", GEMINI_API_KEY_VAR)))
}

/// Read the FCM server key from the environment.
pub fn fcm_server_key() -> Result<String, AppError> {
    std::env::var(FCM_SERVER_KEY_VAR)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Configuration(format!("{} is not set", FCM_SERVER_KEY_VAR)))
}
