//! momentumd: the background daemon.
//!
//! Loads config, opens the database, builds the AI and push clients, then
//! runs the cron scheduler and job executor until killed.

use std::sync::Arc;

use tokio::sync::mpsc;

use momentum::ai::GeminiClient;
use momentum::config;
use momentum::db::StatsDb;
use momentum::error::AppError;
use momentum::jobs;
use momentum::push::{FcmClient, NoopSender, PushSender};
use momentum::scheduler::{Scheduler, SchedulerMessage};
use momentum::state::AppState;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("momentumd failed to start: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = config::load_config()?;

    let db = match &config.database_path {
        Some(path) => StatsDb::open_at(path)?,
        None => StatsDb::open()?,
    };
    log::info!("Database ready");

    let api_key = config::gemini_api_key()?;
    let generator = Arc::new(
        GeminiClient::new(api_key, config.ai.clone())
            .map_err(|e| AppError::Configuration(format!("AI client init failed: {}", e)))?,
    );

    let push: Arc<dyn PushSender> = if config.push.enabled {
        let server_key = config::fcm_server_key()?;
        Arc::new(
            FcmClient::new(server_key, config.push.endpoint.clone())
                .map_err(|e| AppError::Configuration(format!("Push client init failed: {}", e)))?,
        )
    } else {
        log::info!("Push delivery disabled in config");
        Arc::new(NoopSender)
    };

    let state = Arc::new(AppState::new(config, db, generator, push));

    let (sender, mut receiver) = mpsc::channel::<SchedulerMessage>(32);

    let scheduler_state = state.clone();
    tokio::spawn(async move {
        Scheduler::new(scheduler_state, sender).run().await;
    });
    log::info!("Scheduler started");

    // Executor: jobs run one at a time, in arrival order
    while let Some(message) = receiver.recv().await {
        jobs::run_job(&state, message.job, message.trigger, chrono::Utc::now()).await;
    }

    Ok(())
}
