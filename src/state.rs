//! Shared application state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::ai::TextGenerator;
use crate::config::Config;
use crate::db::StatsDb;
use crate::push::PushSender;
use crate::scheduler::JobId;

/// Everything the scheduler, executor, and callable surface share.
pub struct AppState {
    pub config: RwLock<Config>,
    pub db: Mutex<StatsDb>,
    pub generator: Arc<dyn TextGenerator>,
    pub push: Arc<dyn PushSender>,
    /// When each job last ran on schedule. Used to de-duplicate triggers
    /// and to detect missed runs after sleep/wake.
    last_scheduled_run: StdMutex<HashMap<JobId, DateTime<Utc>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: StatsDb,
        generator: Arc<dyn TextGenerator>,
        push: Arc<dyn PushSender>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            db: Mutex::new(db),
            generator,
            push,
            last_scheduled_run: StdMutex::new(HashMap::new()),
        }
    }

    pub fn get_last_scheduled_run(&self, job: JobId) -> Option<DateTime<Utc>> {
        self.last_scheduled_run
            .lock()
            .ok()
            .and_then(|map| map.get(&job).copied())
    }

    pub fn set_last_scheduled_run(&self, job: JobId, at: DateTime<Utc>) {
        if let Ok(mut map) = self.last_scheduled_run.lock() {
            map.insert(job, at);
        }
    }

    /// Snapshot the current config.
    pub fn config_snapshot(&self) -> Config {
        self.config
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}
