//! Momentum: a personal productivity stats daemon.
//!
//! Tracks raw activity (meditation, reading, workouts, daily tasks, health
//! samples), rolls it up into daily/weekly/monthly stats with a 0-100 focus
//! score, generates cached AI insights, and nudges the user over push.

pub mod aggregation;
pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod insights;
pub mod jobs;
pub mod migrations;
pub mod notify;
pub mod period;
pub mod push;
pub mod scheduler;
pub mod score;
pub mod service;
pub mod state;

pub use error::AppError;
pub use state::AppState;
