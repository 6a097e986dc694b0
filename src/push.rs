//! Push delivery over the FCM legacy HTTP endpoint.
//!
//! `PushSender` is the seam between notification logic and the wire. The FCM
//! response reports per-token errors; tokens that come back as invalid or
//! unregistered are returned to the caller for cleanup.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("FCM error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// What to show on the device, plus routing data for the app.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

impl NotificationPayload {
    pub fn new(title: &str, body: &str, kind: &str, redirect: &str) -> Self {
        let mut data = HashMap::new();
        data.insert("type".to_string(), kind.to_string());
        data.insert("redirect".to_string(), redirect.to_string());
        Self {
            title: title.to_string(),
            body: body.to_string(),
            data,
        }
    }

    pub fn kind(&self) -> &str {
        self.data.get("type").map(|s| s.as_str()).unwrap_or("")
    }
}

/// Outcome of a multicast send.
#[derive(Debug, Default)]
pub struct PushOutcome {
    pub success_count: usize,
    /// Tokens FCM rejected as invalid or unregistered. Callers should drop
    /// these from storage.
    pub invalid_tokens: Vec<String>,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        tokens: &[String],
        payload: &NotificationPayload,
    ) -> Result<PushOutcome, PushError>;
}

/// FCM legacy HTTP client (`/fcm/send` with a server key).
pub struct FcmClient {
    http: reqwest::Client,
    server_key: String,
    endpoint: String,
}

#[derive(Serialize)]
struct FcmRequest<'a> {
    registration_ids: &'a [String],
    notification: FcmNotification<'a>,
    data: &'a HashMap<String, String>,
    priority: &'static str,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct FcmResponse {
    #[serde(default)]
    success: usize,
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Deserialize)]
struct FcmResult {
    #[serde(default)]
    error: Option<String>,
}

impl FcmClient {
    pub fn new(server_key: String, endpoint: String) -> Result<Self, PushError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            server_key,
            endpoint,
        })
    }
}

#[async_trait]
impl PushSender for FcmClient {
    async fn send(
        &self,
        tokens: &[String],
        payload: &NotificationPayload,
    ) -> Result<PushOutcome, PushError> {
        if tokens.is_empty() {
            return Ok(PushOutcome::default());
        }

        let body = FcmRequest {
            registration_ids: tokens,
            notification: FcmNotification {
                title: &payload.title,
                body: &payload.body,
            },
            data: &payload.data,
            priority: "high",
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PushError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: FcmResponse = response.json().await?;

        let mut invalid_tokens = Vec::new();
        for (i, result) in parsed.results.iter().enumerate() {
            if let Some(error) = &result.error {
                if error == "InvalidRegistration" || error == "NotRegistered" {
                    if let Some(token) = tokens.get(i) {
                        invalid_tokens.push(token.clone());
                    }
                } else {
                    log::warn!("FCM delivery error for token {}: {}", i, error);
                }
            }
        }

        Ok(PushOutcome {
            success_count: parsed.success,
            invalid_tokens,
        })
    }
}

/// Sender used when push is disabled in config. Reports every send as a
/// zero-token success.
pub struct NoopSender;

#[async_trait]
impl PushSender for NoopSender {
    async fn send(
        &self,
        _tokens: &[String],
        payload: &NotificationPayload,
    ) -> Result<PushOutcome, PushError> {
        log::debug!("Push disabled, dropping notification '{}'", payload.title);
        Ok(PushOutcome::default())
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use std::sync::Mutex;

    /// Sender that records payloads and reports configured invalid tokens.
    pub struct RecordingSender {
        pub sent: Mutex<Vec<(Vec<String>, NotificationPayload)>>,
        pub invalid_tokens: Vec<String>,
    }

    impl RecordingSender {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                invalid_tokens: Vec::new(),
            }
        }

        pub fn with_invalid_tokens(tokens: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                invalid_tokens: tokens.iter().map(|s| s.to_string()).collect(),
            }
        }

        pub fn sent_payloads(&self) -> Vec<NotificationPayload> {
            self.sent
                .lock()
                .expect("sender lock")
                .iter()
                .map(|(_, p)| p.clone())
                .collect()
        }
    }

    #[async_trait]
    impl PushSender for RecordingSender {
        async fn send(
            &self,
            tokens: &[String],
            payload: &NotificationPayload,
        ) -> Result<PushOutcome, PushError> {
            self.sent
                .lock()
                .expect("sender lock")
                .push((tokens.to_vec(), payload.clone()));
            let invalid: Vec<String> = self
                .invalid_tokens
                .iter()
                .filter(|t| tokens.contains(t))
                .cloned()
                .collect();
            Ok(PushOutcome {
                success_count: tokens.len() - invalid.len(),
                invalid_tokens: invalid,
            })
        }
    }
}
