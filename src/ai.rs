//! Text generation via the Gemini REST API.
//!
//! The `TextGenerator` trait is the seam: production code uses `GeminiClient`,
//! tests substitute a canned generator. Retry-on-overload lives here so every
//! caller gets the same policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AiModels;

/// Max retries when the model reports overload.
const MAX_OVERLOAD_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Model overloaded, retries exhausted")]
    Overloaded,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Model returned no text")]
    EmptyResponse,
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AiError::Overloaded)
    }
}

/// Which model to route a request to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Fast model for daily summaries and goal suggestions.
    Flash,
    /// Deeper model for weekly analysis.
    Deep,
}

/// A request for generated text.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub tier: ModelTier,
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f64,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, AiError>;
}

/// Gemini REST client (`generateContent` endpoint).
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    models: AiModels,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(api_key: String, models: AiModels) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            api_key,
            models,
        })
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Flash => &self.models.flash,
            ModelTier::Deep => &self.models.deep,
        }
    }

    async fn generate_once(&self, request: &GenerationRequest) -> Result<String, AiError> {
        let model = self.model_for(request.tier);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.models.base_url, model, self.api_key
        );

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: request.max_output_tokens,
                temperature: request.temperature,
            },
        };

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status.as_u16() == 503 || message.to_lowercase().contains("overloaded") {
                return Err(AiError::Overloaded);
            }
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GeminiResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    /// Generate with exponential backoff on overload (2s, 4s, 8s).
    async fn generate(&self, request: &GenerationRequest) -> Result<String, AiError> {
        let mut attempt = 0u32;
        loop {
            match self.generate_once(request).await {
                Err(AiError::Overloaded) if attempt < MAX_OVERLOAD_RETRIES => {
                    let delay = 2u64 << attempt;
                    log::warn!(
                        "Model overloaded, retrying in {}s (attempt {}/{})",
                        delay,
                        attempt + 1,
                        MAX_OVERLOAD_RETRIES
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
