//! OpenRouter-backed direction oracle.
//!
//! Sends the candle window as a compact table through OpenRouter's
//! OpenAI-compatible chat completions API and reads back one word:
//! `up`, `down` or `hold`. Anything else is `Unavailable`.
//!
//! Transport failures are retried with exponential backoff on 429/5xx,
//! then the fallback model is tried once before giving up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PredictionOracle;
use crate::types::{Candle, PredictionSignal};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const DEFAULT_PRIMARY_MODEL: &str = "anthropic/claude-sonnet-4";
const DEFAULT_FALLBACK_MODEL: &str = "x-ai/grok-4.1-fast";

/// The answer is a single word.
const DEFAULT_MAX_TOKENS: u32 = 16;

/// Maximum retries on rate limit / server errors per model attempt.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

const SYSTEM_PROMPT: &str = "You are a market-direction classifier. You receive OHLCV candles \
for one trading pair, oldest first. Reply with exactly one lowercase word: `up` if the price is \
likely to rise over the next candle, `down` if it is likely to fall, or `hold` if there is no \
clear direction. Do not explain.";

// ---------------------------------------------------------------------------
// API types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct LlmOracle {
    http: Client,
    api_key: String,
    primary_model: String,
    fallback_model: Option<String>,
    max_tokens: u32,
}

impl LlmOracle {
    pub fn new(
        api_key: String,
        primary_model: Option<String>,
        fallback_model: Option<String>,
        max_tokens: Option<u32>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build OpenRouter HTTP client")?;

        Ok(Self {
            http,
            api_key,
            primary_model: primary_model.unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string()),
            fallback_model: Some(
                fallback_model.unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.to_string()),
            ),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    /// One line per candle: `time,open,high,low,close,volume`.
    pub fn build_prompt(window: &[Candle]) -> String {
        let mut prompt = String::from("time,open,high,low,close,volume\n");
        for c in window {
            let time = Utc
                .timestamp_millis_opt(c.timestamp)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| c.timestamp.to_string());
            let _ = writeln!(
                prompt,
                "{time},{},{},{},{},{}",
                c.open, c.high, c.low, c.close, c.volume
            );
        }
        prompt
    }

    /// First `up` / `down` / `hold` word in the reply.
    pub fn parse_signal(text: &str) -> PredictionSignal {
        text.split(|ch: char| !ch.is_ascii_alphabetic())
            .find_map(PredictionSignal::from_word)
            .unwrap_or(PredictionSignal::Unavailable)
    }

    fn chat_request(&self, model: &str, table: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: table.to_string(),
                },
            ],
        }
    }

    /// A single HTTP round-trip. Non-retryable statuses are errors.
    async fn attempt(&self, request: &ChatRequest) -> Result<Attempt> {
        let response = match self
            .http
            .post(OPENROUTER_API_URL)
            .bearer_auth(&self.api_key)
            .header("X-Title", "AUTOTRADER")
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::Retry(format!("request error: {e}"))),
        };

        let status = response.status();
        if status.is_success() {
            let body: ChatResponse = response
                .json()
                .await
                .context("Failed to decode OpenRouter response")?;
            debug!(
                model = %request.model,
                tokens = body.usage.map_or(0, |u| u.total_tokens),
                "OpenRouter reply"
            );
            let text = body
                .choices
                .into_iter()
                .find_map(|c| c.message)
                .map(|m| m.content)
                .unwrap_or_default();
            return Ok(Attempt::Reply(text));
        }

        let detail = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Ok(Attempt::Retry(format!("HTTP {status}: {detail}")))
        } else {
            anyhow::bail!(
                "OpenRouter rejected the request ({status}, model {}): {detail}",
                request.model
            )
        }
    }

    /// Ask one model, retrying transient failures with doubling delays.
    async fn ask(&self, model: &str, table: &str) -> Result<String> {
        let request = self.chat_request(model, table);
        let mut last_reason = String::new();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = backoff(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, model, "Backing off");
                tokio::time::sleep(delay).await;
            }
            match self.attempt(&request).await? {
                Attempt::Reply(text) => return Ok(text),
                Attempt::Retry(reason) => {
                    warn!(attempt, model, reason = %reason, "OpenRouter attempt failed");
                    last_reason = reason;
                }
            }
        }

        anyhow::bail!(
            "OpenRouter gave up on {model} after {} attempts: {last_reason}",
            MAX_RETRIES + 1
        )
    }

    /// Primary model first, then the fallback once.
    async fn ask_with_fallback(&self, table: &str) -> Result<String> {
        let primary_err = match self.ask(&self.primary_model, table).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };
        let Some(fallback) = self.fallback_model.as_deref() else {
            return Err(primary_err);
        };
        warn!(
            primary = %self.primary_model,
            fallback,
            error = %primary_err,
            "Primary model failed, trying fallback"
        );
        self.ask(fallback, table)
            .await
            .with_context(|| format!("Fallback {fallback} failed too; primary error: {primary_err:#}"))
    }
}

/// Outcome of one HTTP attempt.
enum Attempt {
    Reply(String),
    /// 429, 5xx or a transport error.
    Retry(String),
}

/// Delay before retry number `attempt` (1-based).
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS << attempt.saturating_sub(1))
}

#[async_trait]
impl PredictionOracle for LlmOracle {
    async fn predict(&self, window: &[Candle]) -> Result<PredictionSignal> {
        let prompt = Self::build_prompt(window);
        let reply = self
            .ask_with_fallback(&prompt)
            .await
            .context("OpenRouter prediction call failed")?;

        let signal = Self::parse_signal(&reply);
        info!(model = %self.primary_model, signal = %signal, "Prediction received");
        Ok(signal)
    }

    fn name(&self) -> String {
        format!("openrouter({})", self.primary_model)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
