//! Market-direction oracles.
//!
//! Defines the `PredictionOracle` trait and provides implementations for:
//! - `LlmOracle`: asks a chat model via OpenRouter for up / down / hold
//! - `TrendOracle`: deterministic least-squares slope over the closes

pub mod fixtures;
pub mod llm;
pub mod trend;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::sync::Arc;

use crate::config::{PredictionConfig, PredictionProvider};
use crate::types::{Candle, PredictionSignal};

pub use llm::LlmOracle;
pub use trend::TrendOracle;

/// Maps a window of candles (oldest first) to a directional signal.
///
/// `Ok(PredictionSignal::Unavailable)` means the oracle could not decide;
/// `Err` means it failed outright. The trader counts both as a failed cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionOracle: Send + Sync {
    async fn predict(&self, window: &[Candle]) -> Result<PredictionSignal>;

    /// Oracle identifier for logging.
    fn name(&self) -> String;
}

/// Build the oracle selected by the prediction options.
pub fn build(config: &PredictionConfig) -> Result<Arc<dyn PredictionOracle>> {
    match (config.provider, config.api_key.as_ref()) {
        (PredictionProvider::OpenRouter, Some(key)) => Ok(Arc::new(LlmOracle::new(
            key.expose_secret().clone(),
            config.model.clone(),
            config.fallback_model.clone(),
            config.max_tokens,
        )?)),
        _ => Ok(Arc::new(TrendOracle::new(config.trend_threshold))),
    }
}
