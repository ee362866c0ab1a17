//! Deterministic trend oracle.
//!
//! Fits a least-squares line through the closes and normalises the slope
//! by the mean close, so the threshold reads as "fractional move per
//! candle" regardless of the pair's price level.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::PredictionOracle;
use crate::types::{Candle, PredictionSignal};

pub struct TrendOracle {
    threshold: f64,
}

impl TrendOracle {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
        }
    }

    /// Slope of closes per candle divided by the mean close.
    /// `None` for fewer than two candles or a non-positive mean.
    pub fn normalized_slope(window: &[Candle]) -> Option<f64> {
        if window.len() < 2 {
            return None;
        }
        let n = window.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = window.iter().map(|c| c.close).sum::<f64>() / n;
        if !(mean_y > 0.0) {
            return None;
        }

        let (mut num, mut den) = (0.0, 0.0);
        for (i, candle) in window.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (candle.close - mean_y);
            den += dx * dx;
        }
        Some(num / den / mean_y)
    }

    pub fn classify(&self, window: &[Candle]) -> PredictionSignal {
        match Self::normalized_slope(window) {
            None => PredictionSignal::Unavailable,
            Some(s) if s > self.threshold => PredictionSignal::Up,
            Some(s) if s < -self.threshold => PredictionSignal::Down,
            Some(_) => PredictionSignal::Hold,
        }
    }
}

#[async_trait]
impl PredictionOracle for TrendOracle {
    async fn predict(&self, window: &[Candle]) -> Result<PredictionSignal> {
        let signal = self.classify(window);
        debug!(candles = window.len(), signal = %signal, "Trend oracle decided");
        Ok(signal)
    }

    fn name(&self) -> String {
        format!("trend(threshold={})", self.threshold)
    }
}
