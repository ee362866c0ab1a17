//! Canned five-candle windows for smoke-testing an oracle.
//!
//! Both start at 2020-03-10 12:04:00 UTC, one second apart, volume 10.

use crate::types::Candle;

/// 2020-03-10 12:04:00 UTC in Unix milliseconds.
const START_MS: i64 = 1_583_841_840_000;

fn window(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &price)| Candle {
            timestamp: START_MS + i as i64 * 1_000,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 10.0,
        })
        .collect()
}

/// Monotonically increasing closes.
pub fn uptrend() -> Vec<Candle> {
    window(&[1.0, 2.0, 3.0, 4.0, 5.0])
}

/// Monotonically decreasing closes.
pub fn downtrend() -> Vec<Candle> {
    window(&[10.0, 2.0, 0.3, 0.03, 0.003])
}
