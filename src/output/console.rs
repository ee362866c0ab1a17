use tracing::{debug, info};

use super::OutputSink;

/// Renders messages through `tracing` under the `autotrader::console` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn emit_message(&self, text: &str) {
        info!(target: "autotrader::console", "{text}");
    }

    fn record_transaction_cost(&self, value: f64) {
        debug!(target: "autotrader::console", value, "Transaction cost");
    }

    fn record_memory_status(&self, text: &str) {
        info!(target: "autotrader::console", "{text}");
    }
}
