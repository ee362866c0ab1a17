use std::sync::Arc;

use super::OutputSink;
use crate::dashboard::DashboardState;

/// Feeds the shared dashboard state.
#[derive(Debug, Clone)]
pub struct DashboardSink {
    state: Arc<DashboardState>,
}

impl DashboardSink {
    pub fn new(state: Arc<DashboardState>) -> Self {
        Self { state }
    }
}

impl OutputSink for DashboardSink {
    fn emit_message(&self, text: &str) {
        self.state.push_message(text);
    }

    fn record_transaction_cost(&self, value: f64) {
        self.state.push_cost(value);
    }

    fn record_memory_status(&self, text: &str) {
        self.state.set_memory(text);
    }
}
