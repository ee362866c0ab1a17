//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`;
//! the trading loop writes to it through `DashboardSink` while these
//! handlers read it from the server task.

use axum::{extract::State, http::StatusCode, Json};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Messages kept in memory; older ones are dropped.
pub const MAX_MESSAGES: usize = 5_000;
/// Transaction costs kept for the chart.
pub const MAX_COSTS: usize = 50;
/// Messages returned by `/api/messages`.
pub const RECENT_MESSAGES: usize = 10;

#[derive(Debug, Default)]
struct DashboardData {
    messages: VecDeque<String>,
    costs: VecDeque<f64>,
    memory: Option<String>,
}

/// Mutex-guarded state shared by the trading loop and the web server.
#[derive(Debug, Default)]
pub struct DashboardState {
    data: Mutex<DashboardData>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_message(&self, message: &str) {
        let mut data = self.data.lock();
        data.messages.push_back(message.to_string());
        while data.messages.len() > MAX_MESSAGES {
            data.messages.pop_front();
        }
    }

    pub fn push_cost(&self, cost: f64) {
        let mut data = self.data.lock();
        data.costs.push_back(cost);
        while data.costs.len() > MAX_COSTS {
            data.costs.pop_front();
        }
    }

    /// Replace the memory status; only the latest is kept.
    pub fn set_memory(&self, status: &str) {
        self.data.lock().memory = Some(status.to_string());
    }

    /// Up to `n` most recent messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> Vec<String> {
        let data = self.data.lock();
        let skip = data.messages.len().saturating_sub(n);
        data.messages.iter().skip(skip).cloned().collect()
    }

    pub fn message_count(&self) -> usize {
        self.data.lock().messages.len()
    }

    pub fn costs(&self) -> Vec<f64> {
        self.data.lock().costs.iter().copied().collect()
    }

    pub fn memory(&self) -> Option<String> {
        self.data.lock().memory.clone()
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostsResponse {
    pub costs: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryResponse {
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /api/messages
pub async fn get_messages(State(state): State<AppState>) -> Json<MessagesResponse> {
    Json(MessagesResponse {
        messages: state.recent_messages(RECENT_MESSAGES),
        total: state.message_count(),
    })
}

/// GET /api/costs
pub async fn get_costs(State(state): State<AppState>) -> Json<CostsResponse> {
    Json(CostsResponse {
        costs: state.costs(),
    })
}

/// GET /api/memory
pub async fn get_memory(State(state): State<AppState>) -> Json<MemoryResponse> {
    Json(MemoryResponse {
        status: state.memory(),
    })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
