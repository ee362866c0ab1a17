//! Where the trading loop's narrative goes.
//!
//! `OutputSink` has three channels: free-text messages, transaction costs
//! and a memory-status line. `ConsoleSink` writes them to the log;
//! `DashboardSink` stores them for the web dashboard.

pub mod console;
pub mod dashboard;

pub use console::ConsoleSink;
pub use dashboard::DashboardSink;

/// Receiver for user-facing output. Implementations handle their own
/// synchronisation; callers never lock around them.
pub trait OutputSink: Send + Sync {
    fn emit_message(&self, text: &str);

    /// Value of a placed order, in quote units.
    fn record_transaction_cost(&self, value: f64);

    /// Replaces any previous memory status.
    fn record_memory_status(&self, text: &str);
}
