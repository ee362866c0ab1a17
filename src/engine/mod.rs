//! Core engine: the open orders → plan → predict → place loop.

pub mod executor;
pub mod memory;
pub mod monitor;
pub mod planner;
pub mod retry;
pub mod trader;

pub use executor::{OrderExecutor, OrderRejection, Placement};
pub use trader::{CycleCounters, CycleOutcome, NextCycle, Trader};
