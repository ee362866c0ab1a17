//! Integration tests: whole trading cycles against an in-memory exchange.

mod mock_exchange;
mod trader_cycle;
