//! Adapters implementing the `domain::ports` traits: CSV-backed market
//! data, in-memory state, a dev-only execution stub with a circuit
//! breaker, tracing-backed telemetry, and an ingestion planner/stub.

pub mod execution;
pub mod ingestion;
pub mod market_data;
pub mod state;
pub mod telemetry;
