//! Core domain types: candles, calls, policies, execution results, scoring.
//!
//! Everything under `domain` is pure data plus pure functions — no I/O, no
//! async, no ambient clock or RNG. External collaborators are represented
//! as traits in [`ports`] and implemented in `infrastructure`.

pub mod candle;
pub mod call;
pub mod errors;
pub mod execution;
pub mod path_metrics;
pub mod policy;
pub mod portfolio;
pub mod ports;
pub mod rng;
pub mod run_id;
pub mod scoring;
pub mod sinks;
