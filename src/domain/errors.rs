//! Error taxonomy for the domain layer.
//!
//! Each enum corresponds to one of the five kinds in the error-handling
//! design: `CandleError`/`CallError`/`PolicyError` are Validation, `PortError`
//! is Dependency-unavailable, `SimulationFault` is Fatal. Data-absent
//! (`ExecutionOutcome::NoEntry`) and Constraint-violation (`Infeasible`) are
//! modeled as ordinary values elsewhere, not as errors — they are expected
//! outcomes of a correct run, not failures of it.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CandleError {
    #[error("candle interval {given:?} is not a recognized interval")]
    InvalidInterval { given: String },

    #[error("candle at timestamp {timestamp} has non-positive open/close")]
    NonPositivePrice { timestamp: i64 },

    #[error("candle at timestamp {timestamp} has negative volume")]
    NegativeVolume { timestamp: i64 },

    #[error("candle at timestamp {timestamp} has wicks inconsistent with its body")]
    InconsistentWicks { timestamp: i64 },

    #[error("candle timestamps are not strictly increasing at {at}")]
    NonMonotonicTimestamps { at: i64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("call {call_id} has a negative alert_ts_ms")]
    NegativeTimestamp { call_id: String },

    #[error("call {call_id} has a non-positive alert_price")]
    NonPositiveAlertPrice { call_id: String },

    #[error("unknown chain {given:?}")]
    UnknownChain { given: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: String },

    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: String },

    #[error("ladder policy must have at least one level")]
    EmptyLadder,

    #[error("ladder level fractions must sum to at most 1.0, got {sum}")]
    LadderOverAllocated { sum: String },

    #[error("combo policy must have at least one member")]
    EmptyCombo,

    #[error("combo recursion depth {depth} exceeds the maximum of {max}")]
    ComboTooDeep { depth: u32, max: u32 },
}

#[derive(Debug, Error)]
pub enum PortError {
    #[error("market data unavailable for {mint}: {reason}")]
    MarketDataUnavailable { mint: String, reason: String },

    #[error("state store unavailable: {reason}")]
    StateUnavailable { reason: String },

    #[error("ingestion source unavailable: {reason}")]
    IngestionUnavailable { reason: String },

    #[error("execution port unavailable: {reason}")]
    ExecutionUnavailable { reason: String },
}

#[derive(Debug, Error)]
pub enum SimulationFault {
    #[error("capital accounting became inconsistent: {detail}")]
    CapitalAccountingBroken { detail: String },

    #[error("event stream produced a non-chronological event at {call_id}")]
    NonChronologicalEvent { call_id: String },

    #[error("policy {policy_id} aborted: {detail}")]
    PolicyAborted { policy_id: String, detail: String },
}
