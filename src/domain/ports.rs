//! Synchronous ports the core consumes.
//!
//! These are plain blocking traits, not `async_trait` services: the
//! concurrency model forbids any suspension on I/O inside the
//! executor or simulator, so every port here is a plain blocking function
//! call. Adapters that need actual network/disk I/O do it before handing
//! materialized data in.

use rand::rngs::StdRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::call::Chain;
use crate::domain::candle::{Candle, CandleInterval};
use crate::domain::errors::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub value: Decimal,
    pub unix_s: i64,
}

/// Historical OHLCV and point-price access. Implementations must return
/// candles with strictly increasing timestamps.
pub trait MarketDataPort {
    fn fetch_ohlcv(
        &self,
        token: &str,
        chain: Chain,
        interval: CandleInterval,
        from_s: i64,
        to_s: i64,
    ) -> Result<Vec<Candle>, PortError>;

    fn fetch_historical_price_at(
        &self,
        token: &str,
        chain: Chain,
        unix_s: i64,
    ) -> Result<Option<PricePoint>, PortError>;
}

/// Key/value state used for idempotency keys and checkpoints outside the
/// core. `ttl_secs: None` means no expiry.
pub trait StatePort {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, PortError>;
    fn set(&self, namespace: &str, key: &str, value: String, ttl_secs: Option<u64>) -> Result<(), PortError>;
    fn delete(&self, namespace: &str, key: &str) -> Result<(), PortError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSpec {
    pub duckdb_path: String,
    pub chain: Chain,
    pub interval: CandleInterval,
    pub from_s: i64,
    pub to_s: i64,
    pub pre_window_min: i64,
    pub post_window_min: i64,
    pub mints: Option<Vec<String>>,
    pub check_coverage: bool,
    pub rate_limit_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub worklist_generated: usize,
    pub items_processed: usize,
    pub items_succeeded: usize,
    pub items_failed: usize,
    pub items_skipped: usize,
    pub total_candles_fetched: u64,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

pub trait OhlcvIngestionPort {
    fn ingest(&self, spec: &IngestionSpec) -> Result<IngestionSummary, PortError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub token: String,
    pub side: OrderSide,
    pub amount_usd: Decimal,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAck {
    pub idempotency_key: String,
    pub filled: bool,
    pub fill_px: Option<Decimal>,
}

/// Development-only stub. Real trading is out of scope;
/// this exists so the workflow adapter layer has something to call during
/// manual testing. Must default to dry-run and enforce a circuit breaker.
pub trait ExecutionPort {
    fn execute(&mut self, request: &ExecutionRequest, rng: &mut StdRng) -> Result<ExecutionAck, PortError>;
}

/// Idempotency key derivation shared by every `ExecutionPort` implementation:
/// (token, side, amount rounded to 3dp).
pub fn idempotency_key(token: &str, side: OrderSide, amount_usd: Decimal) -> String {
    let rounded = amount_usd.round_dp(3);
    format!("{token}:{side:?}:{rounded}")
}

/// Telemetry emitted only at adapter boundaries, never inside C4/C5.
pub trait TelemetryPort {
    fn emit_metric(&self, name: &str, value: f64);
    fn emit_event(&self, name: &str, fields: &[(&str, &str)]);
}
