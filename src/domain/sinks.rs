//! Persisted row shapes and the sink trait the core writes
//! them through. The core never opens a database connection itself —
//! these are plain serializable structs handed to whatever storage adapter
//! the workflow layer wires up.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::domain::errors::PortError;
use crate::domain::path_metrics::PathMetricsRow;
use rust_decimal::Decimal;

use crate::domain::call::Chain;
use crate::domain::candle::CandleInterval;
use crate::domain::execution::ExitReason;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyResultRow {
    pub run_id: String,
    pub policy_id: String,
    pub call_id: String,
    pub caller: String,
    pub mint: String,
    pub chain: Chain,
    pub interval: CandleInterval,
    pub alert_ts_ms: i64,
    pub realized_return_bps: Decimal,
    pub stop_out: bool,
    pub max_adverse_excursion_bps: Decimal,
    pub time_exposed_ms: i64,
    pub tail_capture: Option<Decimal>,
    pub entry_ts_ms: i64,
    pub exit_ts_ms: i64,
    pub entry_px: Decimal,
    pub exit_px: Decimal,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    PathOnly,
    ExitOptimizer,
    ExitStack,
    Policy,
    Optimize,
    Baseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRow {
    pub run_id: String,
    pub strategy_id: Option<String>,
    pub run_mode: RunMode,
    pub status: RunStatus,
    pub params_json: String,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub error_text: Option<String>,
    pub summary_json: String,
}

/// Write-only sink for the three persisted row families. Implementations
/// live in `infrastructure`; the core only ever holds a `&dyn ResultSink`.
pub trait ResultSink {
    fn write_path_metrics(&self, row: PathMetricsRow) -> Result<(), PortError>;
    fn write_policy_result(&self, row: PolicyResultRow) -> Result<(), PortError>;
    fn write_run(&self, row: RunRow) -> Result<(), PortError>;
}

/// Discards everything. Useful for dry-run CLI invocations and benchmarks.
#[derive(Debug, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn write_path_metrics(&self, _row: PathMetricsRow) -> Result<(), PortError> {
        Ok(())
    }
    fn write_policy_result(&self, _row: PolicyResultRow) -> Result<(), PortError> {
        Ok(())
    }
    fn write_run(&self, _row: RunRow) -> Result<(), PortError> {
        Ok(())
    }
}

/// Accumulates rows in memory. Used by integration tests and by the CLI's
/// `--format json/csv` rendering path, which reads everything back out
/// after a run completes.
#[derive(Debug, Default)]
pub struct InMemorySink {
    pub path_metrics: Mutex<Vec<PathMetricsRow>>,
    pub policy_results: Mutex<Vec<PolicyResultRow>>,
    pub runs: Mutex<Vec<RunRow>>,
}

impl ResultSink for InMemorySink {
    fn write_path_metrics(&self, row: PathMetricsRow) -> Result<(), PortError> {
        self.path_metrics.lock().unwrap().push(row);
        Ok(())
    }
    fn write_policy_result(&self, row: PolicyResultRow) -> Result<(), PortError> {
        self.policy_results.lock().unwrap().push(row);
        Ok(())
    }
    fn write_run(&self, row: RunRow) -> Result<(), PortError> {
        self.runs.lock().unwrap().push(row);
        Ok(())
    }
}
