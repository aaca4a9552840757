//! Output shape of a single (policy, call) replay.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a position closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TimeStop,
    TrailingStop,
    HardStop,
    LadderComplete,
    EndOfData,
    NoEntry,
}

impl ExitReason {
    /// Intrabar tie-break priority when multiple conditions fire on the same
    /// candle: lower number wins.
    pub fn priority(&self) -> u8 {
        match self {
            ExitReason::StopLoss => 0,
            ExitReason::HardStop => 1,
            ExitReason::TrailingStop => 2,
            ExitReason::TimeStop => 3,
            ExitReason::TakeProfit => 4,
            ExitReason::LadderComplete => 4,
            ExitReason::EndOfData => 5,
            ExitReason::NoEntry => 6,
        }
    }
}

/// Result of replaying one policy against one call's candle stream.
///
/// Fees are already netted into `realized_return_bps` (entry + exit, i.e.
/// `(taker_fee_bps + slippage_bps) * 2`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
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

impl ExecutionResult {
    /// The `no_entry` terminal case: no candle at or after the alert, or the
    /// first candidate entry candle had a non-finite/non-positive close.
    pub fn no_entry(alert_ts_ms: i64) -> Self {
        ExecutionResult {
            realized_return_bps: Decimal::ZERO,
            stop_out: false,
            max_adverse_excursion_bps: Decimal::ZERO,
            time_exposed_ms: 0,
            tail_capture: None,
            entry_ts_ms: alert_ts_ms,
            exit_ts_ms: alert_ts_ms,
            entry_px: Decimal::ZERO,
            exit_px: Decimal::ZERO,
            exit_reason: ExitReason::NoEntry,
        }
    }

    pub fn is_no_entry(&self) -> bool {
        matches!(self.exit_reason, ExitReason::NoEntry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_entry_has_zero_exposure() {
        let r = ExecutionResult::no_entry(1000);
        assert!(r.is_no_entry());
        assert_eq!(r.time_exposed_ms, 0);
        assert_eq!(r.realized_return_bps, Decimal::ZERO);
    }

    #[test]
    fn stop_loss_outranks_take_profit_on_priority() {
        assert!(ExitReason::StopLoss.priority() < ExitReason::TakeProfit.priority());
    }
}
