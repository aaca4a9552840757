//! Capital-aware multi-call portfolio simulator.
//!
//! Unlike the single-call policy executor in `executor`, this component
//! owns a shared [`PortfolioState`] across many calls: it sizes positions
//! against available capital, enforces a concurrency cap, and accounts
//! cash as positions open and close. Exit timing per position still comes
//! from a simple fixed take-profit/stop-loss/time-stop rule (`V1Params`)
//! rather than an arbitrary [`RiskPolicy`] — the grid-search optimizer is
//! what sweeps the full policy grid, one call at a time, with no capital
//! model attached.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::executor::FeeModel;
use crate::domain::call::CallRecord;
use crate::domain::candle::Candle;
use crate::domain::errors::SimulationFault;
use crate::domain::portfolio::{CapitalConfig, ClosedTrade, PortfolioState, Position};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct V1Params {
    pub tp_mult: Decimal,
    pub sl_mult: Decimal,
    pub max_hold_hrs: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallOutcome {
    Opened,
    CapacitySkipped,
    SizeSkipped,
    NoEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub portfolio: PortfolioState,
    pub outcomes: Vec<(String, CallOutcome)>,
}

struct PlannedExit {
    exit_ts: i64,
    exit_px: Decimal,
}

/// Precomputes the stop-first fixed exit for one position's full candle
/// tail. This is pure lookahead over already-materialized historical data,
/// not a live causality violation — the simulator is a backtest replaying
/// a closed dataset, not an online policy.
fn plan_exit(tail: &[Candle], entry_px: Decimal, entry_ts_ms: i64, v1: &V1Params) -> PlannedExit {
    let stop_price = entry_px * v1.sl_mult;
    let tp_price = entry_px * v1.tp_mult;
    let deadline = entry_ts_ms + max_hold_ms(v1.max_hold_hrs);

    for c in tail {
        let ts_ms = c.timestamp * 1000;
        if c.low <= stop_price {
            return PlannedExit { exit_ts: ts_ms, exit_px: stop_price };
        }
        if c.high >= tp_price {
            return PlannedExit { exit_ts: ts_ms, exit_px: tp_price };
        }
        if ts_ms >= deadline {
            return PlannedExit { exit_ts: ts_ms, exit_px: c.close };
        }
    }
    let last = tail.last().expect("non-empty candle tail");
    PlannedExit { exit_ts: last.timestamp * 1000, exit_px: last.close }
}

fn max_hold_ms(max_hold_hrs: Decimal) -> i64 {
    (max_hold_hrs * Decimal::from(3_600_000))
        .round()
        .to_i64()
        .unwrap_or(i64::MAX)
}

fn find_entry(candles: &[Candle], alert_ts_ms: i64) -> Option<usize> {
    candles.iter().position(|c| c.timestamp * 1000 >= alert_ts_ms)
}

struct TrackedPosition {
    position: Position,
    planned_exit: PlannedExit,
}

/// Replays `calls` (assumed sorted ascending by `alert_ts_ms`) against a
/// single fixed exit rule, maintaining one shared [`PortfolioState`].
/// `candles_by_call` must contain, for each call_id, the candle tail from
/// at or after that call's alert.
pub fn simulate_portfolio(
    calls: &[CallRecord],
    candles_by_call: &std::collections::HashMap<String, Vec<Candle>>,
    v1: &V1Params,
    config: &CapitalConfig,
) -> Result<SimulationReport, SimulationFault> {
    let mut portfolio = PortfolioState::new(config.initial_capital);
    let mut tracked: Vec<TrackedPosition> = Vec::new();
    let mut outcomes = Vec::new();

    for call in calls {
        close_matured_positions(&mut portfolio, &mut tracked, call.alert_ts_ms)?;

        let Some(candles) = candles_by_call.get(&call.call_id) else {
            outcomes.push((call.call_id.clone(), CallOutcome::NoEntry));
            continue;
        };
        let Some(entry_idx) = find_entry(candles, call.alert_ts_ms) else {
            outcomes.push((call.call_id.clone(), CallOutcome::NoEntry));
            continue;
        };
        let tail = &candles[entry_idx..];
        let entry_px = tail[0].close;
        if entry_px <= Decimal::ZERO {
            outcomes.push((call.call_id.clone(), CallOutcome::NoEntry));
            continue;
        }

        if tracked.len() >= config.max_concurrent {
            outcomes.push((call.call_id.clone(), CallOutcome::CapacitySkipped));
            continue;
        }

        let risk_denominator = Decimal::ONE - v1.sl_mult;
        let size_risk = if risk_denominator > Decimal::ZERO {
            config.max_risk_usd / risk_denominator
        } else {
            Decimal::ZERO
        };
        let size_alloc = portfolio.equity() * config.max_allocation_pct;
        let size_usd = size_risk.min(size_alloc).min(portfolio.free_cash);
        if size_usd <= Decimal::ZERO {
            outcomes.push((call.call_id.clone(), CallOutcome::SizeSkipped));
            continue;
        }

        let entry_ts_ms = tail[0].timestamp * 1000;
        let planned_exit = plan_exit(tail, entry_px, entry_ts_ms, v1);
        let position = Position {
            call_id: call.call_id.clone(),
            entry_px,
            entry_ts: entry_ts_ms,
            size_usd,
            tp_px: entry_px * v1.tp_mult,
            sl_px: entry_px * v1.sl_mult,
            time_exit_ts: entry_ts_ms + max_hold_ms(v1.max_hold_hrs),
        };
        portfolio.free_cash -= size_usd;
        tracked.push(TrackedPosition { position, planned_exit });
        portfolio.open = tracked.iter().map(|t| t.position.clone()).collect();
        portfolio.record_peak();
        outcomes.push((call.call_id.clone(), CallOutcome::Opened));
        portfolio.check_invariants()?;
    }

    portfolio.check_invariants()?;

    Ok(SimulationReport { portfolio, outcomes })
}

/// Closes every tracked position whose planned exit is at or before
/// `cutoff_ts_ms`, in ascending exit-time order, applying pnl to free_cash
/// as each one closes.
fn close_matured_positions(
    portfolio: &mut PortfolioState,
    tracked: &mut Vec<TrackedPosition>,
    cutoff_ts_ms: i64,
) -> Result<(), SimulationFault> {
    let mut due: Vec<usize> = (0..tracked.len())
        .filter(|&i| tracked[i].planned_exit.exit_ts <= cutoff_ts_ms)
        .collect();
    due.sort_by_key(|&i| (tracked[i].planned_exit.exit_ts, tracked[i].position.call_id.clone()));

    for i in due {
        let t = &tracked[i];
        let pnl_usd =
            t.position.size_usd * (t.planned_exit.exit_px / t.position.entry_px - Decimal::ONE);
        portfolio.free_cash += t.position.size_usd + pnl_usd;
        portfolio.closed.push(ClosedTrade {
            call_id: t.position.call_id.clone(),
            entry_px: t.position.entry_px,
            exit_px: t.planned_exit.exit_px,
            size_usd: t.position.size_usd,
            pnl_usd,
            entry_ts: t.position.entry_ts,
            exit_ts: t.planned_exit.exit_ts,
        });
        portfolio.record_peak();
    }
    tracked.retain(|t| t.planned_exit.exit_ts > cutoff_ts_ms);
    portfolio.open = tracked.iter().map(|t| t.position.clone()).collect();
    portfolio.check_invariants()
}
