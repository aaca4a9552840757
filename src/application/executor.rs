//! Policy executor (C4): replays one policy against one call's candle tail
//! and produces a single [`ExecutionResult`].
//!
//! Every variant shares the same wick-aware walk: track a running peak high
//! and max adverse excursion from entry, then decide exits using
//! `candle.low` for downside triggers and `candle.high` for upside triggers
//! within a single candle, resolved by [`IntrabarPolicy`] when both fire.

use rust_decimal::Decimal;

use crate::domain::candle::Candle;
use crate::domain::execution::{ExecutionResult, ExitReason};
use crate::domain::policy::{IntrabarPolicy, RiskPolicy};

#[derive(Debug, Clone, Copy, Default)]
pub struct FeeModel {
    pub taker_fee_bps: Decimal,
    pub slippage_bps: Decimal,
}

impl FeeModel {
    pub fn round_trip_bps(&self) -> Decimal {
        (self.taker_fee_bps + self.slippage_bps) * Decimal::from(2)
    }
}

struct ExitOutcome {
    exit_idx: usize,
    exit_px: Decimal,
    exit_reason: ExitReason,
}

/// Picks which side wins when both a stop-type and a take-profit-type
/// trigger fire within the same candle.
fn resolve_intrabar(
    stop: Option<(Decimal, ExitReason)>,
    target: Option<(Decimal, ExitReason)>,
    policy: IntrabarPolicy,
) -> Option<(Decimal, ExitReason)> {
    match (stop, target) {
        (Some(s), None) => Some(s),
        (None, Some(t)) => Some(t),
        (None, None) => None,
        (Some(s), Some(t)) => match policy {
            IntrabarPolicy::StopFirst | IntrabarPolicy::LowThenHigh => Some(s),
            IntrabarPolicy::TakeProfitFirst | IntrabarPolicy::HighThenLow => Some(t),
        },
    }
}

/// Finds the first candle in `candles` with close-ms timestamp >= alert_ts_ms.
fn find_entry(candles: &[Candle], alert_ts_ms: i64) -> Option<usize> {
    candles.iter().position(|c| c.timestamp * 1000 >= alert_ts_ms)
}

fn mae_and_peak(tail: &[Candle], entry_px: Decimal, upto_idx: usize) -> (Decimal, Decimal) {
    let mut mae_bps = Decimal::ZERO;
    let mut peak_high = tail[0].high;
    for c in &tail[0..=upto_idx] {
        peak_high = peak_high.max(c.high);
        let lr = (c.low / entry_px - Decimal::ONE) * Decimal::from(10_000);
        mae_bps = mae_bps.min(lr);
    }
    (mae_bps.min(Decimal::ZERO), peak_high)
}

fn finalize(
    entry_px: Decimal,
    entry_ts_ms: i64,
    tail: &[Candle],
    outcome: ExitOutcome,
    fees: &FeeModel,
) -> ExecutionResult {
    let exit_candle = &tail[outcome.exit_idx];
    let exit_ts_ms = exit_candle.timestamp * 1000;
    let (mae_bps, peak_high) = mae_and_peak(tail, entry_px, outcome.exit_idx);

    let gross_bps = (outcome.exit_px / entry_px - Decimal::ONE) * Decimal::from(10_000);
    let realized_return_bps = gross_bps - fees.round_trip_bps();

    let denom = (peak_high / entry_px - Decimal::ONE) * Decimal::from(10_000);
    let tail_capture = if denom > Decimal::ZERO {
        Some((gross_bps / denom).min(Decimal::ONE))
    } else {
        None
    };

    ExecutionResult {
        realized_return_bps,
        stop_out: matches!(outcome.exit_reason, ExitReason::StopLoss),
        max_adverse_excursion_bps: mae_bps,
        time_exposed_ms: exit_ts_ms - entry_ts_ms,
        tail_capture,
        entry_ts_ms,
        exit_ts_ms,
        entry_px,
        exit_px: outcome.exit_px,
        exit_reason: outcome.exit_reason,
    }
}

/// Replays `policy` against `candles` (chronological, may start before the
/// alert — entry is resolved here) and returns the resulting fill.
pub fn execute_policy(
    candles: &[Candle],
    alert_ts_ms: i64,
    policy: &RiskPolicy,
    fees: &FeeModel,
) -> ExecutionResult {
    let Some(entry_idx) = find_entry(candles, alert_ts_ms) else {
        return ExecutionResult::no_entry(alert_ts_ms);
    };
    let tail = &candles[entry_idx..];
    let entry_px = tail[0].close;
    if entry_px <= Decimal::ZERO {
        return ExecutionResult::no_entry(alert_ts_ms);
    }
    let entry_ts_ms = tail[0].timestamp * 1000;

    let outcome = match policy {
        RiskPolicy::FixedStop { stop_pct, take_profit_pct } => {
            run_fixed_stop(tail, entry_px, *stop_pct, *take_profit_pct)
        }
        RiskPolicy::TimeStop { max_hold_ms, take_profit_pct } => {
            run_time_stop(tail, entry_px, alert_ts_ms, *max_hold_ms, *take_profit_pct)
        }
        RiskPolicy::TrailingStop { activation_pct, trail_pct, hard_stop_pct } => {
            run_trailing_stop(tail, entry_px, *activation_pct, *trail_pct, *hard_stop_pct)
        }
        RiskPolicy::Ladder { levels, stop_pct, intrabar_policy } => {
            run_ladder(tail, entry_px, levels, *stop_pct, *intrabar_policy)
        }
        RiskPolicy::WashRebound { trail_pct, wash_pct, rebound_pct, max_reentries, cooldown_candles } => {
            run_wash_rebound(tail, entry_px, *trail_pct, *wash_pct, *rebound_pct, *max_reentries, *cooldown_candles)
        }
        RiskPolicy::Combo { policies, .. } => {
            return run_combo(candles, alert_ts_ms, policies, fees);
        }
    };

    finalize(entry_px, entry_ts_ms, tail, outcome, fees)
}

fn run_fixed_stop(
    tail: &[Candle],
    entry_px: Decimal,
    stop_pct: Decimal,
    take_profit_pct: Option<Decimal>,
) -> ExitOutcome {
    let stop_price = entry_px * (Decimal::ONE - stop_pct);
    let tp_price = take_profit_pct.map(|tp| entry_px * (Decimal::ONE + tp));

    for (i, c) in tail.iter().enumerate() {
        let stop_hit = (c.low <= stop_price).then_some((stop_price, ExitReason::StopLoss));
        let tp_hit = tp_price
            .filter(|&tp| c.high >= tp)
            .map(|tp| (tp, ExitReason::TakeProfit));
        if let Some((px, reason)) = resolve_intrabar(stop_hit, tp_hit, IntrabarPolicy::StopFirst) {
            return ExitOutcome { exit_idx: i, exit_px: px, exit_reason: reason };
        }
    }
    ExitOutcome { exit_idx: tail.len() - 1, exit_px: tail.last().unwrap().close, exit_reason: ExitReason::EndOfData }
}

fn run_time_stop(
    tail: &[Candle],
    entry_px: Decimal,
    entry_ts_ms: i64,
    max_hold_ms: i64,
    take_profit_pct: Option<Decimal>,
) -> ExitOutcome {
    let deadline = entry_ts_ms + max_hold_ms;
    let tp_price = take_profit_pct.map(|tp| entry_px * (Decimal::ONE + tp));

    for (i, c) in tail.iter().enumerate() {
        if let Some(tp) = tp_price {
            if c.high >= tp {
                return ExitOutcome { exit_idx: i, exit_px: tp, exit_reason: ExitReason::TakeProfit };
            }
        }
        if c.timestamp * 1000 >= deadline {
            return ExitOutcome { exit_idx: i, exit_px: c.close, exit_reason: ExitReason::TimeStop };
        }
    }
    ExitOutcome { exit_idx: tail.len() - 1, exit_px: tail.last().unwrap().close, exit_reason: ExitReason::EndOfData }
}

fn run_trailing_stop(
    tail: &[Candle],
    entry_px: Decimal,
    activation_pct: Decimal,
    trail_pct: Decimal,
    hard_stop_pct: Option<Decimal>,
) -> ExitOutcome {
    let hard_stop_price = hard_stop_pct.map(|h| entry_px * (Decimal::ONE - h));
    let mut armed = false;
    let mut peak = entry_px;

    for (i, c) in tail.iter().enumerate() {
        if let Some(hs) = hard_stop_price {
            if c.low <= hs {
                return ExitOutcome { exit_idx: i, exit_px: hs, exit_reason: ExitReason::HardStop };
            }
        }
        if !armed {
            if c.high >= entry_px * (Decimal::ONE + activation_pct) {
                armed = true;
                peak = peak.max(c.high);
            } else {
                continue;
            }
        } else {
            peak = peak.max(c.high);
        }
        let trail_price = peak * (Decimal::ONE - trail_pct);
        if c.low <= trail_price {
            return ExitOutcome { exit_idx: i, exit_px: trail_price, exit_reason: ExitReason::TrailingStop };
        }
    }
    ExitOutcome { exit_idx: tail.len() - 1, exit_px: tail.last().unwrap().close, exit_reason: ExitReason::EndOfData }
}

fn run_ladder(
    tail: &[Candle],
    entry_px: Decimal,
    levels: &[crate::domain::policy::LadderLevel],
    stop_pct: Option<Decimal>,
    intrabar_policy: IntrabarPolicy,
) -> ExitOutcome {
    let mut sorted: Vec<_> = levels.to_vec();
    sorted.sort_by(|a, b| a.multiple.cmp(&b.multiple));
    let mut hit = vec![false; sorted.len()];
    let stop_price = stop_pct.map(|sp| entry_px * (Decimal::ONE - sp));

    let mut remaining = Decimal::ONE;
    let mut gross_bps = Decimal::ZERO;
    let favor_stop = matches!(intrabar_policy, IntrabarPolicy::StopFirst | IntrabarPolicy::LowThenHigh);

    let mut apply_levels = |candle: &Candle, remaining: &mut Decimal, gross_bps: &mut Decimal| {
        for (idx, level) in sorted.iter().enumerate() {
            if *remaining <= Decimal::ZERO {
                break;
            }
            if !hit[idx] && candle.high >= entry_px * level.multiple {
                hit[idx] = true;
                let fill = level.fraction.min(*remaining);
                *gross_bps += fill * (level.multiple - Decimal::ONE) * Decimal::from(10_000);
                *remaining -= fill;
            }
        }
    };

    for (i, c) in tail.iter().enumerate() {
        let stop_triggers = stop_price.is_some_and(|sp| c.low <= sp) && remaining > Decimal::ZERO;

        if favor_stop && stop_triggers {
            let sp = stop_price.unwrap();
            gross_bps += remaining * (sp / entry_px - Decimal::ONE) * Decimal::from(10_000);
            remaining = Decimal::ZERO;
            let exit_px = entry_px * (Decimal::ONE + gross_bps / Decimal::from(10_000));
            return ExitOutcome { exit_idx: i, exit_px, exit_reason: ExitReason::StopLoss };
        }

        apply_levels(c, &mut remaining, &mut gross_bps);
        if remaining <= Decimal::ZERO {
            let exit_px = entry_px * (Decimal::ONE + gross_bps / Decimal::from(10_000));
            return ExitOutcome { exit_idx: i, exit_px, exit_reason: ExitReason::LadderComplete };
        }

        if !favor_stop && stop_triggers {
            let sp = stop_price.unwrap();
            gross_bps += remaining * (sp / entry_px - Decimal::ONE) * Decimal::from(10_000);
            remaining = Decimal::ZERO;
            let exit_px = entry_px * (Decimal::ONE + gross_bps / Decimal::from(10_000));
            return ExitOutcome { exit_idx: i, exit_px, exit_reason: ExitReason::StopLoss };
        }
    }

    // end of data with partial fill: close the remainder at last close.
    let last = tail.last().unwrap();
    gross_bps += remaining * (last.close / entry_px - Decimal::ONE) * Decimal::from(10_000);
    let exit_px = entry_px * (Decimal::ONE + gross_bps / Decimal::from(10_000));
    ExitOutcome { exit_idx: tail.len() - 1, exit_px, exit_reason: ExitReason::EndOfData }
}

/// Internal wash/rebound re-entry state. Not serialized —
/// the executor only ever reports the net effect on [`ExecutionResult`].
enum WashReboundState {
    InPosition,
    WaitForWash { peak_at_exit: Decimal, candles_waited: u32 },
    WaitForRebound { wash_low: Decimal },
}

/// Treats the full wash/rebound lifecycle (however many re-entries occur)
/// as one compounded trade from the original entry to the final exit, since
/// there's no per-leg fee or return-attribution contract to split against —
/// see DESIGN.md for this judgment call.
fn run_wash_rebound(
    tail: &[Candle],
    entry_px: Decimal,
    trail_pct: Decimal,
    wash_pct: Decimal,
    rebound_pct: Decimal,
    max_reentries: u32,
    cooldown_candles: u32,
) -> ExitOutcome {
    let mut state = WashReboundState::InPosition;
    let mut current_leg_entry = entry_px;
    let mut peak = entry_px;
    let mut notional_multiplier = Decimal::ONE;
    let mut reentries = 0u32;
    let mut last_exit_idx = 0usize;

    for (i, c) in tail.iter().enumerate() {
        match &mut state {
            WashReboundState::InPosition => {
                peak = peak.max(c.high);
                let trail_price = peak * (Decimal::ONE - trail_pct);
                if c.low <= trail_price {
                    notional_multiplier *= trail_price / current_leg_entry;
                    last_exit_idx = i;
                    if reentries >= max_reentries {
                        let exit_px = entry_px * notional_multiplier;
                        return ExitOutcome { exit_idx: i, exit_px, exit_reason: ExitReason::TrailingStop };
                    }
                    state = WashReboundState::WaitForWash { peak_at_exit: peak, candles_waited: 0 };
                }
            }
            WashReboundState::WaitForWash { peak_at_exit, candles_waited } => {
                *candles_waited += 1;
                if *candles_waited >= cooldown_candles && c.low <= *peak_at_exit * (Decimal::ONE - wash_pct) {
                    state = WashReboundState::WaitForRebound { wash_low: c.low };
                }
            }
            WashReboundState::WaitForRebound { wash_low } => {
                if c.high >= *wash_low * (Decimal::ONE + rebound_pct) {
                    reentries += 1;
                    current_leg_entry = *wash_low * (Decimal::ONE + rebound_pct);
                    peak = current_leg_entry;
                    state = WashReboundState::InPosition;
                }
            }
        }
    }

    // data ran out; if still holding a position, mark it to close at the
    // last candle's close so the trade has a definite exit.
    if let WashReboundState::InPosition = state {
        let last = tail.last().unwrap();
        notional_multiplier *= last.close / current_leg_entry;
        last_exit_idx = tail.len() - 1;
    }
    let exit_px = entry_px * notional_multiplier;
    ExitOutcome { exit_idx: last_exit_idx, exit_px, exit_reason: ExitReason::EndOfData }
}

/// Evaluates every member on the same candle tail and adopts the result of
/// whichever exits earliest, ties broken by member order.
fn run_combo(
    candles: &[Candle],
    alert_ts_ms: i64,
    policies: &[RiskPolicy],
    fees: &FeeModel,
) -> ExecutionResult {
    let mut best: Option<ExecutionResult> = None;
    for member in policies {
        let result = execute_policy(candles, alert_ts_ms, member, fees);
        if result.is_no_entry() {
            continue;
        }
        // strictly-less keeps the earlier member on ties, since policies
        // are visited in member order.
        if best.as_ref().is_none_or(|current| result.exit_ts_ms < current.exit_ts_ms) {
            best = Some(result);
        }
    }
    best.unwrap_or_else(|| ExecutionResult::no_entry(alert_ts_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::LadderLevel;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, o: f64, h: f64, l: f64, cl: f64) -> Candle {
        Candle {
            timestamp: ts,
            open: Decimal::try_from(o).unwrap(),
            high: Decimal::try_from(h).unwrap(),
            low: Decimal::try_from(l).unwrap(),
            close: Decimal::try_from(cl).unwrap(),
            volume: dec!(1000),
        }
    }

    fn no_fees() -> FeeModel {
        FeeModel { taker_fee_bps: Decimal::ZERO, slippage_bps: Decimal::ZERO }
    }

    /// S1: FixedStop hit.
    #[test]
    fn s1_fixed_stop_hit() {
        let candles = vec![candle(0, 1.0, 1.0, 1.0, 1.0), candle(60, 1.0, 1.05, 0.75, 0.9)];
        let policy = RiskPolicy::FixedStop { stop_pct: dec!(0.2), take_profit_pct: Some(dec!(1.0)) };
        let r = execute_policy(&candles, 0, &policy, &no_fees());
        assert_eq!(r.exit_px, dec!(0.8));
        assert_eq!(r.exit_reason, ExitReason::StopLoss);
        assert!(r.stop_out);
        assert_eq!(r.realized_return_bps, dec!(-2000));
    }

    /// S2: TakeProfit hit.
    #[test]
    fn s2_take_profit_hit() {
        let candles = vec![candle(0, 1.0, 1.0, 1.0, 1.0), candle(60, 1.0, 2.1, 0.95, 2.0)];
        let policy = RiskPolicy::FixedStop { stop_pct: dec!(0.2), take_profit_pct: Some(dec!(1.0)) };
        let r = execute_policy(&candles, 0, &policy, &no_fees());
        assert_eq!(r.exit_px, dec!(2.0));
        assert_eq!(r.exit_reason, ExitReason::TakeProfit);
        assert_eq!(r.realized_return_bps, dec!(10000));
    }

    /// S3: Ladder 2x fill with 50% remaining at end of data.
    #[test]
    fn s3_ladder_partial_fill_end_of_data() {
        let candles = vec![
            candle(0, 1.0, 1.0, 1.0, 1.0),
            candle(60, 1.0, 2.5, 1.8, 2.2),
        ];
        let policy = RiskPolicy::Ladder {
            levels: vec![
                LadderLevel { multiple: dec!(2), fraction: dec!(0.5) },
                LadderLevel { multiple: dec!(3), fraction: dec!(0.3) },
                LadderLevel { multiple: dec!(4), fraction: dec!(0.2) },
            ],
            stop_pct: None,
            intrabar_policy: IntrabarPolicy::StopFirst,
        };
        let r = execute_policy(&candles, 0, &policy, &no_fees());
        assert_eq!(r.exit_reason, ExitReason::EndOfData);
        let expected = dec!(0.5) * dec!(10000) + dec!(0.5) * (dec!(2.2) - Decimal::ONE) * dec!(10000);
        assert_eq!(r.realized_return_bps, expected);
    }

    /// S4: TrailingStop arms and fires.
    #[test]
    fn s4_trailing_stop_arms_and_fires() {
        let candles = vec![
            candle(0, 1.0, 1.0, 1.0, 1.0),
            candle(60, 1.0, 1.5, 1.4, 1.5),
            candle(120, 1.5, 1.5, 1.30, 1.3),
        ];
        let policy = RiskPolicy::TrailingStop { activation_pct: dec!(0.2), trail_pct: dec!(0.1), hard_stop_pct: None };
        let r = execute_policy(&candles, 0, &policy, &no_fees());
        assert_eq!(r.exit_px, dec!(1.35));
        assert_eq!(r.exit_reason, ExitReason::TrailingStop);
    }

    /// S5: Intrabar stop-first default.
    #[test]
    fn s5_intrabar_stop_first_default() {
        let candles = vec![candle(0, 1.0, 1.0, 1.0, 1.0), candle(60, 1.0, 1.25, 0.85, 1.0)];
        let policy = RiskPolicy::FixedStop { stop_pct: dec!(0.1), take_profit_pct: Some(dec!(0.2)) };
        let r = execute_policy(&candles, 0, &policy, &no_fees());
        assert_eq!(r.exit_px, dec!(0.9));
        assert_eq!(r.exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn no_entry_when_no_candle_at_or_after_alert() {
        let candles = vec![candle(-100, 1.0, 1.0, 1.0, 1.0)];
        let policy = RiskPolicy::FixedStop { stop_pct: dec!(0.1), take_profit_pct: None };
        let r = execute_policy(&candles, 1000, &policy, &no_fees());
        assert!(r.is_no_entry());
    }

    #[test]
    fn mae_is_never_positive() {
        let candles = vec![candle(0, 1.0, 1.2, 0.8, 1.0), candle(60, 1.0, 1.3, 0.9, 1.1)];
        let policy = RiskPolicy::FixedStop { stop_pct: dec!(0.5), take_profit_pct: None };
        let r = execute_policy(&candles, 0, &policy, &no_fees());
        assert!(r.max_adverse_excursion_bps <= Decimal::ZERO);
    }

    #[test]
    fn combo_adopts_earliest_exiting_member() {
        let candles = vec![
            candle(0, 1.0, 1.0, 1.0, 1.0),
            candle(60, 1.0, 1.05, 0.85, 1.0),
        ];
        let fast_stop = RiskPolicy::FixedStop { stop_pct: dec!(0.1), take_profit_pct: None };
        let slow_time_stop = RiskPolicy::TimeStop { max_hold_ms: 3_600_000, take_profit_pct: None };
        let combo = RiskPolicy::Combo {
            policies: vec![slow_time_stop, fast_stop],
            intrabar_policy: IntrabarPolicy::StopFirst,
        };
        let r = execute_policy(&candles, 0, &combo, &no_fees());
        assert_eq!(r.exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn fees_are_netted_round_trip() {
        let candles = vec![candle(0, 1.0, 1.0, 1.0, 1.0), candle(60, 1.0, 2.1, 0.95, 2.0)];
        let policy = RiskPolicy::FixedStop { stop_pct: dec!(0.2), take_profit_pct: Some(dec!(1.0)) };
        let fees = FeeModel { taker_fee_bps: dec!(10), slippage_bps: dec!(5) };
        let r = execute_policy(&candles, 0, &policy, &fees);
        // gross 10000 bps minus (10+5)*2 = 30 bps
        assert_eq!(r.realized_return_bps, dec!(9970));
    }
}
