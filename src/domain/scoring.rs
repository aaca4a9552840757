//! Hard-contract scoring and the tie-break comparator.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics};
use std::cmp::Ordering;

use crate::domain::execution::ExecutionResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConstraints {
    pub max_stop_out_rate: Decimal,
    pub min_p95_drawdown_bps: Decimal,
    pub max_mean_time_exposed_ms: i64,
}

impl Default for ScoringConstraints {
    fn default() -> Self {
        ScoringConstraints {
            max_stop_out_rate: Decimal::new(30, 2), // 0.30
            min_p95_drawdown_bps: Decimal::from(-3000),
            max_mean_time_exposed_ms: 4 * 3600 * 1000,
        }
    }
}

/// Aggregate statistics over one policy's executions across a set of calls.
/// `no_entry` results are excluded before this is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultStats {
    pub count: usize,
    pub mean_return_bps: Decimal,
    pub median_return_bps: Decimal,
    pub stop_out_rate: Decimal,
    pub p95_drawdown_bps: Decimal,
    pub median_dd_bps: Decimal,
    pub mean_time_exposed_ms: i64,
    pub mean_tail_capture: Decimal,
}

fn decimal_median(mut values: Vec<Decimal>) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.sort();
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / Decimal::from(2)
    }
}

fn to_f64_vec(values: &[Decimal]) -> Vec<f64> {
    values.iter().filter_map(|d| d.to_f64()).collect()
}

impl ResultStats {
    /// Derives aggregate stats from a non-empty slice of executions that
    /// already had `no_entry` results filtered out by the caller.
    pub fn from_executions(results: &[ExecutionResult]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        let count = results.len();
        let returns: Vec<Decimal> = results.iter().map(|r| r.realized_return_bps).collect();
        let maes: Vec<Decimal> = results.iter().map(|r| r.max_adverse_excursion_bps).collect();

        let mean_return_bps = returns.iter().copied().sum::<Decimal>() / Decimal::from(count as i64);
        let median_return_bps = decimal_median(returns.clone());
        let median_dd_bps = decimal_median(maes.clone());

        let stop_outs = results.iter().filter(|r| r.stop_out).count();
        let stop_out_rate = Decimal::from(stop_outs as i64) / Decimal::from(count as i64);

        let mean_time_exposed_ms =
            results.iter().map(|r| r.time_exposed_ms).sum::<i64>() / count as i64;

        let tail_captures: Vec<Decimal> = results.iter().filter_map(|r| r.tail_capture).collect();
        let mean_tail_capture = if tail_captures.is_empty() {
            Decimal::ZERO
        } else {
            tail_captures.iter().copied().sum::<Decimal>() / Decimal::from(tail_captures.len() as i64)
        };

        let mae_f64 = to_f64_vec(&maes);
        let p95_drawdown_bps = if mae_f64.is_empty() {
            Decimal::ZERO
        } else {
            let mut data = Data::new(mae_f64);
            // 95th percentile of MAE, most negative tail: p95 of the
            // distribution of (negative) MAE values, i.e. the 5th
            // percentile of magnitude — we take the lower-tail percentile
            // directly since MAE is already signed non-positive.
            Decimal::try_from(data.percentile(5)).unwrap_or(Decimal::ZERO)
        };

        Some(ResultStats {
            count,
            mean_return_bps,
            median_return_bps,
            stop_out_rate,
            p95_drawdown_bps,
            median_dd_bps,
            mean_time_exposed_ms,
            mean_tail_capture,
        })
    }

    pub fn violations(&self, constraints: &ScoringConstraints) -> u32 {
        let mut v = 0;
        if self.stop_out_rate > constraints.max_stop_out_rate {
            v += 1;
        }
        if self.p95_drawdown_bps < constraints.min_p95_drawdown_bps {
            v += 1;
        }
        if self.mean_time_exposed_ms > constraints.max_mean_time_exposed_ms {
            v += 1;
        }
        v
    }

    pub fn is_feasible(&self, constraints: &ScoringConstraints) -> bool {
        self.violations(constraints) == 0
    }

    /// `score = median_return_bps + mean_tail_capture*100 - median_dd_bps/100`,
    /// or infeasible (no numeric score) when any hard constraint is violated.
    pub fn score(&self, constraints: &ScoringConstraints) -> PolicyScore {
        if !self.is_feasible(constraints) {
            return PolicyScore::Infeasible { violations: self.violations(constraints) };
        }
        let value = self.median_return_bps + self.mean_tail_capture * Decimal::from(100)
            - self.median_dd_bps / Decimal::from(100);
        PolicyScore::Feasible(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PolicyScore {
    Feasible(Decimal),
    Infeasible { violations: u32 },
}

impl PolicyScore {
    pub fn is_feasible(&self) -> bool {
        matches!(self, PolicyScore::Feasible(_))
    }
}

/// Total ordering over (stats, score) pairs using a six-step comparator:
/// feasibility, violation count, score, tail capture, median
/// return, median drawdown. Returns `Ordering::Greater` when `a` ranks above
/// `b` (used descending — "better" sorts first).
pub fn compare_policies(a: &ResultStats, b: &ResultStats, constraints: &ScoringConstraints) -> Ordering {
    let score_a = a.score(constraints);
    let score_b = b.score(constraints);

    match (score_a, score_b) {
        (PolicyScore::Feasible(_), PolicyScore::Infeasible { .. }) => Ordering::Greater,
        (PolicyScore::Infeasible { .. }, PolicyScore::Feasible(_)) => Ordering::Less,
        (PolicyScore::Infeasible { violations: va }, PolicyScore::Infeasible { violations: vb }) => {
            // fewer violations is better
            vb.cmp(&va)
        }
        (PolicyScore::Feasible(sa), PolicyScore::Feasible(sb)) => sa
            .cmp(&sb)
            .then_with(|| a.mean_tail_capture.cmp(&b.mean_tail_capture))
            .then_with(|| a.median_return_bps.cmp(&b.median_return_bps))
            .then_with(|| a.median_dd_bps.cmp(&b.median_dd_bps)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::ExitReason;
    use rust_decimal_macros::dec;

    fn result(return_bps: Decimal, mae: Decimal, stop_out: bool, time_ms: i64, tail: Option<Decimal>) -> ExecutionResult {
        ExecutionResult {
            realized_return_bps: return_bps,
            stop_out,
            max_adverse_excursion_bps: mae,
            time_exposed_ms: time_ms,
            tail_capture: tail,
            entry_ts_ms: 0,
            exit_ts_ms: time_ms,
            entry_px: dec!(1.0),
            exit_px: dec!(1.0),
            exit_reason: if stop_out { ExitReason::StopLoss } else { ExitReason::EndOfData },
        }
    }

    #[test]
    fn stats_compute_basic_aggregates() {
        let results = vec![
            result(dec!(100), dec!(-50), false, 1000, Some(dec!(0.5))),
            result(dec!(-200), dec!(-300), true, 2000, Some(dec!(0.1))),
        ];
        let stats = ResultStats::from_executions(&results).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.stop_out_rate, dec!(0.5));
        assert_eq!(stats.mean_time_exposed_ms, 1500);
    }

    #[test]
    fn infeasible_when_stop_out_rate_too_high() {
        let results: Vec<_> = (0..10).map(|_| result(dec!(0), dec!(0), true, 0, None)).collect();
        let stats = ResultStats::from_executions(&results).unwrap();
        let constraints = ScoringConstraints::default();
        assert!(!stats.is_feasible(&constraints));
        assert!(matches!(stats.score(&constraints), PolicyScore::Infeasible { .. }));
    }

    #[test]
    fn feasible_outranks_infeasible() {
        let feasible = ResultStats {
            count: 1,
            mean_return_bps: dec!(10),
            median_return_bps: dec!(10),
            stop_out_rate: dec!(0),
            p95_drawdown_bps: dec!(-10),
            median_dd_bps: dec!(-10),
            mean_time_exposed_ms: 1000,
            mean_tail_capture: dec!(0.5),
        };
        let infeasible = ResultStats {
            stop_out_rate: dec!(0.9),
            ..feasible.clone()
        };
        let constraints = ScoringConstraints::default();
        assert_eq!(compare_policies(&feasible, &infeasible, &constraints), Ordering::Greater);
    }
}
