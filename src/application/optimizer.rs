//! Grid-search optimizer: enumerates a deterministic policy grid, replays
//! every (policy, call) pair through the executor, scores each policy's
//! result set under the hard-contract comparator, and returns a ranked
//! list plus the best feasible policy.
//!
//! Per-caller partitioning and the grouped re-evaluation heuristic
//! sit on top of the capital simulator's
//! [`V1Params`] rather than the full [`RiskPolicy`] grid, since that is
//! the parameter shape the collapsed/extreme-parameter exclusion heuristic
//! is phrased against (`sl < 0.88`, `tp > 4.0`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::executor::{execute_policy, FeeModel};
use crate::application::simulator::{simulate_portfolio, SimulationReport, V1Params};
use crate::domain::call::CallRecord;
use crate::domain::candle::Candle;
use crate::domain::errors::SimulationFault;
use crate::domain::policy::{IntrabarPolicy, LadderLevel, RiskPolicy};
use crate::domain::portfolio::CapitalConfig;
use crate::domain::scoring::{compare_policies, PolicyScore, ResultStats, ScoringConstraints};

/// The deterministic grid of tunable values, one field group per policy
/// family. Enumeration order within and across families is fixed: sorted
/// by ascending numeric parameter values, then by variant order
/// {FixedStop, TimeStop, TrailingStop, Ladder, Combo}.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSpec {
    pub fixed_stop_pcts: Vec<Decimal>,
    pub fixed_take_profit_pcts: Vec<Option<Decimal>>,
    pub time_stop_max_hold_ms: Vec<i64>,
    pub trailing_activation_pcts: Vec<Decimal>,
    pub trailing_trail_pcts: Vec<Decimal>,
    pub ladder_level_sets: Vec<Vec<LadderLevel>>,
    /// Each combo pairs one fixed-stop pct with one time-stop deadline.
    pub combo_stop_pcts: Vec<Decimal>,
    pub combo_max_hold_ms: Vec<i64>,
}

impl Default for GridSpec {
    fn default() -> Self {
        GridSpec {
            fixed_stop_pcts: vec![Decimal::new(10, 2), Decimal::new(20, 2), Decimal::new(30, 2)],
            fixed_take_profit_pcts: vec![None, Some(Decimal::ONE), Some(Decimal::from(2))],
            time_stop_max_hold_ms: vec![3_600_000, 4 * 3_600_000, 24 * 3_600_000],
            trailing_activation_pcts: vec![Decimal::new(10, 2), Decimal::new(20, 2)],
            trailing_trail_pcts: vec![Decimal::new(10, 2), Decimal::new(15, 2)],
            ladder_level_sets: vec![vec![
                LadderLevel { multiple: Decimal::from(2), fraction: Decimal::new(5, 1) },
                LadderLevel { multiple: Decimal::from(3), fraction: Decimal::new(3, 1) },
                LadderLevel { multiple: Decimal::from(4), fraction: Decimal::new(2, 1) },
            ]],
            combo_stop_pcts: vec![Decimal::new(20, 2)],
            combo_max_hold_ms: vec![4 * 3_600_000],
        }
    }
}

/// Generates every policy in the grid, in a fixed deterministic order,
/// so two runs over the same `GridSpec` always produce the same sequence
/// of canonical IDs.
pub fn enumerate_grid(spec: &GridSpec) -> Vec<RiskPolicy> {
    let mut out = Vec::new();

    let mut stop_pcts = spec.fixed_stop_pcts.clone();
    stop_pcts.sort();
    for stop_pct in &stop_pcts {
        for tp in &spec.fixed_take_profit_pcts {
            out.push(RiskPolicy::FixedStop { stop_pct: *stop_pct, take_profit_pct: *tp });
        }
    }

    let mut holds = spec.time_stop_max_hold_ms.clone();
    holds.sort();
    for max_hold_ms in &holds {
        out.push(RiskPolicy::TimeStop { max_hold_ms: *max_hold_ms, take_profit_pct: None });
    }

    let mut activations = spec.trailing_activation_pcts.clone();
    activations.sort();
    let mut trails = spec.trailing_trail_pcts.clone();
    trails.sort();
    for activation_pct in &activations {
        for trail_pct in &trails {
            out.push(RiskPolicy::TrailingStop {
                activation_pct: *activation_pct,
                trail_pct: *trail_pct,
                hard_stop_pct: None,
            });
        }
    }

    for levels in &spec.ladder_level_sets {
        out.push(RiskPolicy::Ladder {
            levels: levels.clone(),
            stop_pct: None,
            intrabar_policy: IntrabarPolicy::StopFirst,
        });
    }

    let mut combo_stops = spec.combo_stop_pcts.clone();
    combo_stops.sort();
    let mut combo_holds = spec.combo_max_hold_ms.clone();
    combo_holds.sort();
    for stop_pct in &combo_stops {
        for max_hold_ms in &combo_holds {
            out.push(RiskPolicy::Combo {
                policies: vec![
                    RiskPolicy::FixedStop { stop_pct: *stop_pct, take_profit_pct: None },
                    RiskPolicy::TimeStop { max_hold_ms: *max_hold_ms, take_profit_pct: None },
                ],
                intrabar_policy: IntrabarPolicy::StopFirst,
            });
        }
    }

    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub policy_id: String,
    pub policy: RiskPolicy,
    pub stats: Option<ResultStats>,
    pub score: PolicyScore,
}

/// Replays one policy against every call that produced a candle tail,
/// discards `no_entry` results, and scores what's left. Returns `None`
/// only when every call produced `no_entry` (nothing to score).
fn evaluate_policy(
    policy: &RiskPolicy,
    calls: &[CallRecord],
    candles_by_call: &HashMap<String, Vec<Candle>>,
    fees: &FeeModel,
    constraints: &ScoringConstraints,
) -> PolicyEvaluation {
    let results: Vec<_> = calls
        .iter()
        .filter_map(|call| candles_by_call.get(&call.call_id))
        .map(|candles| execute_policy(candles, candles.first().map(|c| c.timestamp * 1000).unwrap_or(0), policy, fees))
        .filter(|r| !r.is_no_entry())
        .collect();

    let stats = ResultStats::from_executions(&results);
    let score = stats
        .as_ref()
        .map(|s| s.score(constraints))
        .unwrap_or(PolicyScore::Infeasible { violations: u32::MAX });

    PolicyEvaluation { policy_id: policy.canonical_id(), policy: policy.clone(), stats, score }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerReport {
    pub ranked: Vec<PolicyEvaluation>,
    pub evaluated_count: usize,
    pub cancelled: bool,
}

impl OptimizerReport {
    pub fn best_feasible(&self) -> Option<&PolicyEvaluation> {
        self.ranked.iter().find(|e| e.score.is_feasible())
    }
}

/// Runs the full grid against `calls`/`candles_by_call`, fanning the
/// (policy, call) work out across a thread pool (one policy per task, each
/// task pure and disjoint) and aggregating with a single deterministic sort
/// afterward. `cancel` is polled once per policy, never
/// mid-candle.
pub fn run_optimizer(
    calls: &[CallRecord],
    candles_by_call: &HashMap<String, Vec<Candle>>,
    grid: &GridSpec,
    fees: &FeeModel,
    constraints: &ScoringConstraints,
    cancel: &AtomicBool,
) -> OptimizerReport {
    let policies = enumerate_grid(grid);

    let evaluations: Vec<PolicyEvaluation> = policies
        .par_iter()
        .map_while(|policy| {
            if cancel.load(Ordering::Relaxed) {
                None
            } else {
                Some(evaluate_policy(policy, calls, candles_by_call, fees, constraints))
            }
        })
        .collect();

    let cancelled = evaluations.len() < policies.len();
    let evaluated_count = evaluations.len();

    let mut ranked = evaluations;
    ranked.sort_by(|a, b| {
        match (&a.stats, &b.stats) {
            (Some(sa), Some(sb)) => compare_policies(sa, sb, constraints).reverse(),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });

    OptimizerReport { ranked, evaluated_count, cancelled }
}

/// Splits `calls` by `caller_name`, preserving each partition's relative
/// order, so the grid can be run independently per caller.
pub fn partition_by_caller(calls: &[CallRecord]) -> HashMap<String, Vec<CallRecord>> {
    let mut out: HashMap<String, Vec<CallRecord>> = HashMap::new();
    for call in calls {
        out.entry(call.caller_name.clone()).or_default().push(call.clone());
    }
    out
}

/// Runs the grid independently over every caller partition and returns the
/// best feasible policy found for each. Callers with no feasible policy
/// are omitted.
pub fn optimize_per_caller(
    calls: &[CallRecord],
    candles_by_call: &HashMap<String, Vec<Candle>>,
    grid: &GridSpec,
    fees: &FeeModel,
    constraints: &ScoringConstraints,
) -> HashMap<String, OptimizerReport> {
    let partitions = partition_by_caller(calls);
    let cancel = AtomicBool::new(false);
    partitions
        .into_iter()
        .map(|(caller, calls)| {
            let report = run_optimizer(&calls, candles_by_call, grid, fees, constraints, &cancel);
            (caller, report)
        })
        .collect()
}

/// Default heuristics for "collapsed" (best run lost money) and
/// "extreme-parameter" callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroupedReoptimizeHeuristics {
    pub min_sl_mult: Decimal,
    pub max_tp_mult: Decimal,
}

impl Default for GroupedReoptimizeHeuristics {
    fn default() -> Self {
        GroupedReoptimizeHeuristics { min_sl_mult: Decimal::new(88, 2), max_tp_mult: Decimal::from(4) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerBestV1 {
    pub caller: String,
    pub v1: V1Params,
    pub final_capital: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedReoptimizationReport {
    pub survivors: Vec<CallerBestV1>,
    pub excluded_collapsed: Vec<String>,
    pub excluded_extreme: Vec<String>,
    pub averaged_v1: Option<V1Params>,
    pub grouped_simulation: Option<SimulationReport>,
}

fn average_v1(survivors: &[CallerBestV1]) -> Option<V1Params> {
    if survivors.is_empty() {
        return None;
    }
    let n = Decimal::from(survivors.len() as i64);
    let tp_mult = survivors.iter().map(|s| s.v1.tp_mult).sum::<Decimal>() / n;
    let sl_mult = survivors.iter().map(|s| s.v1.sl_mult).sum::<Decimal>() / n;
    let max_hold_hrs = survivors.iter().map(|s| s.v1.max_hold_hrs).sum::<Decimal>() / n;
    Some(V1Params { tp_mult, sl_mult, max_hold_hrs })
}

/// Filters per-caller best [`V1Params`] down to "survivors" — callers whose
/// best run beat `C0` and whose parameters aren't extreme outliers — then
/// reruns one grouped simulation over every call using the survivors'
/// averaged parameters.
pub fn grouped_reoptimize(
    per_caller_best: &[CallerBestV1],
    all_calls: &[CallRecord],
    candles_by_call: &HashMap<String, Vec<Candle>>,
    capital_config: &CapitalConfig,
    heuristics: GroupedReoptimizeHeuristics,
) -> Result<GroupedReoptimizationReport, SimulationFault> {
    let mut survivors = Vec::new();
    let mut excluded_collapsed = Vec::new();
    let mut excluded_extreme = Vec::new();

    for entry in per_caller_best {
        if entry.final_capital < capital_config.initial_capital {
            excluded_collapsed.push(entry.caller.clone());
            continue;
        }
        if entry.v1.sl_mult < heuristics.min_sl_mult || entry.v1.tp_mult > heuristics.max_tp_mult {
            excluded_extreme.push(entry.caller.clone());
            continue;
        }
        survivors.push(entry.clone());
    }

    let averaged_v1 = average_v1(&survivors);
    let grouped_simulation = match &averaged_v1 {
        Some(v1) => Some(simulate_portfolio(all_calls, candles_by_call, v1, capital_config)?),
        None => None,
    };

    Ok(GroupedReoptimizationReport {
        survivors,
        excluded_collapsed,
        excluded_extreme,
        averaged_v1,
        grouped_simulation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::Chain;
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

    fn call(id: &str, caller: &str) -> CallRecord {
        CallRecord {
            call_id: id.into(),
            caller_name: caller.into(),
            mint: id.into(),
            chain: Chain::Solana,
            alert_ts_ms: 0,
            alert_price: None,
        }
    }

    #[test]
    fn enumerate_grid_has_no_duplicate_canonical_ids() {
        let grid = GridSpec::default();
        let policies = enumerate_grid(&grid);
        let mut ids: Vec<String> = policies.iter().map(|p| p.canonical_id()).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn enumerate_grid_is_deterministic_across_calls() {
        let grid = GridSpec::default();
        let a: Vec<String> = enumerate_grid(&grid).iter().map(|p| p.canonical_id()).collect();
        let b: Vec<String> = enumerate_grid(&grid).iter().map(|p| p.canonical_id()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn run_optimizer_ranks_feasible_above_infeasible() {
        let calls = vec![call("c1", "alpha"), call("c2", "alpha")];
        let mut candles_by_call = HashMap::new();
        candles_by_call.insert(
            "c1".to_string(),
            vec![candle(0, 1.0, 1.0, 1.0, 1.0), candle(60, 1.0, 2.1, 0.95, 2.0)],
        );
        candles_by_call.insert(
            "c2".to_string(),
            vec![candle(0, 1.0, 1.0, 1.0, 1.0), candle(60, 1.0, 1.1, 0.5, 0.9)],
        );
        let grid = GridSpec::default();
        let fees = FeeModel { taker_fee_bps: dec!(10), slippage_bps: dec!(5) };
        let constraints = ScoringConstraints::default();
        let cancel = AtomicBool::new(false);
        let report = run_optimizer(&calls, &candles_by_call, &grid, &fees, &constraints, &cancel);
        assert_eq!(report.evaluated_count, enumerate_grid(&grid).len());
        assert!(!report.cancelled);
        // best-ranked entry (if any feasible exists) must never rank below an infeasible one.
        if let Some(best) = report.ranked.first() {
            assert!(best.score.is_feasible() || report.ranked.iter().all(|e| !e.score.is_feasible()));
        }
    }

    #[test]
    fn partition_by_caller_groups_correctly() {
        let calls = vec![call("c1", "alpha"), call("c2", "beta"), call("c3", "alpha")];
        let parts = partition_by_caller(&calls);
        assert_eq!(parts.get("alpha").unwrap().len(), 2);
        assert_eq!(parts.get("beta").unwrap().len(), 1);
    }

    #[test]
    fn grouped_reoptimize_excludes_collapsed_and_extreme_callers() {
        let config = CapitalConfig::default();
        let survivors_input = vec![
            CallerBestV1 {
                caller: "good".into(),
                v1: V1Params { tp_mult: dec!(2.0), sl_mult: dec!(0.9), max_hold_hrs: dec!(4) },
                final_capital: config.initial_capital + dec!(500),
            },
            CallerBestV1 {
                caller: "collapsed".into(),
                v1: V1Params { tp_mult: dec!(2.0), sl_mult: dec!(0.9), max_hold_hrs: dec!(4) },
                final_capital: config.initial_capital - dec!(500),
            },
            CallerBestV1 {
                caller: "extreme".into(),
                v1: V1Params { tp_mult: dec!(5.0), sl_mult: dec!(0.9), max_hold_hrs: dec!(4) },
                final_capital: config.initial_capital + dec!(100),
            },
        ];
        let calls = vec![call("c1", "good")];
        let mut candles_by_call = HashMap::new();
        candles_by_call.insert("c1".to_string(), vec![candle(0, 1.0, 1.0, 1.0, 1.0), candle(60, 1.0, 2.1, 0.95, 2.0)]);

        let report = grouped_reoptimize(
            &survivors_input,
            &calls,
            &candles_by_call,
            &config,
            GroupedReoptimizeHeuristics::default(),
        )
        .unwrap();

        assert_eq!(report.survivors.len(), 1);
        assert_eq!(report.excluded_collapsed, vec!["collapsed".to_string()]);
        assert_eq!(report.excluded_extreme, vec!["extreme".to_string()]);
        assert!(report.grouped_simulation.is_some());
    }
}
