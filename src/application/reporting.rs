//! Console and file reporting for optimizer and simulation output.
//!
//! Deliberately a plain `println!`/`write!` formatter rather than a table
//! crate: the CLI's `--format table|json|csv` surface only needs fixed-width
//! columns over a grid search's ranked results.

use std::fmt::Write as _;
use std::io;

use serde::Serialize;

use crate::application::optimizer::{OptimizerReport, PolicyEvaluation};
use crate::domain::scoring::PolicyScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

fn score_value(score: &PolicyScore) -> String {
    match score {
        PolicyScore::Feasible(v) => v.to_string(),
        PolicyScore::Infeasible { violations } => format!("infeasible({violations})"),
    }
}

/// Prints the grid header banner before a run starts.
pub fn print_header(command: &str, run_id: &str, policy_count: usize) {
    println!("{}", "=".repeat(72));
    println!("POLICY GRID SEARCH");
    println!("{}", "=".repeat(72));
    println!("command:  {command}");
    println!("run_id:   {run_id}");
    println!("policies: {policy_count}");
    println!("{}", "=".repeat(72));
}

/// Renders an [`OptimizerReport`] in the requested format and returns the
/// rendered text (callers write it to stdout or a file as needed).
pub fn render_report(report: &OptimizerReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => render_table(report),
        OutputFormat::Json => render_json(report),
        OutputFormat::Csv => render_csv(report),
    }
}

fn render_table(report: &OptimizerReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "-".repeat(90));
    let _ = writeln!(
        out,
        "{:<4} | {:<40} | {:>8} | {:>10} | {:>12}",
        "#", "policy_id", "count", "stop_out%", "score"
    );
    let _ = writeln!(out, "{}", "-".repeat(90));
    for (i, eval) in report.ranked.iter().enumerate() {
        let count = eval.stats.as_ref().map(|s| s.count).unwrap_or(0);
        let stop_out = eval
            .stats
            .as_ref()
            .map(|s| (s.stop_out_rate * rust_decimal::Decimal::from(100)).to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<4} | {:<40} | {:>8} | {:>10} | {:>12}",
            i + 1,
            eval.policy_id,
            count,
            stop_out,
            score_value(&eval.score)
        );
    }
    let _ = writeln!(out, "{}", "-".repeat(90));
    let _ = writeln!(
        out,
        "evaluated: {}{}",
        report.evaluated_count,
        if report.cancelled { " (cancelled early)" } else { "" }
    );
    out
}

fn render_json(report: &OptimizerReport) -> String {
    #[derive(Serialize)]
    struct Envelope<'a> {
        evaluated_count: usize,
        cancelled: bool,
        ranked: &'a [PolicyEvaluation],
    }
    let envelope =
        Envelope { evaluated_count: report.evaluated_count, cancelled: report.cancelled, ranked: &report.ranked };
    serde_json::to_string_pretty(&envelope).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

fn render_csv(report: &OptimizerReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "rank,policy_id,count,stop_out_rate,score");
    for (i, eval) in report.ranked.iter().enumerate() {
        let count = eval.stats.as_ref().map(|s| s.count).unwrap_or(0);
        let stop_out =
            eval.stats.as_ref().map(|s| s.stop_out_rate.to_string()).unwrap_or_default();
        let _ = writeln!(out, "{},{},{},{},{}", i + 1, eval.policy_id, count, stop_out, score_value(&eval.score));
    }
    out
}

/// Writes `rendered` to `path` (or stdout when `path` is `None`), creating
/// any missing parent directories first.
pub fn write_output(rendered: &str, path: Option<&std::path::Path>) -> io::Result<()> {
    match path {
        Some(p) => {
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(p, rendered)
        }
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}

/// Prints the best feasible policy, or a message when none qualified.
pub fn print_best(best: Option<&PolicyEvaluation>) {
    match best {
        Some(eval) => {
            println!("best feasible policy: {}", eval.policy_id);
            println!("  score: {}", score_value(&eval.score));
            if let Some(stats) = &eval.stats {
                println!("  count:              {}", stats.count);
                println!("  mean_return_bps:    {}", stats.mean_return_bps);
                println!("  median_return_bps:  {}", stats.median_return_bps);
                println!("  stop_out_rate:      {}", stats.stop_out_rate);
                println!("  p95_drawdown_bps:   {}", stats.p95_drawdown_bps);
            }
        }
        None => println!("no feasible policy found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;

    use crate::application::executor::FeeModel;
    use crate::application::optimizer::{run_optimizer, GridSpec};
    use crate::domain::call::{CallRecord, Chain};
    use crate::domain::candle::Candle;
    use crate::domain::scoring::ScoringConstraints;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn sample_report() -> OptimizerReport {
        let calls = vec![CallRecord {
            call_id: "c1".into(),
            caller_name: "alpha".into(),
            mint: "c1".into(),
            chain: Chain::Solana,
            alert_ts_ms: 0,
            alert_price: None,
        }];
        let mut candles_by_call = HashMap::new();
        candles_by_call.insert(
            "c1".to_string(),
            vec![
                Candle { timestamp: 0, open: dec!(1), high: dec!(1), low: dec!(1), close: dec!(1), volume: dec!(1000) },
                Candle { timestamp: 60, open: dec!(1), high: dec!(2.1), low: dec!(0.95), close: dec!(2.0), volume: dec!(1000) },
            ],
        );
        let grid = GridSpec::default();
        let fees = FeeModel { taker_fee_bps: Decimal::ZERO, slippage_bps: Decimal::ZERO };
        let constraints = ScoringConstraints::default();
        let cancel = AtomicBool::new(false);
        run_optimizer(&calls, &candles_by_call, &grid, &fees, &constraints, &cancel)
    }

    #[test]
    fn table_format_lists_every_policy() {
        let report = sample_report();
        let rendered = render_report(&report, OutputFormat::Table);
        assert!(rendered.contains("policy_id"));
        assert!(rendered.contains(&format!("evaluated: {}", report.evaluated_count)));
    }

    #[test]
    fn json_format_round_trips_through_serde_value() {
        let report = sample_report();
        let rendered = render_report(&report, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["evaluated_count"].as_u64().unwrap() as usize, report.evaluated_count);
    }

    #[test]
    fn csv_format_has_header_and_one_row_per_policy() {
        let report = sample_report();
        let rendered = render_report(&report, OutputFormat::Csv);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "rank,policy_id,count,stop_out_rate,score");
        assert_eq!(lines.len() - 1, report.ranked.len());
    }

    #[test]
    fn parses_known_format_strings() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
