//! Truth-layer path metrics: what happened to a call's price, independent
//! of any risk policy.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::call::{Chain, CallRecord};
use crate::domain::candle::{Candle, CandleInterval};

/// Default activity threshold used for `alert_to_activity_ms` when the
/// caller doesn't override it: 50 bps of cumulative move from the alert
/// price.
pub const DEFAULT_ACTIVITY_THRESHOLD_BPS: i64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMetricsRow {
    pub run_id: String,
    pub call_id: String,
    pub caller: String,
    pub mint: String,
    pub chain: Chain,
    pub interval: CandleInterval,
    pub alert_ts_ms: i64,
    pub p0: Decimal,
    pub hit_2x: bool,
    pub t_2x_ms: Option<i64>,
    pub hit_3x: bool,
    pub t_3x_ms: Option<i64>,
    pub hit_4x: bool,
    pub t_4x_ms: Option<i64>,
    pub dd_bps: Decimal,
    pub dd_to_2x_bps: Option<Decimal>,
    pub alert_to_activity_ms: Option<i64>,
    pub peak_multiple: Decimal,
}

fn low_return_bps(p0: Decimal, low: Decimal) -> Decimal {
    (low / p0 - Decimal::ONE) * Decimal::from(10_000)
}

/// Finds the first candle with close-ms timestamp >= alert_ts_ms. Path
/// metrics only ever look forward from the alert and never inspect a policy.
fn find_entry(candles: &[Candle], alert_ts_ms: i64) -> Option<usize> {
    candles.iter().position(|c| c.timestamp * 1000 >= alert_ts_ms)
}

/// Computes truth-layer metrics for one call given its full post-alert
/// candle tail. Returns `None` when there is no candle at or after the
/// alert — the caller should simply omit the row (there is no `no_entry`
/// concept at the truth layer, only absence of a row).
pub fn compute_path_metrics(
    run_id: &str,
    call: &CallRecord,
    candles: &[Candle],
    interval: CandleInterval,
    activity_threshold_bps: i64,
) -> Option<PathMetricsRow> {
    let entry_idx = find_entry(candles, call.alert_ts_ms)?;
    let tail = &candles[entry_idx..];
    let p0 = tail[0].close;
    if p0 <= Decimal::ZERO {
        return None;
    }

    let mut peak_high = tail[0].high;
    let mut dd_bps = low_return_bps(p0, tail[0].low);

    let mut hit = [false; 3]; // 2x, 3x, 4x
    let mut t_hit_ms: [Option<i64>; 3] = [None; 3];
    let mut dd_to_2x_bps: Option<Decimal> = None;
    let mut alert_to_activity_ms: Option<i64> = None;

    let threshold_ratio = activity_threshold_bps as f64 / 10_000.0;

    for c in tail {
        peak_high = peak_high.max(c.high);
        let lr = low_return_bps(p0, c.low);
        dd_bps = dd_bps.min(lr);

        for (i, k) in [2u32, 3, 4].into_iter().enumerate() {
            if !hit[i] && c.high >= p0 * Decimal::from(k) {
                hit[i] = true;
                t_hit_ms[i] = Some(c.timestamp * 1000 - call.alert_ts_ms);
            }
        }

        if t_hit_ms[0].is_none() {
            // still accumulating drawdown observed strictly before the 2x hit
            dd_to_2x_bps = Some(dd_to_2x_bps.map_or(lr, |acc: Decimal| acc.min(lr)));
        }

        if alert_to_activity_ms.is_none() {
            if let (Some(close_f), Some(p0_f)) = (c.close.to_f64(), p0.to_f64()) {
                if p0_f > 0.0 && close_f > 0.0 {
                    let log_return = (close_f / p0_f).ln();
                    if log_return.abs() > threshold_ratio {
                        alert_to_activity_ms = Some(c.timestamp * 1000 - call.alert_ts_ms);
                    }
                }
            }
        }
    }

    // dd_to_2x_bps is only meaningful if 2x was actually hit.
    let dd_to_2x_bps = if hit[0] { dd_to_2x_bps } else { None };

    Some(PathMetricsRow {
        run_id: run_id.to_string(),
        call_id: call.call_id.clone(),
        caller: call.caller_name.clone(),
        mint: call.mint.clone(),
        chain: call.chain,
        interval,
        alert_ts_ms: call.alert_ts_ms,
        p0,
        hit_2x: hit[0],
        t_2x_ms: t_hit_ms[0],
        hit_3x: hit[1],
        t_3x_ms: t_hit_ms[1],
        hit_4x: hit[2],
        t_4x_ms: t_hit_ms[2],
        dd_bps,
        dd_to_2x_bps,
        alert_to_activity_ms,
        peak_multiple: peak_high / p0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn call() -> CallRecord {
        CallRecord {
            call_id: "c1".into(),
            caller_name: "alpha".into(),
            mint: "mint1".into(),
            chain: Chain::Solana,
            alert_ts_ms: 0,
            alert_price: None,
        }
    }

    #[test]
    fn no_entry_candle_returns_none() {
        let candles = vec![candle(-10, 1.0, 1.0, 1.0, 1.0)];
        let mut c = call();
        c.alert_ts_ms = 5_000; // alert after the only candle
        assert!(compute_path_metrics("run", &c, &candles, CandleInterval::Min1, 50).is_none());
    }

    #[test]
    fn hits_2x_and_records_time() {
        let candles = vec![
            candle(0, 1.0, 1.0, 0.9, 1.0),
            candle(60, 1.0, 2.1, 0.95, 2.0),
        ];
        let row = compute_path_metrics("run", &call(), &candles, CandleInterval::Min1, 50).unwrap();
        assert!(row.hit_2x);
        assert_eq!(row.t_2x_ms, Some(60_000));
        assert!(!row.hit_3x);
        assert_eq!(row.peak_multiple, dec!(2.1));
    }

    #[test]
    fn dd_to_2x_only_set_when_2x_hit() {
        let candles = vec![candle(0, 1.0, 1.05, 0.75, 1.0)];
        let row = compute_path_metrics("run", &call(), &candles, CandleInterval::Min1, 50).unwrap();
        assert!(!row.hit_2x);
        assert!(row.dd_to_2x_bps.is_none());
        assert_eq!(row.dd_bps, dec!(-2500));
    }
}
