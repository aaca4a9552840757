//! Immutable OHLCV candles and the causal accessor that replays them.
//!
//! The accessor is the only thing in this crate allowed to decide "what was
//! visible at time t" — every other component receives already-bounded
//! slices from it, so the future-scramble invariant (spec §4.1 / §8.1) only
//! has to be proven once, here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::CandleError;

/// Closed set of supported candle granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleInterval {
    Sec15,
    Min1,
    Min5,
    Min15,
    Hour1,
}

impl CandleInterval {
    pub fn interval_seconds(&self) -> i64 {
        match self {
            CandleInterval::Sec15 => 15,
            CandleInterval::Min1 => 60,
            CandleInterval::Min5 => 300,
            CandleInterval::Min15 => 900,
            CandleInterval::Hour1 => 3600,
        }
    }

    pub fn all() -> &'static [CandleInterval] {
        &[
            CandleInterval::Sec15,
            CandleInterval::Min1,
            CandleInterval::Min5,
            CandleInterval::Min15,
            CandleInterval::Hour1,
        ]
    }
}

impl FromStr for CandleInterval {
    type Err = CandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "15s" => Ok(CandleInterval::Sec15),
            "1m" => Ok(CandleInterval::Min1),
            "5m" => Ok(CandleInterval::Min5),
            "15m" => Ok(CandleInterval::Min15),
            "1h" => Ok(CandleInterval::Hour1),
            other => Err(CandleError::InvalidInterval {
                given: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandleInterval::Sec15 => "15s",
            CandleInterval::Min1 => "1m",
            CandleInterval::Min5 => "5m",
            CandleInterval::Min15 => "15m",
            CandleInterval::Hour1 => "1h",
        };
        write!(f, "{s}")
    }
}

/// A single immutable OHLCV bucket. `timestamp` is the candle's open time in
/// whole seconds UTC; it closes at `timestamp + interval.interval_seconds()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Validates the OHLC ordering invariant: low <= min(open,close) <=
    /// max(open,close) <= high, plus strictly-positive finite prices.
    pub fn validate(&self) -> Result<(), CandleError> {
        if self.open <= Decimal::ZERO || self.close <= Decimal::ZERO {
            return Err(CandleError::NonPositivePrice { timestamp: self.timestamp });
        }
        if self.volume < Decimal::ZERO {
            return Err(CandleError::NegativeVolume { timestamp: self.timestamp });
        }
        let body_lo = self.open.min(self.close);
        let body_hi = self.open.max(self.close);
        if !(self.low <= body_lo && body_hi <= self.high) {
            return Err(CandleError::InconsistentWicks { timestamp: self.timestamp });
        }
        Ok(())
    }

    pub fn close_time(&self, interval: CandleInterval) -> i64 {
        self.timestamp + interval.interval_seconds()
    }
}

/// Causal, read-only view over a chronologically sorted candle array for a
/// single mint/interval. Owns the array; queries return bounded slices.
///
/// Construction validates strictly increasing timestamps (spec §6:
/// "candles with strictly increasing timestamps") and per-candle OHLC
/// invariants up front, so every later query is infallible.
#[derive(Debug, Clone)]
pub struct CausalCandleAccessor {
    interval: CandleInterval,
    candles: Vec<Candle>,
}

impl CausalCandleAccessor {
    pub fn new(interval: CandleInterval, candles: Vec<Candle>) -> Result<Self, CandleError> {
        for c in &candles {
            c.validate()?;
        }
        for pair in candles.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(CandleError::NonMonotonicTimestamps {
                    at: pair[1].timestamp,
                });
            }
        }
        Ok(Self { interval, candles })
    }

    pub fn interval(&self) -> CandleInterval {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// All candles whose close time is <= `simulation_time_s` and whose open
    /// time is >= `simulation_time_s - lookback_s`. No partially-formed
    /// candle is ever returned, by construction (we never require a candle
    /// "in progress" — only closed ones already materialized in `candles`).
    pub fn candles_at(&self, simulation_time_s: i64, lookback_s: i64) -> &[Candle] {
        let interval_s = self.interval.interval_seconds();
        let lo = simulation_time_s - lookback_s;
        let start = self
            .candles
            .partition_point(|c| c.timestamp < lo);
        let end = self
            .candles
            .partition_point(|c| c.timestamp + interval_s <= simulation_time_s);
        &self.candles[start..end]
    }

    /// The most recent closed candle at or before `simulation_time_s`, if any.
    pub fn last_closed(&self, simulation_time_s: i64) -> Option<&Candle> {
        let interval_s = self.interval.interval_seconds();
        let end = self
            .candles
            .partition_point(|c| c.timestamp + interval_s <= simulation_time_s);
        if end == 0 { None } else { Some(&self.candles[end - 1]) }
    }

    /// All candles at or after `alert_ts_ms` (milliseconds), chronological.
    /// Used by the path-metrics computer and policy executor, both of which
    /// only ever look forward from the alert.
    pub fn from_alert(&self, alert_ts_ms: i64) -> &[Candle] {
        let alert_ts_s_ceiling = alert_ts_ms.div_euclid(1000)
            + if alert_ts_ms.rem_euclid(1000) != 0 { 1 } else { 0 };
        let start = self
            .candles
            .partition_point(|c| c.timestamp < alert_ts_s_ceiling);
        &self.candles[start..]
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn c(ts: i64, o: f64, h: f64, l: f64, cl: f64) -> Candle {
        Candle {
            timestamp: ts,
            open: Decimal::try_from(o).unwrap(),
            high: Decimal::try_from(h).unwrap(),
            low: Decimal::try_from(l).unwrap(),
            close: Decimal::try_from(cl).unwrap(),
            volume: dec!(100),
        }
    }

    #[test]
    fn rejects_inconsistent_wicks() {
        let bad = c(0, 1.0, 0.5, 0.0, 1.0); // high < open
        assert!(bad.validate().is_err());
    }

    #[test]
    fn rejects_non_monotonic_timestamps() {
        let candles = vec![c(100, 1.0, 1.0, 1.0, 1.0), c(100, 1.0, 1.0, 1.0, 1.0)];
        assert!(CausalCandleAccessor::new(CandleInterval::Min1, candles).is_err());
    }

    #[test]
    fn candles_at_excludes_forming_and_future() {
        let candles = vec![c(0, 1.0, 1.0, 1.0, 1.0), c(60, 1.0, 1.0, 1.0, 1.0), c(120, 1.0, 1.0, 1.0, 1.0)];
        let acc = CausalCandleAccessor::new(CandleInterval::Min1, candles).unwrap();
        // At t=90, candle [60,120) hasn't closed yet (closes at 120).
        let view = acc.candles_at(90, 1000);
        assert_eq!(view.len(), 2);
        assert_eq!(view.last().unwrap().timestamp, 60);
    }

    #[test]
    fn future_scramble_invariance() {
        let shared = vec![c(0, 1.0, 1.0, 1.0, 1.0), c(60, 1.0, 1.0, 1.0, 1.0)];
        let mut a = shared.clone();
        let mut b = shared.clone();
        // Both arrays agree up to close time 120; scramble what comes after.
        a.push(c(120, 1.0, 9.0, 1.0, 1.0));
        b.push(c(120, 1.0, 1.0, 0.1, 1.0));
        let acc_a = CausalCandleAccessor::new(CandleInterval::Min1, a).unwrap();
        let acc_b = CausalCandleAccessor::new(CandleInterval::Min1, b).unwrap();
        assert_eq!(acc_a.candles_at(120, 1000), acc_b.candles_at(120, 1000));
        assert_eq!(acc_a.last_closed(120), acc_b.last_closed(120));
    }

    #[test]
    fn last_closed_none_before_first_close() {
        let candles = vec![c(0, 1.0, 1.0, 1.0, 1.0)];
        let acc = CausalCandleAccessor::new(CandleInterval::Min1, candles).unwrap();
        assert!(acc.last_closed(30).is_none());
        assert!(acc.last_closed(60).is_some());
    }
}
