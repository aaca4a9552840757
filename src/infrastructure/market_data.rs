//! CSV-backed [`MarketDataPort`] implementation.
//!
//! Historical OHLCV lives as one CSV file per `(mint, chain, interval)`
//! under a root directory, matching the layout the CLI's artifacts
//! directory already uses. Reading uses `csv::Reader` directly rather
//! than a database client, since the artifact is already a flat file.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::call::Chain;
use crate::domain::candle::{Candle, CandleInterval};
use crate::domain::errors::PortError;
use crate::domain::ports::{MarketDataPort, PricePoint};

#[derive(Debug, Deserialize)]
struct CandleRow {
    timestamp: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

/// Reads OHLCV from `<root>/<chain>/<interval>/<mint>.csv`. Each file is
/// expected to be pre-sorted ascending by `timestamp`; rows outside
/// `[from_s, to_s]` are filtered out after reading the whole file.
pub struct CsvMarketDataAdapter {
    root: PathBuf,
}

impl CsvMarketDataAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CsvMarketDataAdapter { root: root.into() }
    }

    fn candle_path(&self, token: &str, chain: Chain, interval: CandleInterval) -> PathBuf {
        self.root
            .join(chain.to_string())
            .join(interval.to_string())
            .join(format!("{token}.csv"))
    }
}

fn read_csv(path: &Path) -> Result<Vec<Candle>, PortError> {
    let file = File::open(path).map_err(|e| PortError::MarketDataUnavailable {
        mint: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));
    let mut candles = Vec::new();
    for record in reader.deserialize::<CandleRow>() {
        let row = record.map_err(|e| PortError::MarketDataUnavailable {
            mint: path.display().to_string(),
            reason: e.to_string(),
        })?;
        candles.push(Candle {
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    Ok(candles)
}

impl MarketDataPort for CsvMarketDataAdapter {
    fn fetch_ohlcv(
        &self,
        token: &str,
        chain: Chain,
        interval: CandleInterval,
        from_s: i64,
        to_s: i64,
    ) -> Result<Vec<Candle>, PortError> {
        let path = self.candle_path(token, chain, interval);
        let candles = read_csv(&path)?;
        Ok(candles.into_iter().filter(|c| c.timestamp >= from_s && c.timestamp <= to_s).collect())
    }

    fn fetch_historical_price_at(
        &self,
        token: &str,
        chain: Chain,
        unix_s: i64,
    ) -> Result<Option<PricePoint>, PortError> {
        for interval in CandleInterval::all() {
            let path = self.candle_path(token, chain, *interval);
            if !path.exists() {
                continue;
            }
            let candles = read_csv(&path)?;
            if let Some(c) = candles.iter().rev().find(|c| c.timestamp <= unix_s) {
                return Ok(Some(PricePoint { value: c.close, unix_s: c.timestamp }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile_stub::TempDir;

    /// Minimal drop-cleanup temp directory so these tests don't depend on
    /// an extra dev-dependency for a single adapter's tests.
    mod tempfile_stub {
        use std::path::PathBuf;

        pub struct TempDir {
            path: PathBuf,
        }

        impl TempDir {
            pub fn new(tag: &str) -> Self {
                let path = std::env::temp_dir().join(format!("callbench-test-{tag}-{}", std::process::id()));
                std::fs::create_dir_all(&path).unwrap();
                TempDir { path }
            }

            pub fn path(&self) -> &std::path::Path {
                &self.path
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.path);
            }
        }
    }

    #[test]
    fn fetch_ohlcv_filters_to_requested_window() {
        let dir = TempDir::new("fetch-window");
        let sub = dir.path().join("solana").join("1m");
        std::fs::create_dir_all(&sub).unwrap();
        let mut f = File::create(sub.join("mint1.csv")).unwrap();
        writeln!(f, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(f, "0,1,1,1,1,100").unwrap();
        writeln!(f, "60,1,1.1,0.9,1.0,100").unwrap();
        writeln!(f, "120,1,1.2,0.9,1.1,100").unwrap();
        drop(f);

        let adapter = CsvMarketDataAdapter::new(dir.path());
        let candles = adapter.fetch_ohlcv("mint1", Chain::Solana, CandleInterval::Min1, 60, 120).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 60);
    }

    #[test]
    fn fetch_ohlcv_missing_file_is_unavailable() {
        let dir = TempDir::new("missing-file");
        let adapter = CsvMarketDataAdapter::new(dir.path());
        let result = adapter.fetch_ohlcv("ghost", Chain::Solana, CandleInterval::Min1, 0, 100);
        assert!(result.is_err());
    }

    #[test]
    fn fetch_historical_price_at_returns_last_candle_at_or_before() {
        let dir = TempDir::new("price-at");
        let sub = dir.path().join("solana").join("15s");
        std::fs::create_dir_all(&sub).unwrap();
        let mut f = File::create(sub.join("mint1.csv")).unwrap();
        writeln!(f, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(f, "0,1,1,1,1,100").unwrap();
        writeln!(f, "15,1,1.1,0.9,1.05,100").unwrap();
        drop(f);

        let adapter = CsvMarketDataAdapter::new(dir.path());
        let price = adapter.fetch_historical_price_at("mint1", Chain::Solana, 20).unwrap().unwrap();
        assert_eq!(price.unix_s, 15);
    }
}
