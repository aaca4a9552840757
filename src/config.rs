//! Environment-driven configuration, loaded once at binary start and never
//! re-read mid-run. Every field has a sensible default; invalid values fail
//! fast with a descriptive `anyhow::bail!` rather than silently falling back.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::application::executor::FeeModel;
use crate::application::optimizer::GridSpec;
use crate::domain::portfolio::CapitalConfig;
use crate::domain::scoring::ScoringConstraints;

fn env_decimal(key: &str, default: Decimal) -> Result<Decimal> {
    match env::var(key) {
        Ok(v) => Decimal::from_str(&v).with_context(|| format!("invalid {key}: {v}")),
        Err(_) => Ok(default),
    }
}

fn env_i64(key: &str, default: i64) -> Result<i64> {
    match env::var(key) {
        Ok(v) => v.parse::<i64>().with_context(|| format!("invalid {key}: {v}")),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(v) => v.parse::<usize>().with_context(|| format!("invalid {key}: {v}")),
        Err(_) => Ok(default),
    }
}

/// Storage and provider endpoints, loaded from the environment.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub duckdb_path: String,
    pub clickhouse_url: Option<String>,
    pub artifacts_dir: PathBuf,
}

impl StorageConfig {
    fn from_env() -> Result<Self> {
        let duckdb_path = env::var("DUCKDB_PATH").unwrap_or_else(|_| "artifacts/calls.duckdb".to_string());
        let clickhouse_url = env::var("CLICKHOUSE_URL").ok();
        let artifacts_dir = env::var("ARTIFACTS_DIR").unwrap_or_else(|_| "./artifacts".to_string()).into();
        Ok(StorageConfig { duckdb_path, clickhouse_url, artifacts_dir })
    }
}

/// Third-party market-data API credentials. Both are optional: a crate
/// build without them can still run entirely off locally cached CSVs.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub birdeye_api_key: Option<String>,
    pub helius_api_key: Option<String>,
}

impl ProviderConfig {
    fn from_env() -> Self {
        ProviderConfig {
            birdeye_api_key: env::var("BIRDEYE_API_KEY").ok(),
            helius_api_key: env::var("HELIUS_API_KEY").ok(),
        }
    }
}

/// Top-level configuration, assembled once in `main` and passed down by
/// reference. Never read from the environment again after construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub providers: ProviderConfig,
    pub fees: FeeModel,
    pub capital: CapitalConfig,
    pub scoring: ScoringConstraints,
    pub grid: GridSpec,
    pub default_output_format: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let storage = StorageConfig::from_env()?;
        let providers = ProviderConfig::from_env();

        let fees = FeeModel {
            taker_fee_bps: env_decimal("TAKER_FEE_BPS", Decimal::from(30))?,
            slippage_bps: env_decimal("SLIPPAGE_BPS", Decimal::from(10))?,
        };

        let capital = CapitalConfig {
            initial_capital: env_decimal("INITIAL_CAPITAL", Decimal::from(10_000))?,
            max_allocation_pct: env_decimal("MAX_ALLOCATION_PCT", Decimal::new(4, 2))?,
            max_risk_usd: env_decimal("MAX_RISK_USD", Decimal::from(200))?,
            max_concurrent: env_usize("MAX_CONCURRENT", 25)?,
        };

        let scoring = ScoringConstraints {
            max_stop_out_rate: env_decimal("MAX_STOP_OUT_RATE", Decimal::new(30, 2))?,
            min_p95_drawdown_bps: env_decimal("MIN_P95_DRAWDOWN_BPS", Decimal::from(-3000))?,
            max_mean_time_exposed_ms: env_i64("MAX_MEAN_TIME_EXPOSED_MS", 4 * 3_600_000)?,
        };

        let default_output_format = env::var("DEFAULT_OUTPUT_FORMAT").unwrap_or_else(|_| "table".to_string());
        if default_output_format.parse::<crate::application::reporting::OutputFormat>().is_err() {
            bail!("invalid DEFAULT_OUTPUT_FORMAT: {default_output_format}");
        }

        if capital.initial_capital <= Decimal::ZERO {
            bail!("INITIAL_CAPITAL must be positive");
        }
        if capital.max_concurrent == 0 {
            bail!("MAX_CONCURRENT must be at least 1");
        }

        Ok(Config {
            storage,
            providers,
            fees,
            capital,
            scoring,
            grid: GridSpec::default(),
            default_output_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `std::env` is process-global; serialize tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_load_without_any_env_vars_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("INITIAL_CAPITAL");
        env::remove_var("MAX_CONCURRENT");
        let config = Config::from_env().unwrap();
        assert_eq!(config.capital.initial_capital, Decimal::from(10_000));
        assert_eq!(config.capital.max_concurrent, 25);
    }

    #[test]
    fn rejects_non_positive_initial_capital() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("INITIAL_CAPITAL", "0");
        let result = Config::from_env();
        env::remove_var("INITIAL_CAPITAL");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_decimal() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("TAKER_FEE_BPS", "not-a-number");
        let result = Config::from_env();
        env::remove_var("TAKER_FEE_BPS");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_output_format() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("DEFAULT_OUTPUT_FORMAT", "xml");
        let result = Config::from_env();
        env::remove_var("DEFAULT_OUTPUT_FORMAT");
        assert!(result.is_err());
    }
}
