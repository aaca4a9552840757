//! The raw input unit: a single caller's alert on a token.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::CallError;

/// Chain the alerted mint/contract lives on. A closed set, not an open string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Solana,
    Ethereum,
    Base,
    Bsc,
}

impl FromStr for Chain {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "solana" => Ok(Chain::Solana),
            "ethereum" => Ok(Chain::Ethereum),
            "base" => Ok(Chain::Base),
            "bsc" => Ok(Chain::Bsc),
            other => Err(CallError::UnknownChain { given: other.to_string() }),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Chain::Solana => "solana",
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::Bsc => "bsc",
        };
        write!(f, "{s}")
    }
}

/// One caller's alert on one mint at one point in time.
///
/// `alert_price` is optional: some ingestion sources only carry the alert
/// timestamp, in which case the executor resolves an entry from the first
/// causally-visible candle instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub caller_name: String,
    pub mint: String,
    pub chain: Chain,
    pub alert_ts_ms: i64,
    pub alert_price: Option<Decimal>,
}

impl CallRecord {
    pub fn validate(&self) -> Result<(), CallError> {
        if self.call_id.trim().is_empty() {
            return Err(CallError::EmptyField { field: "call_id" });
        }
        if self.caller_name.trim().is_empty() {
            return Err(CallError::EmptyField { field: "caller_name" });
        }
        if self.mint.trim().is_empty() {
            return Err(CallError::EmptyField { field: "mint" });
        }
        if self.alert_ts_ms < 0 {
            return Err(CallError::NegativeTimestamp { call_id: self.call_id.clone() });
        }
        if let Some(p) = self.alert_price {
            if p <= Decimal::ZERO {
                return Err(CallError::NonPositiveAlertPrice { call_id: self.call_id.clone() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> CallRecord {
        CallRecord {
            call_id: "call-1".into(),
            caller_name: "alpha".into(),
            mint: "So111111111111111111111111111111111111112".into(),
            chain: Chain::Solana,
            alert_ts_ms: 1_700_000_000_000,
            alert_price: Some(dec!(0.01)),
        }
    }

    #[test]
    fn valid_call_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_empty_mint() {
        let mut c = sample();
        c.mint.clear();
        assert!(matches!(c.validate(), Err(CallError::EmptyField { field: "mint" })));
    }

    #[test]
    fn rejects_non_positive_alert_price() {
        let mut c = sample();
        c.alert_price = Some(Decimal::ZERO);
        assert!(c.validate().is_err());
    }

    #[test]
    fn chain_roundtrips_through_display_and_fromstr() {
        for chain in [Chain::Solana, Chain::Ethereum, Chain::Base, Chain::Bsc] {
            let s = chain.to_string();
            assert_eq!(Chain::from_str(&s).unwrap(), chain);
        }
    }
}
