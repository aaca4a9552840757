//! The risk-policy model: a tagged sum of exit strategies, each with a
//! total validation function and a canonical string ID.
//!
//! Canonical IDs are the storage key for a policy across a sweep, so the
//! serialization here must be total and collision-free: same parameters
//! always produce the same string, different parameters (almost) always
//! produce different strings. See `canonical_id` on each variant.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::PolicyError;

/// Intrabar tie-break when a candle's high and low would both trigger an
/// exit within the same bar. Default is `StopFirst` (conservative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IntrabarPolicy {
    #[default]
    StopFirst,
    TakeProfitFirst,
    HighThenLow,
    LowThenHigh,
}

pub const MAX_COMBO_DEPTH: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderLevel {
    pub multiple: Decimal,
    pub fraction: Decimal,
}

impl LadderLevel {
    fn validate(&self) -> Result<(), PolicyError> {
        if self.multiple <= Decimal::ZERO {
            return Err(PolicyError::NonPositive { field: "ladder level multiple", value: self.multiple.to_string() });
        }
        if self.fraction < Decimal::ZERO || self.fraction > Decimal::ONE {
            return Err(PolicyError::Negative { field: "ladder level fraction", value: self.fraction.to_string() });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RiskPolicy {
    FixedStop {
        stop_pct: Decimal,
        take_profit_pct: Option<Decimal>,
    },
    TimeStop {
        max_hold_ms: i64,
        take_profit_pct: Option<Decimal>,
    },
    TrailingStop {
        activation_pct: Decimal,
        trail_pct: Decimal,
        hard_stop_pct: Option<Decimal>,
    },
    Ladder {
        levels: Vec<LadderLevel>,
        stop_pct: Option<Decimal>,
        intrabar_policy: IntrabarPolicy,
    },
    WashRebound {
        trail_pct: Decimal,
        wash_pct: Decimal,
        rebound_pct: Decimal,
        max_reentries: u32,
        cooldown_candles: u32,
    },
    Combo {
        policies: Vec<RiskPolicy>,
        intrabar_policy: IntrabarPolicy,
    },
}

fn unit_interval(field: &'static str, v: Decimal) -> Result<(), PolicyError> {
    if v < Decimal::ZERO || v > Decimal::ONE {
        return Err(PolicyError::Negative { field, value: v.to_string() });
    }
    Ok(())
}

fn non_negative(field: &'static str, v: Decimal) -> Result<(), PolicyError> {
    if v < Decimal::ZERO {
        return Err(PolicyError::Negative { field, value: v.to_string() });
    }
    Ok(())
}

impl RiskPolicy {
    /// Validates all numeric ranges from spec §3 and bounds Combo recursion
    /// depth at [`MAX_COMBO_DEPTH`].
    pub fn validate(&self) -> Result<(), PolicyError> {
        self.validate_at_depth(1)
    }

    fn validate_at_depth(&self, depth: u32) -> Result<(), PolicyError> {
        match self {
            RiskPolicy::FixedStop { stop_pct, take_profit_pct } => {
                unit_interval("stop_pct", *stop_pct)?;
                if let Some(tp) = take_profit_pct {
                    non_negative("take_profit_pct", *tp)?;
                }
                Ok(())
            }
            RiskPolicy::TimeStop { max_hold_ms, take_profit_pct } => {
                if *max_hold_ms <= 0 {
                    return Err(PolicyError::NonPositive { field: "max_hold_ms", value: max_hold_ms.to_string() });
                }
                if let Some(tp) = take_profit_pct {
                    non_negative("take_profit_pct", *tp)?;
                }
                Ok(())
            }
            RiskPolicy::TrailingStop { activation_pct, trail_pct, hard_stop_pct } => {
                non_negative("activation_pct", *activation_pct)?;
                unit_interval("trail_pct", *trail_pct)?;
                if let Some(hs) = hard_stop_pct {
                    unit_interval("hard_stop_pct", *hs)?;
                }
                Ok(())
            }
            RiskPolicy::Ladder { levels, stop_pct, .. } => {
                if levels.is_empty() {
                    return Err(PolicyError::EmptyLadder);
                }
                for level in levels {
                    level.validate()?;
                }
                let sum: Decimal = levels.iter().map(|l| l.fraction).sum();
                if sum > Decimal::ONE {
                    return Err(PolicyError::LadderOverAllocated { sum: sum.to_string() });
                }
                if let Some(sp) = stop_pct {
                    unit_interval("stop_pct", *sp)?;
                }
                Ok(())
            }
            RiskPolicy::WashRebound { trail_pct, wash_pct, rebound_pct, .. } => {
                unit_interval("trail_pct", *trail_pct)?;
                unit_interval("wash_pct", *wash_pct)?;
                unit_interval("rebound_pct", *rebound_pct)?;
                Ok(())
            }
            RiskPolicy::Combo { policies, .. } => {
                if policies.is_empty() {
                    return Err(PolicyError::EmptyCombo);
                }
                if depth > MAX_COMBO_DEPTH {
                    return Err(PolicyError::ComboTooDeep { depth, max: MAX_COMBO_DEPTH });
                }
                for p in policies {
                    p.validate_at_depth(depth + 1)?;
                }
                Ok(())
            }
        }
    }

    fn opt_decimal(v: &Option<Decimal>) -> String {
        v.map(|d| d.to_string()).unwrap_or_else(|| "none".to_string())
    }

    /// Deterministic, collision-free string serialization used as the
    /// storage key across a grid sweep.
    pub fn canonical_id(&self) -> String {
        match self {
            RiskPolicy::FixedStop { stop_pct, take_profit_pct } => {
                format!("fixed_stop_{}_{}", stop_pct, Self::opt_decimal(take_profit_pct))
            }
            RiskPolicy::TimeStop { max_hold_ms, take_profit_pct } => {
                format!("time_stop_{}_{}", max_hold_ms, Self::opt_decimal(take_profit_pct))
            }
            RiskPolicy::TrailingStop { activation_pct, trail_pct, hard_stop_pct } => {
                format!("trailing_{}_{}_{}", activation_pct, trail_pct, Self::opt_decimal(hard_stop_pct))
            }
            RiskPolicy::Ladder { levels, stop_pct, .. } => {
                let mut sorted = levels.clone();
                sorted.sort_by(|a, b| a.multiple.cmp(&b.multiple));
                let levels_part = sorted
                    .iter()
                    .map(|l| format!("{}x{}", l.multiple, l.fraction))
                    .collect::<Vec<_>>()
                    .join("_");
                format!("ladder_{}_{}", levels_part, Self::opt_decimal(stop_pct))
            }
            RiskPolicy::WashRebound { trail_pct, wash_pct, rebound_pct, max_reentries, cooldown_candles } => {
                format!(
                    "wash_rebound_{}_{}_{}_{}_{}",
                    trail_pct, wash_pct, rebound_pct, max_reentries, cooldown_candles
                )
            }
            RiskPolicy::Combo { policies, .. } => {
                let members = policies.iter().map(|p| p.canonical_id()).collect::<Vec<_>>().join("+");
                format!("combo_{}", members)
            }
        }
    }

    pub fn intrabar_policy(&self) -> IntrabarPolicy {
        match self {
            RiskPolicy::Ladder { intrabar_policy, .. } => *intrabar_policy,
            RiskPolicy::Combo { intrabar_policy, .. } => *intrabar_policy,
            _ => IntrabarPolicy::StopFirst,
        }
    }
}
