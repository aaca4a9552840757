//! Capital-simulator data model.
//!
//! This module is pure data plus the invariant checks the simulator must
//! hold at every event boundary; the event-stepping logic itself lives in
//! `application::simulator` since it needs the causal candle accessor.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::SimulationFault;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalConfig {
    pub initial_capital: Decimal,
    pub max_allocation_pct: Decimal,
    pub max_risk_usd: Decimal,
    pub max_concurrent: usize,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        CapitalConfig {
            initial_capital: Decimal::from(10_000),
            max_allocation_pct: Decimal::new(4, 2), // 0.04
            max_risk_usd: Decimal::from(200),
            max_concurrent: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub call_id: String,
    pub entry_px: Decimal,
    pub entry_ts: i64,
    pub size_usd: Decimal,
    pub tp_px: Decimal,
    pub sl_px: Decimal,
    pub time_exit_ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub call_id: String,
    pub entry_px: Decimal,
    pub exit_px: Decimal,
    pub size_usd: Decimal,
    pub pnl_usd: Decimal,
    pub entry_ts: i64,
    pub exit_ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub initial_capital: Decimal,
    pub free_cash: Decimal,
    pub open: Vec<Position>,
    pub closed: Vec<ClosedTrade>,
    pub peak_equity: Decimal,
}

impl PortfolioState {
    pub fn new(initial_capital: Decimal) -> Self {
        PortfolioState {
            initial_capital,
            free_cash: initial_capital,
            open: Vec::new(),
            closed: Vec::new(),
            peak_equity: initial_capital,
        }
    }

    pub fn allocated_usd(&self) -> Decimal {
        self.open.iter().map(|p| p.size_usd).sum()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.closed.iter().map(|t| t.pnl_usd).sum()
    }

    /// equity = free_cash + sum of open position sizes (mark-to-cost, not
    /// mark-to-market: Σ position_size_usd + free_cash tracks committed
    /// capital, not live market value).
    pub fn equity(&self) -> Decimal {
        self.free_cash + self.allocated_usd()
    }

    pub fn final_capital(&self) -> Decimal {
        self.initial_capital + self.realized_pnl()
    }

    pub fn total_return(&self) -> Decimal {
        if self.initial_capital == Decimal::ZERO {
            Decimal::ZERO
        } else {
            self.final_capital() / self.initial_capital
        }
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.peak_equity - self.equity()
    }

    /// Invariant 6: free_cash + Σ position_size + Σ
    /// realized_pnl = initial_capital, and free_cash never negative.
    pub fn check_invariants(&self) -> Result<(), SimulationFault> {
        if self.free_cash < Decimal::ZERO {
            return Err(SimulationFault::CapitalAccountingBroken {
                detail: format!("free_cash went negative: {}", self.free_cash),
            });
        }
        let lhs = self.free_cash + self.allocated_usd() + self.realized_pnl();
        if lhs != self.initial_capital {
            return Err(SimulationFault::CapitalAccountingBroken {
                detail: format!(
                    "cash conservation violated: free_cash({}) + allocated({}) + realized_pnl({}) = {} != initial_capital({})",
                    self.free_cash, self.allocated_usd(), self.realized_pnl(), lhs, self.initial_capital
                ),
            });
        }
        Ok(())
    }

    pub fn record_peak(&mut self) {
        let e = self.equity();
        if e > self.peak_equity {
            self.peak_equity = e;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fresh_portfolio_satisfies_invariants() {
        let p = PortfolioState::new(dec!(10000));
        assert!(p.check_invariants().is_ok());
        assert_eq!(p.equity(), dec!(10000));
    }

    #[test]
    fn detects_negative_free_cash() {
        let mut p = PortfolioState::new(dec!(1000));
        p.free_cash = dec!(-1);
        assert!(p.check_invariants().is_err());
    }

    #[test]
    fn closing_a_trade_conserves_cash() {
        let mut p = PortfolioState::new(dec!(1000));
        p.open.push(Position {
            call_id: "c1".into(),
            entry_px: dec!(1.0),
            entry_ts: 0,
            size_usd: dec!(100),
            tp_px: dec!(1.2),
            sl_px: dec!(0.8),
            time_exit_ts: 3600,
        });
        p.free_cash -= dec!(100);
        assert!(p.check_invariants().is_ok());

        // close with a +10 pnl
        p.open.clear();
        p.free_cash += dec!(110);
        p.closed.push(ClosedTrade {
            call_id: "c1".into(),
            entry_px: dec!(1.0),
            exit_px: dec!(1.1),
            size_usd: dec!(100),
            pnl_usd: dec!(10),
            entry_ts: 0,
            exit_ts: 100,
        });
        assert!(p.check_invariants().is_ok());
        assert_eq!(p.final_capital(), dec!(1010));
    }
}
