//! Development-only stub [`ExecutionPort`]: live order placement is out of
//! scope for a backtesting engine. Defaults to dry-run and trips a circuit
//! breaker after repeated failures, using a plain blocking `Mutex` since
//! this port is synchronous by design.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::domain::errors::PortError;
use crate::domain::ports::{idempotency_key, ExecutionAck, ExecutionPort, ExecutionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerState {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    last_failure: Option<Instant>,
}

/// Trips open after `failure_threshold` consecutive failures, probes with
/// one call after `timeout`, and closes again after `success_threshold`
/// consecutive successes in the half-open state.
struct CircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: usize,
    success_threshold: usize,
    timeout: Duration,
    name: &'static str,
}

impl CircuitBreaker {
    fn new(name: &'static str, failure_threshold: usize, success_threshold: usize, timeout: Duration) -> Self {
        CircuitBreaker {
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
            failure_threshold,
            success_threshold,
            timeout,
            name,
        }
    }

    fn allow(&self) -> Result<(), PortError> {
        let mut s = self.state.lock().expect("circuit breaker mutex poisoned");
        if s.state == CircuitState::Open {
            match s.last_failure {
                Some(last) if last.elapsed() > self.timeout => {
                    info!(breaker = self.name, "transitioning Open -> HalfOpen");
                    s.state = CircuitState::HalfOpen;
                    s.success_count = 0;
                }
                _ => {
                    return Err(PortError::ExecutionUnavailable {
                        reason: format!("circuit breaker [{}] open", self.name),
                    });
                }
            }
        }
        Ok(())
    }

    fn on_success(&self) {
        let mut s = self.state.lock().expect("circuit breaker mutex poisoned");
        match s.state {
            CircuitState::HalfOpen => {
                s.success_count += 1;
                if s.success_count >= self.success_threshold {
                    info!(breaker = self.name, "transitioning HalfOpen -> Closed");
                    s.state = CircuitState::Closed;
                    s.failure_count = 0;
                    s.success_count = 0;
                }
            }
            CircuitState::Closed => s.failure_count = 0,
            CircuitState::Open => warn!(breaker = self.name, "success recorded while open"),
        }
    }

    fn on_failure(&self) {
        let mut s = self.state.lock().expect("circuit breaker mutex poisoned");
        s.failure_count += 1;
        s.last_failure = Some(Instant::now());
        match s.state {
            CircuitState::Closed if s.failure_count >= self.failure_threshold => {
                error!(breaker = self.name, failures = s.failure_count, "transitioning Closed -> Open");
                s.state = CircuitState::Open;
            }
            CircuitState::HalfOpen => {
                warn!(breaker = self.name, "transitioning HalfOpen -> Open");
                s.state = CircuitState::Open;
                s.success_count = 0;
            }
            _ => {}
        }
    }
}

/// Accepts every request as a dry run by default; only fills orders when
/// `ExecutionRequest.dry_run` is explicitly false, and even then only
/// simulates a fill (no network call) since live trading is out of scope.
pub struct StubExecutionAdapter {
    breaker: CircuitBreaker,
}

impl StubExecutionAdapter {
    pub fn new() -> Self {
        StubExecutionAdapter {
            breaker: CircuitBreaker::new("execution", 3, 2, Duration::from_secs(30)),
        }
    }
}

impl Default for StubExecutionAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionPort for StubExecutionAdapter {
    fn execute(&mut self, request: &ExecutionRequest, rng: &mut StdRng) -> Result<ExecutionAck, PortError> {
        self.breaker.allow()?;

        if request.amount_usd <= Decimal::ZERO {
            self.breaker.on_failure();
            return Err(PortError::ExecutionUnavailable { reason: "amount_usd must be positive".into() });
        }

        let key = idempotency_key(&request.token, request.side, request.amount_usd);
        if request.dry_run {
            self.breaker.on_success();
            return Ok(ExecutionAck { idempotency_key: key, filled: false, fill_px: None });
        }

        // Simulated fill only: a tiny jittered slippage around par, never a real order.
        let jitter: f64 = rng.random_range(-0.001..0.001);
        let fill_px = Decimal::ONE + Decimal::try_from(jitter).unwrap_or(Decimal::ZERO);
        self.breaker.on_success();
        Ok(ExecutionAck { idempotency_key: key, filled: true, fill_px: Some(fill_px) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::OrderSide;
    use crate::domain::rng::seeded_rng;
    use rust_decimal_macros::dec;

    #[test]
    fn dry_run_never_fills() {
        let mut adapter = StubExecutionAdapter::new();
        let mut rng = seeded_rng(1);
        let req = ExecutionRequest { token: "mint1".into(), side: OrderSide::Buy, amount_usd: dec!(10), dry_run: true };
        let ack = adapter.execute(&req, &mut rng).unwrap();
        assert!(!ack.filled);
        assert!(ack.fill_px.is_none());
    }

    #[test]
    fn zero_amount_is_rejected() {
        let mut adapter = StubExecutionAdapter::new();
        let mut rng = seeded_rng(1);
        let req = ExecutionRequest { token: "mint1".into(), side: OrderSide::Buy, amount_usd: dec!(0), dry_run: true };
        assert!(adapter.execute(&req, &mut rng).is_err());
    }

    #[test]
    fn breaker_opens_after_repeated_failures() {
        let mut adapter = StubExecutionAdapter::new();
        let mut rng = seeded_rng(1);
        let bad = ExecutionRequest { token: "mint1".into(), side: OrderSide::Buy, amount_usd: dec!(0), dry_run: true };
        for _ in 0..3 {
            let _ = adapter.execute(&bad, &mut rng);
        }
        let good = ExecutionRequest { token: "mint1".into(), side: OrderSide::Buy, amount_usd: dec!(10), dry_run: true };
        let result = adapter.execute(&good, &mut rng);
        assert!(result.is_err());
    }
}
