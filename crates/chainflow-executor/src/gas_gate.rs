//! Gas price gate.
//!
//! Blocks a task until the oracle reports a gas price at or below the target,
//! polling with a delay that doubles after every poll.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chainflow_chain::DynGasOracle;
use chainflow_telemetry::Metrics;

use crate::config::GasGateConfig;
use crate::sleep::cancellable_sleep;

/// Outcome of a gas wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasWait {
    /// Whether the target was met.
    pub ok: bool,
    /// Last price observed, if any poll succeeded.
    pub last_price_wei: Option<u128>,
}

impl GasWait {
    fn met(price: u128) -> Self {
        Self {
            ok: true,
            last_price_wei: Some(price),
        }
    }

    fn missed(price: Option<u128>) -> Self {
        Self {
            ok: false,
            last_price_wei: price,
        }
    }
}

/// Polls a gas price oracle until a target is met.
pub struct GasGate {
    oracle: DynGasOracle,
    config: GasGateConfig,
}

impl GasGate {
    pub fn new(oracle: DynGasOracle, config: GasGateConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &GasGateConfig {
        &self.config
    }

    /// Wait using the configured target and timeout.
    pub async fn wait(&self, cancel: &CancellationToken) -> GasWait {
        self.wait_for_target(
            self.config.target_price_wei,
            Duration::from_secs(self.config.timeout_secs),
            self.config.timeout_enforced,
            cancel,
        )
        .await
    }

    /// Wait until the gas price is at or below `target_wei`.
    ///
    /// - A failed first poll is retried once after `first_error_retry_secs`;
    ///   a second failure gives up.
    /// - Later poll failures keep the previous price.
    /// - Sleeps start at `base_delay_ms` and double after every poll, up to
    ///   `max_delay_ms` when one is set.
    /// - With `timeout_enforced` the wait gives up once `timeout` has elapsed,
    ///   otherwise it only ends when the target is met.
    /// - Cancellation ends the wait with `ok = false`.
    pub async fn wait_for_target(
        &self,
        target_wei: u128,
        timeout: Duration,
        timeout_enforced: bool,
        cancel: &CancellationToken,
    ) -> GasWait {
        let start = Instant::now();
        let result = self
            .poll_until(target_wei, timeout, timeout_enforced, cancel, start)
            .await;
        Metrics::gas_wait(start.elapsed().as_secs_f64());
        result
    }

    async fn poll_until(
        &self,
        target_wei: u128,
        timeout: Duration,
        timeout_enforced: bool,
        cancel: &CancellationToken,
        start: Instant,
    ) -> GasWait {
        let mut price = match self.first_poll(cancel).await {
            Some(price) => price,
            None => return GasWait::missed(None),
        };
        if price <= target_wei {
            return GasWait::met(price);
        }

        info!(
            price_wei = price,
            target_wei, "Gas price above target, waiting"
        );

        let max_delay = self
            .config
            .max_delay_ms
            .map_or(Duration::MAX, Duration::from_millis);
        let mut delay = Duration::from_millis(self.config.base_delay_ms);

        loop {
            let sleep_for = if timeout_enforced {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    warn!(price_wei = price, target_wei, "Gas wait timed out");
                    return GasWait::missed(Some(price));
                }
                delay.min(timeout - elapsed)
            } else {
                delay
            };

            if !cancellable_sleep(cancel, sleep_for).await {
                return GasWait::missed(Some(price));
            }

            match self.oracle.gas_price_wei().await {
                Ok(current) => {
                    price = current;
                    Metrics::gas_price(price);
                }
                Err(e) => warn!(error = %e, "Gas price poll failed, keeping last price"),
            }

            if price <= target_wei {
                info!(price_wei = price, target_wei, "Gas price target met");
                return GasWait::met(price);
            }
            debug!(price_wei = price, delay_ms = delay.as_millis() as u64, "Gas still above target");
            delay = delay.saturating_mul(2).min(max_delay);
        }
    }

    async fn first_poll(&self, cancel: &CancellationToken) -> Option<u128> {
        match self.oracle.gas_price_wei().await {
            Ok(price) => {
                Metrics::gas_price(price);
                return Some(price);
            }
            Err(e) => warn!(error = %e, "First gas price poll failed, retrying once"),
        }

        let retry_after = Duration::from_secs(self.config.first_error_retry_secs);
        if !cancellable_sleep(cancel, retry_after).await {
            return None;
        }
        match self.oracle.gas_price_wei().await {
            Ok(price) => {
                Metrics::gas_price(price);
                Some(price)
            }
            Err(e) => {
                warn!(error = %e, "Gas price unavailable");
                None
            }
        }
    }
}
