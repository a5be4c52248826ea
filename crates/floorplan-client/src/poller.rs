//! Timer-backed result poller.
//!
//! Checks a result endpoint immediately, then once per interval, until:
//! - the source reports the result ready (returns the payload)
//! - the pending-poll ceiling is reached (`PollTimeout`)
//! - a request fails (error propagated, no further polls)
//! - the slot's handle is cancelled (`Superseded`)
//!
//! In every case the slot's timer cell is cleared before `poll` returns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PollConfig;
use crate::error::{ClientError, Result};
use crate::stats::Statistics;
use crate::task::{ResultLocator, Slot, TaskStatus};
use crate::timers::TimerTable;

/// Final content of a result endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    Svg(Vec<u8>),
    Statistics(Statistics),
}

/// Answer of a single status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ready(ResultPayload),
    /// Not final yet; carries the task status when the back end reported one.
    Pending(Option<TaskStatus>),
}

/// Anything that can check a result endpoint once.
#[async_trait]
pub trait ResultSource: Send + Sync {
    async fn fetch(&self, locator: &ResultLocator) -> Result<PollOutcome>;
}

pub struct Poller {
    source: Arc<dyn ResultSource>,
    config: PollConfig,
}

impl Poller {
    pub fn new(source: Arc<dyn ResultSource>, config: PollConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Poll `locator` until it is ready, occupying `slot` in `timers` meanwhile.
    ///
    /// Installing the handle cancels any poll already running for `slot`.
    /// The handle is a child of `cycle`, so cancelling the cycle stops the poll.
    ///
    /// Exactly `max_iterations` requests are sent before giving up: the
    /// request that comes back pending for the `max_iterations`-th time
    /// fails with [`ClientError::PollTimeout`], with no extra check after it.
    pub async fn poll(
        &self,
        locator: &ResultLocator,
        timers: &Arc<TimerTable>,
        slot: Slot,
        cycle: &CancellationToken,
    ) -> Result<ResultPayload> {
        let guard = timers.install(slot, cycle);
        let token = guard.token();

        let period = self.config.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts: u32 = 0;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(slot = %slot, locator = %locator, "Poll cancelled");
                    return Err(ClientError::Superseded);
                }
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(slot = %slot, locator = %locator, "Poll cancelled mid-request");
                    return Err(ClientError::Superseded);
                }
                outcome = self.source.fetch(locator) => outcome,
            };
            attempts += 1;

            match outcome {
                Ok(PollOutcome::Ready(payload)) => {
                    tracing::debug!(slot = %slot, locator = %locator, attempts, "Result ready");
                    return Ok(payload);
                }
                Ok(PollOutcome::Pending(status)) => {
                    tracing::debug!(
                        slot = %slot,
                        locator = %locator,
                        attempt = attempts,
                        status = status.map(|s| s.as_str()).unwrap_or("unknown"),
                        "Still processing"
                    );
                    if attempts >= self.config.max_iterations {
                        tracing::warn!(
                            slot = %slot,
                            locator = %locator,
                            attempts,
                            "Max poll iterations reached, back end did not respond with results"
                        );
                        return Err(ClientError::PollTimeout {
                            locator: locator.to_string(),
                            attempts,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(slot = %slot, locator = %locator, error = %e, "Poll request failed");
                    return Err(e);
                }
            }
        }
    }
}
