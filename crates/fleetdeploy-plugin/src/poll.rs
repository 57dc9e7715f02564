//! Cancellable, time-boxed polling
//!
//! Every reconciler polls through [`Poller::run`]: sleep one interval, poll,
//! check the deadline, repeat. A cancelled token stops the loop at the next
//! await point, including while a poll is in flight.

use fleetdeploy_core::{PollSettings, ServiceState};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Result of a single poll
#[derive(Debug, Clone, PartialEq)]
pub enum Tick<T> {
    /// Converged; stop polling
    Done(T),
    /// Not there yet; carries the state observed on this tick
    Pending(ServiceState),
}

/// Why the loop stopped without converging
#[derive(Debug, Clone, PartialEq)]
pub enum PollError<E> {
    /// The poll itself returned a terminal error
    Failed(E),
    TimedOut {
        last: ServiceState,
        elapsed: Duration,
        polls: u32,
    },
    Cancelled {
        last: ServiceState,
        polls: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(PollSettings::default())
    }
}

impl From<PollSettings> for Poller {
    fn from(settings: PollSettings) -> Self {
        Self::new(settings)
    }
}

impl Poller {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            interval: settings.interval,
            timeout: settings.timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll until `tick` reports [`Tick::Done`], fails, the timeout budget is
    /// spent, or `cancel` fires.
    ///
    /// The budget is measured from the call. Polls never overlap.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        tick: F,
    ) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Tick<T>, E>>,
    {
        self.run_from(Instant::now(), cancel, tick).await
    }

    /// Like [`Poller::run`], with the budget measured from `started`.
    ///
    /// At least one poll runs even when the budget is already spent.
    pub async fn run_from<T, E, F, Fut>(
        &self,
        started: Instant,
        cancel: &CancellationToken,
        mut tick: F,
    ) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Tick<T>, E>>,
    {
        let mut last = ServiceState::Unknown;
        let mut polls = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled { last, polls }),
                _ = sleep(self.interval) => {}
            }

            polls += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled { last, polls }),
                outcome = tick() => outcome,
            };

            match outcome.map_err(PollError::Failed)? {
                Tick::Done(value) => return Ok(value),
                Tick::Pending(state) => last = state,
            }

            let elapsed = started.elapsed();
            trace!(polls, state = %last, elapsed_ms = elapsed.as_millis() as u64, "Still waiting");

            if elapsed >= self.timeout {
                return Err(PollError::TimedOut {
                    last,
                    elapsed,
                    polls,
                });
            }
        }
    }
}
