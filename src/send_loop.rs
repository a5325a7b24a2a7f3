//! Paced delivery loop with exponential backoff
//!
//! One logical thread of control: pull a payload, send it, then sleep either
//! the fixed send interval (success) or a growing backoff delay (failure).
//! A payload that fails to send is dropped; the next iteration pulls fresh
//! data instead of retrying stale telemetry.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::provider::PayloadSource;
use crate::sender::PayloadSender;
use crate::Result;

/// Upper bound for any backoff delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponent cap for backoff growth
const MAX_BACKOFF_EXPONENT: u32 = 8;

/// Consecutive-failure backoff: `min(30s, base * 2^min(failures, 8))`
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    failures: u32,
}

impl Backoff {
    /// Create a backoff with the given base delay
    pub fn new(base: Duration) -> Self {
        Self { base, failures: 0 }
    }

    /// Record one failure and return the delay to apply
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current_delay()
    }

    /// Delay for the current failure count
    pub fn current_delay(&self) -> Duration {
        let factor = 2u32.pow(self.failures.min(MAX_BACKOFF_EXPONENT));
        self.base.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Clear the failure count after a success
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures recorded
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting on the source for the next payload
    Idle,
    /// Delivering a payload
    Sending,
    /// Sleeping the send interval after a success
    Paced,
    /// Sleeping a backoff delay after a failure
    BackingOff,
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub sent: u64,
    pub failed: u64,
}

/// Pulls payloads from a source and delivers them with a sender
pub struct SendLoop<P, S> {
    source: P,
    sender: S,
    send_interval: Duration,
    backoff: Backoff,
    state: LoopState,
    stats: LoopStats,
}

impl<P, S> SendLoop<P, S>
where
    P: PayloadSource,
    S: PayloadSender,
{
    /// Create a loop pacing successes at `send_interval` and backing off from `base_backoff`
    pub fn new(source: P, sender: S, send_interval: Duration, base_backoff: Duration) -> Self {
        Self {
            source,
            sender,
            send_interval,
            backoff: Backoff::new(base_backoff),
            state: LoopState::Idle,
            stats: LoopStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run until `cancel` fires or the source ends.
    ///
    /// Only fatal source errors (configuration or platform) are returned;
    /// everything else is logged and absorbed by backoff.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<LoopStats> {
        info!(interval_ms = self.send_interval.as_millis() as u64, "Send loop started");

        loop {
            self.transition(LoopState::Idle);
            let pulled = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Send loop cancelled while waiting for data");
                    break;
                }
                pulled = self.source.next_payload() => pulled,
            };

            let payload = match pulled {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    info!("Payload source ended");
                    break;
                }
                Err(e) if e.is_fatal() => {
                    error!("Payload source failed fatally: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        failures = self.backoff.failures(),
                        delay_ms = delay.as_millis() as u64,
                        "Payload source error ({}). Retrying in {:.1}s",
                        e,
                        delay.as_secs_f64()
                    );
                    self.transition(LoopState::BackingOff);
                    if !Self::sleep_or_cancel(delay, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            self.transition(LoopState::Sending);
            let delay = match self.sender.send(&payload).await {
                Ok(()) => {
                    self.stats.sent += 1;
                    self.backoff.reset();
                    trace!(drone_id = %payload.drone_id, ts = %payload.ts, "Payload delivered");
                    self.transition(LoopState::Paced);
                    self.send_interval
                }
                Err(e) => {
                    self.stats.failed += 1;
                    let delay = self.backoff.next_delay();
                    warn!(
                        failures = self.backoff.failures(),
                        delay_ms = delay.as_millis() as u64,
                        "Send failed ({}). Retrying in {:.1}s",
                        e,
                        delay.as_secs_f64()
                    );
                    self.transition(LoopState::BackingOff);
                    delay
                }
            };

            if !Self::sleep_or_cancel(delay, &cancel).await {
                break;
            }
        }

        self.transition(LoopState::Idle);
        info!(sent = self.stats.sent, failed = self.stats.failed, "Send loop stopped");
        Ok(self.stats)
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            trace!("Send loop {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Returns false when cancelled during the sleep
    async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Send loop cancelled while sleeping");
                false
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
