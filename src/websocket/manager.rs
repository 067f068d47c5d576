//! Reconnection supervisor
//!
//! Runs sessions back to back until a close is requested, sleeping with
//! exponential backoff and jitter between attempts.

use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::session::{ConnectionSession, SessionState};
use crate::config::Config;
use crate::events::Notification;
use crate::stream::Shared;
use crate::telemetry::{SESSIONS_STARTED, SESSION_FAILURES};

/// Largest accepted `max_exponent`; higher settings are clamped to it
pub const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Consecutive-failure counter driving the reconnect delay.
///
/// The delay floor is `base * 2^attempts` with `attempts` capped at
/// `max_exponent`. An attempt that lasted longer than `decay` resets the
/// streak, so a long-lived connection that drops reconnects quickly.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_exponent: u32,
    decay: Duration,
    attempts: u32,
    attempt_started: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, max_exponent: u32, decay: Duration) -> Self {
        Self {
            base,
            max_exponent: max_exponent.min(MAX_BACKOFF_EXPONENT),
            decay,
            attempts: 0,
            attempt_started: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            config.backoff_max_exponent,
            Duration::from_secs(config.attempt_decay_secs),
        )
    }

    /// Count a new connection attempt starting now
    pub fn start_attempt(&mut self) -> u32 {
        self.attempt_started = Some(Instant::now());
        self.attempts += 1;
        self.attempts
    }

    /// Deterministic part of the delay after an attempt that ran for `elapsed`
    pub fn floor_after(&mut self, elapsed: Duration) -> Duration {
        if elapsed > self.decay {
            self.attempts = 0;
        }
        self.attempts = self.attempts.min(self.max_exponent);
        2u32.checked_pow(self.attempts)
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Delay before the next attempt: the floor plus up to the same again
    pub fn next_delay(&mut self) -> Duration {
        let elapsed = self
            .attempt_started
            .map(|started| started.elapsed())
            .unwrap_or_default();
        let floor = self.floor_after(elapsed);
        floor.saturating_add(jitter(floor))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

fn jitter(floor: Duration) -> Duration {
    let max = u64::try_from(floor.as_millis()).unwrap_or(u64::MAX);
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max))
}

/// Keeps a session running forever, reconnecting on any error
pub(crate) struct ReconnectSupervisor {
    shared: Arc<Shared>,
    config: Arc<Config>,
    backoff: Backoff,
}

impl ReconnectSupervisor {
    pub(crate) fn new(shared: Arc<Shared>, config: Arc<Config>) -> Self {
        let backoff = Backoff::from_config(&config);
        Self {
            shared,
            config,
            backoff,
        }
    }

    /// Run until a close is requested
    pub(crate) async fn run(mut self) {
        info!(pair = %self.config.pair, "Starting order book stream");
        let mut closed = self.shared.subscribe_closed();

        loop {
            if *closed.borrow() {
                break;
            }

            let attempt = self.backoff.start_attempt();
            SESSIONS_STARTED.inc();

            let session = ConnectionSession::new(self.shared.clone(), self.config.clone());
            match session.run().await {
                Ok(()) => info!(pair = %self.config.pair, "Session ended"),
                Err(e) => {
                    let kind = if e.is_protocol_violation() {
                        "protocol"
                    } else {
                        "transport"
                    };
                    SESSION_FAILURES.with_label_values(&[kind]).inc();
                    error!(
                        key_id = %self.config.api_key_id,
                        pair = %self.config.pair,
                        attempt,
                        error = %e,
                        "Connection error"
                    );
                    self.shared.notify(Notification::ConnectionError(e));
                }
            }

            if *closed.borrow() {
                break;
            }

            let delay = self.backoff.next_delay();
            warn!(
                attempt = self.backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Waiting before reconnecting"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = closed.wait_for(|c| *c) => break,
            }
        }

        self.shared.set_state(SessionState::Closed);
        info!(pair = %self.config.pair, "Order book stream closed");
    }
}
