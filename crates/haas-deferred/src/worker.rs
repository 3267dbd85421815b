//! Background drain trigger.
//!
//! Drains on every poll tick and on every [`WorkerHandle::kick`], until shut
//! down. A failed drain is logged and retried on the next trigger.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::NetworkEngine;

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Drains started
    pub drains: u64,
    /// Drains that returned an error
    pub failures: u64,
    /// Actions applied across all drains
    pub applied: u64,
}

/// Control handle for a running [`DrainWorker`].
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    kick: Arc<Notify>,
    shutdown: CancellationToken,
}

impl WorkerHandle {
    /// Requests a drain without waiting for the next tick.
    pub fn kick(&self) {
        self.kick.notify_one();
    }

    /// Stops the worker after the current action.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Runs drains in the background.
pub struct DrainWorker {
    engine: Arc<NetworkEngine>,
    poll_interval: Duration,
    drain_on_start: bool,
    kick: Arc<Notify>,
    shutdown: CancellationToken,
}

impl DrainWorker {
    /// Creates a worker draining every `poll_interval`.
    pub fn new(engine: Arc<NetworkEngine>, poll_interval: Duration) -> Self {
        Self {
            engine,
            poll_interval,
            drain_on_start: true,
            kick: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Whether to drain immediately instead of waiting for the first tick.
    pub fn with_drain_on_start(mut self, drain_on_start: bool) -> Self {
        self.drain_on_start = drain_on_start;
        self
    }

    /// Returns a handle to kick or stop the worker.
    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            kick: Arc::clone(&self.kick),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Runs until [`WorkerHandle::shutdown`] is called.
    pub async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.drain_on_start {
            // The first tick completes immediately.
            ticker.tick().await;
        }

        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Drain worker started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = self.kick.notified() => {}
                _ = ticker.tick() => {}
            }

            stats.drains += 1;
            match self.engine.drain_until(&self.shutdown).await {
                Ok(report) => stats.applied += report.applied as u64,
                Err(e) => {
                    stats.failures += 1;
                    error!(
                        error = %e,
                        action = ?e.action_id(),
                        retryable = e.is_retryable(),
                        "Drain failed"
                    );
                }
            }
        }

        info!(
            drains = stats.drains,
            failures = stats.failures,
            applied = stats.applied,
            "Drain worker stopped"
        );
        stats
    }
}
