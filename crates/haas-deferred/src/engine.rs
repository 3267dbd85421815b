//! The deferred networking engine.
//!
//! A drain applies pending actions strictly in queue order. Each action is
//! resolved to a switchport, applied through the switch's driver, and then
//! committed on its own; the first failure stops the drain and leaves the
//! failing action at the head of the queue for the next drain to retry.
//!
//! ```text
//!   Idle ──drain()──> Draining ──queue empty / first error──> Idle
//! ```

use haas_model::NetworkingAction;
use haas_switch::DriverRegistry;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::error::{DrainError, DrainResult};
use crate::session::SessionCache;
use crate::store::ActionStore;

/// Outcome of a successful drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions applied and committed
    pub applied: usize,
    /// Switch sessions opened
    pub sessions_opened: usize,
    /// True if the drain stopped early on cancellation
    pub cancelled: bool,
}

/// Applies queued networking actions to switches.
///
/// At most one drain runs at a time; the engine owns the lock that enforces
/// it. Each drain runs as its own task, so dropping the future returned by
/// [`NetworkEngine::drain`] does not interrupt an apply or a commit, and the
/// drain's sessions are still closed.
pub struct NetworkEngine {
    inner: Arc<EngineInner>,
    drain_lock: Arc<Mutex<()>>,
}

struct EngineInner {
    store: Arc<dyn ActionStore>,
    registry: Arc<DriverRegistry>,
}

impl NetworkEngine {
    /// Creates an engine over a store and a driver registry.
    pub fn new(store: Arc<dyn ActionStore>, registry: Arc<DriverRegistry>) -> Self {
        Self {
            inner: Arc::new(EngineInner { store, registry }),
            drain_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the action store.
    pub fn store(&self) -> &Arc<dyn ActionStore> {
        &self.inner.store
    }

    /// Returns the driver registry.
    pub fn registry(&self) -> &DriverRegistry {
        &self.inner.registry
    }

    /// Returns true while a drain holds the engine.
    pub fn is_draining(&self) -> bool {
        self.drain_lock.try_lock().is_err()
    }

    /// Applies every pending action, waiting for a running drain to finish
    /// first.
    ///
    /// An empty queue is a successful no-op. Once the drain has started,
    /// dropping the returned future leaves it running to completion.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> DrainResult<DrainReport> {
        let guard = Arc::clone(&self.drain_lock).lock_owned().await;
        self.spawn_drain(guard, None).await
    }

    /// Like [`NetworkEngine::drain`], but fails with
    /// [`DrainError::AlreadyDraining`] instead of waiting.
    #[instrument(skip(self))]
    pub async fn try_drain(&self) -> DrainResult<DrainReport> {
        let guard = Arc::clone(&self.drain_lock)
            .try_lock_owned()
            .map_err(|_| DrainError::AlreadyDraining)?;
        self.spawn_drain(guard, None).await
    }

    /// Like [`NetworkEngine::drain`], but stops before the next action once
    /// `cancel` fires. An action already being applied runs to completion.
    #[instrument(skip(self, cancel))]
    pub async fn drain_until(&self, cancel: &CancellationToken) -> DrainResult<DrainReport> {
        let guard = Arc::clone(&self.drain_lock).lock_owned().await;
        self.spawn_drain(guard, Some(cancel.clone())).await
    }

    async fn spawn_drain(
        &self,
        guard: OwnedMutexGuard<()>,
        cancel: Option<CancellationToken>,
    ) -> DrainResult<DrainReport> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(
            async move {
                let result = inner.drain_locked(cancel.as_ref()).await;
                drop(guard);
                result
            }
            .in_current_span(),
        );

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(DrainError::Aborted(e.to_string())),
        }
    }
}

impl EngineInner {
    async fn drain_locked(&self, cancel: Option<&CancellationToken>) -> DrainResult<DrainReport> {
        let mut sessions = SessionCache::new();
        let mut report = DrainReport::default();

        let result = self.apply_pending(&mut sessions, cancel, &mut report).await;

        report.sessions_opened = sessions.opened_count();
        sessions.close_all().await;

        match result {
            Ok(()) => {
                if report.applied > 0 || report.cancelled {
                    info!(
                        applied = report.applied,
                        sessions = report.sessions_opened,
                        cancelled = report.cancelled,
                        "Drain finished"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                warn!(applied = report.applied, error = %e, "Drain stopped");
                Err(e)
            }
        }
    }

    async fn apply_pending(
        &self,
        sessions: &mut SessionCache,
        cancel: Option<&CancellationToken>,
        report: &mut DrainReport,
    ) -> DrainResult<()> {
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                report.cancelled = true;
                return Ok(());
            }

            let Some(action) = self.store.peek_oldest().await? else {
                return Ok(());
            };
            self.apply_one(&action, sessions).await?;
            report.applied += 1;
        }
    }

    #[instrument(skip(self, action, sessions), fields(action = action.id))]
    async fn apply_one(
        &self,
        action: &NetworkingAction,
        sessions: &mut SessionCache,
    ) -> DrainResult<()> {
        let resolved = self.store.resolve(action).await?;
        let switch = &resolved.switch;

        let driver =
            self.registry
                .get(&switch.api_name)
                .map_err(|_| DrainError::UnknownDriver {
                    action: action.id,
                    switch: switch.label.clone(),
                    api_name: switch.api_name.clone(),
                })?;

        let session = sessions
            .session_for(switch, driver.as_ref())
            .await
            .map_err(|source| DrainError::Connection {
                action: action.id,
                switch: switch.label.clone(),
                source,
            })?;

        session
            .apply(&resolved.action)
            .await
            .map_err(|source| DrainError::Apply {
                action: action.id,
                switch: switch.label.clone(),
                source,
            })?;

        self.store.commit_applied(action).await?;
        debug!(port_action = %resolved.action, "Applied networking action");
        Ok(())
    }
}
