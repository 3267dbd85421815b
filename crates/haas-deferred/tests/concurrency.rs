//! Mutual exclusion and cancellation of drains.

use async_trait::async_trait;
use haas_deferred::{DrainError, MemoryStore, NetworkEngine};
use haas_model::{FieldValues, Switch, Topology};
use haas_switch::{DriverRegistry, PortAction, SwitchDriver, SwitchResult, SwitchSession};
use haas_test::{
    queued_actions, queued_on_switches, CountingDriver, RecordingDriver, COUNTING_API_NAME,
    RECORDING_API_NAME,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn engine_with(
    topology: Topology,
    driver: Arc<dyn SwitchDriver>,
) -> (Arc<NetworkEngine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(topology));
    let mut registry = DriverRegistry::new();
    registry.register(driver).unwrap();
    let engine = Arc::new(NetworkEngine::new(store.clone(), Arc::new(registry)));
    (engine, store)
}

async fn wait_until_draining(engine: &NetworkEngine) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !engine.is_draining() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_drains_apply_each_action_once() {
    let store = Arc::new(MemoryStore::new(queued_actions(COUNTING_API_NAME, 5).unwrap()));
    let reader = Arc::clone(&store);
    let counting = CountingDriver::new(move || reader.read(Topology::pending_count));

    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(counting.clone())).unwrap();
    let engine = Arc::new(NetworkEngine::new(store.clone(), Arc::new(registry)));

    let drains: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.drain().await })
        })
        .collect();

    let mut applied = 0;
    for drain in drains {
        applied += drain.await.unwrap().unwrap().applied;
    }

    assert_eq!(applied, 5);
    assert_eq!(counting.applies(), 5);
    assert_eq!(store.read(Topology::pending_count), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_drains_across_switches() {
    let topology = queued_on_switches(COUNTING_API_NAME, &["a", "b", "a", "b"]).unwrap();
    let store = Arc::new(MemoryStore::new(topology));
    let reader = Arc::clone(&store);
    let counting = CountingDriver::new(move || reader.read(Topology::pending_count));

    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(counting.clone())).unwrap();
    let engine = Arc::new(NetworkEngine::new(store.clone(), Arc::new(registry)));

    let drains: Vec<_> = (0..3)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.drain().await })
        })
        .collect();
    let mut applied = 0;
    for drain in drains {
        applied += drain.await.unwrap().unwrap().applied;
    }

    assert_eq!(applied, 4);
    assert_eq!(counting.applies(), 4);
    assert_eq!(store.read(Topology::pending_count), 0);
}

#[tokio::test]
async fn test_abandoned_drain_still_closes_sessions() {
    let driver = RecordingDriver::new();
    driver.set_apply_delay(Duration::from_millis(200));
    let (engine, store) = engine_with(
        queued_actions(RECORDING_API_NAME, 2).unwrap(),
        Arc::new(driver.clone()),
    );

    let timed_out = tokio::time::timeout(Duration::from_millis(50), engine.drain()).await;
    assert!(timed_out.is_err());

    // The next drain waits for the abandoned one, which runs to completion.
    let report = engine.drain().await.unwrap();
    assert_eq!(report.applied, 0);

    let log = driver.log();
    assert_eq!(log.applied, vec![0, 1]);
    assert_eq!(log.opened, vec!["switch".to_string()]);
    assert_eq!(log.closed, log.opened);
    assert_eq!(store.read(Topology::pending_count), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_drains_never_double_apply() {
    let driver = RecordingDriver::new();
    driver.set_apply_delay(Duration::from_millis(10));
    let (engine, store) = engine_with(
        queued_actions(RECORDING_API_NAME, 4).unwrap(),
        Arc::new(driver.clone()),
    );

    let drains: Vec<_> = (0..3)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.drain().await })
        })
        .collect();
    for drain in drains {
        drain.await.unwrap().unwrap();
    }

    assert_eq!(driver.log().attempted, vec![0, 1, 2, 3]);
    assert_eq!(store.read(Topology::pending_count), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_try_drain_reports_already_draining() {
    let driver = RecordingDriver::new();
    driver.set_apply_delay(Duration::from_millis(100));
    let (engine, _store) = engine_with(
        queued_actions(RECORDING_API_NAME, 2).unwrap(),
        Arc::new(driver.clone()),
    );

    let running = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.drain().await })
    };
    wait_until_draining(&engine).await;

    let err = engine.try_drain().await.unwrap_err();
    assert!(matches!(err, DrainError::AlreadyDraining));

    assert_eq!(running.await.unwrap().unwrap().applied, 2);
    assert_eq!(engine.try_drain().await.unwrap().applied, 0);
}

/// Cancels a token while applying the first action it sees.
struct CancellingDriver {
    token: CancellationToken,
    inner: RecordingDriver,
}

#[async_trait]
impl SwitchDriver for CancellingDriver {
    fn api_name(&self) -> &str {
        RECORDING_API_NAME
    }

    fn validate(&self, config: &FieldValues) -> SwitchResult<()> {
        self.inner.validate(config)
    }

    async fn open_session(&self, switch: &Switch) -> SwitchResult<Box<dyn SwitchSession>> {
        Ok(Box::new(CancellingSession {
            token: self.token.clone(),
            inner: self.inner.open_session(switch).await?,
        }))
    }
}

struct CancellingSession {
    token: CancellationToken,
    inner: Box<dyn SwitchSession>,
}

#[async_trait]
impl SwitchSession for CancellingSession {
    fn switch_label(&self) -> &str {
        self.inner.switch_label()
    }

    async fn apply(&mut self, action: &PortAction) -> SwitchResult<()> {
        self.token.cancel();
        self.inner.apply(action).await
    }

    async fn close(&mut self) -> SwitchResult<()> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_cancellation_between_actions() {
    let token = CancellationToken::new();
    let recorder = RecordingDriver::new();
    let driver = CancellingDriver {
        token: token.clone(),
        inner: recorder.clone(),
    };
    let (engine, store) = engine_with(
        queued_actions(RECORDING_API_NAME, 3).unwrap(),
        Arc::new(driver),
    );

    let report = engine.drain_until(&token).await.unwrap();

    // The in-flight action completes; the rest stay queued.
    assert!(report.cancelled);
    assert_eq!(report.applied, 1);
    assert_eq!(recorder.applied(), vec![0]);
    assert_eq!(store.read(Topology::pending_count), 2);
    assert_eq!(recorder.log().closed.len(), 1);

    let report = engine.drain().await.unwrap();
    assert_eq!(report.applied, 2);
}
