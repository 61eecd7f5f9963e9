//! # Sync Coordinator
//!
//! Drains the pending-operation queue into the inventory service whenever
//! the device is online, and keeps the local cache fresh from the results.
//!
//! ## Pass Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          One Sync Pass                                  │
//! │                                                                         │
//! │  trigger (manual, or offline→online transition; extra triggers         │
//! │  during a running pass coalesce into at most one follow-up)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. recover_stranded()      requeue rows a crash left in 'syncing'     │
//! │  2. pending_targets()       partition the queue by target              │
//! │  3. per target, oldest-first:                                          │
//! │       mark_syncing → gateway.submit →                                  │
//! │         Synced    → mark_synced, refresh cache from snapshot           │
//! │         Conflict  → mark_conflict, SKIP REST OF THIS TARGET            │
//! │         Invalid   → terminal failed, next operation                    │
//! │         Transient → requeue (or ceiling → terminal), ABORT WHOLE PASS  │
//! │  4. emit SyncSummary { synced, conflicts, failed, remaining }          │
//! │                                                                         │
//! │  INVARIANTS                                                            │
//! │  • Never two passes at once (async mutex around the whole pass)        │
//! │  • Within a target, strict creation order; a halted target never       │
//! │    lets a later operation jump its stuck predecessor                   │
//! │  • Targets are independent: one conflicted target cannot starve        │
//! │    the rest of the queue                                               │
//! │  • Going offline mid-pass aborts cleanly; untouched operations         │
//! │    simply stay pending                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ergolab_core::{OperationStatus, SyncSummary};
use ergolab_db::Database;

use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{RemoteGateway, SubmitOutcome};

// =============================================================================
// Sync State & Reporting
// =============================================================================

/// Point-in-time view of the sync engine, for hosts and UIs.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    /// Whether the service is currently reachable.
    pub is_online: bool,

    /// Whether a pass is running right now.
    pub sync_in_progress: bool,

    /// When the last pass finished, if any has.
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Operations still waiting to be synced.
    pub pending_count: i64,
}

/// Receives pass results. Hosts plug in their own to surface sync activity;
/// the default discards everything.
pub trait SyncReporter: Send + Sync {
    fn pass_completed(&self, summary: &SyncSummary);
}

/// Reporter that discards all events.
#[derive(Debug, Default)]
pub struct NoOpReporter;

impl SyncReporter for NoOpReporter {
    fn pass_completed(&self, _summary: &SyncSummary) {}
}

// =============================================================================
// Sync Coordinator
// =============================================================================

/// Orchestrates sync passes over one device's queue and cache.
///
/// An explicit instance; create as many as you have databases. Cloning is
/// cheap and all clones share the same pass lock.
#[derive(Clone)]
pub struct SyncCoordinator {
    db: Database,
    gateway: Arc<dyn RemoteGateway>,
    monitor: ConnectivityMonitor,
    reporter: Arc<dyn SyncReporter>,

    /// Max operations drained per target per pass.
    batch_size: u32,

    pass_lock: Arc<Mutex<()>>,
    pass_running: Arc<AtomicBool>,
    last_sync_at: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl SyncCoordinator {
    pub fn new(
        db: Database,
        gateway: Arc<dyn RemoteGateway>,
        monitor: ConnectivityMonitor,
        batch_size: u32,
    ) -> Self {
        SyncCoordinator {
            db,
            gateway,
            monitor,
            reporter: Arc::new(NoOpReporter),
            batch_size,
            pass_lock: Arc::new(Mutex::new(())),
            pass_running: Arc::new(AtomicBool::new(false)),
            last_sync_at: Arc::new(RwLock::new(None)),
        }
    }

    /// Replaces the reporter. Call before [`start`](Self::start).
    pub fn with_reporter(mut self, reporter: Arc<dyn SyncReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Returns the current engine state.
    pub async fn state(&self) -> SyncResult<SyncState> {
        let pending_count = self.db.operations().count(OperationStatus::Pending).await?;

        Ok(SyncState {
            is_online: self.monitor.state().is_online(),
            sync_in_progress: self.pass_running.load(Ordering::SeqCst),
            last_sync_at: *self.last_sync_at.read().await,
            pending_count,
        })
    }

    /// Runs one full sync pass, waiting for any in-flight pass first.
    ///
    /// ## Errors
    /// * [`SyncError::Offline`] - the device is offline; nothing attempted
    pub async fn sync_now(&self) -> SyncResult<SyncSummary> {
        let _guard = self.pass_lock.lock().await;
        self.pass_running.store(true, Ordering::SeqCst);
        let result = self.run_pass().await;
        self.pass_running.store(false, Ordering::SeqCst);

        if let Ok(ref summary) = result {
            *self.last_sync_at.write().await = Some(Utc::now());
            self.reporter.pass_completed(summary);
        }

        result
    }

    /// The pass itself. Caller holds the pass lock.
    async fn run_pass(&self) -> SyncResult<SyncSummary> {
        if !self.monitor.state().is_online() {
            return Err(SyncError::Offline);
        }

        let queue = self.db.operations();
        let cache = self.db.cache();

        let recovered = queue.recover_stranded().await?;
        if recovered > 0 {
            info!(count = recovered, "Requeued operations from interrupted pass");
        }

        let mut summary = SyncSummary::default();
        let mut aborted = false;

        let targets = queue.pending_targets().await?;
        debug!(targets = targets.len(), "Starting sync pass");

        'targets: for target in targets {
            let batch = queue.next_batch(Some(&target), self.batch_size).await?;

            for op in batch {
                // Going offline mid-pass: stop cleanly, everything not yet
                // attempted stays pending.
                if !self.monitor.state().is_online() {
                    warn!("Went offline mid-pass, aborting");
                    aborted = true;
                    break 'targets;
                }

                queue.mark_syncing(&op.local_id).await?;

                match self.gateway.submit(&op).await? {
                    SubmitOutcome::Synced { server_id, snapshot } => {
                        queue.mark_synced(&op.local_id, &server_id).await?;
                        summary.synced += 1;

                        if let Some(snapshot) = snapshot {
                            cache
                                .put(target.entity_type, &target.id, &snapshot)
                                .await?;
                        }
                    }

                    SubmitOutcome::Conflict { reason } => {
                        queue.mark_conflict(&op.local_id, &reason).await?;
                        summary.conflicts += 1;

                        // Later operations on this target may depend on the
                        // conflicted one; they stay pending until it is
                        // resolved. Other targets are unaffected.
                        continue 'targets;
                    }

                    SubmitOutcome::Invalid { cause } => {
                        queue.mark_failed(&op.local_id, &cause, false).await?;
                        summary.failed += 1;
                    }

                    SubmitOutcome::TransientFailure { cause } => {
                        let status = queue.mark_failed(&op.local_id, &cause, true).await?;
                        if status == OperationStatus::Failed {
                            summary.failed += 1;
                        }

                        // The service (or network) is struggling; hammering
                        // it with the rest of the queue helps nobody.
                        warn!(cause = %cause, "Transient failure, aborting pass");
                        aborted = true;
                        break 'targets;
                    }
                }
            }
        }

        summary.remaining = queue.count(OperationStatus::Pending).await? as u64;

        info!(
            synced = summary.synced,
            conflicts = summary.conflicts,
            failed = summary.failed,
            remaining = summary.remaining,
            aborted,
            "Sync pass finished"
        );

        Ok(summary)
    }

    /// Spawns the background loop reacting to triggers and connectivity.
    pub fn start(&self) -> CoordinatorHandle {
        // Capacity 1: a trigger during a running pass coalesces into
        // exactly one follow-up pass.
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let coordinator = self.clone();
        let mut connectivity = self.monitor.subscribe();

        let task = tokio::spawn(async move {
            info!("Sync coordinator started");

            loop {
                tokio::select! {
                    Some(()) = trigger_rx.recv() => {
                        coordinator.run_triggered_pass().await;
                    }

                    Ok(state) = connectivity.changed() => {
                        if state.is_online() {
                            info!("Back online, starting sync pass");
                            coordinator.run_triggered_pass().await;
                        }
                    }

                    _ = shutdown_rx.changed() => {
                        info!("Sync coordinator shutting down");
                        break;
                    }
                }
            }
        });

        CoordinatorHandle {
            trigger_tx,
            shutdown_tx,
            task,
        }
    }

    async fn run_triggered_pass(&self) {
        match self.sync_now().await {
            Ok(summary) if summary.is_noop() => debug!("Sync pass had nothing to do"),
            Ok(_) => {}
            Err(SyncError::Offline) => debug!("Sync trigger while offline, skipped"),
            Err(e) => error!(error = %e, "Sync pass failed"),
        }
    }
}

// =============================================================================
// Coordinator Handle
// =============================================================================

/// Controls a running coordinator loop.
pub struct CoordinatorHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    /// Requests a sync pass. Non-blocking; while a pass is running, any
    /// number of triggers collapse into one follow-up pass.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Stops the loop. A pass in flight completes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Coordinator task panicked during shutdown");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityState;
    use crate::gateway::FetchOutcome;
    use async_trait::async_trait;
    use ergolab_core::{EntityRef, EntityType, OperationKind, PendingOperation};
    use ergolab_db::DbConfig;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex as StdMutex;

    /// Gateway driven by a per-target script of outcomes. Unscripted
    /// submissions succeed with a generated server id. Records every
    /// submission for ordering assertions.
    #[derive(Default)]
    struct ScriptedGateway {
        scripts: StdMutex<HashMap<String, VecDeque<SubmitOutcome>>>,
        submitted: StdMutex<Vec<(String, String)>>, // (target, local_id)
        counter: StdMutex<u64>,
    }

    impl ScriptedGateway {
        fn script(&self, target: &EntityRef, outcome: SubmitOutcome) {
            self.scripts
                .lock()
                .unwrap()
                .entry(target.to_string())
                .or_default()
                .push_back(outcome);
        }

        fn submissions(&self) -> Vec<(String, String)> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteGateway for ScriptedGateway {
        async fn submit(&self, operation: &PendingOperation) -> SyncResult<SubmitOutcome> {
            let target = operation.target().to_string();
            self.submitted
                .lock()
                .unwrap()
                .push((target.clone(), operation.local_id.clone()));

            if let Some(outcome) = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&target)
                .and_then(|queue| queue.pop_front())
            {
                return Ok(outcome);
            }

            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            Ok(SubmitOutcome::Synced {
                server_id: format!("srv-{}", counter),
                snapshot: None,
            })
        }

        async fn fetch(&self, _entity: &EntityRef) -> SyncResult<FetchOutcome> {
            Ok(FetchOutcome::NotFound)
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        summaries: StdMutex<Vec<SyncSummary>>,
    }

    impl SyncReporter for RecordingReporter {
        fn pass_completed(&self, summary: &SyncSummary) {
            self.summaries.lock().unwrap().push(summary.clone());
        }
    }

    fn stock_in(material: &str, qty: i64) -> OperationKind {
        OperationKind::StockIn {
            material_id: material.to_string(),
            warehouse_id: "wh-1".to_string(),
            quantity: qty,
            note: None,
        }
    }

    async fn setup(
        gateway: Arc<ScriptedGateway>,
        online: bool,
    ) -> (SyncCoordinator, Database, ConnectivityMonitor) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let monitor = if online {
            ConnectivityMonitor::new(ConnectivityState::Online)
        } else {
            ConnectivityMonitor::starting_offline()
        };
        let coordinator = SyncCoordinator::new(db.clone(), gateway, monitor.clone(), 50);
        (coordinator, db, monitor)
    }

    #[tokio::test]
    async fn test_pass_syncs_everything_in_order() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (coordinator, db, _) = setup(gateway.clone(), true).await;
        let queue = db.operations();

        let a1 = queue.enqueue(stock_in("mat-a", 1)).await.unwrap();
        let a2 = queue.enqueue(stock_in("mat-a", 2)).await.unwrap();
        let b1 = queue.enqueue(stock_in("mat-b", 3)).await.unwrap();

        let summary = coordinator.sync_now().await.unwrap();
        assert_eq!(summary.synced, 3);
        assert_eq!(summary.conflicts, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.remaining, 0);

        // Within mat-a the creation order held
        let subs = gateway.submissions();
        let mat_a: Vec<&str> = subs
            .iter()
            .filter(|(t, _)| t == "material:mat-a")
            .map(|(_, id)| id.as_str())
            .collect();
        assert_eq!(mat_a, vec![a1.local_id.as_str(), a2.local_id.as_str()]);

        // Everything confirmed with a server id
        for op in [&a1, &a2, &b1] {
            let stored = queue.get(&op.local_id).await.unwrap().unwrap();
            assert_eq!(stored.status, OperationStatus::Synced);
            assert!(stored.server_id.is_some());
        }
    }

    #[tokio::test]
    async fn test_conflict_halts_target_but_not_others() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (coordinator, db, _) = setup(gateway.clone(), true).await;
        let queue = db.operations();

        let a1 = queue.enqueue(stock_in("mat-a", 1)).await.unwrap();
        let a2 = queue.enqueue(stock_in("mat-a", 2)).await.unwrap();
        let b1 = queue.enqueue(stock_in("mat-b", 3)).await.unwrap();

        gateway.script(
            &EntityRef::material("mat-a"),
            SubmitOutcome::Conflict {
                reason: "insufficient stock".into(),
            },
        );

        let summary = coordinator.sync_now().await.unwrap();
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.synced, 1); // mat-b still went through
        assert_eq!(summary.remaining, 1); // a2 held back behind the conflict

        let a1 = queue.get(&a1.local_id).await.unwrap().unwrap();
        assert_eq!(a1.status, OperationStatus::Conflict);

        // a2 was never submitted: it must not jump its stuck predecessor
        let a2 = queue.get(&a2.local_id).await.unwrap().unwrap();
        assert_eq!(a2.status, OperationStatus::Pending);
        assert!(!gateway
            .submissions()
            .iter()
            .any(|(_, id)| id == &a2.local_id));

        let b1 = queue.get(&b1.local_id).await.unwrap().unwrap();
        assert_eq!(b1.status, OperationStatus::Synced);
    }

    #[tokio::test]
    async fn test_transient_failure_aborts_whole_pass() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (coordinator, db, _) = setup(gateway.clone(), true).await;
        let queue = db.operations();

        let a1 = queue.enqueue(stock_in("mat-a", 1)).await.unwrap();
        queue.enqueue(stock_in("mat-b", 2)).await.unwrap();

        gateway.script(
            &EntityRef::material("mat-a"),
            SubmitOutcome::TransientFailure {
                cause: "connection reset".into(),
            },
        );

        let summary = coordinator.sync_now().await.unwrap();
        assert_eq!(summary.synced, 0);
        assert_eq!(summary.remaining, 2);

        // Only one submission happened; mat-b was never attempted
        assert_eq!(gateway.submissions().len(), 1);

        // The failed operation is back in the queue with one attempt burned
        let a1 = queue.get(&a1.local_id).await.unwrap().unwrap();
        assert_eq!(a1.status, OperationStatus::Pending);
        assert_eq!(a1.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_invalid_operation_fails_terminally_pass_continues() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (coordinator, db, _) = setup(gateway.clone(), true).await;
        let queue = db.operations();

        let a1 = queue.enqueue(stock_in("mat-a", 1)).await.unwrap();
        let b1 = queue.enqueue(stock_in("mat-b", 2)).await.unwrap();

        gateway.script(
            &EntityRef::material("mat-a"),
            SubmitOutcome::Invalid {
                cause: "unknown warehouse".into(),
            },
        );

        let summary = coordinator.sync_now().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.remaining, 0);

        let a1 = queue.get(&a1.local_id).await.unwrap().unwrap();
        assert_eq!(a1.status, OperationStatus::Failed);
        assert_eq!(a1.attempt_count, 0); // no retry budget spent

        let b1 = queue.get(&b1.local_id).await.unwrap().unwrap();
        assert_eq!(b1.status, OperationStatus::Synced);
    }

    #[tokio::test]
    async fn test_offline_pass_is_refused() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (coordinator, db, _) = setup(gateway.clone(), false).await;

        db.operations().enqueue(stock_in("mat-a", 1)).await.unwrap();

        let err = coordinator.sync_now().await.unwrap_err();
        assert!(matches!(err, SyncError::Offline));
        assert!(gateway.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_transient_failures_converge_at_ceiling() {
        let gateway = Arc::new(ScriptedGateway::default());
        let db = Database::new(DbConfig::in_memory().retry_ceiling(3))
            .await
            .unwrap();
        let monitor = ConnectivityMonitor::new(ConnectivityState::Online);
        let coordinator = SyncCoordinator::new(db.clone(), gateway.clone(), monitor, 50);
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-a", 1)).await.unwrap();
        let target = EntityRef::material("mat-a");

        // Every pass fails transiently; the queue must go terminal on the
        // third attempt rather than retrying forever.
        for _ in 0..3 {
            gateway.script(
                &target,
                SubmitOutcome::TransientFailure {
                    cause: "timeout".into(),
                },
            );
        }

        for pass in 1..=3 {
            let summary = coordinator.sync_now().await.unwrap();
            if pass < 3 {
                assert_eq!(summary.remaining, 1, "pass {}", pass);
            } else {
                assert_eq!(summary.failed, 1, "pass {}", pass);
                assert_eq!(summary.remaining, 0, "pass {}", pass);
            }
        }

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Failed);
        assert_eq!(stored.attempt_count, 3);

        // A fourth pass finds nothing to do
        let summary = coordinator.sync_now().await.unwrap();
        assert!(summary.is_noop());
    }

    #[tokio::test]
    async fn test_transient_failures_then_success_spends_budget_once_per_pass() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (coordinator, db, _) = setup(gateway.clone(), true).await;
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-b", 4)).await.unwrap();
        let target = EntityRef::material("mat-b");

        // Three flaky passes, then the network holds
        for _ in 0..3 {
            gateway.script(
                &target,
                SubmitOutcome::TransientFailure {
                    cause: "timeout".into(),
                },
            );
        }

        for _ in 0..3 {
            let summary = coordinator.sync_now().await.unwrap();
            assert_eq!(summary.remaining, 1);
        }

        let summary = coordinator.sync_now().await.unwrap();
        assert_eq!(summary.synced, 1);

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Synced);
        // One attempt per failed pass, none past the ceiling
        assert_eq!(stored.attempt_count, 3);
    }

    #[tokio::test]
    async fn test_stranded_operation_is_replayed_with_same_token() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (coordinator, db, _) = setup(gateway.clone(), true).await;
        let queue = db.operations();

        // Simulate a crash after the submit was sent but before the ack
        // was recorded: the row is stuck in 'syncing'.
        let op = queue.enqueue(stock_in("mat-a", 1)).await.unwrap();
        queue.mark_syncing(&op.local_id).await.unwrap();

        let summary = coordinator.sync_now().await.unwrap();
        assert_eq!(summary.synced, 1);

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Synced);
        // Same token went over the wire, so the service deduplicated
        assert_eq!(stored.idempotency_token, op.idempotency_token);
    }

    #[tokio::test]
    async fn test_snapshot_from_ack_refreshes_cache() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (coordinator, db, _) = setup(gateway.clone(), true).await;

        gateway.script(
            &EntityRef::material("mat-a"),
            SubmitOutcome::Synced {
                server_id: "srv-1".into(),
                snapshot: Some(serde_json::json!({"name": "Rebar", "quantity": 42})),
            },
        );

        db.operations().enqueue(stock_in("mat-a", 1)).await.unwrap();
        coordinator.sync_now().await.unwrap();

        let cached = db
            .cache()
            .get(EntityType::Material, "mat-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.payload["quantity"], 42);
    }

    #[tokio::test]
    async fn test_reporter_receives_pass_summary() {
        let gateway = Arc::new(ScriptedGateway::default());
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let monitor = ConnectivityMonitor::new(ConnectivityState::Online);
        let reporter = Arc::new(RecordingReporter::default());
        let coordinator = SyncCoordinator::new(db.clone(), gateway, monitor, 50)
            .with_reporter(reporter.clone());

        db.operations().enqueue(stock_in("mat-a", 1)).await.unwrap();
        coordinator.sync_now().await.unwrap();

        let summaries = reporter.summaries.lock().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].synced, 1);
    }

    #[tokio::test]
    async fn test_background_loop_syncs_on_reconnect() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (coordinator, db, monitor) = setup(gateway.clone(), false).await;
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-a", 1)).await.unwrap();
        let handle = coordinator.start();

        // Offline: triggering does nothing
        handle.trigger();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(gateway.submissions().is_empty());

        // Coming back online starts a pass by itself
        monitor.set_online();
        for _ in 0..100 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let stored = queue.get(&op.local_id).await.unwrap().unwrap();
            if stored.status == OperationStatus::Synced {
                break;
            }
        }

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Synced);

        handle.shutdown().await;
    }
}
