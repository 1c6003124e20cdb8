// ==========================================
// 并发控制 / 取消 集成测试
// ==========================================
// 测试目标:
// - 同仓库组波互斥，不同仓库互不阻塞
// - 提交时订单已被占用 → 整体回滚，重试一次
// - 提交前取消 → 无任何写入
// ==========================================


use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wave_scheduler::config::WaveEngineConfig;
use wave_scheduler::domain::{BinLocation, Order, SkuRate, Wave, WaveAssignment, WaveStatus};
use wave_scheduler::engine::{
    AssignmentStore, CancelFlag, ErrorKind, WarehouseLockRegistry, WaveBuildOrchestrator, WaveBuildRequest,
    WaveCommit, WaveEngineError,
};
use wave_scheduler::repository::{RepositoryResult, SqliteAssignmentStore};
use test_helpers::*;

// ==========================================
// 测试用存储包装
// ==========================================

/// 在提交前执行一次钩子（模拟其他进程抢占订单 / 调用方取消）
struct HookedStore {
    inner: Arc<SqliteAssignmentStore>,
    before_commit: Box<dyn Fn(usize) + Send + Sync>,
    commits: AtomicUsize,
    cancel_on_read: Option<CancelFlag>,
}

impl HookedStore {
    fn new(inner: Arc<SqliteAssignmentStore>, before_commit: impl Fn(usize) + Send + Sync + 'static) -> Self {
        Self {
            inner,
            before_commit: Box::new(before_commit),
            commits: AtomicUsize::new(0),
            cancel_on_read: None,
        }
    }

    /// 读取工时时置位取消标志（模拟计算期间调用方取消）
    fn cancelling_on_read(mut self, cancel: CancelFlag) -> Self {
        self.cancel_on_read = Some(cancel);
        self
    }
}

impl AssignmentStore for HookedStore {
    fn fetch_pending_orders(&self, warehouse_id: i64) -> RepositoryResult<Vec<Order>> {
        self.inner.fetch_pending_orders(warehouse_id)
    }

    fn fetch_sku_rates(&self, sku_codes: &[String]) -> RepositoryResult<HashMap<String, SkuRate>> {
        if let Some(cancel) = &self.cancel_on_read {
            cancel.cancel();
        }
        self.inner.fetch_sku_rates(sku_codes)
    }

    fn resolve_bin_location(&self, bin_code: &str) -> RepositoryResult<Option<BinLocation>> {
        self.inner.resolve_bin_location(bin_code)
    }

    fn fetch_wave(&self, wave_id: &str) -> RepositoryResult<Option<Wave>> {
        self.inner.fetch_wave(wave_id)
    }

    fn fetch_wave_orders(&self, wave_id: &str) -> RepositoryResult<Vec<Order>> {
        self.inner.fetch_wave_orders(wave_id)
    }

    fn fetch_wave_assignments(&self, wave_id: &str) -> RepositoryResult<Vec<WaveAssignment>> {
        self.inner.fetch_wave_assignments(wave_id)
    }

    fn commit_wave_build(&self, commits: &[WaveCommit]) -> RepositoryResult<()> {
        let call = self.commits.fetch_add(1, Ordering::SeqCst);
        (self.before_commit)(call);
        self.inner.commit_wave_build(commits)
    }

    fn replace_wave_assignments(
        &self,
        wave_id: &str,
        planned_start_time: NaiveDateTime,
        assignments: &[WaveAssignment],
    ) -> RepositoryResult<()> {
        self.inner
            .replace_wave_assignments(wave_id, planned_start_time, assignments)
    }

    fn update_wave_status(&self, wave_id: &str, next: WaveStatus) -> RepositoryResult<()> {
        self.inner.update_wave_status(wave_id, next)
    }
}

fn fast_retry_config() -> Arc<WaveEngineConfig> {
    let mut config = WaveEngineConfig::default();
    config.store.conflict_retry_backoff_ms = 10;
    Arc::new(config)
}

// ==========================================
// 测试
// ==========================================

#[tokio::test]
async fn test_order_taken_by_other_process_rolls_back_and_retries() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    seed_two_order_scenario(&store);

    // 第一次提交前，另一连接抢走 O2
    let external_path = db_path.clone();
    let hooked = Arc::new(HookedStore::new(store.clone(), move |call| {
        if call == 0 {
            let conn = open_test_connection(&external_path).unwrap();
            conn.execute("UPDATE orders SET status = 'cancelled' WHERE order_id = 'O2'", [])
                .unwrap();
        }
    }));
    let orchestrator = WaveBuildOrchestrator::new(hooked.clone(), fast_retry_config());

    let report = orchestrator
        .build_waves(1, WaveBuildRequest::starting_at(t0()))
        .await
        .unwrap();

    // 第一次提交整体回滚，重试只包含 O1
    assert_eq!(report.attempts, 2);
    assert_eq!(report.waves.len(), 1);
    assert_eq!(report.waves[0].order_ids, vec!["O1".to_string()]);

    let conn = open_test_connection(&db_path).unwrap();
    assert_eq!(count_rows(&conn, "waves"), 1);
    assert_eq!(count_rows(&conn, "wave_assignments"), 3);
    assert_eq!(order_status(&conn, "O1"), "assigned");
    assert_eq!(order_status(&conn, "O2"), "cancelled");
}

#[tokio::test]
async fn test_conflict_surfaces_after_single_retry() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    seed_two_order_scenario(&store);

    // 每次提交前都有新订单被抢占：两次都冲突
    let external_path = db_path.clone();
    let hooked = Arc::new(HookedStore::new(store.clone(), move |call| {
        let victim = if call == 0 { "O1" } else { "O2" };
        let conn = open_test_connection(&external_path).unwrap();
        conn.execute("UPDATE orders SET status = 'cancelled' WHERE order_id = ?1", [victim])
            .unwrap();
    }));
    let orchestrator = WaveBuildOrchestrator::new(hooked.clone(), fast_retry_config());

    let err = orchestrator
        .build_waves(1, WaveBuildRequest::starting_at(t0()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
    assert!(matches!(err, WaveEngineError::ConcurrencyConflict { warehouse_id: 1, .. }));
    assert_eq!(hooked.commits.load(Ordering::SeqCst), 2);

    let conn = open_test_connection(&db_path).unwrap();
    assert_eq!(count_rows(&conn, "waves"), 0);
    assert_eq!(count_rows(&conn, "wave_assignments"), 0);
}

#[tokio::test]
async fn test_same_warehouse_is_mutually_exclusive() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    seed_two_order_scenario(&store);
    seed_order(&store, &make_order("W2-1", 2, queued(10), &[("A", 1)]));

    let locks = Arc::new(WarehouseLockRegistry::new());
    let orchestrator = WaveBuildOrchestrator::with_locks(store.clone(), fast_retry_config(), locks.clone());

    // 另一个组波正持有仓库 1
    let guard = locks.try_acquire(1).unwrap();

    let err = orchestrator
        .build_waves(1, WaveBuildRequest::starting_at(t0()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
    assert_eq!(store.fetch_pending_orders(1).unwrap().len(), 2);

    // 仓库 2 不受影响
    let report = orchestrator
        .build_waves(2, WaveBuildRequest::starting_at(t0()))
        .await
        .unwrap();
    assert_eq!(report.waves[0].order_ids, vec!["W2-1".to_string()]);

    drop(guard);
    let report = orchestrator
        .build_waves(1, WaveBuildRequest::starting_at(t0()))
        .await
        .unwrap();
    assert_eq!(report.total_orders(), 2);
}

#[tokio::test]
async fn test_lock_released_during_backoff_succeeds_on_retry() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    seed_two_order_scenario(&store);

    let mut config = WaveEngineConfig::default();
    config.store.conflict_retry_backoff_ms = 200;
    let locks = Arc::new(WarehouseLockRegistry::new());
    let orchestrator = WaveBuildOrchestrator::with_locks(store.clone(), Arc::new(config), locks.clone());

    let guard = locks.try_acquire(1).unwrap();
    let releaser = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(guard);
    });

    let report = orchestrator
        .build_waves(1, WaveBuildRequest::starting_at(t0()))
        .await
        .unwrap();
    releaser.await.unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.total_orders(), 2);
}

#[tokio::test]
async fn test_different_warehouses_build_concurrently() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    seed_two_order_scenario(&store);
    seed_order(&store, &make_order("W2-1", 2, queued(10), &[("A", 1), ("B", 2)]));
    seed_order(&store, &make_order("W2-2", 2, queued(9), &[("B", 1)]));

    let orchestrator = Arc::new(WaveBuildOrchestrator::new(store.clone(), fast_retry_config()));
    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.build_waves(1, WaveBuildRequest::starting_at(t0())).await })
    };
    let second = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.build_waves(2, WaveBuildRequest::starting_at(t0())).await })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.total_orders(), 2);
    assert_eq!(second.total_orders(), 2);

    // 不存在被分配到两个波次的订单
    let conn = open_test_connection(&db_path).unwrap();
    let duplicated: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM (SELECT order_id FROM wave_assignments WHERE stage = 'pick' \
             GROUP BY order_id HAVING COUNT(DISTINCT wave_id) > 1)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(duplicated, 0);
}

#[tokio::test]
async fn test_cancel_before_commit_writes_nothing() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    seed_two_order_scenario(&store);

    let cancel = CancelFlag::new();
    cancel.cancel();
    let orchestrator = WaveBuildOrchestrator::new(store.clone(), fast_retry_config());

    let err = orchestrator
        .build_waves(1, WaveBuildRequest::starting_at(t0()).with_cancel(cancel))
        .await
        .unwrap_err();
    assert!(matches!(err, WaveEngineError::Cancelled { warehouse_id: 1 }));
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let conn = open_test_connection(&db_path).unwrap();
    assert_eq!(count_rows(&conn, "waves"), 0);
    assert_eq!(order_status(&conn, "O1"), "pending");
}

#[tokio::test]
async fn test_cancel_during_planning_is_checked_before_commit() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    seed_two_order_scenario(&store);

    let cancel = CancelFlag::new();
    let hooked = Arc::new(HookedStore::new(store.clone(), |_| {}).cancelling_on_read(cancel.clone()));
    let orchestrator = WaveBuildOrchestrator::new(hooked.clone(), fast_retry_config());

    let err = orchestrator
        .build_waves(1, WaveBuildRequest::starting_at(t0()).with_cancel(cancel.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(cancel.is_cancelled());
    assert_eq!(hooked.commits.load(Ordering::SeqCst), 0);

    let conn = open_test_connection(&db_path).unwrap();
    assert_eq!(count_rows(&conn, "waves"), 0);
    assert_eq!(count_rows(&conn, "wave_assignments"), 0);
    assert_eq!(store.fetch_pending_orders(1).unwrap().len(), 2);
}
