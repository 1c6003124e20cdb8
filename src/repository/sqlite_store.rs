// ==========================================
// 仓库波次排程引擎 - SQLite 分配存储实现
// ==========================================
// 职责: 以单个共享 SQLite 连接实现 AssignmentStore
// 红线: commit_wave_build 在单事务内写入全部波次并标记全部订单
// ==========================================

use crate::db::{
    configure_sqlite_connection_with_timeout, init_schema, read_schema_version, CURRENT_SCHEMA_VERSION,
};
use crate::domain::order::Order;
use crate::domain::sku::{BinLocation, SkuRate};
use crate::domain::types::WaveStatus;
use crate::domain::wave::{Wave, WaveAssignment};
use crate::engine::store::{AssignmentStore, WaveCommit};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::order_repo::OrderRepository;
use crate::repository::sku_repo::{BinRepository, SkuRepository};
use crate::repository::wave_repo::WaveRepository;
use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

// ==========================================
// SqliteAssignmentStore
// ==========================================
pub struct SqliteAssignmentStore {
    conn: Arc<Mutex<Connection>>,
    order_repo: OrderRepository,
    sku_repo: SkuRepository,
    bin_repo: BinRepository,
    wave_repo: WaveRepository,
}

impl SqliteAssignmentStore {
    /// 基于已有连接创建（调用方负责 schema 初始化）
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            order_repo: OrderRepository::new(conn.clone()),
            sku_repo: SkuRepository::new(conn.clone()),
            bin_repo: BinRepository::new(conn.clone()),
            wave_repo: WaveRepository::new(conn.clone()),
            conn,
        }
    }

    /// 打开数据库文件并初始化 schema
    ///
    /// 已有数据库的 schema_version 高于当前代码时拒绝打开。
    pub fn open(db_path: &str, busy_timeout_ms: u64) -> RepositoryResult<Self> {
        let conn = Connection::open(db_path)?;
        configure_sqlite_connection_with_timeout(&conn, busy_timeout_ms)?;
        init_schema(&conn)?;

        let version = read_schema_version(&conn)?.unwrap_or(0);
        if version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::FieldValueError {
                field: "schema_version".to_string(),
                message: format!("数据库版本 {} 高于当前支持的 {}", version, CURRENT_SCHEMA_VERSION),
            });
        }
        debug!(db_path, schema_version = version, "存储已打开");

        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// 按仓库配置调整 busy_timeout（store.busy_timeout_ms）
    pub fn apply_busy_timeout(&self, busy_timeout_ms: u64) -> RepositoryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        configure_sqlite_connection_with_timeout(&conn, busy_timeout_ms)?;
        Ok(())
    }

    /// 共享连接（供同库的其他仓储/配置管理器复用）
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    pub fn orders(&self) -> &OrderRepository {
        &self.order_repo
    }

    pub fn skus(&self) -> &SkuRepository {
        &self.sku_repo
    }

    pub fn bins(&self) -> &BinRepository {
        &self.bin_repo
    }

    pub fn waves(&self) -> &WaveRepository {
        &self.wave_repo
    }
}

impl AssignmentStore for SqliteAssignmentStore {
    fn fetch_pending_orders(&self, warehouse_id: i64) -> RepositoryResult<Vec<Order>> {
        self.order_repo.find_pending_by_warehouse(warehouse_id)
    }

    fn fetch_sku_rates(&self, sku_codes: &[String]) -> RepositoryResult<HashMap<String, SkuRate>> {
        self.sku_repo.find_rates(sku_codes)
    }

    fn resolve_bin_location(&self, bin_code: &str) -> RepositoryResult<Option<BinLocation>> {
        self.bin_repo.find_by_code(bin_code)
    }

    fn fetch_wave(&self, wave_id: &str) -> RepositoryResult<Option<Wave>> {
        self.wave_repo.find_by_id(wave_id)
    }

    fn fetch_wave_orders(&self, wave_id: &str) -> RepositoryResult<Vec<Order>> {
        self.order_repo.find_by_wave(wave_id)
    }

    fn fetch_wave_assignments(&self, wave_id: &str) -> RepositoryResult<Vec<WaveAssignment>> {
        self.wave_repo.find_assignments(wave_id)
    }

    #[instrument(skip(self, commits), fields(waves = commits.len()))]
    fn commit_wave_build(&self, commits: &[WaveCommit]) -> RepositoryResult<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction()?;

        for commit in commits {
            WaveRepository::persist_wave(&tx, &commit.wave, &commit.assignments)?;
            OrderRepository::mark_orders_assigned(&tx, &commit.order_ids, &commit.wave.wave_id)?;
            debug!(
                wave_id = %commit.wave.wave_id,
                orders = commit.order_ids.len(),
                assignments = commit.assignments.len(),
                "波次已写入事务"
            );
        }

        tx.commit()?;
        Ok(())
    }

    fn replace_wave_assignments(
        &self,
        wave_id: &str,
        planned_start_time: NaiveDateTime,
        assignments: &[WaveAssignment],
    ) -> RepositoryResult<()> {
        self.wave_repo
            .replace_assignments(wave_id, planned_start_time, assignments)
            .map(|_| ())
    }

    fn update_wave_status(&self, wave_id: &str, next: WaveStatus) -> RepositoryResult<()> {
        self.wave_repo.update_status(wave_id, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DEFAULT_BUSY_TIMEOUT_MS;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_rejects_newer_schema() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();

        let store = SqliteAssignmentStore::open(&db_path, DEFAULT_BUSY_TIMEOUT_MS).unwrap();
        store
            .connection()
            .lock()
            .unwrap()
            .execute("INSERT INTO schema_version (version) VALUES (?1)", [CURRENT_SCHEMA_VERSION + 1])
            .unwrap();
        drop(store);

        let err = SqliteAssignmentStore::open(&db_path, DEFAULT_BUSY_TIMEOUT_MS)
            .err()
            .unwrap();
        assert!(matches!(err, RepositoryError::FieldValueError { ref field, .. } if field == "schema_version"));
    }
}
