// ==========================================
// 仓库波次排程引擎 - 波次 / 阶段排程数据仓储
// ==========================================
// 红线:
// - Repository 不含业务逻辑
// - wave_assignment 的替换必须在单事务内完成（删除 + 插入）
// ==========================================

use crate::domain::types::{Stage, WaveStatus};
use crate::domain::wave::{Wave, WaveAssignment};
use crate::repository::convert::parse_enum_column;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::sync::{Arc, Mutex};

const WAVE_COLUMNS: &str =
    "wave_id, wave_name, wave_type, warehouse_id, status, total_orders, planned_start_time, created_at";

// ==========================================
// WaveRepository - 波次仓储
// ==========================================
pub struct WaveRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WaveRepository {
    /// 创建新的WaveRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按wave_id查询波次
    pub fn find_by_id(&self, wave_id: &str) -> RepositoryResult<Option<Wave>> {
        let conn = self.get_conn()?;

        let wave = conn
            .query_row(
                &format!("SELECT {} FROM waves WHERE wave_id = ?1", WAVE_COLUMNS),
                params![wave_id],
                map_wave_row,
            )
            .optional()?;

        Ok(wave)
    }

    /// 查询仓库全部波次（按创建时间、名称）
    pub fn find_by_warehouse(&self, warehouse_id: i64) -> RepositoryResult<Vec<Wave>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM waves WHERE warehouse_id = ?1 ORDER BY created_at, wave_name",
            WAVE_COLUMNS
        ))?;
        let waves = stmt
            .query_map(params![warehouse_id], map_wave_row)?
            .collect::<Result<Vec<Wave>, _>>()?;

        Ok(waves)
    }

    /// 查询波次全部阶段记录
    ///
    /// 排序: (planned_start_time, order_id, stage)，在内存中按领域字段排序
    pub fn find_assignments(&self, wave_id: &str) -> RepositoryResult<Vec<WaveAssignment>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT wave_id, order_id, stage, planned_start_time, planned_duration_minutes
               FROM wave_assignments
               WHERE wave_id = ?1"#,
        )?;
        let mut assignments = stmt
            .query_map(params![wave_id], map_assignment_row)?
            .collect::<Result<Vec<WaveAssignment>, _>>()?;

        assignments.sort_by(|a, b| {
            a.planned_start_time
                .cmp(&b.planned_start_time)
                .then_with(|| a.order_id.cmp(&b.order_id))
                .then_with(|| a.stage.cmp(&b.stage))
        });

        Ok(assignments)
    }

    // ==========================================
    // 写入
    // ==========================================

    /// 写入波次及其阶段记录（必须与 mark_orders_assigned 在同一事务中调用）
    pub fn persist_wave(tx: &Transaction, wave: &Wave, assignments: &[WaveAssignment]) -> RepositoryResult<()> {
        tx.execute(
            r#"INSERT INTO waves (
                wave_id, wave_name, wave_type, warehouse_id, status, total_orders,
                planned_start_time, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)"#,
            params![
                &wave.wave_id,
                &wave.wave_name,
                &wave.wave_type,
                wave.warehouse_id,
                wave.status.as_str(),
                wave.total_orders,
                wave.planned_start_time,
                wave.created_at,
            ],
        )?;

        insert_assignments(tx, assignments)
    }

    /// 原子替换 pending 波次的全部阶段记录
    ///
    /// # 红线
    /// - 删除与插入在同一事务；任何失败整体回滚，旧集合保持完整可见
    /// - 波次已不是 pending（并发释放）时返回乐观锁冲突
    pub fn replace_assignments(
        &self,
        wave_id: &str,
        planned_start_time: NaiveDateTime,
        assignments: &[WaveAssignment],
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let guarded = tx.execute(
            r#"UPDATE waves
               SET planned_start_time = ?1, updated_at = datetime('now')
               WHERE wave_id = ?2 AND status = 'pending'"#,
            params![planned_start_time, wave_id],
        )?;
        if guarded != 1 {
            let exists: bool = tx
                .query_row("SELECT 1 FROM waves WHERE wave_id = ?1", params![wave_id], |_| Ok(true))
                .optional()?
                .unwrap_or(false);
            return Err(if exists {
                RepositoryError::OptimisticLockFailure {
                    entity: "waves".to_string(),
                    id: wave_id.to_string(),
                    message: "波次已不是 pending，不可重排".to_string(),
                }
            } else {
                RepositoryError::NotFound {
                    entity: "waves".to_string(),
                    id: wave_id.to_string(),
                }
            });
        }

        tx.execute("DELETE FROM wave_assignments WHERE wave_id = ?1", params![wave_id])?;
        insert_assignments(&tx, assignments)?;

        tx.commit()?;
        Ok(assignments.len())
    }

    /// 波次状态流转
    pub fn update_status(&self, wave_id: &str, next: WaveStatus) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let current_raw: Option<String> = tx
            .query_row(
                "SELECT status FROM waves WHERE wave_id = ?1",
                params![wave_id],
                |row| row.get(0),
            )
            .optional()?;
        let current_raw = current_raw.ok_or_else(|| RepositoryError::NotFound {
            entity: "waves".to_string(),
            id: wave_id.to_string(),
        })?;
        let current = WaveStatus::parse(&current_raw).ok_or_else(|| RepositoryError::FieldValueError {
            field: "waves.status".to_string(),
            message: format!("未知状态 '{}'", current_raw),
        })?;

        if !current.can_transition_to(next) {
            return Err(RepositoryError::InvalidStateTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }

        tx.execute(
            "UPDATE waves SET status = ?1, updated_at = datetime('now') WHERE wave_id = ?2 AND status = ?3",
            params![next.as_str(), wave_id, current.as_str()],
        )?;

        tx.commit()?;
        Ok(())
    }
}

// ==========================================
// 行映射 / 写入辅助
// ==========================================

fn insert_assignments(tx: &Transaction, assignments: &[WaveAssignment]) -> RepositoryResult<()> {
    let mut stmt = tx.prepare(
        r#"INSERT INTO wave_assignments (
                wave_id, order_id, stage, planned_start_time, planned_duration_minutes
            ) VALUES (?1, ?2, ?3, ?4, ?5)"#,
    )?;

    for assignment in assignments {
        stmt.execute(params![
            &assignment.wave_id,
            &assignment.order_id,
            assignment.stage.as_str(),
            assignment.planned_start_time,
            assignment.planned_duration_minutes,
        ])?;
    }

    Ok(())
}

fn map_wave_row(row: &Row) -> rusqlite::Result<Wave> {
    let status_raw: String = row.get(4)?;
    Ok(Wave {
        wave_id: row.get(0)?,
        wave_name: row.get(1)?,
        wave_type: row.get(2)?,
        warehouse_id: row.get(3)?,
        status: parse_enum_column(4, "waves.status", status_raw, WaveStatus::parse)?,
        total_orders: row.get(5)?,
        planned_start_time: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_assignment_row(row: &Row) -> rusqlite::Result<WaveAssignment> {
    let stage_raw: String = row.get(2)?;
    Ok(WaveAssignment {
        wave_id: row.get(0)?,
        order_id: row.get(1)?,
        stage: parse_enum_column(2, "wave_assignments.stage", stage_raw, Stage::parse)?,
        planned_start_time: row.get(3)?,
        planned_duration_minutes: row.get(4)?,
    })
}
