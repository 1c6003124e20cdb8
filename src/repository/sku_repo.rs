// ==========================================
// 仓库波次排程引擎 - SKU / 库位数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑（工时缺失的判定交给 Time Model）
// ==========================================

use crate::domain::sku::{BinLocation, SkuRate};
use crate::repository::convert::in_placeholders;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const RATE_QUERY_CHUNK: usize = 500;

// ==========================================
// SkuRepository - SKU 工时仓储
// ==========================================
pub struct SkuRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SkuRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或更新 SKU
    pub fn upsert(&self, rate: &SkuRate) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO skus (sku_code, name, pick_time_minutes, pack_time_minutes, bin_code)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(sku_code) DO UPDATE SET
                   name = ?2, pick_time_minutes = ?3, pack_time_minutes = ?4, bin_code = ?5"#,
            params![
                &rate.sku_code,
                &rate.name,
                rate.pick_time_minutes,
                rate.pack_time_minutes,
                &rate.bin_code,
            ],
        )?;

        Ok(())
    }

    /// 批量查询 SKU 工时
    ///
    /// # 返回
    /// sku_code → SkuRate（库中不存在的 SKU 不出现在结果中）
    pub fn find_rates(&self, sku_codes: &[String]) -> RepositoryResult<HashMap<String, SkuRate>> {
        let mut rates = HashMap::new();
        if sku_codes.is_empty() {
            return Ok(rates);
        }

        let conn = self.get_conn()?;
        for chunk in sku_codes.chunks(RATE_QUERY_CHUNK) {
            let sql = format!(
                "SELECT sku_code, name, pick_time_minutes, pack_time_minutes, bin_code \
                 FROM skus WHERE sku_code IN ({})",
                in_placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok(SkuRate {
                    sku_code: row.get(0)?,
                    name: row.get(1)?,
                    pick_time_minutes: row.get(2)?,
                    pack_time_minutes: row.get(3)?,
                    bin_code: row.get(4)?,
                })
            })?;
            for row in rows {
                let rate = row?;
                rates.insert(rate.sku_code.clone(), rate);
            }
        }

        Ok(rates)
    }
}

// ==========================================
// BinRepository - 库位仓储
// ==========================================
pub struct BinRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BinRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或更新库位
    pub fn upsert(&self, warehouse_id: i64, location: &BinLocation) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO bins (bin_code, warehouse_id, zone, aisle, position, level)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(bin_code) DO UPDATE SET
                   warehouse_id = ?2, zone = ?3, aisle = ?4, position = ?5, level = ?6"#,
            params![
                &location.bin_code,
                warehouse_id,
                &location.zone,
                location.aisle,
                location.position,
                location.level,
            ],
        )?;

        Ok(())
    }

    /// 按库位编码查询
    pub fn find_by_code(&self, bin_code: &str) -> RepositoryResult<Option<BinLocation>> {
        let conn = self.get_conn()?;

        let location = conn
            .query_row(
                "SELECT bin_code, zone, aisle, position, level FROM bins WHERE bin_code = ?1",
                params![bin_code],
                |row| {
                    Ok(BinLocation {
                        bin_code: row.get(0)?,
                        zone: row.get(1)?,
                        aisle: row.get(2)?,
                        position: row.get(3)?,
                        level: row.get(4)?,
                    })
                },
            )
            .optional()?;

        Ok(location)
    }
}
