// ==========================================
// 仓库波次排程引擎 - 订单数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 约定: 排序全部基于显式领域字段 (created_at, order_id) / wave_sequence
// ==========================================

use crate::domain::order::{Order, OrderLine};
use crate::domain::types::OrderStatus;
use crate::repository::convert::{in_placeholders, parse_enum_column};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 单次 IN 查询的最大参数个数
const LINE_QUERY_CHUNK: usize = 500;

const ORDER_COLUMNS: &str =
    "order_id, warehouse_id, status, carrier, priority, created_at, wave_id, wave_sequence";

// ==========================================
// OrderRepository - 订单仓储
// ==========================================
pub struct OrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderRepository {
    /// 创建新的OrderRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增订单（含订单行）
    pub fn insert(&self, order: &Order) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO orders (
                order_id, warehouse_id, status, carrier, priority, created_at, wave_id, wave_sequence
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &order.order_id,
                order.warehouse_id,
                order.status.as_str(),
                &order.carrier,
                order.priority,
                order.created_at,
                &order.wave_id,
                order.wave_sequence,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO order_lines (order_id, line_no, sku_code, quantity) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for line in &order.lines {
                stmt.execute(params![&order.order_id, line.line_no, &line.sku_code, line.quantity])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// 查询仓库待组波订单（一致性快照：订单与订单行在同一读事务中读取）
    pub fn find_pending_by_warehouse(&self, warehouse_id: i64) -> RepositoryResult<Vec<Order>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut orders = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM orders WHERE warehouse_id = ?1 AND status = 'pending' \
                 ORDER BY created_at, order_id",
                ORDER_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![warehouse_id], map_order_row)?
                .collect::<Result<Vec<Order>, _>>()?;
            rows
        };
        attach_lines(&tx, &mut orders)?;

        tx.commit()?;
        Ok(orders)
    }

    /// 查询波次内订单（按 wave_sequence）
    pub fn find_by_wave(&self, wave_id: &str) -> RepositoryResult<Vec<Order>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut orders = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM orders WHERE wave_id = ?1 ORDER BY wave_sequence, order_id",
                ORDER_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![wave_id], map_order_row)?
                .collect::<Result<Vec<Order>, _>>()?;
            rows
        };
        attach_lines(&tx, &mut orders)?;

        tx.commit()?;
        Ok(orders)
    }

    /// 按ID查询订单
    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<Order>> {
        let conn = self.get_conn()?;

        let order = conn
            .query_row(
                &format!("SELECT {} FROM orders WHERE order_id = ?1", ORDER_COLUMNS),
                params![order_id],
                map_order_row,
            )
            .optional()?;

        match order {
            Some(order) => {
                let mut orders = vec![order];
                attach_lines(&conn, &mut orders)?;
                Ok(orders.pop())
            }
            None => Ok(None),
        }
    }

    /// 标记订单已分配到波次（必须与 persist_wave 在同一事务中调用）
    ///
    /// # 红线
    /// - 仅 status='pending' 的订单可被标记；否则说明订单已被其他组波占用，返回乐观锁冲突
    pub fn mark_orders_assigned(tx: &Transaction, order_ids: &[String], wave_id: &str) -> RepositoryResult<()> {
        let mut stmt = tx.prepare(
            r#"UPDATE orders
               SET status = 'assigned', wave_id = ?1, wave_sequence = ?2
               WHERE order_id = ?3 AND status = 'pending'"#,
        )?;

        for (idx, order_id) in order_ids.iter().enumerate() {
            let affected = stmt.execute(params![wave_id, (idx + 1) as i32, order_id])?;
            if affected != 1 {
                return Err(RepositoryError::OptimisticLockFailure {
                    entity: "orders".to_string(),
                    id: order_id.clone(),
                    message: "订单已不是 pending，可能已被其他组波分配".to_string(),
                });
            }
        }

        Ok(())
    }
}

// ==========================================
// 行映射
// ==========================================

fn map_order_row(row: &Row) -> rusqlite::Result<Order> {
    let status_raw: String = row.get(2)?;
    Ok(Order {
        order_id: row.get(0)?,
        warehouse_id: row.get(1)?,
        status: parse_enum_column(2, "orders.status", status_raw, OrderStatus::parse)?,
        carrier: row.get(3)?,
        priority: row.get(4)?,
        created_at: row.get(5)?,
        lines: Vec::new(),
        wave_id: row.get(6)?,
        wave_sequence: row.get(7)?,
    })
}

/// 为订单批量加载订单行（按 line_no）
fn attach_lines(conn: &Connection, orders: &mut [Order]) -> RepositoryResult<()> {
    if orders.is_empty() {
        return Ok(());
    }

    let mut lines_by_order: HashMap<String, Vec<OrderLine>> = HashMap::new();
    let ids: Vec<&str> = orders.iter().map(|o| o.order_id.as_str()).collect();

    for chunk in ids.chunks(LINE_QUERY_CHUNK) {
        let sql = format!(
            "SELECT order_id, line_no, sku_code, quantity FROM order_lines \
             WHERE order_id IN ({}) ORDER BY order_id, line_no",
            in_placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                OrderLine {
                    line_no: row.get(1)?,
                    sku_code: row.get(2)?,
                    quantity: row.get(3)?,
                },
            ))
        })?;
        for row in rows {
            let (order_id, line) = row?;
            lines_by_order.entry(order_id).or_default().push(line);
        }
    }

    for order in orders.iter_mut() {
        if let Some(lines) = lines_by_order.remove(&order.order_id) {
            order.lines = lines;
        }
    }

    Ok(())
}
