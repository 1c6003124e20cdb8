// ==========================================
// 仓库波次排程引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 + busy_timeout）
// - busy_timeout 即边界 I/O 的超时：仅作用于读写存储，不作用于内存排程
// - 提供 schema 初始化与版本检查
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 波次排程 schema
///
/// 说明：
/// - skus.bin_code 不设外键：外部主数据允许出现悬空库位引用，由 Time Model 报 MissingLocation
/// - wave_assignments 以 (wave_id, order_id, stage) 唯一，保证每阶段恰好一条
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS bins (
    bin_code TEXT PRIMARY KEY,
    warehouse_id INTEGER NOT NULL,
    zone TEXT NOT NULL,
    aisle INTEGER NOT NULL,
    position INTEGER NOT NULL,
    level INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS skus (
    sku_code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    pick_time_minutes REAL CHECK (pick_time_minutes IS NULL OR pick_time_minutes >= 0),
    pack_time_minutes REAL CHECK (pack_time_minutes IS NULL OR pack_time_minutes >= 0),
    bin_code TEXT
);

CREATE TABLE IF NOT EXISTS waves (
    wave_id TEXT PRIMARY KEY,
    wave_name TEXT NOT NULL,
    wave_type TEXT NOT NULL,
    warehouse_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'released', 'completed')),
    total_orders INTEGER NOT NULL,
    planned_start_time TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS orders (
    order_id TEXT PRIMARY KEY,
    warehouse_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    carrier TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    wave_id TEXT REFERENCES waves(wave_id),
    wave_sequence INTEGER
);

CREATE TABLE IF NOT EXISTS order_lines (
    order_id TEXT NOT NULL REFERENCES orders(order_id) ON DELETE CASCADE,
    line_no INTEGER NOT NULL,
    sku_code TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    PRIMARY KEY (order_id, line_no)
);

CREATE TABLE IF NOT EXISTS wave_assignments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    wave_id TEXT NOT NULL REFERENCES waves(wave_id) ON DELETE CASCADE,
    order_id TEXT NOT NULL REFERENCES orders(order_id),
    stage TEXT NOT NULL CHECK (stage IN ('pick', 'pack', 'ship')),
    planned_start_time TEXT NOT NULL,
    planned_duration_minutes REAL NOT NULL CHECK (planned_duration_minutes >= 0),
    UNIQUE (wave_id, order_id, stage)
);

CREATE INDEX IF NOT EXISTS idx_orders_pool ON orders (warehouse_id, status, created_at);
CREATE INDEX IF NOT EXISTS idx_orders_wave ON orders (wave_id, wave_sequence);
CREATE INDEX IF NOT EXISTS idx_wave_assignments_wave ON wave_assignments (wave_id);

INSERT OR IGNORE INTO schema_version (version) VALUES (1);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    configure_sqlite_connection_with_timeout(conn, DEFAULT_BUSY_TIMEOUT_MS)
}

/// 配置 SQLite 连接（指定 busy_timeout）
pub fn configure_sqlite_connection_with_timeout(conn: &Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化 schema（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }
}
