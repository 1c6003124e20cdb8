// ==========================================
// 仓库波次排程引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 作用域: global < warehouse/{id}（仓库级覆写全局）
// ==========================================

use crate::config::engine_config::WaveEngineConfig;
use crate::config::wave_config_trait::WaveConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::types::{PickResourceMode, WaveTypeRule};
use crate::engine::error::{EngineResult, WaveEngineError};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// ConfigScope - 配置作用域
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,                          // 全局
    Warehouse { warehouse_id: i64 }, // 仓库
}

impl ConfigScope {
    /// config_kv.scope_id
    pub fn scope_id(&self) -> String {
        match self {
            ConfigScope::Global => "global".to_string(),
            ConfigScope::Warehouse { warehouse_id } => format!("warehouse/{}", warehouse_id),
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取指定作用域的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, scope: &ConfigScope, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![scope.scope_id(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 读取仓库生效配置（仓库级优先，其次全局）
    pub fn get_effective_value(&self, warehouse_id: i64, key: &str) -> RepositoryResult<Option<String>> {
        let warehouse_scope = ConfigScope::Warehouse { warehouse_id };
        if let Some(value) = self.get_config_value(&warehouse_scope, key)? {
            return Ok(Some(value));
        }
        self.get_config_value(&ConfigScope::Global, key)
    }

    /// 写入配置值 (UPSERT)
    pub fn set_config_value(&self, scope: &ConfigScope, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope.scope_id(), key, value],
        )?;

        Ok(())
    }

    /// 获取仓库生效配置快照（JSON格式）
    ///
    /// # 用途
    /// - 组波报告中记录本次使用的参数
    pub fn get_config_snapshot(&self, warehouse_id: i64) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT scope_id, key, value FROM config_kv WHERE scope_id IN ('global', ?1) ORDER BY key",
        )?;

        let warehouse_scope_id = ConfigScope::Warehouse { warehouse_id }.scope_id();
        let rows = stmt.query_map(params![warehouse_scope_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        // 仓库级覆写全局
        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let mut overrides: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (scope_id, key, value) = row?;
            if scope_id == "global" {
                config_map.insert(key, value);
            } else {
                overrides.insert(key, value);
            }
        }
        config_map.extend(overrides);

        serde_json::to_string(&json!(config_map))
            .map_err(|e| RepositoryError::Other(anyhow::Error::new(e)))
    }

    // ==========================================
    // 解析辅助
    // ==========================================

    fn read_number<T>(&self, warehouse_id: i64, key: &str, default: T) -> EngineResult<T>
    where
        T: FromStr,
    {
        match self.get_effective_value(warehouse_id, key)? {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|_| WaveEngineError::config(key, format!("无法解析数值: '{}'", raw))),
        }
    }

    fn read_bool(&self, warehouse_id: i64, key: &str, default: bool) -> EngineResult<bool> {
        match self.get_effective_value(warehouse_id, key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "y" => Ok(true),
                "0" | "false" | "no" | "n" => Ok(false),
                _ => Err(WaveEngineError::config(key, format!("无法解析布尔值: '{}'", raw))),
            },
        }
    }
}

// ==========================================
// WaveConfigReader 实现
// ==========================================
#[async_trait]
impl WaveConfigReader for ConfigManager {
    async fn load_engine_config(&self, warehouse_id: i64) -> EngineResult<WaveEngineConfig> {
        let defaults = WaveEngineConfig::default();
        let mut config = defaults.clone();

        // ===== 行走时间 =====
        config.walking_time.walking_speed_fpm = self.read_number(
            warehouse_id,
            config_keys::WALKING_SPEED_FPM,
            defaults.walking_time.walking_speed_fpm,
        )?;
        config.walking_time.vertical_movement_weight = self.read_number(
            warehouse_id,
            config_keys::VERTICAL_MOVEMENT_WEIGHT,
            defaults.walking_time.vertical_movement_weight,
        )?;
        config.walking_time.aisle_spacing_feet = self.read_number(
            warehouse_id,
            config_keys::AISLE_SPACING_FEET,
            defaults.walking_time.aisle_spacing_feet,
        )?;
        config.walking_time.bay_width_feet = self.read_number(
            warehouse_id,
            config_keys::BAY_WIDTH_FEET,
            defaults.walking_time.bay_width_feet,
        )?;
        config.walking_time.level_height_feet = self.read_number(
            warehouse_id,
            config_keys::LEVEL_HEIGHT_FEET,
            defaults.walking_time.level_height_feet,
        )?;
        config.walking_time.zone_change_feet = self.read_number(
            warehouse_id,
            config_keys::ZONE_CHANGE_FEET,
            defaults.walking_time.zone_change_feet,
        )?;

        // ===== 组波 =====
        config.wave_builder.max_orders_per_wave = self.read_number(
            warehouse_id,
            config_keys::MAX_ORDERS_PER_WAVE,
            defaults.wave_builder.max_orders_per_wave,
        )?;
        if let Some(raw) = self.get_effective_value(warehouse_id, config_keys::WAVE_TYPE_RULE)? {
            config.wave_builder.wave_type_rule = WaveTypeRule::parse(&raw).ok_or_else(|| {
                WaveEngineError::config(config_keys::WAVE_TYPE_RULE, format!("未知波次类型规则: '{}'", raw))
            })?;
        }
        config.wave_builder.exclude_invalid_orders = self.read_bool(
            warehouse_id,
            config_keys::EXCLUDE_INVALID_ORDERS,
            defaults.wave_builder.exclude_invalid_orders,
        )?;

        // ===== 阶段排程 =====
        if let Some(raw) = self.get_effective_value(warehouse_id, config_keys::PICK_RESOURCE_MODE)? {
            config.stage_scheduler.pick_resource_mode = PickResourceMode::parse(&raw).ok_or_else(|| {
                WaveEngineError::config(
                    config_keys::PICK_RESOURCE_MODE,
                    format!("必须为 shared 或 parallel, 实际 '{}'", raw),
                )
            })?;
        }
        config.stage_scheduler.ship_time_minutes = self.read_number(
            warehouse_id,
            config_keys::SHIP_TIME_MINUTES,
            defaults.stage_scheduler.ship_time_minutes,
        )?;

        // ===== 边界 I/O =====
        config.store.busy_timeout_ms = self.read_number(
            warehouse_id,
            config_keys::BUSY_TIMEOUT_MS,
            defaults.store.busy_timeout_ms,
        )?;
        config.store.conflict_retry_backoff_ms = self.read_number(
            warehouse_id,
            config_keys::CONFLICT_RETRY_BACKOFF_MS,
            defaults.store.conflict_retry_backoff_ms,
        )?;

        config.validate()?;

        debug!(
            warehouse_id,
            walking_speed_fpm = config.walking_time.walking_speed_fpm,
            max_orders_per_wave = config.wave_builder.max_orders_per_wave,
            pick_resource_mode = %config.stage_scheduler.pick_resource_mode,
            "引擎配置加载完成"
        );

        Ok(config)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 行走时间模型
    pub const WALKING_SPEED_FPM: &str = "walking_time.walking_speed_fpm";
    pub const VERTICAL_MOVEMENT_WEIGHT: &str = "walking_time.vertical_movement_weight";
    pub const AISLE_SPACING_FEET: &str = "walking_time.aisle_spacing_feet";
    pub const BAY_WIDTH_FEET: &str = "walking_time.bay_width_feet";
    pub const LEVEL_HEIGHT_FEET: &str = "walking_time.level_height_feet";
    pub const ZONE_CHANGE_FEET: &str = "walking_time.zone_change_feet";

    // 组波
    pub const MAX_ORDERS_PER_WAVE: &str = "wave_builder.max_orders_per_wave";
    pub const WAVE_TYPE_RULE: &str = "wave_builder.wave_type_rule";
    pub const EXCLUDE_INVALID_ORDERS: &str = "wave_builder.exclude_invalid_orders";

    // 阶段排程
    pub const PICK_RESOURCE_MODE: &str = "stage_scheduler.pick_resource_mode";
    pub const SHIP_TIME_MINUTES: &str = "stage_scheduler.ship_time_minutes";

    // 边界 I/O
    pub const BUSY_TIMEOUT_MS: &str = "store.busy_timeout_ms";
    pub const CONFLICT_RETRY_BACKOFF_MS: &str = "orchestrator.conflict_retry_backoff_ms";
}
