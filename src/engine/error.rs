// ==========================================
// 仓库波次排程引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: Configuration / DataIntegrity / ConcurrencyConflict / Persistence
//       + Planning / StateConflict / Cancelled
// ==========================================

use crate::domain::types::{Stage, WaveStatus};
use crate::repository::error::RepositoryError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// 错误大类（决定上层处理策略）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 配置缺失/非法：任何写入之前失败
    Configuration,
    /// 工时/库位缺失：仅影响相关订单
    DataIntegrity,
    /// 同仓库并发组波冲突：重试一次后上抛
    ConcurrencyConflict,
    /// 存储失败：整次组波回滚
    Persistence,
    /// 规划输入不满足前置条件
    Planning,
    /// 波次状态不允许该操作
    StateConflict,
    /// 提交前被取消
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "CONFIGURATION",
            ErrorKind::DataIntegrity => "DATA_INTEGRITY",
            ErrorKind::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            ErrorKind::Persistence => "PERSISTENCE",
            ErrorKind::Planning => "PLANNING",
            ErrorKind::StateConflict => "STATE_CONFLICT",
            ErrorKind::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum WaveEngineError {
    // ===== 配置错误 =====
    #[error("配置错误 (key={key}): {message}")]
    Configuration { key: String, message: String },

    #[error("波次容量配置非法: max_orders_per_wave={max_orders_per_wave} (必须 > 0)")]
    CapacityConfig { max_orders_per_wave: i64 },

    // ===== 数据完整性错误 =====
    #[error("SKU 工时缺失: sku_code={sku_code}, field={field}")]
    MissingRate { sku_code: String, field: &'static str },

    #[error("库位无法解析: sku_code={sku_code}, bin_code={bin_code}")]
    MissingLocation { sku_code: String, bin_code: String },

    #[error("阶段结束时间超出可表示范围: order_id={order_id}, stage={stage}")]
    ScheduleOverflow { order_id: String, stage: Stage },

    // ===== 规划错误 =====
    #[error("无可组波订单: warehouse_id={warehouse_id}")]
    EmptyCandidateSet { warehouse_id: i64 },

    #[error("订单缺少工时估算: order_id={order_id}")]
    IncompleteTimeModel { order_id: String },

    #[error("波次未找到: wave_id={wave_id}")]
    WaveNotFound { wave_id: String },

    // ===== 状态冲突 =====
    #[error("波次状态不允许重排: wave_id={wave_id}, status={status}")]
    ReplanConflict { wave_id: String, status: WaveStatus },

    // ===== 并发冲突 =====
    #[error("仓库订单池并发冲突: warehouse_id={warehouse_id}, {message}")]
    ConcurrencyConflict { warehouse_id: i64, message: String },

    // ===== 取消 =====
    #[error("组波已在提交前取消: warehouse_id={warehouse_id}")]
    Cancelled { warehouse_id: i64 },

    // ===== 存储错误 =====
    #[error("存储失败: {0}")]
    Persistence(#[from] RepositoryError),
}

impl WaveEngineError {
    /// 错误大类
    pub fn kind(&self) -> ErrorKind {
        match self {
            WaveEngineError::Configuration { .. } | WaveEngineError::CapacityConfig { .. } => {
                ErrorKind::Configuration
            }
            WaveEngineError::MissingRate { .. }
            | WaveEngineError::MissingLocation { .. }
            | WaveEngineError::ScheduleOverflow { .. } => ErrorKind::DataIntegrity,
            WaveEngineError::EmptyCandidateSet { .. }
            | WaveEngineError::IncompleteTimeModel { .. }
            | WaveEngineError::WaveNotFound { .. } => ErrorKind::Planning,
            WaveEngineError::ReplanConflict { .. } => ErrorKind::StateConflict,
            WaveEngineError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            WaveEngineError::Cancelled { .. } => ErrorKind::Cancelled,
            WaveEngineError::Persistence(RepositoryError::OptimisticLockFailure { .. }) => {
                ErrorKind::ConcurrencyConflict
            }
            WaveEngineError::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// 配置错误快捷构造
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        WaveEngineError::Configuration {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// 是否仅影响单个订单（可剔除后继续组波）
    pub fn is_order_scoped(&self) -> bool {
        self.kind() == ErrorKind::DataIntegrity
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, WaveEngineError>;
