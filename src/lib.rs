// ==========================================
// 仓库波次排程引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 将待处理订单组成波次，并为每个订单排定 拣货 → 打包 → 发运 的计划时间
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 组波与排程
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{OrderStatus, PickResourceMode, Stage, WaveStatus, WaveTypeRule};

// 领域实体
pub use domain::{BinLocation, Order, OrderLine, SkuRate, Wave, WaveAssignment, WaveType};

// 引擎
pub use engine::{
    AssignmentStore, CancelFlag, ErrorKind, StageScheduler, TimeModel, WaveBuildOrchestrator,
    WaveBuildReport, WaveBuildRequest, WaveBuilder, WaveEngineError,
};

// 配置
pub use config::{ConfigManager, ConfigScope, WaveConfigReader, WaveEngineConfig};

// 仓储
pub use repository::{RepositoryError, SqliteAssignmentStore};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "仓库波次排程引擎";
