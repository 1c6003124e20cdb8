// ==========================================
// 仓库波次排程引擎 - 配置层
// ==========================================
// 职责: 系统配置管理,支持仓库级覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod engine_config;
pub mod wave_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, ConfigScope};
pub use engine_config::{
    StageSchedulerConfig, StoreConfig, WalkingTimeConfig, WaveBuilderConfig, WaveEngineConfig,
};
pub use wave_config_trait::WaveConfigReader;
