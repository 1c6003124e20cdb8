// ==========================================
// 仓库波次排程引擎 - 配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 实现者: ConfigManager（从 config_kv 表读取）、WaveEngineConfig（固定配置）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::engine_config::WaveEngineConfig;
use crate::engine::error::EngineResult;
use async_trait::async_trait;

// ==========================================
// WaveConfigReader Trait
// ==========================================
#[async_trait]
pub trait WaveConfigReader: Send + Sync {
    /// 加载指定仓库的生效配置
    ///
    /// # 返回
    /// - 已通过 `WaveEngineConfig::validate` 的配置
    /// - 配置缺失项使用默认值，非法值返回 Configuration 类错误
    async fn load_engine_config(&self, warehouse_id: i64) -> EngineResult<WaveEngineConfig>;
}

// 固定配置（所有仓库共用同一份参数）
#[async_trait]
impl WaveConfigReader for WaveEngineConfig {
    async fn load_engine_config(&self, _warehouse_id: i64) -> EngineResult<WaveEngineConfig> {
        self.validate()?;
        Ok(self.clone())
    }
}
