// ==========================================
// 仓库波次排程引擎 - 引擎配置值对象
// ==========================================
// 红线: 配置作为显式值传入 Time Model / 调度器，不使用进程级单例
// 用途: 不同仓库可并发使用不同参数组波
// ==========================================

use crate::config::config_manager::config_keys;
use crate::domain::types::{PickResourceMode, WaveTypeRule};
use crate::engine::error::{EngineResult, WaveEngineError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// WalkingTimeConfig - 行走时间模型参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkingTimeConfig {
    pub walking_speed_fpm: f64,        // 行走速度（英尺/分钟）
    pub vertical_movement_weight: f64, // 垂直移动权重（乘数）
    pub aisle_spacing_feet: f64,       // 相邻巷道间距（英尺）
    pub bay_width_feet: f64,           // 货位宽度（英尺）
    pub level_height_feet: f64,        // 层高（英尺）
    pub zone_change_feet: f64,         // 跨库区附加距离（英尺）
}

impl Default for WalkingTimeConfig {
    fn default() -> Self {
        Self {
            walking_speed_fpm: 264.0,
            vertical_movement_weight: 1.5,
            aisle_spacing_feet: 10.0,
            bay_width_feet: 4.0,
            level_height_feet: 5.0,
            zone_change_feet: 0.0,
        }
    }
}

// ==========================================
// WaveBuilderConfig - 组波参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveBuilderConfig {
    pub max_orders_per_wave: i64,            // 单波次最大订单数
    pub wave_type_rule: WaveTypeRule,        // 波次类型规则
    pub cutoff_time: Option<NaiveDateTime>,  // 截单时间（晚于此时间入队的订单顺延）
    pub exclude_invalid_orders: bool,        // 数据不完整订单是否剔除后继续
}

impl Default for WaveBuilderConfig {
    fn default() -> Self {
        Self {
            max_orders_per_wave: 20,
            wave_type_rule: WaveTypeRule::Single,
            cutoff_time: None,
            exclude_invalid_orders: true,
        }
    }
}

// ==========================================
// StageSchedulerConfig - 阶段排程参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSchedulerConfig {
    pub pick_resource_mode: PickResourceMode, // 拣货资源模式
    pub ship_time_minutes: f64,               // 发运阶段时长（分钟）
}

impl Default for StageSchedulerConfig {
    fn default() -> Self {
        Self {
            pick_resource_mode: PickResourceMode::Shared,
            ship_time_minutes: 0.0,
        }
    }
}

// ==========================================
// StoreConfig - 边界 I/O 参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub busy_timeout_ms: u64,           // 存储忙等待超时
    pub conflict_retry_backoff_ms: u64, // 并发冲突重试退避
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            conflict_retry_backoff_ms: 200,
        }
    }
}

// ==========================================
// WaveEngineConfig - 引擎完整配置
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveEngineConfig {
    pub walking_time: WalkingTimeConfig,
    pub wave_builder: WaveBuilderConfig,
    pub stage_scheduler: StageSchedulerConfig,
    pub store: StoreConfig,
}

impl WaveEngineConfig {
    /// 校验全部参数
    ///
    /// 任何非法值都在写入之前返回 Configuration 类错误。
    pub fn validate(&self) -> EngineResult<()> {
        let walking = &self.walking_time;

        if !(walking.walking_speed_fpm.is_finite() && walking.walking_speed_fpm > 0.0) {
            return Err(WaveEngineError::config(
                config_keys::WALKING_SPEED_FPM,
                format!("必须 > 0, 实际 {}", walking.walking_speed_fpm),
            ));
        }
        if !(walking.vertical_movement_weight.is_finite() && walking.vertical_movement_weight >= 0.0) {
            return Err(WaveEngineError::config(
                config_keys::VERTICAL_MOVEMENT_WEIGHT,
                format!("必须 >= 0, 实际 {}", walking.vertical_movement_weight),
            ));
        }

        let geometry = [
            (config_keys::AISLE_SPACING_FEET, walking.aisle_spacing_feet),
            (config_keys::BAY_WIDTH_FEET, walking.bay_width_feet),
            (config_keys::LEVEL_HEIGHT_FEET, walking.level_height_feet),
            (config_keys::ZONE_CHANGE_FEET, walking.zone_change_feet),
        ];
        for (key, value) in geometry {
            if !(value.is_finite() && value >= 0.0) {
                return Err(WaveEngineError::config(key, format!("必须 >= 0, 实际 {}", value)));
            }
        }

        if self.wave_builder.max_orders_per_wave <= 0 {
            return Err(WaveEngineError::CapacityConfig {
                max_orders_per_wave: self.wave_builder.max_orders_per_wave,
            });
        }

        let ship = self.stage_scheduler.ship_time_minutes;
        if !(ship.is_finite() && ship >= 0.0) {
            return Err(WaveEngineError::config(
                config_keys::SHIP_TIME_MINUTES,
                format!("必须 >= 0, 实际 {}", ship),
            ));
        }

        Ok(())
    }
}
