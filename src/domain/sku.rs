// ==========================================
// 仓库波次排程引擎 - SKU 与库位领域模型
// ==========================================
// 约定:
// - 拣货/打包工时为 None 表示未配置（数据完整性错误）
// - 工时为 0 是数据质量信号，不是错误
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// SkuRate - SKU 作业工时
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuRate {
    pub sku_code: String,                // SKU 编码
    pub name: String,                    // SKU 名称
    pub pick_time_minutes: Option<f64>,  // 单件拣货工时（分钟）
    pub pack_time_minutes: Option<f64>,  // 单件打包工时（分钟）
    pub bin_code: Option<String>,        // 存储库位（可空）
}

impl SkuRate {
    /// 是否存在零工时（数据质量信号）
    pub fn has_zero_rate(&self) -> bool {
        self.pick_time_minutes == Some(0.0) || self.pack_time_minutes == Some(0.0)
    }
}

// ==========================================
// BinLocation - 库位位置描述
// ==========================================
// 用途: 计算行走距离与垂直移动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinLocation {
    pub bin_code: String, // 库位编码
    pub zone: String,     // 库区
    pub aisle: i32,       // 巷道号
    pub position: i32,    // 巷道内货位序号
    pub level: i32,       // 层（0 为地面层）
}

impl BinLocation {
    /// 确定性排序键: (zone, aisle, position, level, bin_code)
    pub fn route_key(&self) -> (&str, i32, i32, i32, &str) {
        (
            self.zone.as_str(),
            self.aisle,
            self.position,
            self.level,
            self.bin_code.as_str(),
        )
    }
}
