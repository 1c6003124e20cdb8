// ==========================================
// 仓库波次排程引擎 - 波次领域模型
// ==========================================
// 红线:
// - 同一订单的后序阶段开始时间 >= 前序阶段开始 + 时长
// - 重排必须整体替换某波次的全部 wave_assignment
// ==========================================

use crate::domain::types::{Stage, WaveStatus, WaveTypeRule};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 分钟 → 毫秒（四舍五入，负值按 0 处理）
///
/// 排程内部统一使用整毫秒推进时间轴，保证落库时间戳上的不重叠约束严格成立。
pub fn minutes_to_millis(minutes: f64) -> i64 {
    if !minutes.is_finite() || minutes <= 0.0 {
        return 0;
    }
    (minutes * 60_000.0).round() as i64
}

// ==========================================
// Wave - 波次
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    pub wave_id: String,                          // 波次ID (uuid)
    pub wave_name: String,                        // 波次名称
    pub wave_type: String,                        // 波次类型 (由类型规则生成)
    pub warehouse_id: i64,                        // 仓库ID
    pub status: WaveStatus,                       // 状态
    pub total_orders: i32,                        // 订单数
    pub planned_start_time: Option<NaiveDateTime>,// 计划开始时间（排程后写入）
    pub created_at: NaiveDateTime,                // 创建时间
}

impl Wave {
    pub fn is_pending(&self) -> bool {
        self.status == WaveStatus::Pending
    }
}

// ==========================================
// WaveType - 波次类型键
// ==========================================
// 由 WaveTypeRule 从订单属性派生，同类型订单才会进入同一波次
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaveType {
    pub rule: WaveTypeRule,
    pub carrier: Option<String>,
    pub priority: Option<i32>,
}

impl WaveType {
    /// 类型标签（写入 waves.wave_type）
    pub fn label(&self) -> String {
        let carrier = self.carrier.as_deref().unwrap_or("none");
        match self.rule {
            WaveTypeRule::Single => "standard".to_string(),
            WaveTypeRule::Carrier => format!("carrier:{}", carrier),
            WaveTypeRule::Priority => format!("priority:{}", self.priority.unwrap_or_default()),
            WaveTypeRule::CarrierPriority => format!(
                "carrier:{}/priority:{}",
                carrier,
                self.priority.unwrap_or_default()
            ),
        }
    }
}

// ==========================================
// WaveAssignment - 阶段排程记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveAssignment {
    pub wave_id: String,                   // 波次ID
    pub order_id: String,                  // 订单ID
    pub stage: Stage,                      // 阶段
    pub planned_start_time: NaiveDateTime, // 计划开始时间
    pub planned_duration_minutes: f64,     // 计划时长（分钟）
}

impl WaveAssignment {
    /// 计划结束时间（与排程器相同的整毫秒口径）
    pub fn planned_end_time(&self) -> NaiveDateTime {
        self.planned_start_time + Duration::milliseconds(minutes_to_millis(self.planned_duration_minutes))
    }
}
