// ==========================================
// 仓库波次排程引擎 - 订单领域模型
// ==========================================
// 红线: 订单分配到波次后不可变（状态流转除外）
// ==========================================

use crate::domain::types::OrderStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// OrderLine - 订单行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: i32,     // 行号
    pub sku_code: String, // SKU 编码
    pub quantity: u32,    // 数量
}

impl OrderLine {
    pub fn new(line_no: i32, sku_code: &str, quantity: u32) -> Self {
        Self {
            line_no,
            sku_code: sku_code.to_string(),
            quantity,
        }
    }
}

// ==========================================
// Order - 出库订单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,            // 订单ID
    pub warehouse_id: i64,           // 仓库ID
    pub status: OrderStatus,         // 订单状态
    pub carrier: Option<String>,     // 承运商（波次类型分组依据）
    pub priority: i32,               // 优先级（越小越紧急）
    pub created_at: NaiveDateTime,   // 入队时间（FIFO 主键）
    pub lines: Vec<OrderLine>,       // 订单行

    // ===== 波次归属（分配后写入） =====
    pub wave_id: Option<String>,     // 所属波次
    pub wave_sequence: Option<i32>,  // 波次内序号（从 1 开始）
}

impl Order {
    /// FIFO 排序键（显式领域字段，不依赖存储行序）
    pub fn queue_key(&self) -> (NaiveDateTime, &str) {
        (self.created_at, self.order_id.as_str())
    }

    /// 订单涉及的去重 SKU 编码（按编码排序）
    pub fn sku_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.lines.iter().map(|l| l.sku_code.clone()).collect();
        codes.sort();
        codes.dedup();
        codes
    }

    /// 订单总件数
    pub fn total_units(&self) -> u64 {
        self.lines.iter().map(|l| l.quantity as u64).sum()
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}
