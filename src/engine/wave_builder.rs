// ==========================================
// 仓库波次排程引擎 - 组波引擎 (Wave Builder)
// ==========================================
// 职责: 将待组波订单划分为波次
// 输入: 仓库ID + 候选订单 + 组波参数
// 输出: 候选波次（status=pending），每个波次持有有序订单列表
// ==========================================
// 规则:
// 1) 过滤 status=pending、仓库匹配、入队时间 <= 截单时间
// 2) 按 FIFO 键 (created_at, order_id) 排序，不依赖存储行序
// 3) 按波次类型规则分组（组按首个成员出现顺序排列）
// 4) 组内按 max_orders_per_wave 切块，保持 FIFO
// 红线: 无副作用，持久化交给 Assignment Store
// ==========================================

use crate::config::engine_config::WaveBuilderConfig;
use crate::domain::order::Order;
use crate::domain::types::{WaveStatus, WaveTypeRule};
use crate::domain::wave::{Wave, WaveType};
use crate::engine::error::{EngineResult, ErrorKind, WaveEngineError};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

// ==========================================
// 输出结构
// ==========================================

/// 候选波次（尚未持久化）
#[derive(Debug, Clone, Serialize)]
pub struct WaveCandidate {
    pub wave: Wave,
    pub wave_type: WaveType,
    pub orders: Vec<Order>, // 波次内顺序即排程顺序
}

impl WaveCandidate {
    pub fn order_ids(&self) -> Vec<String> {
        self.orders.iter().map(|o| o.order_id.clone()).collect()
    }
}

/// 被剔除的订单（必须出现在组波报告中）
#[derive(Debug, Clone, Serialize)]
pub struct ExcludedOrder {
    pub order_id: String,
    pub kind: ErrorKind,
    pub reason: String,
}

/// 资格筛选结果
#[derive(Debug, Clone, Default)]
pub struct EligibleSelection {
    pub eligible: Vec<Order>,         // FIFO 顺序
    pub deferred_order_ids: Vec<String>, // 晚于截单时间，留待后续组波
    pub ignored_count: usize,         // 非 pending 或仓库不匹配
}

/// 组波结果
#[derive(Debug, Clone)]
pub struct WaveBuildPlan {
    pub warehouse_id: i64,
    pub waves: Vec<WaveCandidate>,
    pub deferred_order_ids: Vec<String>,
    pub ignored_count: usize,
}

impl WaveBuildPlan {
    pub fn total_orders(&self) -> usize {
        self.waves.iter().map(|w| w.orders.len()).sum()
    }
}

// ==========================================
// WaveBuilder - 组波引擎
// ==========================================
pub struct WaveBuilder {
    // 无状态引擎，不需要注入依赖
}

impl WaveBuilder {
    pub fn new() -> Self {
        Self {}
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 资格筛选 + FIFO 排序
    pub fn select_eligible(
        &self,
        warehouse_id: i64,
        candidates: &[Order],
        config: &WaveBuilderConfig,
    ) -> EligibleSelection {
        let mut selection = EligibleSelection::default();

        for order in candidates {
            if !order.is_pending() || order.warehouse_id != warehouse_id {
                selection.ignored_count += 1;
                continue;
            }
            if let Some(cutoff) = config.cutoff_time {
                if order.created_at > cutoff {
                    selection.deferred_order_ids.push(order.order_id.clone());
                    continue;
                }
            }
            selection.eligible.push(order.clone());
        }

        selection.eligible.sort_by(|a, b| a.queue_key().cmp(&b.queue_key()));
        selection
    }

    /// 组波
    ///
    /// # 参数
    /// - `warehouse_id`: 仓库ID
    /// - `candidates`: 候选订单（任意顺序）
    /// - `config`: 组波参数
    /// - `created_at`: 波次创建时间
    ///
    /// # 错误
    /// - `CapacityConfig`: max_orders_per_wave <= 0
    /// - `EmptyCandidateSet`: 无可组波订单
    #[instrument(skip(self, candidates, config), fields(
        candidates_count = candidates.len(),
        max_orders_per_wave = config.max_orders_per_wave,
        wave_type_rule = %config.wave_type_rule
    ))]
    pub fn build(
        &self,
        warehouse_id: i64,
        candidates: &[Order],
        config: &WaveBuilderConfig,
        created_at: NaiveDateTime,
    ) -> EngineResult<WaveBuildPlan> {
        if config.max_orders_per_wave <= 0 {
            return Err(WaveEngineError::CapacityConfig {
                max_orders_per_wave: config.max_orders_per_wave,
            });
        }
        let max_per_wave = config.max_orders_per_wave as usize;

        let selection = self.select_eligible(warehouse_id, candidates, config);
        if selection.eligible.is_empty() {
            return Err(WaveEngineError::EmptyCandidateSet { warehouse_id });
        }

        debug!(
            eligible_count = selection.eligible.len(),
            deferred_count = selection.deferred_order_ids.len(),
            ignored_count = selection.ignored_count,
            "订单资格筛选完成"
        );

        // 1. 按类型分组（组顺序 = 首个成员的 FIFO 位置）
        let mut groups: Vec<(WaveType, Vec<Order>)> = Vec::new();
        let mut group_index: HashMap<WaveType, usize> = HashMap::new();
        for order in selection.eligible {
            let wave_type = self.wave_type_for(&order, config.wave_type_rule);
            match group_index.get(&wave_type) {
                Some(&idx) => groups[idx].1.push(order),
                None => {
                    group_index.insert(wave_type.clone(), groups.len());
                    groups.push((wave_type, vec![order]));
                }
            }
        }

        // 2. 组内切块
        let mut waves = Vec::new();
        let mut wave_seq = 1;
        for (wave_type, orders) in groups {
            for chunk in orders.chunks(max_per_wave) {
                let wave = Wave {
                    wave_id: Uuid::new_v4().to_string(),
                    wave_name: self.wave_name(warehouse_id, created_at, wave_seq),
                    wave_type: wave_type.label(),
                    warehouse_id,
                    status: WaveStatus::Pending,
                    total_orders: chunk.len() as i32,
                    planned_start_time: None,
                    created_at,
                };
                waves.push(WaveCandidate {
                    wave,
                    wave_type: wave_type.clone(),
                    orders: chunk.to_vec(),
                });
                wave_seq += 1;
            }
        }

        let plan = WaveBuildPlan {
            warehouse_id,
            waves,
            deferred_order_ids: selection.deferred_order_ids,
            ignored_count: selection.ignored_count,
        };

        info!(
            waves_count = plan.waves.len(),
            orders_count = plan.total_orders(),
            "组波完成"
        );

        Ok(plan)
    }

    /// 订单的波次类型
    pub fn wave_type_for(&self, order: &Order, rule: WaveTypeRule) -> WaveType {
        let carrier = order
            .carrier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_uppercase());

        match rule {
            WaveTypeRule::Single => WaveType {
                rule,
                carrier: None,
                priority: None,
            },
            WaveTypeRule::Carrier => WaveType {
                rule,
                carrier,
                priority: None,
            },
            WaveTypeRule::Priority => WaveType {
                rule,
                carrier: None,
                priority: Some(order.priority),
            },
            WaveTypeRule::CarrierPriority => WaveType {
                rule,
                carrier,
                priority: Some(order.priority),
            },
        }
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn wave_name(&self, warehouse_id: i64, created_at: NaiveDateTime, seq: usize) -> String {
        format!("WH{}-{}-{:03}", warehouse_id, created_at.format("%Y%m%d%H%M"), seq)
    }
}

// ==========================================
// Default trait 实现
// ==========================================
impl Default for WaveBuilder {
    fn default() -> Self {
        Self::new()
    }
}
