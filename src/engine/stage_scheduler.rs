// ==========================================
// 仓库波次排程引擎 - 阶段排程引擎 (Stage Scheduler)
// ==========================================
// 职责: 为波次内每个 (订单, 阶段) 指定计划开始时间与时长
// 输入: 波次 + 有序订单 + 波次开始时间 + 工时估算
// 输出: 完整的 WaveAssignment 集合
// ==========================================
// 规则:
// - pick: shared 模式 = max(波次开始, 上一订单拣货结束)；parallel 模式 = 波次开始
// - pack: pick 结束；ship: pack 结束
// - 时间轴按整毫秒推进，记录的时长即推进量（与 WaveAssignment::planned_end_time 同口径）
// 红线: 仅 pending 波次可排程/重排
// ==========================================

use crate::config::engine_config::StageSchedulerConfig;
use crate::domain::order::Order;
use crate::domain::types::{PickResourceMode, Stage};
use crate::domain::wave::{minutes_to_millis, Wave, WaveAssignment};
use crate::engine::error::{EngineResult, WaveEngineError};
use crate::engine::time_model::OrderEstimate;
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

// ==========================================
// WaveSchedule - 单波次排程结果
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct WaveSchedule {
    pub wave_id: String,
    pub wave_start: NaiveDateTime,
    pub pick_lane_end: NaiveDateTime, // 最后一个拣货阶段结束
    pub wave_end: NaiveDateTime,      // 最后一个阶段结束
    pub assignments: Vec<WaveAssignment>,
}

impl WaveSchedule {
    /// 波次总跨度（分钟）
    pub fn makespan_minutes(&self) -> f64 {
        (self.wave_end - self.wave_start).num_milliseconds() as f64 / 60_000.0
    }
}

// ==========================================
// StageScheduler - 阶段排程引擎
// ==========================================
pub struct StageScheduler {
    // 无状态引擎，不需要注入依赖
}

impl StageScheduler {
    pub fn new() -> Self {
        Self {}
    }

    /// 排程单个波次
    ///
    /// # 参数
    /// - `wave`: 波次（必须为 pending）
    /// - `orders`: 波次内订单（顺序即排程顺序）
    /// - `wave_start`: 波次开始时间
    /// - `estimates`: order_id → 工时估算
    /// - `config`: 阶段排程参数
    ///
    /// # 错误
    /// - `ReplanConflict`: 波次不是 pending
    /// - `IncompleteTimeModel`: 任一订单缺少估算（此时不产生任何记录）
    /// - `ScheduleOverflow`: 阶段结束时间超出可表示范围
    #[instrument(skip(self, wave, orders, estimates, config), fields(
        wave_id = %wave.wave_id,
        orders_count = orders.len(),
        pick_resource_mode = %config.pick_resource_mode
    ))]
    pub fn schedule_wave(
        &self,
        wave: &Wave,
        orders: &[Order],
        wave_start: NaiveDateTime,
        estimates: &HashMap<String, OrderEstimate>,
        config: &StageSchedulerConfig,
    ) -> EngineResult<WaveSchedule> {
        if !wave.is_pending() {
            return Err(WaveEngineError::ReplanConflict {
                wave_id: wave.wave_id.clone(),
                status: wave.status,
            });
        }

        // 先整体校验，保证失败时不产生部分结果
        let mut ordered_estimates = Vec::with_capacity(orders.len());
        for order in orders {
            let estimate = estimates
                .get(&order.order_id)
                .ok_or_else(|| WaveEngineError::IncompleteTimeModel {
                    order_id: order.order_id.clone(),
                })?;
            ordered_estimates.push((order, estimate));
        }

        let mut assignments = Vec::with_capacity(orders.len() * Stage::ALL.len());
        let mut pick_cursor = wave_start;
        let mut pick_lane_end = wave_start;
        let mut wave_end = wave_start;

        for (order, estimate) in ordered_estimates {
            let pick_start = match config.pick_resource_mode {
                PickResourceMode::Shared => pick_cursor.max(wave_start),
                PickResourceMode::Parallel => wave_start,
            };

            let mut stage_start = pick_start;
            for stage in Stage::ALL {
                let millis = minutes_to_millis(estimate.stage_minutes(stage));
                let stage_end = stage_start
                    .checked_add_signed(Duration::milliseconds(millis))
                    .ok_or_else(|| WaveEngineError::ScheduleOverflow {
                        order_id: order.order_id.clone(),
                        stage,
                    })?;

                assignments.push(WaveAssignment {
                    wave_id: wave.wave_id.clone(),
                    order_id: order.order_id.clone(),
                    stage,
                    planned_start_time: stage_start,
                    planned_duration_minutes: millis as f64 / 60_000.0,
                });

                if stage == Stage::Pick {
                    if config.pick_resource_mode == PickResourceMode::Shared {
                        pick_cursor = stage_end;
                    }
                    pick_lane_end = pick_lane_end.max(stage_end);
                }
                stage_start = stage_end;
            }
            wave_end = wave_end.max(stage_start);
        }

        debug!(
            assignments_count = assignments.len(),
            %pick_lane_end,
            %wave_end,
            "波次阶段排程完成"
        );

        Ok(WaveSchedule {
            wave_id: wave.wave_id.clone(),
            wave_start,
            pick_lane_end,
            wave_end,
            assignments,
        })
    }
}

// ==========================================
// Default trait 实现
// ==========================================
impl Default for StageScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// 查找违反阶段不重叠约束的记录
///
/// # 返回
/// - None: 每个订单的每个阶段恰好一条，且后序开始 >= 前序结束
/// - Some((order_id, stage)): 首个违规的订单与阶段（缺失/重复/重叠）
pub fn find_stage_violation(assignments: &[WaveAssignment]) -> Option<(String, Stage)> {
    let mut by_order: HashMap<&str, Vec<&WaveAssignment>> = HashMap::new();
    for assignment in assignments {
        by_order.entry(assignment.order_id.as_str()).or_default().push(assignment);
    }

    let mut order_ids: Vec<&str> = by_order.keys().copied().collect();
    order_ids.sort();

    for order_id in order_ids {
        let rows = &by_order[order_id];
        for stage in Stage::ALL {
            let matching: Vec<&&WaveAssignment> = rows.iter().filter(|a| a.stage == stage).collect();
            if matching.len() != 1 {
                return Some((order_id.to_string(), stage));
            }
            if let Some(previous) = stage.previous() {
                let Some(prev) = rows.iter().find(|a| a.stage == previous) else {
                    return Some((order_id.to_string(), previous));
                };
                if matching[0].planned_start_time < prev.planned_end_time() {
                    return Some((order_id.to_string(), stage));
                }
            }
        }
    }

    None
}
