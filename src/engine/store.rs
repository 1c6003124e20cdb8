// ==========================================
// 仓库波次排程引擎 - 分配存储接口 (Assignment Store)
// ==========================================
// 职责: 定义引擎读写波次/订单/工时/库位的契约（依赖倒置）
// 实现者: repository::SqliteAssignmentStore（或外部持久化服务）
// 红线:
// - fetch_pending_orders 必须是一致性快照
// - commit_wave_build 必须原子：波次 + 阶段记录 + 订单标记，要么全部可见，要么全部不可见
// - replace_wave_assignments 必须原子：旧集合与新集合不可部分可见
// ==========================================

use crate::domain::order::Order;
use crate::domain::sku::{BinLocation, SkuRate};
use crate::domain::types::WaveStatus;
use crate::domain::wave::{Wave, WaveAssignment};
use crate::repository::error::RepositoryResult;
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// 单个波次的提交单元
#[derive(Debug, Clone)]
pub struct WaveCommit {
    pub wave: Wave,
    pub order_ids: Vec<String>, // 波次内顺序（写入 wave_sequence）
    pub assignments: Vec<WaveAssignment>,
}

// ==========================================
// AssignmentStore Trait
// ==========================================
pub trait AssignmentStore: Send + Sync {
    // ===== 读边界 =====

    /// 仓库待组波订单（含订单行）
    fn fetch_pending_orders(&self, warehouse_id: i64) -> RepositoryResult<Vec<Order>>;

    /// SKU 工时（未知 SKU 不出现在结果中）
    fn fetch_sku_rates(&self, sku_codes: &[String]) -> RepositoryResult<HashMap<String, SkuRate>>;

    /// 库位位置（无法解析返回 None）
    fn resolve_bin_location(&self, bin_code: &str) -> RepositoryResult<Option<BinLocation>>;

    /// 波次
    fn fetch_wave(&self, wave_id: &str) -> RepositoryResult<Option<Wave>>;

    /// 波次内订单（按 wave_sequence）
    fn fetch_wave_orders(&self, wave_id: &str) -> RepositoryResult<Vec<Order>>;

    /// 波次阶段记录
    fn fetch_wave_assignments(&self, wave_id: &str) -> RepositoryResult<Vec<WaveAssignment>>;

    // ===== 写边界 =====

    /// 原子提交一次组波的全部波次
    ///
    /// 对每个波次执行 persist_wave(wave, assignments) + mark_orders_assigned(order_ids, wave_id)，
    /// 整体在同一事务中；任一订单已不是 pending 时返回乐观锁冲突并整体回滚。
    fn commit_wave_build(&self, commits: &[WaveCommit]) -> RepositoryResult<()>;

    /// 原子替换 pending 波次的全部阶段记录
    fn replace_wave_assignments(
        &self,
        wave_id: &str,
        planned_start_time: NaiveDateTime,
        assignments: &[WaveAssignment],
    ) -> RepositoryResult<()>;

    /// 波次状态流转（pending → released → completed）
    fn update_wave_status(&self, wave_id: &str, next: WaveStatus) -> RepositoryResult<()>;
}
