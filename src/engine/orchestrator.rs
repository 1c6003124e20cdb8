// ==========================================
// 仓库波次排程引擎 - 组波编排器
// ==========================================
// 主流程:
// 加载配置 → 仓库锁 → 边界读取 → 内存计算（组波 + 工时 + 排程）
// → 取消检查 → 原子提交 → 报告
// ==========================================
// 红线:
// - 配置错误在任何写入之前失败
// - 计算阶段不做 I/O；提交要么全部可见，要么全部不可见
// - 并发冲突重试一次（退避后），仍冲突则上抛
// ==========================================

use crate::config::engine_config::WaveEngineConfig;
use crate::config::wave_config_trait::WaveConfigReader;
use crate::domain::order::Order;
use crate::domain::sku::{BinLocation, SkuRate};
use crate::domain::types::{PickResourceMode, WaveStatus};
use crate::domain::wave::WaveAssignment;
use crate::engine::error::{EngineResult, ErrorKind, WaveEngineError};
use crate::engine::stage_scheduler::{find_stage_violation, StageScheduler};
use crate::engine::store::{AssignmentStore, WaveCommit};
use crate::engine::time_model::{OrderEstimate, TimeModel};
use crate::engine::warehouse_lock::{WarehouseLockGuard, WarehouseLockRegistry};
use crate::engine::wave_builder::{ExcludedOrder, WaveBuilder};
use crate::repository::error::RepositoryError;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// 并发冲突最多尝试次数（首次 + 重试一次）
const MAX_ATTEMPTS: u32 = 2;

// ==========================================
// CancelFlag - 取消令牌
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ==========================================
// 请求 / 报告
// ==========================================

/// 组波请求
#[derive(Debug, Clone)]
pub struct WaveBuildRequest {
    pub wave_start: NaiveDateTime,          // 第一个波次开始时间
    pub cutoff_time: Option<NaiveDateTime>, // 截单时间（覆盖配置）
    pub created_at: Option<NaiveDateTime>,  // 波次创建时间（默认当前时间）
    pub cancel: Option<CancelFlag>,
}

impl WaveBuildRequest {
    pub fn starting_at(wave_start: NaiveDateTime) -> Self {
        Self {
            wave_start,
            cutoff_time: None,
            created_at: None,
            cancel: None,
        }
    }

    pub fn with_cutoff(mut self, cutoff_time: NaiveDateTime) -> Self {
        self.cutoff_time = Some(cutoff_time);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false)
    }
}

/// 单波次摘要
#[derive(Debug, Clone, Serialize)]
pub struct WaveSummary {
    pub wave_id: String,
    pub wave_name: String,
    pub wave_type: String,
    pub order_ids: Vec<String>,
    pub wave_start: NaiveDateTime,
    pub pick_lane_end: NaiveDateTime,
    pub wave_end: NaiveDateTime,
    pub makespan_minutes: f64,
    pub assignments: Vec<WaveAssignment>,
}

/// 组波报告
#[derive(Debug, Clone, Serialize)]
pub struct WaveBuildReport {
    pub warehouse_id: i64,
    pub wave_start: NaiveDateTime,
    pub waves: Vec<WaveSummary>,
    pub excluded_orders: Vec<ExcludedOrder>,
    pub deferred_order_ids: Vec<String>,
    pub ignored_count: usize,
    pub zero_rate_skus: Vec<String>,
    pub total_assignments: usize,
    pub attempts: u32,
    pub config: WaveEngineConfig,
}

impl WaveBuildReport {
    pub fn total_orders(&self) -> usize {
        self.waves.iter().map(|w| w.order_ids.len()).sum()
    }
}

/// 重排报告
#[derive(Debug, Clone, Serialize)]
pub struct ReplanReport {
    pub wave: WaveSummary,
    pub replaced_assignments: usize,
    pub attempts: u32,
}

/// 边界读取得到的工时估算
struct EstimateSet {
    estimates: HashMap<String, OrderEstimate>,
    valid_orders: Vec<Order>,
    excluded: Vec<ExcludedOrder>,
    zero_rate_skus: Vec<String>,
}

// ==========================================
// WaveBuildOrchestrator - 组波编排器
// ==========================================
pub struct WaveBuildOrchestrator<S, C>
where
    S: AssignmentStore,
    C: WaveConfigReader,
{
    store: Arc<S>,
    config: Arc<C>,
    locks: Arc<WarehouseLockRegistry>,
    builder: WaveBuilder,
    scheduler: StageScheduler,
}

impl<S, C> WaveBuildOrchestrator<S, C>
where
    S: AssignmentStore,
    C: WaveConfigReader,
{
    /// 创建编排器（独立锁注册表）
    pub fn new(store: Arc<S>, config: Arc<C>) -> Self {
        Self::with_locks(store, config, Arc::new(WarehouseLockRegistry::new()))
    }

    /// 创建编排器（共享锁注册表，同进程内多个编排器互斥）
    pub fn with_locks(store: Arc<S>, config: Arc<C>, locks: Arc<WarehouseLockRegistry>) -> Self {
        Self {
            store,
            config,
            locks,
            builder: WaveBuilder::new(),
            scheduler: StageScheduler::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ==========================================
    // 组波
    // ==========================================

    /// 执行一次组波
    ///
    /// # 错误
    /// - Configuration: 配置非法（无任何写入）
    /// - Planning: 无可组波订单
    /// - ConcurrencyConflict: 重试后仍冲突
    /// - Cancelled: 提交前取消（无任何写入）
    /// - Persistence: 提交失败（整体回滚）
    #[instrument(skip(self, request), fields(wave_start = %request.wave_start))]
    pub async fn build_waves(&self, warehouse_id: i64, request: WaveBuildRequest) -> EngineResult<WaveBuildReport> {
        let mut config = self.config.load_engine_config(warehouse_id).await?;
        if let Some(cutoff) = request.cutoff_time {
            config.wave_builder.cutoff_time = Some(cutoff);
        }

        info!(
            warehouse_id,
            max_orders_per_wave = config.wave_builder.max_orders_per_wave,
            pick_resource_mode = %config.stage_scheduler.pick_resource_mode,
            "开始组波"
        );

        let mut attempt = 1;
        loop {
            match self.try_build(warehouse_id, &request, &config, attempt) {
                Err(err) if err.kind() == ErrorKind::ConcurrencyConflict && attempt < MAX_ATTEMPTS => {
                    warn!(warehouse_id, attempt, error = %err, "组波并发冲突，退避后重试");
                    tokio::time::sleep(Duration::from_millis(config.store.conflict_retry_backoff_ms)).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(warehouse_id, attempt, kind = %err.kind(), error = %err, "组波失败");
                    return Err(self.surface_conflict(warehouse_id, err));
                }
                Ok(report) => {
                    info!(
                        warehouse_id,
                        waves = report.waves.len(),
                        orders = report.total_orders(),
                        excluded = report.excluded_orders.len(),
                        deferred = report.deferred_order_ids.len(),
                        attempts = report.attempts,
                        "组波完成"
                    );
                    return Ok(report);
                }
            }
        }
    }

    fn try_build(
        &self,
        warehouse_id: i64,
        request: &WaveBuildRequest,
        config: &WaveEngineConfig,
        attempt: u32,
    ) -> EngineResult<WaveBuildReport> {
        let _guard = self.acquire(warehouse_id)?;
        if request.is_cancelled() {
            return Err(WaveEngineError::Cancelled { warehouse_id });
        }

        // ===== 边界读取 =====
        let pending = self.store.fetch_pending_orders(warehouse_id)?;
        let selection = self
            .builder
            .select_eligible(warehouse_id, &pending, &config.wave_builder);
        if selection.eligible.is_empty() {
            return Err(WaveEngineError::EmptyCandidateSet { warehouse_id });
        }

        let estimate_set = self.estimate_orders(&selection.eligible, config, config.wave_builder.exclude_invalid_orders)?;
        if estimate_set.valid_orders.is_empty() {
            warn!(
                warehouse_id,
                excluded = estimate_set.excluded.len(),
                "全部候选订单因数据缺失被剔除"
            );
            return Err(WaveEngineError::EmptyCandidateSet { warehouse_id });
        }

        // ===== 内存计算 =====
        let created_at = request.created_at.unwrap_or_else(|| Local::now().naive_local());
        let mut plan = self
            .builder
            .build(warehouse_id, &estimate_set.valid_orders, &config.wave_builder, created_at)?;
        plan.deferred_order_ids.extend(selection.deferred_order_ids);
        plan.ignored_count += selection.ignored_count;

        let mut commits = Vec::with_capacity(plan.waves.len());
        let mut summaries = Vec::with_capacity(plan.waves.len());
        let mut next_start = request.wave_start;

        for candidate in plan.waves.iter_mut() {
            let wave_start = match config.stage_scheduler.pick_resource_mode {
                PickResourceMode::Shared => next_start,
                PickResourceMode::Parallel => request.wave_start,
            };
            candidate.wave.planned_start_time = Some(wave_start);

            let schedule = self.scheduler.schedule_wave(
                &candidate.wave,
                &candidate.orders,
                wave_start,
                &estimate_set.estimates,
                &config.stage_scheduler,
            )?;
            debug_assert!(find_stage_violation(&schedule.assignments).is_none());
            next_start = schedule.pick_lane_end;

            let order_ids = candidate.order_ids();
            summaries.push(WaveSummary {
                wave_id: candidate.wave.wave_id.clone(),
                wave_name: candidate.wave.wave_name.clone(),
                wave_type: candidate.wave.wave_type.clone(),
                order_ids: order_ids.clone(),
                wave_start,
                pick_lane_end: schedule.pick_lane_end,
                wave_end: schedule.wave_end,
                makespan_minutes: schedule.makespan_minutes(),
                assignments: schedule.assignments.clone(),
            });
            commits.push(WaveCommit {
                wave: candidate.wave.clone(),
                order_ids,
                assignments: schedule.assignments,
            });
        }

        // ===== 边界写入 =====
        if request.is_cancelled() {
            info!(warehouse_id, waves = commits.len(), "组波在提交前取消，不写入任何记录");
            return Err(WaveEngineError::Cancelled { warehouse_id });
        }
        self.store.commit_wave_build(&commits)?;

        let total_assignments = commits.iter().map(|c| c.assignments.len()).sum();
        Ok(WaveBuildReport {
            warehouse_id,
            wave_start: request.wave_start,
            waves: summaries,
            excluded_orders: estimate_set.excluded,
            deferred_order_ids: plan.deferred_order_ids,
            ignored_count: plan.ignored_count,
            zero_rate_skus: estimate_set.zero_rate_skus,
            total_assignments,
            attempts: attempt,
            config: config.clone(),
        })
    }

    // ==========================================
    // 重排
    // ==========================================

    /// 重排 pending 波次的全部阶段记录
    ///
    /// # 错误
    /// - WaveNotFound: 波次不存在
    /// - ReplanConflict: 波次不是 pending（含重试后仍被并发释放）
    /// - DataIntegrity: 波次内订单工时/库位缺失（重排不剔除订单）
    #[instrument(skip(self, wave_start), fields(wave_start = %wave_start))]
    pub async fn replan_wave(&self, wave_id: &str, wave_start: NaiveDateTime) -> EngineResult<ReplanReport> {
        let wave = self
            .store
            .fetch_wave(wave_id)?
            .ok_or_else(|| WaveEngineError::WaveNotFound {
                wave_id: wave_id.to_string(),
            })?;
        let config = self.config.load_engine_config(wave.warehouse_id).await?;

        let mut attempt = 1;
        loop {
            match self.try_replan(wave_id, wave_start, &config, attempt) {
                Err(err) if err.kind() == ErrorKind::ConcurrencyConflict && attempt < MAX_ATTEMPTS => {
                    warn!(wave_id, attempt, error = %err, "重排并发冲突，退避后重试");
                    tokio::time::sleep(Duration::from_millis(config.store.conflict_retry_backoff_ms)).await;
                    attempt += 1;
                }
                Err(WaveEngineError::Persistence(RepositoryError::OptimisticLockFailure { .. })) => {
                    return Err(match self.store.fetch_wave(wave_id)? {
                        Some(current) => WaveEngineError::ReplanConflict {
                            wave_id: wave_id.to_string(),
                            status: current.status,
                        },
                        None => WaveEngineError::WaveNotFound {
                            wave_id: wave_id.to_string(),
                        },
                    });
                }
                Err(err) => return Err(self.surface_conflict(wave.warehouse_id, err)),
                Ok(report) => {
                    info!(
                        wave_id,
                        replaced = report.replaced_assignments,
                        attempts = report.attempts,
                        "波次重排完成"
                    );
                    return Ok(report);
                }
            }
        }
    }

    fn try_replan(
        &self,
        wave_id: &str,
        wave_start: NaiveDateTime,
        config: &WaveEngineConfig,
        attempt: u32,
    ) -> EngineResult<ReplanReport> {
        let wave = self
            .store
            .fetch_wave(wave_id)?
            .ok_or_else(|| WaveEngineError::WaveNotFound {
                wave_id: wave_id.to_string(),
            })?;
        let _guard = self.acquire(wave.warehouse_id)?;

        if !wave.is_pending() {
            return Err(WaveEngineError::ReplanConflict {
                wave_id: wave.wave_id.clone(),
                status: wave.status,
            });
        }

        let orders = self.store.fetch_wave_orders(wave_id)?;
        let estimate_set = self.estimate_orders(&orders, config, false)?;
        let schedule = self.scheduler.schedule_wave(
            &wave,
            &orders,
            wave_start,
            &estimate_set.estimates,
            &config.stage_scheduler,
        )?;
        debug_assert!(find_stage_violation(&schedule.assignments).is_none());

        self.store
            .replace_wave_assignments(wave_id, wave_start, &schedule.assignments)?;

        Ok(ReplanReport {
            replaced_assignments: schedule.assignments.len(),
            wave: WaveSummary {
                wave_id: wave.wave_id.clone(),
                wave_name: wave.wave_name.clone(),
                wave_type: wave.wave_type.clone(),
                order_ids: orders.iter().map(|o| o.order_id.clone()).collect(),
                wave_start,
                pick_lane_end: schedule.pick_lane_end,
                wave_end: schedule.wave_end,
                makespan_minutes: schedule.makespan_minutes(),
                assignments: schedule.assignments,
            },
            attempts: attempt,
        })
    }

    // ==========================================
    // 状态流转
    // ==========================================

    /// 释放波次（pending → released），之后不可重排
    #[instrument(skip(self))]
    pub fn release_wave(&self, wave_id: &str) -> EngineResult<()> {
        self.transition_wave(wave_id, WaveStatus::Released)
    }

    /// 完成波次（released → completed）
    #[instrument(skip(self))]
    pub fn complete_wave(&self, wave_id: &str) -> EngineResult<()> {
        self.transition_wave(wave_id, WaveStatus::Completed)
    }

    fn transition_wave(&self, wave_id: &str, next: WaveStatus) -> EngineResult<()> {
        match self.store.update_wave_status(wave_id, next) {
            Ok(()) => {
                info!(wave_id, status = %next, "波次状态已更新");
                Ok(())
            }
            Err(RepositoryError::NotFound { .. }) => Err(WaveEngineError::WaveNotFound {
                wave_id: wave_id.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn acquire(&self, warehouse_id: i64) -> EngineResult<WarehouseLockGuard> {
        self.locks
            .try_acquire(warehouse_id)
            .ok_or_else(|| WaveEngineError::ConcurrencyConflict {
                warehouse_id,
                message: "该仓库正在组波".to_string(),
            })
    }

    /// 乐观锁失败在重试耗尽后统一表达为并发冲突
    fn surface_conflict(&self, warehouse_id: i64, err: WaveEngineError) -> WaveEngineError {
        match err {
            WaveEngineError::Persistence(RepositoryError::OptimisticLockFailure { entity, id, message }) => {
                WaveEngineError::ConcurrencyConflict {
                    warehouse_id,
                    message: format!("{}({}): {}", entity, id, message),
                }
            }
            other => other,
        }
    }

    /// 读取工时/库位并估算每个订单
    ///
    /// `exclude_invalid` 为 true 时，数据缺失的订单被剔除并记录；否则直接失败。
    fn estimate_orders(
        &self,
        orders: &[Order],
        config: &WaveEngineConfig,
        exclude_invalid: bool,
    ) -> EngineResult<EstimateSet> {
        let sku_codes: Vec<String> = orders
            .iter()
            .flat_map(|o| o.sku_codes())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let rates: HashMap<String, SkuRate> = self.store.fetch_sku_rates(&sku_codes)?;

        let bin_codes: BTreeSet<&str> = rates.values().filter_map(|r| r.bin_code.as_deref()).collect();
        let mut bins: HashMap<String, BinLocation> = HashMap::new();
        for bin_code in bin_codes {
            if let Some(location) = self.store.resolve_bin_location(bin_code)? {
                bins.insert(location.bin_code.clone(), location);
            }
        }

        let zero_rate_skus: Vec<String> = sku_codes
            .iter()
            .filter(|code| rates.get(*code).map(|r| r.has_zero_rate()).unwrap_or(false))
            .cloned()
            .collect();
        for sku_code in &zero_rate_skus {
            warn!(sku_code = %sku_code, "SKU 工时为 0，请核对主数据");
        }

        let model = TimeModel::new(&config.walking_time, &rates, &bins);
        let mut estimates = HashMap::with_capacity(orders.len());
        let mut valid_orders = Vec::with_capacity(orders.len());
        let mut excluded = Vec::new();

        for order in orders {
            match model.estimate_order(order, config.stage_scheduler.ship_time_minutes) {
                Ok(estimate) => {
                    debug!(
                        order_id = %order.order_id,
                        pick_minutes = estimate.pick_minutes,
                        walking_minutes = estimate.walking_minutes,
                        pack_minutes = estimate.pack_minutes,
                        "订单工时估算完成"
                    );
                    estimates.insert(order.order_id.clone(), estimate);
                    valid_orders.push(order.clone());
                }
                Err(err) if exclude_invalid && err.is_order_scoped() => {
                    warn!(order_id = %order.order_id, error = %err, "订单数据不完整，已剔除");
                    excluded.push(ExcludedOrder {
                        order_id: order.order_id.clone(),
                        kind: err.kind(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok(EstimateSet {
            estimates,
            valid_orders,
            excluded,
            zero_rate_skus,
        })
    }
}
