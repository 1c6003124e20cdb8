// ==========================================
// 仓库波次排程引擎 - 引擎层
// ==========================================
// 职责: 组波、工时估算、阶段排程与编排
// 红线: Engine 不拼 SQL，所有读写经由 AssignmentStore
// ==========================================

pub mod error;
pub mod orchestrator;
pub mod stage_scheduler;
pub mod store;
pub mod time_model;
pub mod warehouse_lock;
pub mod wave_builder;

// 重导出核心引擎
pub use error::{EngineResult, ErrorKind, WaveEngineError};
pub use orchestrator::{
    CancelFlag, ReplanReport, WaveBuildOrchestrator, WaveBuildReport, WaveBuildRequest, WaveSummary,
};
pub use stage_scheduler::{find_stage_violation, StageScheduler, WaveSchedule};
pub use store::{AssignmentStore, WaveCommit};
pub use time_model::{OrderEstimate, PickRoute, TimeModel};
pub use warehouse_lock::{WarehouseLockGuard, WarehouseLockRegistry};
pub use wave_builder::{EligibleSelection, ExcludedOrder, WaveBuildPlan, WaveBuilder, WaveCandidate};
