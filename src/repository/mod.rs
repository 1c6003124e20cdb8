// ==========================================
// 仓库波次排程引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

mod convert;
pub mod error;
pub mod order_repo;
pub mod sku_repo;
pub mod sqlite_store;
pub mod wave_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use order_repo::OrderRepository;
pub use sku_repo::{BinRepository, SkuRepository};
pub use sqlite_store::SqliteAssignmentStore;
pub use wave_repo::WaveRepository;
