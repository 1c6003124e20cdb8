// ==========================================
// 仓库波次排程引擎 - 领域模型层
// ==========================================
// 职责: 定义订单、SKU、库位、波次、阶段排程等领域实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod order;
pub mod sku;
pub mod types;
pub mod wave;

// 重导出核心类型
pub use order::{Order, OrderLine};
pub use sku::{BinLocation, SkuRate};
pub use types::{OrderStatus, PickResourceMode, Stage, WaveStatus, WaveTypeRule};
pub use wave::{minutes_to_millis, Wave, WaveAssignment, WaveType};
