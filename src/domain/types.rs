// ==========================================
// 仓库波次排程引擎 - 领域类型定义
// ==========================================
// 职责: 订单/波次状态、履约阶段、拣货资源模式、波次类型规则
// 约定: 数据库存储使用小写 snake_case 字符串
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 订单状态 (Order Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,   // 待组波
    Assigned,  // 已分配波次
    Cancelled, // 已取消
    Shipped,   // 已发运
}

impl OrderStatus {
    /// 从数据库字符串解析（未知值返回 None）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "assigned" => Some(OrderStatus::Assigned),
            "cancelled" => Some(OrderStatus::Cancelled),
            "shipped" => Some(OrderStatus::Shipped),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Assigned => "assigned",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Shipped => "shipped",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 波次状态 (Wave Status)
// ==========================================
// 流转: pending → released → completed（不可逆）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveStatus {
    Pending,   // 待释放（可重排）
    Released,  // 已释放到现场
    Completed, // 已完成
}

impl WaveStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(WaveStatus::Pending),
            "released" => Some(WaveStatus::Released),
            "completed" => Some(WaveStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WaveStatus::Pending => "pending",
            WaveStatus::Released => "released",
            WaveStatus::Completed => "completed",
        }
    }

    /// 判断状态流转是否合法
    pub fn can_transition_to(&self, next: WaveStatus) -> bool {
        matches!(
            (self, next),
            (WaveStatus::Pending, WaveStatus::Released) | (WaveStatus::Released, WaveStatus::Completed)
        )
    }
}

impl fmt::Display for WaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 履约阶段 (Fulfillment Stage)
// ==========================================
// 固定顺序: pick → pack → ship（派生 Ord 依赖声明顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pick, // 拣货
    Pack, // 打包
    Ship, // 发运
}

impl Stage {
    /// 按履约顺序排列的全部阶段
    pub const ALL: [Stage; 3] = [Stage::Pick, Stage::Pack, Stage::Ship];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pick" => Some(Stage::Pick),
            "pack" => Some(Stage::Pack),
            "ship" => Some(Stage::Ship),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pick => "pick",
            Stage::Pack => "pack",
            Stage::Ship => "ship",
        }
    }

    /// 前序阶段（pick 无前序）
    pub fn previous(&self) -> Option<Stage> {
        match self {
            Stage::Pick => None,
            Stage::Pack => Some(Stage::Pick),
            Stage::Ship => Some(Stage::Pack),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 拣货资源模式 (Pick Resource Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickResourceMode {
    Shared,   // 单通道共享：同波次内拣货串行
    Parallel, // 多通道并行：仅约束单订单内阶段顺序
}

impl PickResourceMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "shared" => Some(PickResourceMode::Shared),
            "parallel" => Some(PickResourceMode::Parallel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PickResourceMode::Shared => "shared",
            PickResourceMode::Parallel => "parallel",
        }
    }
}

impl fmt::Display for PickResourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 波次类型规则 (Wave Type Rule)
// ==========================================
// 决定订单按什么维度分组后再切块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveTypeRule {
    Single,          // 不分组，全部订单同一类型
    Carrier,         // 按承运商
    Priority,        // 按优先级
    CarrierPriority, // 按承运商 + 优先级
}

impl WaveTypeRule {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" => Some(WaveTypeRule::Single),
            "carrier" => Some(WaveTypeRule::Carrier),
            "priority" => Some(WaveTypeRule::Priority),
            "carrier_priority" => Some(WaveTypeRule::CarrierPriority),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WaveTypeRule::Single => "single",
            WaveTypeRule::Carrier => "carrier",
            WaveTypeRule::Priority => "priority",
            WaveTypeRule::CarrierPriority => "carrier_priority",
        }
    }
}

impl fmt::Display for WaveTypeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_pick_pack_ship() {
        let mut stages = vec![Stage::Ship, Stage::Pick, Stage::Pack];
        stages.sort();
        assert_eq!(stages, Stage::ALL.to_vec());
        assert_eq!(Stage::Ship.previous(), Some(Stage::Pack));
        assert_eq!(Stage::Pick.previous(), None);
    }

    #[test]
    fn test_wave_status_transitions() {
        assert!(WaveStatus::Pending.can_transition_to(WaveStatus::Released));
        assert!(WaveStatus::Released.can_transition_to(WaveStatus::Completed));
        assert!(!WaveStatus::Pending.can_transition_to(WaveStatus::Completed));
        assert!(!WaveStatus::Completed.can_transition_to(WaveStatus::Pending));
        assert!(!WaveStatus::Released.can_transition_to(WaveStatus::Pending));
    }

    #[test]
    fn test_parse_rejects_unknown_values() {
        assert_eq!(PickResourceMode::parse("SHARED"), Some(PickResourceMode::Shared));
        assert_eq!(PickResourceMode::parse("zones"), None);
        assert_eq!(WaveTypeRule::parse("carrier_priority"), Some(WaveTypeRule::CarrierPriority));
        assert_eq!(OrderStatus::parse("on_hold"), None);
    }

    #[test]
    fn test_wave_type_rule_as_map_key() {
        use std::collections::HashSet;

        let rules: HashSet<WaveTypeRule> = [
            WaveTypeRule::Carrier,
            WaveTypeRule::Priority,
            WaveTypeRule::Carrier,
        ]
        .into_iter()
        .collect();
        assert_eq!(rules.len(), 2);
        assert!(rules.contains(&WaveTypeRule::Carrier));
        assert!(!rules.contains(&WaveTypeRule::Single));
    }
}
