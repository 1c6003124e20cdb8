// ==========================================
// 仓库波次排程引擎 - 仓库级互斥
// ==========================================
// 红线: 同一仓库的订单池在选单期间互斥，防止订单被分配到两个波次
// 说明: 不同仓库互不阻塞；跨进程冲突由提交时的 status='pending' 守卫兜底
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 仓库锁守卫（drop 即释放）
pub type WarehouseLockGuard = OwnedMutexGuard<()>;

// ==========================================
// WarehouseLockRegistry - 仓库锁注册表
// ==========================================
#[derive(Default)]
pub struct WarehouseLockRegistry {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl WarehouseLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试获取仓库锁（不等待）
    ///
    /// # 返回
    /// - Some(guard): 获取成功
    /// - None: 该仓库正在组波
    ///
    /// 顺带清理无人持有的仓库条目（仅注册表自身引用）。
    pub fn try_acquire(&self, warehouse_id: i64) -> Option<WarehouseLockGuard> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(warehouse_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.try_lock_owned().ok()
    }

    /// 仓库当前是否被占用
    pub fn is_locked(&self, warehouse_id: i64) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .get(&warehouse_id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// 注册表中的仓库条目数
    pub fn tracked_warehouses(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_warehouse_is_exclusive() {
        let registry = WarehouseLockRegistry::new();

        let guard = registry.try_acquire(1).unwrap();
        assert!(registry.is_locked(1));
        assert!(registry.try_acquire(1).is_none());

        // 其他仓库不受影响
        let other = registry.try_acquire(2);
        assert!(other.is_some());

        drop(guard);
        assert!(!registry.is_locked(1));
        assert!(registry.try_acquire(1).is_some());
    }

    #[test]
    fn test_released_warehouses_are_pruned() {
        let registry = WarehouseLockRegistry::new();

        let first = registry.try_acquire(1).unwrap();
        let second = registry.try_acquire(2).unwrap();
        assert_eq!(registry.tracked_warehouses(), 2);

        drop(first);
        drop(second);
        let _third = registry.try_acquire(3).unwrap();
        assert_eq!(registry.tracked_warehouses(), 1);

        // 持有中的条目不会被清理
        let _fourth = registry.try_acquire(4).unwrap();
        assert_eq!(registry.tracked_warehouses(), 2);
        assert!(registry.is_locked(3));
        assert!(registry.try_acquire(3).is_none());
    }
}
