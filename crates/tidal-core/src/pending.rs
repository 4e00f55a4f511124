// 启用 `--cfg loom` 时切换到 loom 提供的原子类型，供模型检查穷举交错。
#[cfg(not(loom))]
use std::sync::atomic::{AtomicI64, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicI64, Ordering};

use crate::fatal_condition;

/// 会话在途异步操作计数。
///
/// # 契约（What）
/// - `increment`/`decrement` 为无锁原子操作，返回调整后的取值；
/// - 计数永不为负：在零上递减意味着同一操作被完成了两次，属于致命不变量违背，
///   计数保持为零并走 [`fatal_condition!`] 路径；
/// - `load` 不加锁，可在任意线程读取。
///
/// # 逻辑（How）
/// - 递减使用比较交换循环，先确认当前值为正再提交，因此任何线程都观察不到负值。
#[derive(Debug)]
pub struct PendingCounter {
    count: AtomicI64,
}

impl PendingCounter {
    pub fn new() -> Self {
        Self {
            count: AtomicI64::new(0),
        }
    }

    pub fn increment(&self) -> i64 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn decrement(&self) -> i64 {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            fatal_condition!(
                current <= 0,
                "pending io count fell below zero ({})",
                current - 1
            );
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current - 1,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn load(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }
}

impl Default for PendingCounter {
    fn default() -> Self {
        Self::new()
    }
}
