//! IO 模式契约。
//!
//! # 教案式注释
//!
//! ## 意图（Why）
//! - 每种流量形态（批量推送、批量拉取、乒乓、双工）都是一个策略对象：它决定下一步发起
//!   什么任务、如何消费完成通知、何时宣告会话结束；
//! - 会话核心只依赖本契约，不关心任何具体协议的字节格式。
//!
//! ## 契约（What）
//! - 状态机：`Active → Completing → Done`。`Active→Completing` 由模式自身逻辑触发；
//!   `Completing→Done` 由会话在 `notify_parent_complete` 中触发；
//! - `register_callback(None)` 之后模式不得再调用任何回调；
//! - `last_error` 返回模式记录的最具体错误，终态通知时优先于调用方提供的错误码。
//!
//! ## 实现辅助（How）
//! - [`PatternLifecycle`]、[`CallbackSlot`]、[`LastError`] 是线程安全的小积木，具体模式
//!   组合它们即可满足上述契约，无需自行编写原子状态机。

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::address::AddressPair;
use crate::error::{ErrorCode, NO_ERROR, Result};
use crate::task::IoTask;

/// 模式主动请求发起 IO 的回调。
///
/// 用于节奏控制类模式：它们在完成通知之外的时机（例如自身定时器）产出任务。
pub type PatternCallback = Arc<dyn Fn(IoTask) + Send + Sync + 'static>;

/// 模式消费一次完成通知后的裁决。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternStatus {
    /// 继续调用 `initiate_io` 拉取后续任务。
    ContinueIo,
    /// 所需字节已全部传输，不再产出新任务。
    CompletedIo,
    /// 观察到致命错误；会话应关闭句柄以迫使其余在途操作尽快完成。
    FailedIo(ErrorCode),
}

/// 模式生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternState {
    Active,
    Completing,
    Done,
}

/// IO 模式能力集合。
pub trait IoPattern: Send + Sync + 'static {
    /// 统计输出使用的类名。
    fn class_name(&self) -> &'static str;

    /// 产出下一个任务；`None` 表示当前没有可发起的任务。
    fn initiate_io(&self) -> Option<IoTask>;

    /// 消费一次完成通知。回调可在任意工作线程上并发进入。
    fn complete_io(&self, task: &IoTask, transferred: usize, status: ErrorCode) -> PatternStatus;

    /// 模式记录的最具体错误；无错误时为 [`NO_ERROR`]。
    fn last_error(&self) -> ErrorCode;

    /// 替换完成回调；`None` 禁止后续一切回调。
    fn register_callback(&self, callback: Option<PatternCallback>);

    /// 输出累计的测量结果；无法恢复的写出/格式化错误向上传播。
    fn print_stats(&self, addresses: &AddressPair) -> Result<()>;

    /// 模式的生命周期状态机。
    fn lifecycle(&self) -> &PatternLifecycle;

    fn state(&self) -> PatternState {
        self.lifecycle().state()
    }
}

const STATE_ACTIVE: u8 = 0;
const STATE_COMPLETING: u8 = 1;
const STATE_DONE: u8 = 2;

/// `Active → Completing → Done` 的原子状态机。
///
/// 所有转换均为单向的比较交换，重复调用返回 `false` 且不会回退状态。
#[derive(Debug)]
pub struct PatternLifecycle {
    state: AtomicU8,
}

impl PatternLifecycle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_ACTIVE),
        }
    }

    pub fn state(&self) -> PatternState {
        match self.state.load(Ordering::Acquire) {
            STATE_ACTIVE => PatternState::Active,
            STATE_COMPLETING => PatternState::Completing,
            _ => PatternState::Done,
        }
    }

    /// `Active → Completing`，由模式自身在传输完成或观察到致命错误时调用。
    pub fn begin_completing(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_ACTIVE,
                STATE_COMPLETING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// 进入 `Done`，由会话在终态通知时调用。
    ///
    /// 外部触发的关闭可能让模式仍停留在 `Active`，此时直接跃迁到 `Done`。
    pub fn finish(&self) -> bool {
        self.state.swap(STATE_DONE, Ordering::AcqRel) != STATE_DONE
    }
}

impl Default for PatternLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// 可替换的回调槽。
///
/// 调用时先克隆出 `Arc` 再释放锁，回调体内重入 `replace` 不会死锁。
#[derive(Default)]
pub struct CallbackSlot {
    callback: Mutex<Option<PatternCallback>>,
}

impl CallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, callback: Option<PatternCallback>) {
        *self.callback.lock() = callback;
    }

    pub fn is_registered(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// 若已注册回调则以 `task` 调用并返回 `true`；否则丢弃任务返回 `false`。
    pub fn invoke(&self, task: IoTask) -> bool {
        let callback = self.callback.lock().clone();
        match callback {
            Some(callback) => {
                callback(task);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for CallbackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// 首个非成功错误码胜出的记录器。
#[derive(Debug, Default)]
pub struct LastError {
    code: AtomicU32,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            code: AtomicU32::new(NO_ERROR),
        }
    }

    /// 记录错误；仅当此前没有错误时生效，返回是否生效。
    pub fn record(&self, code: ErrorCode) -> bool {
        code != NO_ERROR
            && self
                .code
                .compare_exchange(NO_ERROR, code, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    pub fn get(&self) -> ErrorCode {
        self.code.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::IoAction;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn lifecycle_only_moves_forward() {
        let lifecycle = PatternLifecycle::new();
        assert_eq!(lifecycle.state(), PatternState::Active);
        assert!(lifecycle.begin_completing());
        assert!(!lifecycle.begin_completing());
        assert_eq!(lifecycle.state(), PatternState::Completing);
        assert!(lifecycle.finish());
        assert!(!lifecycle.finish());
        assert!(!lifecycle.begin_completing());
        assert_eq!(lifecycle.state(), PatternState::Done);
    }

    #[test]
    fn external_shutdown_finishes_from_active() {
        let lifecycle = PatternLifecycle::new();
        assert!(lifecycle.finish());
        assert_eq!(lifecycle.state(), PatternState::Done);
    }

    #[test]
    fn first_error_sticks() {
        let last = LastError::new();
        assert!(!last.record(NO_ERROR));
        assert!(last.record(10054));
        assert!(!last.record(10060));
        assert_eq!(last.get(), 10054);
    }

    #[test]
    fn cleared_slot_drops_tasks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let slot = CallbackSlot::new();
        let counter = Arc::clone(&hits);
        slot.replace(Some(Arc::new(move |_task| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(slot.invoke(IoTask::control(IoAction::None)));
        slot.replace(None);
        assert!(!slot.invoke(IoTask::control(IoAction::None)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
