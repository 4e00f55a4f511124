//! 套接字会话：一条被测连接的原生句柄、IO 模式与完成生命周期。
//!
//! # 教案式注释
//!
//! ## 意图（Why）
//! - 多个完成回调（任意工作线程）、父状态机发起的关闭、会话自身的析构会竞争同一个原生
//!   句柄与模式对象；会话必须保证至多一次拆除、拆除时无在途操作、终态通知恰好一次；
//! - 关闭调用不能在持有会话锁时等待工作线程，否则正在上报完成、同样需要该锁的工作线程
//!   会与之互相等待。
//!
//! ## 逻辑（How）
//! - 句柄、完成适配器、定时器三个槽位由同一把 `parking_lot::Mutex` 保护；
//! - 在途计数使用无锁的 [`PendingCounter`]；
//! - `shutdown` 只在锁内完成“关闭句柄 + 取出指针”，适配器与定时器的释放放在锁外；
//! - 定时器回调仅捕获会话的 `Weak`，会话先于触发被拆除时回调解析失败即为无操作；
//! - 父状态机同样以 `Weak` 持有，只在通知瞬间尝试升级，绝不延长其寿命。
//!
//! ## 契约（What）
//! - 句柄 `Invalid → valid` 每个会话至多一次；重复设置是致命错误；
//! - `notify_parent_complete` 要求在途计数为零，否则致命；并发的重复触发只投递一次；
//! - 模式记录的最后错误优先于调用方提供的错误码；
//! - 析构时兜底调用 `shutdown` 并释放模式，但不负责终态通知。

use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use socket2::Socket;

use crate::address::{AddressPair, AddressSlots};
use crate::completion::CompletionAdapter;
use crate::error::{CoreError, ErrorCategory, ErrorCode, Result, codes};
use crate::fatal_condition;
use crate::pattern::IoPattern;
use crate::pending::PendingCounter;
use crate::runtime::IoEnvironment;
use crate::task::IoTask;
use crate::timer::DeferredTimer;

/// 接收会话终态通知的父状态机。
pub trait SessionParent: Send + Sync {
    /// 每个会话恰好调用一次，携带最终错误码。
    fn complete_state(&self, error: ErrorCode);
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct SessionSlots {
    handle: Option<Arc<Socket>>,
    handle_assigned: bool,
    adapter: Option<Arc<CompletionAdapter>>,
    timer: Option<Arc<DeferredTimer>>,
}

/// 单条被测连接的会话对象。
///
/// 只能通过 [`SocketSession::new`] 以 `Arc` 形式构造，以便内部派发弱引用。
pub struct SocketSession {
    id: u64,
    slots: Mutex<SessionSlots>,
    pending: PendingCounter,
    pattern: Mutex<Option<Arc<dyn IoPattern>>>,
    addresses: AddressSlots,
    parent: Weak<dyn SessionParent>,
    completed: AtomicBool,
    env: IoEnvironment,
    weak_self: Weak<SocketSession>,
}

impl SocketSession {
    pub fn new(parent: Weak<dyn SessionParent>, env: IoEnvironment) -> Arc<Self> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(session = id, "session created");
        Arc::new_cyclic(|weak_self| Self {
            id,
            slots: Mutex::new(SessionSlots::default()),
            pending: PendingCounter::new(),
            pattern: Mutex::new(None),
            addresses: AddressSlots::default(),
            parent,
            completed: AtomicBool::new(false),
            env,
            weak_self: weak_self.clone(),
        })
    }

    /// 进程内唯一的会话编号，仅用于日志关联。
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 挂接连接/接受完成后的原生句柄。
    ///
    /// # Panics
    /// 会话曾经持有过句柄时触发致命路径，绝不覆盖第一个句柄。
    pub fn set_handle(&self, socket: Socket) {
        let mut slots = self.slots.lock();
        fatal_condition!(
            slots.handle_assigned,
            "session {} already had a socket assigned (holding: {}); refusing to overwrite",
            self.id,
            slots.handle.is_some()
        );
        slots.handle = Some(Arc::new(socket));
        slots.handle_assigned = true;
        tracing::debug!(session = self.id, "socket attached");
    }

    /// 幂等地关闭原生句柄，迫使在途操作尽快完成。
    ///
    /// 适配器随句柄一并释放（锁外）；它持有的描述符引用在最后一个在途操作完成后关闭。
    pub fn close_handle(&self) {
        let adapter = {
            let mut slots = self.slots.lock();
            if let Some(socket) = slots.handle.take() {
                close_socket(self.id, &socket);
            }
            slots.adapter.take()
        };
        drop(adapter);
    }

    /// 当前是否持有有效句柄。
    pub fn has_handle(&self) -> bool {
        self.slots.lock().handle.is_some()
    }

    /// 返回共享的完成适配器，首次调用时创建。
    ///
    /// 句柄尚未有效时返回 `Ok(None)`；绑定失败以资源错误向上传播。
    pub fn completion_adapter(&self) -> Result<Option<Arc<CompletionAdapter>>> {
        let mut slots = self.slots.lock();
        // 必须先确认句柄有效，避免与 shutdown 释放适配器的过程交错时重新创建。
        let Some(socket) = slots.handle.as_ref() else {
            return Ok(None);
        };
        if slots.adapter.is_none() {
            let adapter = CompletionAdapter::bind(socket, &self.env)?;
            slots.adapter = Some(Arc::new(adapter));
            tracing::debug!(session = self.id, "completion adapter created");
        }
        Ok(slots.adapter.clone())
    }

    pub fn has_completion_adapter(&self) -> bool {
        self.slots.lock().adapter.is_some()
    }

    pub fn has_timer(&self) -> bool {
        self.slots.lock().timer.is_some()
    }

    pub fn increment_pending(&self) -> i64 {
        self.pending.increment()
    }

    /// # Panics
    /// 计数在零上递减（重复完成）时触发致命路径。
    pub fn decrement_pending(&self) -> i64 {
        self.pending.decrement()
    }

    pub fn pending_count(&self) -> i64 {
        self.pending.load()
    }

    /// 在 `delay` 之后以 `(会话弱引用, task)` 调用一次 `callback`。
    ///
    /// 定时器在首次调用时惰性创建。闭包只捕获弱引用：会话在触发前被拆除时，
    /// `callback` 收到的弱引用无法升级，应视为无操作。
    pub fn schedule_delayed<F>(&self, task: IoTask, delay: Duration, callback: F) -> Result<()>
    where
        F: FnOnce(Weak<SocketSession>, IoTask) + Send + 'static,
    {
        let timer = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.timer.get_or_insert_with(|| {
                tracing::debug!(session = self.id, "deferred timer created");
                Arc::new(DeferredTimer::new(&self.env))
            }))
        };
        let weak_self = self.weak_self.clone();
        timer.schedule_singleton(move || callback(weak_self, task), delay)
    }

    /// 挂接 IO 模式。
    ///
    /// # Panics
    /// 模式只允许设置一次。
    pub fn set_io_pattern(&self, pattern: Arc<dyn IoPattern>) {
        let mut slot = self.pattern.lock();
        fatal_condition!(
            slot.is_some(),
            "session {} already has an io pattern attached",
            self.id
        );
        *slot = Some(pattern);
    }

    pub fn io_pattern(&self) -> Option<Arc<dyn IoPattern>> {
        self.pattern.lock().clone()
    }

    pub fn set_local_addr(&self, addr: SocketAddr) {
        if !self.addresses.set_local(addr) {
            tracing::warn!(session = self.id, %addr, "local address already set; ignoring");
        }
    }

    pub fn set_target_addr(&self, addr: SocketAddr) {
        if !self.addresses.set_target(addr) {
            tracing::warn!(session = self.id, %addr, "target address already set; ignoring");
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addresses.local()
    }

    pub fn target_addr(&self) -> SocketAddr {
        self.addresses.target()
    }

    pub fn addresses(&self) -> AddressPair {
        self.addresses.pair()
    }

    /// 输出本会话的结果：有模式时打印其统计，否则记录建连阶段的失败。
    pub fn print_pattern_results(&self, error: ErrorCode) -> Result<()> {
        let addresses = self.addresses();
        match self.io_pattern() {
            Some(pattern) => pattern.print_stats(&addresses),
            None => {
                tracing::info!(
                    session = self.id,
                    local = %addresses.local,
                    target = %addresses.target,
                    error,
                    "connection result"
                );
                Ok(())
            }
        }
    }

    /// 向父状态机投递终态通知。
    ///
    /// # Panics
    /// 仍有在途操作时触发致命路径。
    pub fn notify_parent_complete(&self, error: ErrorCode) {
        let pending = self.pending.load();
        fatal_condition!(
            pending != 0,
            "session {} completing with outstanding io ({})",
            self.id,
            pending
        );
        if self.completed.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                session = self.id,
                error,
                "duplicate terminal notification ignored"
            );
            return;
        }

        let mut recorded = error;
        if let Some(pattern) = self.io_pattern() {
            recorded = pattern.last_error();
            pattern.register_callback(None);
            pattern.lifecycle().finish();
        }

        tracing::debug!(session = self.id, error = recorded, "session complete");
        if let Some(parent) = self.parent.upgrade() {
            parent.complete_state(recorded);
        }
    }

    /// 终态通知是否已投递。
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// 幂等关闭：锁内关闭句柄并取出适配器/定时器，锁外释放它们。
    pub fn shutdown(&self) {
        let (adapter, timer) = {
            let mut slots = self.slots.lock();
            if let Some(socket) = slots.handle.take() {
                close_socket(self.id, &socket);
            }
            (slots.adapter.take(), slots.timer.take())
        };
        if adapter.is_some() || timer.is_some() {
            tracing::debug!(session = self.id, "releasing worker-bound objects");
        }
        if let Some(timer) = timer {
            timer.release();
        }
        drop(adapter);
    }
}

impl Drop for SocketSession {
    fn drop(&mut self) {
        self.shutdown();
        // 模式只在析构时释放：shutdown 可能由父状态机在回调仍持有会话引用时调用。
        self.pattern.get_mut().take();
        tracing::trace!(session = self.id, "session dropped");
    }
}

impl std::fmt::Debug for SocketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSession")
            .field("id", &self.id)
            .field("pending", &self.pending.load())
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}

/// 关闭双向以唤醒阻塞在该句柄上的操作；失败只记录，不阻断拆除。
fn close_socket(session: u64, socket: &Socket) {
    if let Err(err) = socket.shutdown(Shutdown::Both) {
        let err = CoreError::from_io(codes::TEARDOWN, "session.close", err)
            .with_category(ErrorCategory::Teardown);
        tracing::debug!(session, error = %err, "socket shutdown during close failed");
    }
    tracing::debug!(session, "socket closed");
}
