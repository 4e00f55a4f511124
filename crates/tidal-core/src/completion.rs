//! 异步完成适配器。
//!
//! # 教案式注释
//!
//! ## 意图（Why）
//! - 把原生套接字绑定到共享工作线程池：调用方提交任务后立即返回，操作完成时在任意
//!   工作线程上回调一次，携带实际字节数与状态码；
//! - 适配器构造后不再暴露任何可变状态，它只是派发通道。
//!
//! ## 逻辑（How）
//! - 构造时对句柄执行一次平台查询以确认其有效，随后切换为非阻塞模式并以
//!   `tokio::io::unix::AsyncFd` 注册到运行时的 IO 反应器，失败即返回资源错误；
//! - 每个任务是一个异步任务：等待就绪、尝试一次非阻塞调用、`WouldBlock` 时清除就绪
//!   重新等待。等待期间不占用任何线程，空闲连接再多也不会饿死工作线程或阻塞线程池；
//! - 回调被包裹在 `DeliveryGuard` 中：任务在等待途中或运行前被运行时丢弃（例如运行时
//!   正在关闭），`Drop` 会以 [`ERROR_OPERATION_ABORTED`] 补发一次完成，保证“每个操作
//!   恰好一次回调”，会话的在途计数因此总能归零。
//!
//! ## 契约（What）
//! - 同一句柄上的多个操作可在不同工作线程上并发完成，回调必须可重入；
//! - 关闭原生句柄（`shutdown(Both)`）会让反应器报告挂断，在途的读写随即以错误或
//!   零字节返回，这些结果仍作为普通完成投递；
//! - 适配器被释放后拒绝新提交；已在途的操作持有共享状态，照常完成；
//! - 运行时必须启用 IO 驱动（`enable_all` 或 `enable_io`）。
//!
//! ## 注意事项（Trade-offs）
//! - 释放适配器不会等待在途回调排空：在途任务各自持有共享状态的引用，
//!   注册与文件描述符在最后一个在途操作结束时才随之释放；
//! - 仅支持类 Unix 平台。

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use socket2::Socket;
use tokio::io::unix::AsyncFd;
use tokio::runtime::Handle;

use crate::error::{
    CoreError, ERROR_OPERATION_ABORTED, ErrorCategory, ErrorCode, NO_ERROR, Result, codes,
    error_code_from_io,
};
use crate::runtime::IoEnvironment;
use crate::task::{IoAction, IoCompletion, IoTask};

/// 单次操作的完成回调。
pub type CompletionCallback = Box<dyn FnOnce(IoCompletion) + Send + 'static>;

/// 未被接受的提交：拒绝原因与原任务。
#[derive(Debug)]
pub struct Rejected {
    pub error: CoreError,
    pub task: IoTask,
}

struct AdapterShared {
    io: AsyncFd<Arc<Socket>>,
    released: AtomicBool,
    outstanding: AtomicUsize,
    max_outstanding: usize,
}

/// 原生句柄与完成派发机制之间的绑定。
pub struct CompletionAdapter {
    shared: Arc<AdapterShared>,
    runtime: Handle,
}

impl CompletionAdapter {
    /// 绑定句柄；句柄无效或平台调用失败时返回资源错误。
    pub fn bind(socket: &Arc<Socket>, env: &IoEnvironment) -> Result<Self> {
        let io = register(socket, env.handle()).map_err(|err| {
            CoreError::from_io(codes::ADAPTER_BIND, "completion.bind", err)
                .with_category(ErrorCategory::ResourceExhausted)
        })?;
        tracing::debug!(
            max_outstanding = env.limits().max_outstanding_io,
            "completion adapter bound"
        );
        Ok(Self {
            shared: Arc::new(AdapterShared {
                io,
                released: AtomicBool::new(false),
                outstanding: AtomicUsize::new(0),
                max_outstanding: env.limits().max_outstanding_io,
            }),
            runtime: env.handle().clone(),
        })
    }

    /// 提交一次操作；成功返回后 `callback` 恰好被调用一次。
    ///
    /// 被拒绝时任务随 [`Rejected`] 原样交还，`callback` 不会被调用。
    pub fn submit<F>(&self, task: IoTask, callback: F) -> std::result::Result<(), Rejected>
    where
        F: FnOnce(IoCompletion) + Send + 'static,
    {
        if self.shared.released.load(Ordering::Acquire) {
            return Err(Rejected {
                error: CoreError::resource_exhausted(
                    codes::ADAPTER_CLOSED,
                    "completion.submit",
                    "completion adapter has been released",
                ),
                task,
            });
        }
        let previous = self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        if previous >= self.shared.max_outstanding {
            self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(Rejected {
                error: CoreError::resource_exhausted(
                    codes::ADAPTER_SATURATED,
                    "completion.submit",
                    format!(
                        "{} operations already outstanding",
                        self.shared.max_outstanding
                    ),
                ),
                task,
            });
        }

        let mut guard = DeliveryGuard {
            shared: Arc::clone(&self.shared),
            task: Some(task),
            callback: Some(Box::new(callback)),
        };
        // `JoinHandle` 被丢弃即分离；完成结果经由回调而非句柄返回。
        drop(self.runtime.spawn(async move {
            // 等待期间任务留在守卫内，future 被丢弃时由 `Drop` 补发中止完成。
            let (transferred, status) = match guard.task.as_mut() {
                Some(task) => perform(&guard.shared.io, task).await,
                None => return,
            };
            if let Some(task) = guard.task.take() {
                guard.deliver(task, transferred, status);
            }
        }));
        Ok(())
    }

    /// 当前在途操作数。
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }
}

impl Drop for CompletionAdapter {
    fn drop(&mut self) {
        self.shared.released.store(true, Ordering::Release);
        tracing::debug!(
            outstanding = self.shared.outstanding.load(Ordering::Acquire),
            "completion adapter released"
        );
    }
}

impl std::fmt::Debug for CompletionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionAdapter")
            .field("outstanding", &self.outstanding())
            .field("released", &self.shared.released.load(Ordering::Acquire))
            .finish()
    }
}

struct DeliveryGuard {
    shared: Arc<AdapterShared>,
    task: Option<IoTask>,
    callback: Option<CompletionCallback>,
}

impl DeliveryGuard {
    fn deliver(&mut self, task: IoTask, transferred: usize, status: ErrorCode) {
        if let Some(callback) = self.callback.take() {
            self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
            callback(IoCompletion {
                task,
                transferred,
                status,
            });
        }
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!(action = ?task.action(), "operation dropped before completion");
            self.deliver(task, 0, ERROR_OPERATION_ABORTED);
        }
    }
}

fn register(socket: &Arc<Socket>, runtime: &Handle) -> io::Result<AsyncFd<Arc<Socket>>> {
    socket.r#type()?;
    socket.set_nonblocking(true)?;
    let _entered = runtime.enter();
    AsyncFd::new(Arc::clone(socket))
}

/// 在套接字上完成一次操作，返回 `(字节数, 状态码)`。
async fn perform(io: &AsyncFd<Arc<Socket>>, task: &mut IoTask) -> (usize, ErrorCode) {
    let outcome = match task.action() {
        IoAction::None | IoAction::Abort => Ok(0),
        IoAction::Send => send(io, task.window()).await,
        IoAction::Recv => recv(io, task.window_mut()).await,
        IoAction::GracefulShutdown => io.get_ref().shutdown(Shutdown::Write).map(|()| 0),
        IoAction::HardShutdown => hard_shutdown(io.get_ref()).map(|()| 0),
    };
    match outcome {
        Ok(transferred) => (transferred, NO_ERROR),
        Err(err) => {
            tracing::trace!(action = ?task.action(), error = %err, "operation failed");
            (0, error_code_from_io(&err))
        }
    }
}

async fn send(io: &AsyncFd<Arc<Socket>>, buf: &[u8]) -> io::Result<usize> {
    loop {
        let mut ready = io.writable().await?;
        match ready.try_io(|inner| (&**inner.get_ref()).write(buf)) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

async fn recv(io: &AsyncFd<Arc<Socket>>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let mut ready = io.readable().await?;
        match ready.try_io(|inner| (&**inner.get_ref()).read(buf)) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

fn hard_shutdown(socket: &Socket) -> io::Result<()> {
    socket.set_linger(Some(Duration::ZERO))?;
    socket.shutdown(Shutdown::Both)
}
