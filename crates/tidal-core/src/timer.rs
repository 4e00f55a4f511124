use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::error::{CoreError, Result, codes};
use crate::runtime::IoEnvironment;

/// 延迟调度器：在指定延迟后于工作线程上执行一次回调。
///
/// # 教案式注释
///
/// ## 意图（Why）
/// - 节奏控制与重试需要“稍后再发起”的能力，但被调度的回调不应延长会话寿命；
///   调用方应只在闭包中捕获目标的弱引用，触发时解析失败即为无操作。
///
/// ## 契约（What）
/// - [`schedule_singleton`](Self::schedule_singleton)：闭包至多执行一次，且不早于 `delay`；
///   与其他定时器或 IO 完成之间没有顺序保证；
/// - 挂起回调数达到上限或定时器已释放时返回资源错误；
/// - 没有显式取消操作；释放定时器会中止尚未触发的回调。
///
/// ## 逻辑（How）
/// - 每次调度在共享运行时上派生一个 `sleep → callback` 任务，只保留其 `AbortHandle`；
/// - 内部锁只覆盖计数与句柄表的读写：派生任务、中止任务、丢弃被拒绝的闭包都发生在
///   锁外，闭包的析构逻辑因此可以安全地重入本定时器（例如触发会话拆除）。
pub struct DeferredTimer {
    runtime: Handle,
    capacity: usize,
    scheduled: Mutex<Scheduled>,
}

#[derive(Default)]
struct Scheduled {
    handles: Vec<AbortHandle>,
    reserved: usize,
    released: bool,
}

impl DeferredTimer {
    pub fn new(env: &IoEnvironment) -> Self {
        Self {
            runtime: env.handle().clone(),
            capacity: env.limits().max_pending_timers,
            scheduled: Mutex::new(Scheduled::default()),
        }
    }

    pub fn schedule_singleton<F>(&self, callback: F, delay: Duration) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.reserve()?;
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        let abort = task.abort_handle();

        let mut scheduled = self.scheduled.lock();
        scheduled.reserved -= 1;
        if scheduled.released {
            drop(scheduled);
            abort.abort();
        } else {
            scheduled.handles.push(abort);
        }
        Ok(())
    }

    fn reserve(&self) -> Result<()> {
        let mut scheduled = self.scheduled.lock();
        if scheduled.released {
            return Err(CoreError::resource_exhausted(
                codes::TIMER_CLOSED,
                "timer.schedule",
                "deferred timer has been released",
            ));
        }
        scheduled.handles.retain(|handle| !handle.is_finished());
        if scheduled.handles.len() + scheduled.reserved >= self.capacity {
            return Err(CoreError::resource_exhausted(
                codes::TIMER_SATURATED,
                "timer.schedule",
                format!("{} callbacks already pending", self.capacity),
            ));
        }
        scheduled.reserved += 1;
        Ok(())
    }

    /// 仍在等待触发的回调数量。
    pub fn pending(&self) -> usize {
        let mut scheduled = self.scheduled.lock();
        scheduled.handles.retain(|handle| !handle.is_finished());
        scheduled.handles.len()
    }

    /// 中止尚未触发的回调并拒绝后续调度。幂等。
    pub fn release(&self) {
        let handles = {
            let mut scheduled = self.scheduled.lock();
            if scheduled.released {
                return;
            }
            scheduled.released = true;
            std::mem::take(&mut scheduled.handles)
        };
        let aborted = handles.iter().filter(|handle| !handle.is_finished()).count();
        for handle in handles {
            handle.abort();
        }
        tracing::debug!(aborted, "deferred timer released");
    }
}

impl Drop for DeferredTimer {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for DeferredTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredTimer")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
