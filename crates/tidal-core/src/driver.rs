//! 会话 IO 驱动：把模式产出的任务接到完成适配器上，并在计数归零时投递终态通知。
//!
//! # 教案式注释
//!
//! ## 逻辑（How）
//! - [`start`] 为模式注册回调（只捕获会话弱引用，避免 会话→模式→回调→会话 的环），
//!   随后排空 `initiate_io`；排空期间驱动器自身占用一个在途计数，防止早完成的操作
//!   在种子任务尚未全部发出时就把计数降到零；
//! - 带延迟的任务经由会话定时器发起，延迟期间同样占用一个在途计数；
//! - 每个完成先交给 `complete_io`，再递减计数：最后一个递减者因此能看到所有完成对
//!   模式状态造成的影响；计数归零且模式已离开 `Active` 时投递终态通知；
//! - 模式判定失败时关闭句柄，迫使其余在途操作尽快以错误完成；
//! - 提交被拒、适配器不可用、延迟任务未能触发等无法同步上报的失败，
//!   都被折算为一次带错误码的完成，走同一条计数与通知路径。

use std::sync::{Arc, Weak};

use crate::error::{CoreError, ERROR_OPERATION_ABORTED, ErrorCode, NO_ERROR, Result, codes};
use crate::pattern::{IoPattern, PatternState, PatternStatus};
use crate::session::SocketSession;
use crate::task::{IoAction, IoCompletion, IoTask};

/// 启动会话的 IO 循环。
///
/// 会话必须已挂接有效句柄与 IO 模式，否则返回错误且不产生任何副作用。
pub fn start(session: &Arc<SocketSession>) -> Result<()> {
    let Some(pattern) = session.io_pattern() else {
        return Err(CoreError::new(
            codes::SESSION_NO_PATTERN,
            "driver.start",
            format!("session {} has no io pattern attached", session.id()),
        ));
    };
    if !session.has_handle() {
        return Err(CoreError::new(
            codes::SESSION_NO_HANDLE,
            "driver.start",
            format!("session {} has no valid socket", session.id()),
        ));
    }

    let weak = Arc::downgrade(session);
    pattern.register_callback(Some(Arc::new(move |task| {
        if let Some(session) = weak.upgrade() {
            dispatch(&session, task);
        }
    })));

    session.increment_pending();
    pump(session, &pattern);
    finish_one(session, &pattern, NO_ERROR);
    Ok(())
}

/// 发起一个任务：有延迟时交给定时器，否则立即提交。
pub fn dispatch(session: &Arc<SocketSession>, task: IoTask) {
    match task.delay() {
        Some(delay) => {
            session.increment_pending();
            let ticket = DelayTicket {
                session: Arc::downgrade(session),
                action: task.action(),
                armed: true,
            };
            let scheduled = session.schedule_delayed(task, delay, move |weak, mut task| {
                let mut ticket = ticket;
                ticket.armed = false;
                let Some(session) = weak.upgrade() else {
                    return;
                };
                task.clear_delay();
                issue_now(&session, task);
                if let Some(pattern) = session.io_pattern() {
                    finish_one(&session, &pattern, NO_ERROR);
                }
            });
            // 失败时闭包已随 Err 一起被丢弃，票据的 Drop 负责补发完成。
            if let Err(err) = scheduled {
                tracing::warn!(session = session.id(), error = %err, "failed to schedule delayed io");
            }
        }
        None => issue_now(session, task),
    }
}

fn pump(session: &Arc<SocketSession>, pattern: &Arc<dyn IoPattern>) {
    while let Some(task) = pattern.initiate_io() {
        dispatch(session, task);
    }
}

fn issue_now(session: &Arc<SocketSession>, task: IoTask) {
    let Some(pattern) = session.io_pattern() else {
        return;
    };
    session.increment_pending();

    if !task.action().touches_socket() {
        if task.action() == IoAction::Abort {
            session.close_handle();
        }
        return complete_inline(session, &pattern, task, NO_ERROR);
    }

    let adapter = match session.completion_adapter() {
        Ok(Some(adapter)) => adapter,
        Ok(None) => return complete_inline(session, &pattern, task, ERROR_OPERATION_ABORTED),
        Err(err) => {
            tracing::warn!(session = session.id(), error = %err, "completion adapter unavailable");
            let code = err.error_code();
            return complete_inline(session, &pattern, task, code);
        }
    };

    let owner = Arc::clone(session);
    let owner_pattern = Arc::clone(&pattern);
    if let Err(rejected) = adapter.submit(task, move |completion| {
        on_complete(&owner, &owner_pattern, completion);
    }) {
        tracing::debug!(session = session.id(), error = %rejected.error, "io submission rejected");
        let code = rejected.error.error_code();
        complete_inline(session, &pattern, rejected.task, code);
    }
}

fn complete_inline(
    session: &Arc<SocketSession>,
    pattern: &Arc<dyn IoPattern>,
    task: IoTask,
    status: ErrorCode,
) {
    on_complete(
        session,
        pattern,
        IoCompletion {
            task,
            transferred: 0,
            status,
        },
    );
}

fn on_complete(
    session: &Arc<SocketSession>,
    pattern: &Arc<dyn IoPattern>,
    completion: IoCompletion,
) {
    if !completion.is_success() {
        tracing::trace!(
            session = session.id(),
            action = ?completion.task.action(),
            status = completion.status,
            "io completed with error"
        );
    }
    let IoCompletion {
        task,
        transferred,
        status,
    } = completion;
    let mut error = status;
    match pattern.complete_io(&task, transferred, status) {
        PatternStatus::ContinueIo => pump(session, pattern),
        PatternStatus::CompletedIo => {}
        PatternStatus::FailedIo(code) => {
            error = code;
            pattern.lifecycle().begin_completing();
            session.close_handle();
        }
    }
    finish_one(session, pattern, error);
}

fn finish_one(session: &Arc<SocketSession>, pattern: &Arc<dyn IoPattern>, error: ErrorCode) {
    if session.decrement_pending() == 0 && pattern.state() != PatternState::Active {
        session.notify_parent_complete(error);
    }
}

/// 延迟任务占用的在途计数。
///
/// 定时器触发时解除武装；若闭包未触发就被丢弃（调度失败、定时器被释放、运行时关闭），
/// 且会话仍然存活，则把会话判为失败，并以同类动作的空任务向模式补发一次中止完成，
/// 该完成同时归还计数。
struct DelayTicket {
    session: Weak<SocketSession>,
    action: IoAction,
    armed: bool,
}

impl Drop for DelayTicket {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(session) = self.session.upgrade() else {
            return;
        };
        let Some(pattern) = session.io_pattern() else {
            return;
        };
        tracing::debug!(session = session.id(), action = ?self.action, "delayed io abandoned before firing");
        pattern.lifecycle().begin_completing();
        session.close_handle();
        complete_inline(
            &session,
            &pattern,
            IoTask::control(self.action),
            ERROR_OPERATION_ABORTED,
        );
    }
}
