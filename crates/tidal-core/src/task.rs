//! IO 任务描述符与完成结果。
//!
//! 任务由 [`IoPattern`](crate::pattern::IoPattern) 产出、由
//! [`CompletionAdapter`](crate::completion::CompletionAdapter) 执行；缓冲区以所有权形式
//! 随任务流转，完成时连同结果一并交还给模式。

use std::time::Duration;

use bytes::BytesMut;

use crate::error::{CoreError, ErrorCode, NO_ERROR, Result, codes};

/// 任务请求的操作种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IoAction {
    /// 无需执行 IO，仅用于让模式推进状态。
    None,
    Send,
    Recv,
    /// 关闭发送方向，等待对端读到 EOF。
    GracefulShutdown,
    /// 以 `linger = 0` 关闭双向，对端会收到 RST。
    HardShutdown,
    /// 放弃连接：由驱动器直接关闭会话句柄，不发起平台调用。
    Abort,
}

impl IoAction {
    /// 该动作是否需要在套接字上执行平台调用。
    pub fn touches_socket(self) -> bool {
        !matches!(self, IoAction::None | IoAction::Abort)
    }
}

/// 一次 IO 请求的值描述。
///
/// - `buffer`：任务拥有的缓冲区；
/// - `offset`/`length`：本次操作使用的窗口，始终落在 `buffer` 范围内；
/// - `delay`：可选的延迟，非零时驱动器会经由会话定时器延后发起。
#[derive(Debug)]
pub struct IoTask {
    action: IoAction,
    buffer: BytesMut,
    offset: usize,
    length: usize,
    delay: Option<Duration>,
}

impl IoTask {
    /// 以整个缓冲区为窗口构造任务。
    pub fn new(action: IoAction, buffer: BytesMut) -> Self {
        let length = buffer.len();
        Self {
            action,
            buffer,
            offset: 0,
            length,
            delay: None,
        }
    }

    /// 构造不携带缓冲区的控制类任务（关闭、放弃等）。
    pub fn control(action: IoAction) -> Self {
        Self::new(action, BytesMut::new())
    }

    /// 收窄本次操作的窗口；越界时返回错误而不是截断。
    pub fn with_window(mut self, offset: usize, length: usize) -> Result<Self> {
        let in_range = offset
            .checked_add(length)
            .is_some_and(|end| end <= self.buffer.len());
        if !in_range {
            return Err(CoreError::new(
                codes::TASK_WINDOW,
                "task.window",
                format!(
                    "window {offset}+{length} exceeds buffer of {} bytes",
                    self.buffer.len()
                ),
            ));
        }
        self.offset = offset;
        self.length = length;
        Ok(self)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn action(&self) -> IoAction {
        self.action
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// 仅当延迟非零时返回。
    pub fn delay(&self) -> Option<Duration> {
        self.delay.filter(|delay| !delay.is_zero())
    }

    /// 清除延迟，供定时器触发后立即发起。
    pub fn clear_delay(&mut self) {
        self.delay = None;
    }

    /// 当前窗口的只读视图。
    pub fn window(&self) -> &[u8] {
        &self.buffer[self.offset..self.offset + self.length]
    }

    /// 当前窗口的可写视图。
    pub fn window_mut(&mut self) -> &mut [u8] {
        let (offset, length) = (self.offset, self.length);
        &mut self.buffer[offset..offset + length]
    }

    pub fn into_buffer(self) -> BytesMut {
        self.buffer
    }
}

/// 一次完成通知：原任务、实际传输字节数与状态码。
#[derive(Debug)]
pub struct IoCompletion {
    pub task: IoTask,
    pub transferred: usize,
    pub status: ErrorCode,
}

impl IoCompletion {
    pub fn is_success(&self) -> bool {
        self.status == NO_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_validated_against_buffer() {
        let task = IoTask::new(IoAction::Send, BytesMut::from(&b"0123456789"[..]));
        assert_eq!(task.length(), 10);

        let task = task.with_window(2, 3).unwrap();
        assert_eq!(task.window(), b"234");

        let err = IoTask::new(IoAction::Recv, BytesMut::zeroed(4))
            .with_window(3, 2)
            .unwrap_err();
        assert_eq!(err.code(), codes::TASK_WINDOW);

        let overflow = IoTask::new(IoAction::Recv, BytesMut::zeroed(4)).with_window(usize::MAX, 2);
        assert!(overflow.is_err());
    }

    #[test]
    fn zero_delay_counts_as_immediate() {
        let task = IoTask::control(IoAction::None).with_delay(Duration::ZERO);
        assert_eq!(task.delay(), None);

        let mut task = task.with_delay(Duration::from_millis(5));
        assert_eq!(task.delay(), Some(Duration::from_millis(5)));
        task.clear_delay();
        assert_eq!(task.delay(), None);
    }
}
