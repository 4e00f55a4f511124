use std::{borrow::Cow, error::Error, fmt, io};

/// 框架内部使用的结果别名。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

/// 模式、完成适配器与父状态机之间传递的数值状态码。
///
/// - `0` 表示成功；
/// - 其余取值来自平台错误码（如 `ECONNRESET`/`WSAECONNRESET`）或模式自定义码。
pub type ErrorCode = u32;

/// 成功状态码。
pub const NO_ERROR: ErrorCode = 0;

/// 操作在完成前即被运行时丢弃时合成的状态码（与 `ERROR_OPERATION_ABORTED` 取值一致）。
pub const ERROR_OPERATION_ABORTED: ErrorCode = 995;

/// 底层错误缺少平台错误码时的兜底取值。
pub const ERROR_GEN_FAILURE: ErrorCode = 31;

/// 将 IO 错误折算为数值状态码。
pub fn error_code_from_io(error: &io::Error) -> ErrorCode {
    error
        .raw_os_error()
        .and_then(|code| ErrorCode::try_from(code).ok())
        .filter(|code| *code != NO_ERROR)
        .unwrap_or(ERROR_GEN_FAILURE)
}

/// 稳定错误码，遵循 `<域>.<语义>` 命名。
pub mod codes {
    pub const ADAPTER_BIND: &str = "tidal.completion.bind_failed";
    pub const ADAPTER_CLOSED: &str = "tidal.completion.closed";
    pub const ADAPTER_SATURATED: &str = "tidal.completion.saturated";
    pub const TIMER_CLOSED: &str = "tidal.timer.closed";
    pub const TIMER_SATURATED: &str = "tidal.timer.saturated";
    pub const TASK_WINDOW: &str = "tidal.task.window_out_of_range";
    pub const SESSION_NO_HANDLE: &str = "tidal.session.handle_invalid";
    pub const SESSION_NO_PATTERN: &str = "tidal.session.pattern_missing";
    pub const RUNTIME_UNAVAILABLE: &str = "tidal.runtime.unavailable";
    pub const RUNTIME_BUILD: &str = "tidal.runtime.build_failed";
    pub const TEARDOWN: &str = "tidal.session.teardown_failed";
    pub const STATS_WRITE: &str = "tidal.stats.write_failed";
}

/// 错误分类，决定调用方的处置策略。
///
/// - `ResourceExhausted`：完成适配器绑定或定时器调度失败，调用方可重试或终止会话；
/// - `OperationFailed`：单次 IO 或统计写出失败；
/// - `Teardown`：关闭阶段的尽力而为失败，只记录不阻断；
/// - `Configuration`：配置或运行时构建失败。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    ResourceExhausted,
    OperationFailed,
    Teardown,
    Configuration,
    NonRetryable,
}

/// `CoreError` 是 tidal 引擎跨模块共享的稳定错误形态。
///
/// # 设计背景（Why）
/// - 资源耗尽、平台调用失败需要在传播前被装饰为“错误码 + 操作名 + 可选上下文”，
///   便于排障时直接定位是哪一次平台调用、由哪个对象发起；
/// - 回调驱动的路径无法同步返回错误，因此只有构造与资源申请调用返回 `CoreError`，
///   其余失败折算为 [`ErrorCode`] 走终态通知。
///
/// # 契约说明（What）
/// - `code`：稳定字符串，取自 [`codes`]；
/// - `operation`：失败的操作名，例如 `"completion.bind"`；
/// - `os_code`：可选的平台错误码；
/// - `class_name`：可选的发起对象类名，例如模式的统计类名；
/// - `cause`：可选底层原因，通过 [`Error::source`] 暴露。
///
/// # 设计取舍（Trade-offs）
/// - 消息采用 `Cow<'static, str>`，静态文案零分配，动态文案付出一次堆分配。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    operation: &'static str,
    message: Cow<'static, str>,
    category: ErrorCategory,
    os_code: Option<ErrorCode>,
    class_name: Option<Cow<'static, str>>,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl CoreError {
    /// 构造核心错误，分类默认为 [`ErrorCategory::NonRetryable`]。
    pub fn new(
        code: &'static str,
        operation: &'static str,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code,
            operation,
            message: message.into(),
            category: ErrorCategory::NonRetryable,
            os_code: None,
            class_name: None,
            cause: None,
        }
    }

    /// 构造资源耗尽错误。
    pub fn resource_exhausted(
        code: &'static str,
        operation: &'static str,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(code, operation, message).with_category(ErrorCategory::ResourceExhausted)
    }

    /// 将平台 IO 错误装饰为核心错误，保留平台错误码与底层原因。
    pub fn from_io(code: &'static str, operation: &'static str, error: io::Error) -> Self {
        let os_code = error_code_from_io(&error);
        Self::new(code, operation, format!("{operation}: {error}"))
            .with_category(ErrorCategory::OperationFailed)
            .with_os_code(os_code)
            .with_cause(error)
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_os_code(mut self, os_code: ErrorCode) -> Self {
        self.os_code = Some(os_code);
        self
    }

    /// 附带发起对象的类名（可用时）。
    pub fn with_class_name(mut self, class_name: impl Into<Cow<'static, str>>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn os_code(&self) -> Option<ErrorCode> {
        self.os_code
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// 折算为终态通知可携带的数值状态码。
    ///
    /// 优先使用平台错误码；缺失时资源耗尽类错误回退为 [`ERROR_OPERATION_ABORTED`]，
    /// 其余回退为 [`ERROR_GEN_FAILURE`]。
    pub fn error_code(&self) -> ErrorCode {
        match (self.os_code, self.category) {
            (Some(code), _) => code,
            (None, ErrorCategory::ResourceExhausted) => ERROR_OPERATION_ABORTED,
            (None, _) => ERROR_GEN_FAILURE,
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(os_code) = self.os_code {
            write!(f, " (os error {os_code})")?;
        }
        if let Some(class_name) = &self.class_name {
            write!(f, " [class {class_name}]")?;
        }
        Ok(())
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}
