#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "tidal-core: 流量生成引擎中单条被测连接的会话核心。"]
#![doc = ""]
#![doc = "一个会话持有原生套接字、惰性创建的完成适配器与延迟定时器、在途 IO 计数以及一个"]
#![doc = "可插拔的 IO 模式；它保证拆除至多一次、拆除时无在途操作、终态通知恰好一次。"]
#![doc = ""]
#![doc = "== 模块分工 =="]
#![doc = "1. `session`：会话状态与生命周期；"]
#![doc = "2. `completion` / `timer`：绑定共享工作线程池的异步完成与延迟回调；"]
#![doc = "3. `pattern` / `task` / `driver`：IO 模式契约、任务描述与驱动循环；"]
#![doc = "4. `configuration` / `runtime` / `observability` / `error`：配置、运行时、日志与错误域。"]

mod macros;

pub mod address;
pub mod completion;
pub mod configuration;
pub mod driver;
pub mod error;
pub mod observability;
pub mod pattern;
pub mod pending;
pub mod runtime;
pub mod session;
pub mod task;
pub mod timer;

pub use address::{AddressPair, UNSPECIFIED_ADDR};
pub use completion::{CompletionAdapter, CompletionCallback, Rejected};
pub use configuration::{
    ConfigError, EngineConfig, IoLimits, LoggingConfig, RuntimeConfig, StatsConfig,
};
pub use error::{
    CoreError, ERROR_GEN_FAILURE, ERROR_OPERATION_ABORTED, ErrorCategory, ErrorCode, NO_ERROR,
    Result, codes, error_code_from_io,
};
pub use observability::{LoggingError, install_logging};
pub use pattern::{
    CallbackSlot, IoPattern, LastError, PatternCallback, PatternLifecycle, PatternState,
    PatternStatus,
};
pub use pending::PendingCounter;
pub use runtime::{IoEnvironment, build_runtime};
pub use session::{SessionParent, SocketSession};
pub use task::{IoAction, IoCompletion, IoTask};
pub use timer::DeferredTimer;
