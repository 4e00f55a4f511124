//! 日志引导。
//!
//! 引擎内部只使用 `tracing` 宏埋点；进程入口调用 [`install_logging`] 一次，
//! 组装 `fmt + EnvFilter` 订阅者并设为全局默认。

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::EnvFilter;

use crate::configuration::LoggingConfig;

/// 日志安装错误。
#[derive(Debug, Error)]
pub enum LoggingError {
    /// 外部已设置全局订阅者，拒绝覆盖。
    #[error("a global tracing subscriber is already installed")]
    AlreadySet,
    #[error("invalid log filter `{filter}`: {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 构造过滤器：`RUST_LOG` 存在时优先，否则使用配置中的指令。
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter).map_err(|source| LoggingError::Filter {
        filter: config.filter.clone(),
        source,
    })
}

/// 安装全局日志订阅者。
pub fn install_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    if dispatcher::has_been_set() {
        return Err(LoggingError::AlreadySet);
    }
    let filter = build_filter(config)?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
