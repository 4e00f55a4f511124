//! 引擎配置。
//!
//! # 教案式注释
//!
//! ## 意图（Why）
//! - 工作线程数、定时器/在途操作上限、日志过滤与统计输出位置需要集中声明，
//!   避免散落在各组件中各自硬编码；
//! - 所有字段都有默认值，空 TOML 文档即可得到一份可运行的配置。
//!
//! ## 契约（What）
//! - [`EngineConfig::from_toml_str`] / [`EngineConfig::load`] 解析后立即执行
//!   [`EngineConfig::validate`]；零值上限被拒绝为 [`ConfigError::Invalid`]；
//! - 未知字段被拒绝，防止拼写错误静默回退到默认值。

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 配置加载与校验错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// 引擎顶层配置。
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub runtime: RuntimeConfig,
    pub limits: IoLimits,
    pub logging: LoggingConfig,
    pub stats: StatsConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.worker_threads == Some(0) {
            return Err(ConfigError::Invalid {
                field: "runtime.worker_threads",
                reason: "must be at least 1 when set",
            });
        }
        if self.limits.max_pending_timers == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.max_pending_timers",
                reason: "must be at least 1",
            });
        }
        if self.limits.max_outstanding_io == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.max_outstanding_io",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// 共享工作线程池配置。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// `None` 表示沿用 tokio 默认值（CPU 核数）。
    pub worker_threads: Option<usize>,
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name: "tidal-worker".to_owned(),
        }
    }
}

/// 每会话资源上限。
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IoLimits {
    /// 单个会话定时器同时挂起的回调上限。
    pub max_pending_timers: usize,
    /// 单个完成适配器同时在途的操作上限。
    pub max_outstanding_io: usize,
}

impl Default for IoLimits {
    fn default() -> Self {
        Self {
            max_pending_timers: 64,
            max_outstanding_io: 1024,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` 指令；`RUST_LOG` 存在时优先。
    pub filter: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            ansi: false,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StatsConfig {
    /// 明细 CSV 路径；`None` 表示不输出明细。
    pub details_path: Option<PathBuf>,
    /// 只输出 `TotalCount,Min,Max,Mean` 四列。
    pub mean_only: bool,
}
