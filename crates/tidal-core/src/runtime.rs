use tokio::runtime::{Builder, Handle, Runtime};

use crate::configuration::{IoLimits, RuntimeConfig};
use crate::error::{CoreError, ErrorCategory, Result, codes};

/// 会话创建完成适配器与定时器时所需的执行环境。
///
/// # 教案式注释
///
/// ## 意图（Why）
/// - 完成回调与定时器回调都投递到同一个共享工作线程池；会话在首次需要时才惰性
///   创建适配器/定时器，因此需要随身携带线程池句柄与资源上限。
///
/// ## 契约（What）
/// - `handle`：tokio 运行时句柄，克隆廉价；
/// - `limits`：每会话资源上限；
/// - 环境本身不持有运行时所有权，运行时的生命周期由调用方（通常是引擎入口）管理。
#[derive(Clone, Debug)]
pub struct IoEnvironment {
    handle: Handle,
    limits: IoLimits,
}

impl IoEnvironment {
    pub fn new(handle: Handle, limits: IoLimits) -> Self {
        Self { handle, limits }
    }

    /// 从当前所在的 tokio 运行时获取环境。
    pub fn current(limits: IoLimits) -> Result<Self> {
        let handle = Handle::try_current().map_err(|err| {
            CoreError::new(
                codes::RUNTIME_UNAVAILABLE,
                "runtime.current",
                "no tokio runtime is active on this thread",
            )
            .with_category(ErrorCategory::Configuration)
            .with_cause(err)
        })?;
        Ok(Self::new(handle, limits))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn limits(&self) -> IoLimits {
        self.limits
    }
}

/// 按配置构建共享工作线程池。
pub fn build_runtime(config: &RuntimeConfig) -> Result<Runtime> {
    let mut builder = Builder::new_multi_thread();
    builder.enable_all().thread_name(config.thread_name.clone());
    if let Some(threads) = config.worker_threads {
        builder.worker_threads(threads);
    }
    builder.build().map_err(|err| {
        CoreError::from_io(codes::RUNTIME_BUILD, "runtime.build", err)
            .with_category(ErrorCategory::Configuration)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_fails_outside_runtime() {
        let err = IoEnvironment::current(IoLimits::default()).unwrap_err();
        assert_eq!(err.code(), codes::RUNTIME_UNAVAILABLE);
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn built_runtime_provides_environment() {
        let runtime = build_runtime(&RuntimeConfig {
            worker_threads: Some(1),
            ..RuntimeConfig::default()
        })
        .unwrap();
        let limits = IoLimits {
            max_pending_timers: 3,
            max_outstanding_io: 7,
        };
        let env = runtime.block_on(async { IoEnvironment::current(limits) }).unwrap();
        assert_eq!(env.limits(), limits);
    }
}
