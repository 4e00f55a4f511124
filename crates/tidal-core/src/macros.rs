/// 不变量守卫：条件成立即视为共享原生资源状态已损坏。
///
/// 先以 `tracing::error!` 留下诊断，再 panic；发布构建使用 `panic = "abort"`，
/// 因此进程会立即终止而不是继续操作可能已被破坏的句柄或计数。
#[macro_export]
macro_rules! fatal_condition {
    ($cond:expr, $($arg:tt)+) => {
        if $cond {
            let diagnostic = ::std::format!($($arg)+);
            ::tracing::error!(target: "tidal::fatal", "{}", diagnostic);
            ::std::panic!("{}", diagnostic);
        }
    };
}
