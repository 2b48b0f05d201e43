//! 可观测性：tracing 订阅器只由二进制入口安装，库本身不设置全局状态

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装 fmt 日志层；默认 info，可通过 RUST_LOG 覆盖。重复安装时返回错误而不是 panic
pub fn init() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
}

/// 仅输出 warn 及以上，用于 stdio 工具服务器（stdout 留给协议）
pub fn init_quiet() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .try_init()
}
