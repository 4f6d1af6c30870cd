//! 日志初始化
//!
//! `RUST_LOG` 控制过滤级别，未设置时为 `info`。依赖 `log` 宏的第三方库
//! 通过 `tracing-log` 桥接到同一个 subscriber。

use thiserror::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("log bridge already installed: {0}")]
    Log(#[from] log::SetLoggerError),
    #[error("global tracing subscriber already set: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// 安装全局 subscriber，重复调用返回错误
pub fn try_init_logger() -> Result<(), LoggerError> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

/// 安装全局 subscriber；已安装时静默忽略
pub fn init_logger() {
    if let Err(e) = try_init_logger() {
        tracing::debug!(error = %e, "logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 第二次初始化报错，`init_logger` 不会 panic
    #[test]
    fn test_init_twice() {
        init_logger();
        assert!(try_init_logger().is_err());
        init_logger();
        log::info!("bridged through tracing-log");
    }
}
