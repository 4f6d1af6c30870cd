//! 驱动层模块
//!
//! 本模块提供桥接板 UCP 链路的请求/响应交换，包括：
//! - 单连接半双工交换（写请求 → 按 seq 匹配响应 → 超时合成 0x4034）
//! - 按 `(串口, 波特率)` 共享的引用计数连接池
//! - 响应分类、读取重试与错误日志去重
//!
//! # 使用场景
//!
//! 适用于需要直接收发 UCP 请求的场景（调试工具、原始指令通道）。
//! 大多数用户应该使用 `ucp-client` 提供的 `DriveUnit` 等高级接口。

mod builder;
pub mod classify;
mod client;
mod error;
pub mod pool;

pub use builder::{UcpClientBuilder, detect_port};
pub use classify::{ErrorClass, ErrorLogGate, ErrorSignature, ResponseExt, RetryPolicy};
pub use client::{
    ClientStats, DEFAULT_TIMEOUT_MS, LinkOpener, RequestOptions, UcpClient, default_opener,
};
pub use error::DriverError;
pub use pool::{ClientFactory, ConnectionKey, ConnectionPool, PoolEntryInfo, SharedClient};
