//! 响应分类、重试策略与错误日志去重
//!
//! 桥接板在高频轮询下会偶发 CAN 超时 / 设备忙，这类错误可恢复，
//! 读取类操作静默重试；其余错误直接上抛。
//!
//! 重试集合（[`is_recoverable`]）比分类更窄：status 2 虽归为 `Timeout`、
//! status 7 虽归为 `DeviceBusy`，但不在重试之列。

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::time::Duration;
use ucp_protocol::{
    ERR_ACK_TIMEOUT, ERR_DEVICE_BUSY, Response, STATUS_BUSY, STATUS_CAN_ERROR,
    STATUS_CAN_TIMEOUT, STATUS_OK, STATUS_PARAM_ERROR, STATUS_TIMEOUT, STATUS_UNSUPPORTED,
};

/// 响应分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Ok,
    /// status 2/3，或本地等待超时（3/0x4034）
    Timeout,
    /// 0x0101 / status 7
    DeviceBusy,
    /// status 4（CAN 总线错误）
    BusError,
    /// status 5
    ParamError,
    /// status 6
    Unsupported,
    /// status 1 / 8 / 0xFF 及其他
    Device,
}

/// 按 (status, err_code) 分类
pub fn classify(status: u8, err_code: u16) -> ErrorClass {
    match status {
        STATUS_OK => ErrorClass::Ok,
        STATUS_CAN_TIMEOUT if err_code == ERR_ACK_TIMEOUT => ErrorClass::Timeout,
        STATUS_TIMEOUT | STATUS_CAN_TIMEOUT => ErrorClass::Timeout,
        STATUS_BUSY => ErrorClass::DeviceBusy,
        _ if err_code == ERR_DEVICE_BUSY => ErrorClass::DeviceBusy,
        STATUS_CAN_ERROR => ErrorClass::BusError,
        STATUS_PARAM_ERROR => ErrorClass::ParamError,
        STATUS_UNSUPPORTED => ErrorClass::Unsupported,
        _ => ErrorClass::Device,
    }
}

/// 可恢复：status ∈ {3, 4} 或 err ∈ {0x0101, 0x4034}
///
/// 与 [`classify`] 不一一对应：status 2（`Timeout`）与 status 7（`DeviceBusy`）
/// 在错误码不是 0x0101 / 0x4034 时不可恢复。
pub fn is_recoverable(status: u8, err_code: u16) -> bool {
    matches!(status, STATUS_CAN_TIMEOUT | STATUS_CAN_ERROR)
        || matches!(err_code, ERR_DEVICE_BUSY | ERR_ACK_TIMEOUT)
}

/// 响应上的分类便捷方法
pub trait ResponseExt {
    fn class(&self) -> ErrorClass;
    fn is_recoverable(&self) -> bool;
    fn diag_hex(&self) -> String;
}

impl ResponseExt for Response {
    fn class(&self) -> ErrorClass {
        classify(self.status, self.err_code)
    }

    fn is_recoverable(&self) -> bool {
        self.status != STATUS_OK && is_recoverable(self.status, self.err_code)
    }

    fn diag_hex(&self) -> String {
        hex::encode(&self.diag)
    }
}

/// 错误签名：(status, err_code, diag)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSignature {
    pub status: u8,
    pub err_code: u16,
    /// 桥接板诊断字节通常不超过 16 字节
    pub diag: SmallVec<[u8; 16]>,
}

impl ErrorSignature {
    pub fn of(resp: &Response) -> Self {
        Self {
            status: resp.status,
            err_code: resp.err_code,
            diag: SmallVec::from_slice(&resp.diag),
        }
    }
}

/// 错误日志去重
///
/// 与上一条签名相同则不再输出；成功响应重置。
/// `CAN_ERROR + 0x0101`（设备忙）属于高频轮询噪声，从不输出。
#[derive(Debug, Default)]
pub struct ErrorLogGate {
    last: Mutex<Option<ErrorSignature>>,
}

impl ErrorLogGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回该响应是否应输出错误日志
    pub fn should_log(&self, resp: &Response) -> bool {
        if resp.is_ok() {
            self.reset();
            return false;
        }
        if resp.status == STATUS_CAN_ERROR && resp.err_code == ERR_DEVICE_BUSY {
            return false;
        }
        let sig = ErrorSignature::of(resp);
        let mut last = self.last.lock();
        if last.as_ref() == Some(&sig) {
            return false;
        }
        *last = Some(sig);
        true
    }

    pub fn reset(&self) {
        *self.last.lock() = None;
    }
}

/// 读取类重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// 单次尝试的请求超时（毫秒）
    pub timeout_ms: u16,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(30),
            timeout_ms: 300,
        }
    }
}

impl RetryPolicy {
    /// 不重试
    pub fn once(timeout_ms: u16) -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            timeout_ms,
        }
    }

    /// 执行带重试的请求
    ///
    /// 闭包参数为 `is_last_attempt`（用于只在最后一次输出错误日志）。
    /// 仅对可恢复响应重试；闭包返回的错误立即上抛。
    pub fn run<E, F>(&self, mut attempt: F) -> Result<Response, E>
    where
        F: FnMut(bool) -> Result<Response, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut n = 1;
        loop {
            let last = n >= attempts;
            let resp = attempt(last)?;
            if resp.is_ok() || last || !resp.is_recoverable() {
                return Ok(resp);
            }
            tracing::trace!(
                attempt = n,
                status = resp.status,
                err_code = resp.err_code,
                "recoverable response, retrying"
            );
            if !self.delay.is_zero() {
                spin_sleep::sleep(self.delay);
            }
            n += 1;
        }
    }
}
