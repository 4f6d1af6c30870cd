//! # UCP Serial Link Layer
//!
//! 串口字节流抽象。桥接板通过 USB-CDC / UART 与主机通信，
//! 本层只负责字节收发与设备错误分类，不理解 UCP 帧语义。
//!
//! - [`SerialLink`]：统一的半双工字节链路接口
//! - [`SerialPortLink`]：基于 `serialport` 的真实串口后端（`native-backend` feature）
//! - [`MockLink`]：按脚本回复响应帧的模拟链路（`mock` feature 或单元测试）

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "native-backend")]
pub mod port;

#[cfg(feature = "native-backend")]
pub use port::{PortInfo, SerialPortLink, available_ports};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockHandle, MockLink, MockReply};

/// 默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// 串口层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] SerialDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Link closed")]
    Closed,
}

impl SerialError {
    /// 是否为致命错误（链路需要重新打开）
    pub fn is_fatal(&self) -> bool {
        match self {
            SerialError::Device(e) => e.is_fatal(),
            SerialError::Closed => true,
            SerialError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::NotFound
            ),
            SerialError::Timeout => false,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    InvalidConfig,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct SerialDeviceError {
    pub kind: SerialDeviceErrorKind,
    pub message: String,
}

impl SerialDeviceError {
    pub fn new(kind: SerialDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            SerialDeviceErrorKind::NoDevice
                | SerialDeviceErrorKind::AccessDenied
                | SerialDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for SerialDeviceError {
    fn from(message: String) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for SerialDeviceError {
    fn from(message: &str) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

/// 半双工字节链路
///
/// 同一时刻只允许一个请求在途，由上层（`UcpClient`）加锁保证。
pub trait SerialLink: Send {
    /// 写入全部字节并 flush
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError>;

    /// 阻塞读取，最长等待当前读超时；无数据时返回 `SerialError::Timeout`
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;

    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), SerialError> {
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SerialError> {
        self.set_read_timeout(timeout)?;
        self.read(buf)
    }

    /// 非阻塞读取：无数据返回 `Ok(None)`
    fn try_read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, SerialError> {
        match self.read_timeout(buf, Duration::ZERO) {
            Ok(n) => Ok(Some(n)),
            Err(SerialError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 接收缓冲区中待读字节数
    fn bytes_available(&mut self) -> Result<usize, SerialError> {
        Ok(0)
    }

    /// 丢弃接收缓冲区中的残留字节，返回丢弃数量
    fn clear_input(&mut self) -> Result<usize, SerialError> {
        let mut dropped = 0usize;
        let mut scratch = [0u8; 256];
        loop {
            let pending = self.bytes_available()?;
            if pending == 0 {
                return Ok(dropped);
            }
            match self.try_read(&mut scratch[..pending.min(256)])? {
                Some(0) | None => return Ok(dropped),
                Some(n) => dropped += n,
            }
        }
    }

    /// 链路名称（用于日志）
    fn name(&self) -> &str {
        "serial"
    }
}

impl<T: SerialLink + ?Sized> SerialLink for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        (**self).write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        (**self).read(buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        (**self).set_read_timeout(timeout)
    }

    fn bytes_available(&mut self) -> Result<usize, SerialError> {
        (**self).bytes_available()
    }

    fn clear_input(&mut self) -> Result<usize, SerialError> {
        (**self).clear_input()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_fatal_kinds() {
        assert!(SerialDeviceError::new(SerialDeviceErrorKind::NoDevice, "gone").is_fatal());
        assert!(SerialDeviceError::new(SerialDeviceErrorKind::AccessDenied, "perm").is_fatal());
        assert!(!SerialDeviceError::new(SerialDeviceErrorKind::Busy, "busy").is_fatal());
        assert!(!SerialDeviceError::from("x").is_fatal());
    }

    #[test]
    fn test_serial_error_fatal() {
        assert!(!SerialError::Timeout.is_fatal());
        assert!(SerialError::Closed.is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged");
        assert!(SerialError::from(io).is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr");
        assert!(!SerialError::from(io).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let e = SerialError::Device(SerialDeviceError::new(
            SerialDeviceErrorKind::NotFound,
            "/dev/ttyACM9",
        ));
        assert_eq!(e.to_string(), "Device Error: NotFound: /dev/ttyACM9");
    }
}
