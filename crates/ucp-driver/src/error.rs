//! 驱动层错误类型定义

use thiserror::Error;
use ucp_protocol::ProtocolError;
use ucp_serial::SerialError;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 串口链路错误
    #[error("Serial link error: {0}")]
    Serial(#[from] SerialError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 链路未打开（未 connect 或已 disconnect）
    #[error("Not connected: {port}")]
    NotConnected { port: String },

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DriverError {
    /// 链路层致命错误（需要重新打开串口）
    pub fn is_fatal(&self) -> bool {
        match self {
            DriverError::Serial(e) => e.is_fatal(),
            DriverError::NotConnected { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use ucp_protocol::ProtocolError;
    use ucp_serial::SerialError;

    /// 测试 DriverError 的 Display 实现
    #[test]
    fn test_driver_error_display() {
        let e = DriverError::Serial(SerialError::Timeout);
        assert_eq!(e.to_string(), "Serial link error: Read timeout");

        let e = DriverError::Protocol(ProtocolError::UnknownOpcode(0x99));
        assert!(e.to_string().contains("0x99"));

        let e = DriverError::NotConnected {
            port: "/dev/ttyACM0".into(),
        };
        assert_eq!(e.to_string(), "Not connected: /dev/ttyACM0");
    }

    /// 测试致命错误判定
    #[test]
    fn test_driver_error_fatal() {
        assert!(!DriverError::Serial(SerialError::Timeout).is_fatal());
        assert!(DriverError::Serial(SerialError::Closed).is_fatal());
        assert!(DriverError::NotConnected { port: "x".into() }.is_fatal());
        assert!(!DriverError::InvalidInput("bad".into()).is_fatal());
    }
}
