//! 控制层错误类型
//!
//! 每个错误都带轴号与操作名；来自设备的错误额外带原始 status / err_code。

use crate::config::ConfigError;
use crate::guard::LimitViolation;
use crate::trajectory::PlayerState;
use thiserror::Error;
use ucp_driver::{DriverError, ErrorClass, ResponseExt};
use ucp_protocol::{ProtocolError, Response};

/// 设备响应错误的公共上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub axis: u8,
    pub operation: &'static str,
    pub status: u8,
    pub err_code: u16,
    pub diag: Vec<u8>,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "axis {} {}: status={} err=0x{:04X}",
            self.axis, self.operation, self.status, self.err_code
        )
    }
}

/// 控制层错误
#[derive(Error, Debug)]
pub enum ControlError {
    /// 桥接板/驱动板超时（含本地合成的 3/0x4034）
    #[error("Timeout: {0}")]
    Timeout(Fault),

    #[error("CAN bus error: {0}")]
    BusError(Fault),

    #[error("Parameter error: {0}")]
    ParamError(Fault),

    /// 0x0101 / status 7
    #[error("Device busy: {0}")]
    DeviceBusy(Fault),

    #[error("Unsupported: {0}")]
    Unsupported(Fault),

    /// 其他设备错误（status 1 / 8 / 0xFF 等）
    #[error("Device error: {0}")]
    Device(Fault),

    /// 关节限位检查失败（未发送任何请求）
    #[error("Joint limit violation in {operation}: {}", format_violations(.violations))]
    LimitViolation {
        operation: &'static str,
        violations: Vec<LimitViolation>,
    },

    #[error("Not connected: axis {axis} {operation}")]
    NotConnected { axis: u8, operation: &'static str },

    /// 响应数据无法解析，或参数无法编码
    #[error("Decode error: axis {axis} {operation}: {source}")]
    DecodeError {
        axis: u8,
        operation: &'static str,
        #[source]
        source: ProtocolError,
    },

    /// 调用参数无法编码为指令（超出量程、非法轴号等）
    #[error("Invalid argument: axis {axis} {operation}: {source}")]
    InvalidArgument {
        axis: u8,
        operation: &'static str,
        #[source]
        source: ProtocolError,
    },

    /// 串口链路故障（不重试）
    #[error("Transport error: axis {axis} {operation}: {source}")]
    TransportFatal {
        axis: u8,
        operation: &'static str,
        #[source]
        source: DriverError,
    },

    /// 当前状态不允许该操作
    #[error("Invalid state for {operation}: {state}")]
    InvalidState {
        operation: &'static str,
        state: PlayerState,
    },

    /// 操作在批次之间被取消
    #[error("Cancelled: {operation}")]
    Cancelled { operation: &'static str },

    /// 配置文件读取或校验失败
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 旧版预加载 + 广播触发同步已禁用，多轴同步只走 Y42
    #[error("Unsupported sync mode: axis {axis} {operation} (use Y42 aggregation)")]
    UnsupportedSyncMode { axis: u8, operation: &'static str },
}

fn format_violations(violations: &[LimitViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ControlError {
    /// 按响应分类生成错误；成功响应返回 `None`
    pub fn from_response(axis: u8, operation: &'static str, resp: &Response) -> Option<Self> {
        let fault = Fault {
            axis,
            operation,
            status: resp.status,
            err_code: resp.err_code,
            diag: resp.diag.clone(),
        };
        Some(match resp.class() {
            ErrorClass::Ok => return None,
            ErrorClass::Timeout => ControlError::Timeout(fault),
            ErrorClass::DeviceBusy => ControlError::DeviceBusy(fault),
            ErrorClass::BusError => ControlError::BusError(fault),
            ErrorClass::ParamError => ControlError::ParamError(fault),
            ErrorClass::Unsupported => ControlError::Unsupported(fault),
            ErrorClass::Device => ControlError::Device(fault),
        })
    }

    /// 链路层错误转换
    pub fn from_driver(axis: u8, operation: &'static str, err: DriverError) -> Self {
        match err {
            DriverError::NotConnected { .. } => ControlError::NotConnected { axis, operation },
            DriverError::Protocol(source) => ControlError::DecodeError {
                axis,
                operation,
                source,
            },
            other => ControlError::TransportFatal {
                axis,
                operation,
                source: other,
            },
        }
    }

    pub fn decode(axis: u8, operation: &'static str, source: ProtocolError) -> Self {
        ControlError::DecodeError {
            axis,
            operation,
            source,
        }
    }

    pub fn invalid(axis: u8, operation: &'static str, source: ProtocolError) -> Self {
        ControlError::InvalidArgument {
            axis,
            operation,
            source,
        }
    }

    fn fault(&self) -> Option<&Fault> {
        match self {
            ControlError::Timeout(f)
            | ControlError::BusError(f)
            | ControlError::ParamError(f)
            | ControlError::DeviceBusy(f)
            | ControlError::Unsupported(f)
            | ControlError::Device(f) => Some(f),
            _ => None,
        }
    }

    /// 相关轴号（限位错误返回第一个越限轴）
    pub fn axis(&self) -> Option<u8> {
        match self {
            ControlError::LimitViolation { violations, .. } => violations.first().map(|v| v.axis),
            ControlError::NotConnected { axis, .. }
            | ControlError::DecodeError { axis, .. }
            | ControlError::InvalidArgument { axis, .. }
            | ControlError::TransportFatal { axis, .. }
            | ControlError::UnsupportedSyncMode { axis, .. } => Some(*axis),
            other => other.fault().map(|f| f.axis),
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            ControlError::LimitViolation { operation, .. }
            | ControlError::NotConnected { operation, .. }
            | ControlError::DecodeError { operation, .. }
            | ControlError::InvalidArgument { operation, .. }
            | ControlError::TransportFatal { operation, .. }
            | ControlError::UnsupportedSyncMode { operation, .. }
            | ControlError::InvalidState { operation, .. }
            | ControlError::Cancelled { operation } => operation,
            other => other.fault().map_or("", |f| f.operation),
        }
    }

    /// 设备返回的原始 status
    pub fn status(&self) -> Option<u8> {
        self.fault().map(|f| f.status)
    }

    pub fn err_code(&self) -> Option<u16> {
        self.fault().map(|f| f.err_code)
    }

    /// 是否值得由调用方重试（超时 / 设备忙 / 总线错误）
    pub fn is_recoverable(&self) -> bool {
        self.fault()
            .is_some_and(|f| ucp_driver::classify::is_recoverable(f.status, f.err_code))
    }

    /// 本地合成的应答超时（3 / 0x4034）
    pub fn is_ack_timeout(&self) -> bool {
        self.fault().is_some_and(|f| {
            f.status == ucp_protocol::STATUS_CAN_TIMEOUT
                && f.err_code == ucp_protocol::ERR_ACK_TIMEOUT
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试响应到错误的分类
    #[test]
    fn test_from_response_classes() {
        assert!(ControlError::from_response(1, "op", &Response::ok(vec![])).is_none());

        let e = ControlError::from_response(2, "get_position", &Response::ack_timeout()).unwrap();
        assert!(matches!(e, ControlError::Timeout(_)));
        assert!(e.is_ack_timeout());
        assert!(e.is_recoverable());
        assert_eq!(e.axis(), Some(2));
        assert_eq!(e.operation(), "get_position");
        assert_eq!(e.status(), Some(3));
        assert_eq!(e.err_code(), Some(0x4034));

        let e = ControlError::from_response(1, "op", &Response::error(4, 0x0101)).unwrap();
        assert!(matches!(e, ControlError::DeviceBusy(_)));

        let e = ControlError::from_response(1, "op", &Response::error(5, 0)).unwrap();
        assert!(matches!(e, ControlError::ParamError(_)));
        assert!(!e.is_recoverable());

        let e = ControlError::from_response(1, "op", &Response::error(0xFF, 0)).unwrap();
        assert!(matches!(e, ControlError::Device(_)));
    }

    /// 测试链路错误转换
    #[test]
    fn test_from_driver() {
        let e = ControlError::from_driver(
            3,
            "stop",
            DriverError::NotConnected {
                port: "/dev/ttyACM0".into(),
            },
        );
        assert!(matches!(e, ControlError::NotConnected { axis: 3, .. }));

        let e = ControlError::from_driver(3, "stop", DriverError::Serial(ucp_serial::SerialError::Closed));
        assert!(matches!(e, ControlError::TransportFatal { .. }));
        assert_eq!(e.status(), None);
        assert!(!e.is_recoverable());
    }

    /// 测试 Display
    #[test]
    fn test_display() {
        let e = ControlError::from_response(4, "set_speed", &Response::error(6, 0x7005)).unwrap();
        assert_eq!(e.to_string(), "Unsupported: axis 4 set_speed: status=6 err=0x7005");

        let e = ControlError::UnsupportedSyncMode {
            axis: 1,
            operation: "sync_motion",
        };
        assert!(e.to_string().contains("Y42"));
    }
}
