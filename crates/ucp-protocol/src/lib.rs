//! # UCP Protocol
//!
//! 桥接板 UCP 协议与 ZDT 驱动板指令的编解码（无硬件依赖、无 IO）
//!
//! ## 模块
//!
//! - `constants`: 帧头、TLV 标签、状态码/错误码常量
//! - `opcode`: UCP 操作码
//! - `frame`: 外层帧（CRC16、TLV、流式解帧）
//! - `message`: 请求/响应报文
//! - `command`: 单轴直通指令参数（小端）
//! - `zdt`: ZDT 子指令体（大端，0x6B 结尾）
//! - `y42`: 多轴聚合帧
//! - `feedback`: 读取类响应解析
//! - `params`: 驱动参数 / 回零参数 / PID 等参数块
//! - `trajectory`: 轨迹点编码、抽稀、状态解析
//!
//! ## 字节序
//!
//! - 单轴直通 UCP args：小端（LE）
//! - Y42 聚合帧内的 ZDT 子指令：大端（BE）
//! - ZDT 原生读取响应：大端；标准化读取（0x60-0x69）：小端 float32

pub mod command;
pub mod constants;
pub mod feedback;
pub mod frame;
pub mod message;
pub mod opcode;
pub mod params;
pub mod trajectory;
pub mod y42;
pub mod zdt;

// 重新导出常用类型
pub use command::*;
pub use constants::*;
pub use feedback::*;
pub use frame::{FrameDecoder, FrameType, UcpFrame, crc16_ibm};
pub use message::{Request, Response};
pub use opcode::Opcode;
pub use params::*;
pub use trajectory::*;
pub use y42::*;
pub use zdt::*;

use thiserror::Error;

/// 协议编解码错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid payload length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// 长度字段与实际负载不一致（编码端逻辑错误，不可恢复）
    #[error("Frame length mismatch: declared {declared}, actual {actual}")]
    FrameLengthMismatch { declared: usize, actual: usize },

    #[error("Unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    #[error("Unknown ZDT sub-command: 0x{0:02X}")]
    UnknownSubCommand(u8),

    #[error("Value out of range for {field}: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: i64 },

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// 检查最小长度
pub(crate) fn require_len(data: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if data.len() < expected {
        return Err(ProtocolError::InvalidLength {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// 物理量按 0.1 分辨率量化（四舍五入）
///
/// 超出 `max` 时返回 `OutOfRange`。
pub fn scale_x10(value: f64, field: &'static str, max: u64) -> Result<u64, ProtocolError> {
    if !value.is_finite() {
        return Err(ProtocolError::OutOfRange { field, value });
    }
    let scaled = (value.abs() * 10.0).round();
    if scaled > max as f64 {
        return Err(ProtocolError::OutOfRange { field, value });
    }
    Ok(scaled as u64)
}

/// 大端字节序转 u16
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// 大端字节序转 u32
pub fn bytes_to_u32_be(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_x10_rounds_magnitude() {
        assert_eq!(scale_x10(45.04, "pos", u32::MAX as u64).unwrap(), 450);
        assert_eq!(scale_x10(-45.06, "pos", u32::MAX as u64).unwrap(), 451);
        assert_eq!(scale_x10(0.0, "pos", 10).unwrap(), 0);
    }

    #[test]
    fn test_scale_x10_out_of_range() {
        let err = scale_x10(7000.0, "speed", u16::MAX as u64).unwrap_err();
        assert!(matches!(err, ProtocolError::OutOfRange { field: "speed", .. }));

        let err = scale_x10(f64::NAN, "speed", u16::MAX as u64).unwrap_err();
        assert!(matches!(err, ProtocolError::OutOfRange { .. }));
    }

    #[test]
    fn test_require_len() {
        assert!(require_len(&[1, 2, 3], 3).is_ok());
        assert_eq!(
            require_len(&[1], 5),
            Err(ProtocolError::InvalidLength {
                expected: 5,
                actual: 1
            })
        );
    }

    #[test]
    fn test_byte_helpers() {
        assert_eq!(bytes_to_u16_be([0x12, 0x34]), 0x1234);
        assert_eq!(bytes_to_u32_be([0x00, 0x00, 0x57, 0xE4]), 22500);
        assert_eq!(bytes_to_u16_le([0x34, 0x12]), 0x1234);
    }

    #[test]
    fn test_error_display() {
        let e = ProtocolError::CrcMismatch {
            expected: 0x1234,
            actual: 0xABCD,
        };
        assert_eq!(e.to_string(), "CRC mismatch: expected 0x1234, got 0xABCD");

        let e = ProtocolError::FrameLengthMismatch {
            declared: 12,
            actual: 11,
        };
        assert!(e.to_string().contains("declared 12"));
    }
}
