//! 读取类响应解析
//!
//! ZDT 原生读取（0x20-0x2F）的 data 字段为驱动板原始字节（大端）；
//! 标准化读取（0x60-0x69）由桥接板统一换算为 float32 / uint32 小端。
//!
//! 所有解析函数对过短或无法识别的数据返回 `ProtocolError`，不会 panic。

use crate::ProtocolError;
use crate::opcode::Opcode;
use crate::require_len;
use bilge::prelude::*;

// ============================================================================
// 原生读取（ZDT，大端）
// ============================================================================

/// 位置：`sign(u8) | pos×10(u32 BE)`，单位度（电机端）
///
/// sign=1 表示负值。
pub fn parse_position(data: &[u8]) -> Result<f64, ProtocolError> {
    require_len(data, 5)?;
    let raw = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    Ok(apply_sign(data[0], raw as f64 / 10.0))
}

/// 速度：`sign(u8) | rpm×10(u16 BE)`
pub fn parse_speed(data: &[u8]) -> Result<f64, ProtocolError> {
    require_len(data, 3)?;
    let raw = u16::from_be_bytes([data[1], data[2]]);
    Ok(apply_sign(data[0], raw as f64 / 10.0))
}

/// 温度：`sign(u8) | °C(u8)`
pub fn parse_temperature(data: &[u8]) -> Result<f64, ProtocolError> {
    require_len(data, 2)?;
    Ok(apply_sign(data[0], data[1] as f64))
}

/// 电压：`mV(u16 BE)` → V
pub fn parse_voltage(data: &[u8]) -> Result<f64, ProtocolError> {
    require_len(data, 2)?;
    Ok(u16::from_be_bytes([data[0], data[1]]) as f64 / 1000.0)
}

/// 电流：`mA(u16 BE)` → A
pub fn parse_current(data: &[u8]) -> Result<f64, ProtocolError> {
    require_len(data, 2)?;
    Ok(u16::from_be_bytes([data[0], data[1]]) as f64 / 1000.0)
}

/// 编码器值（u16 LE，桥接板已转换）
pub fn parse_encoder(data: &[u8]) -> Result<u16, ProtocolError> {
    require_len(data, 2)?;
    Ok(u16::from_le_bytes([data[0], data[1]]))
}

/// 脉冲计数（i32 LE，桥接板已转换）
pub fn parse_pulse_count(data: &[u8]) -> Result<i32, ProtocolError> {
    require_len(data, 4)?;
    Ok(i32::from_le_bytes([data[0], data[1], data[2], data[3]]))
}

fn apply_sign(sign: u8, magnitude: f64) -> f64 {
    if sign == 1 { -magnitude } else { magnitude }
}

/// 电机状态标志位（0x23，1 字节）
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct MotorStatusFlags {
    pub enabled: bool,          // Bit 0: 使能
    pub in_position: bool,      // Bit 1: 到位
    pub stall_detected: bool,   // Bit 2: 检测到堵转
    pub stall_protection: bool, // Bit 3: 堵转保护已触发
    pub reserved: u4,
}

impl MotorStatusFlags {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        require_len(data, 1)?;
        Ok(Self::from(u8::new(data[0])))
    }
}

/// 回零状态标志位（0x24，1 字节）
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct HomingStatusFlags {
    pub encoder_ready: bool,      // Bit 0
    pub encoder_calibrated: bool, // Bit 1
    pub homing_in_progress: bool, // Bit 2
    pub homing_failed: bool,      // Bit 3
    pub reserved: u3,             // Bit 4-6
    pub high_precision: bool,     // Bit 7
}

impl HomingStatusFlags {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        require_len(data, 1)?;
        Ok(Self::from(u8::new(data[0])))
    }
}

/// 固件/硬件版本（0x2F）：`fw(u16 BE) | hw(u16 BE)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FirmwareVersion {
    pub firmware_raw: u16,
    pub hardware_raw: u16,
}

impl FirmwareVersion {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        require_len(data, 4)?;
        Ok(Self {
            firmware_raw: u16::from_be_bytes([data[0], data[1]]),
            hardware_raw: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    /// 例：`132` → `"V1.3.2"`
    pub fn firmware(&self) -> String {
        let fw = self.firmware_raw;
        format!("V{}.{}.{}", fw / 100, (fw % 100) / 10, fw % 10)
    }

    /// 例：`120` → `"V1.2"`
    pub fn hardware(&self) -> String {
        let hw = self.hardware_raw;
        format!("V{}.{}", hw / 100, (hw % 100) / 10)
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fw {} / hw {}", self.firmware(), self.hardware())
    }
}

// ============================================================================
// 标准化读取（float32 / uint32 小端）
// ============================================================================

/// 标准化浮点读取的物理量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardQuantity {
    /// 度
    Position,
    /// RPM
    Speed,
    /// °C
    Temperature,
    /// V
    Voltage,
    /// A
    Current,
    /// A
    PhaseCurrent,
    /// 度
    PositionError,
    /// 度
    TargetPosition,
}

impl StandardQuantity {
    pub const ALL: [StandardQuantity; 8] = [
        Self::Position,
        Self::Speed,
        Self::Temperature,
        Self::Voltage,
        Self::Current,
        Self::PhaseCurrent,
        Self::PositionError,
        Self::TargetPosition,
    ];

    pub fn opcode(self) -> Opcode {
        match self {
            Self::Position => Opcode::ReadPositionStd,
            Self::Speed => Opcode::ReadSpeedStd,
            Self::Temperature => Opcode::ReadTemperatureStd,
            Self::Voltage => Opcode::ReadVoltageStd,
            Self::Current => Opcode::ReadCurrentStd,
            Self::PhaseCurrent => Opcode::ReadPhaseCurrentStd,
            Self::PositionError => Opcode::ReadPositionErrorStd,
            Self::TargetPosition => Opcode::ReadTargetPositionStd,
        }
    }
}

/// 解析标准化 float32
///
/// 固件用 NaN 表示换算失败，此时返回 `Ok(None)`。
pub fn parse_standard_f32(data: &[u8]) -> Result<Option<f32>, ProtocolError> {
    require_len(data, 4)?;
    let value = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    Ok(if value.is_nan() { None } else { Some(value) })
}

/// 标准化状态标志位（0x69，u32 LE）
#[bitsize(32)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct StandardStatusFlags {
    pub motor_enabled: bool,      // Bit 0
    pub in_position: bool,        // Bit 1
    pub stall_detected: bool,     // Bit 2
    pub stall_protection: bool,   // Bit 3
    pub homing_in_progress: bool, // Bit 4
    pub homing_complete: bool,    // Bit 5
    pub homing_failed: bool,      // Bit 6
    pub encoder_ready: bool,      // Bit 7
    pub encoder_calibrated: bool, // Bit 8
    pub error_state: bool,        // Bit 9
    pub reserved: u22,
}

impl StandardStatusFlags {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        require_len(data, 4)?;
        let raw = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        Ok(Self::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position_sign() {
        // 22500 → 2250.0°
        let data = [0x00, 0x00, 0x00, 0x57, 0xE4];
        assert_eq!(parse_position(&data).unwrap(), 2250.0);
        let data = [0x01, 0x00, 0x00, 0x57, 0xE4];
        assert_eq!(parse_position(&data).unwrap(), -2250.0);
    }

    #[test]
    fn test_parse_short_payloads_fail() {
        assert!(parse_position(&[0, 1, 2]).is_err());
        assert!(parse_speed(&[0]).is_err());
        assert!(parse_temperature(&[]).is_err());
        assert!(parse_voltage(&[1]).is_err());
        assert!(FirmwareVersion::parse(&[1, 2, 3]).is_err());
        assert!(MotorStatusFlags::parse(&[]).is_err());
        assert!(parse_standard_f32(&[0, 0]).is_err());
    }

    #[test]
    fn test_parse_speed_and_units() {
        assert_eq!(parse_speed(&[0x01, 0x01, 0xF4]).unwrap(), -50.0);
        assert_eq!(parse_temperature(&[0x00, 38]).unwrap(), 38.0);
        assert_eq!(parse_voltage(&[0x5D, 0xC0]).unwrap(), 24.0);
        assert_eq!(parse_current(&[0x03, 0xE8]).unwrap(), 1.0);
        assert_eq!(parse_encoder(&[0x34, 0x12]).unwrap(), 0x1234);
        assert_eq!(parse_pulse_count(&(-5i32).to_le_bytes()).unwrap(), -5);
    }

    #[test]
    fn test_motor_status_flags() {
        let flags = MotorStatusFlags::parse(&[0b0000_0011]).unwrap();
        assert!(flags.enabled());
        assert!(flags.in_position());
        assert!(!flags.stall_detected());
        assert!(!flags.stall_protection());
    }

    #[test]
    fn test_homing_status_flags() {
        let flags = HomingStatusFlags::parse(&[0x80 | 0x04 | 0x01]).unwrap();
        assert!(flags.encoder_ready());
        assert!(!flags.encoder_calibrated());
        assert!(flags.homing_in_progress());
        assert!(!flags.homing_failed());
        assert!(flags.high_precision());
    }

    #[test]
    fn test_version_format() {
        let v = FirmwareVersion::parse(&[0x00, 0x84, 0x00, 0x78]).unwrap();
        assert_eq!(v.firmware_raw, 132);
        assert_eq!(v.firmware(), "V1.3.2");
        assert_eq!(v.hardware(), "V1.2");
    }

    #[test]
    fn test_standard_f32_nan_is_none() {
        assert_eq!(
            parse_standard_f32(&12.5f32.to_le_bytes()).unwrap(),
            Some(12.5)
        );
        assert_eq!(parse_standard_f32(&f32::NAN.to_le_bytes()).unwrap(), None);
    }

    #[test]
    fn test_standard_flags() {
        let raw: u32 = (1 << 0) | (1 << 5) | (1 << 9);
        let flags = StandardStatusFlags::parse(&raw.to_le_bytes()).unwrap();
        assert!(flags.motor_enabled());
        assert!(flags.homing_complete());
        assert!(flags.error_state());
        assert!(!flags.in_position());
        assert!(!flags.encoder_calibrated());
    }

    #[test]
    fn test_standard_quantity_opcodes() {
        assert_eq!(StandardQuantity::Position.opcode().code(), 0x60);
        assert_eq!(StandardQuantity::TargetPosition.opcode().code(), 0x67);
    }
}
