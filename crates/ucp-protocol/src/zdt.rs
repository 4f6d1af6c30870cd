//! ZDT 驱动板子指令体
//!
//! 子指令在 Y42 聚合帧内使用，全部为大端字节序，以 `0x6B` 结尾。
//! 角度/速度按 0.1 单位量化，方向由符号给出（负数 → dir=1）。

use crate::constants::*;
use crate::{ProtocolError, bytes_to_u16_be, bytes_to_u32_be, require_len, scale_x10};
use smallvec::SmallVec;

/// 子指令体（最长 15 字节，栈上存储）
pub type ZdtBody = SmallVec<[u8; 16]>;

pub const POSITION_DIRECT_BODY_LEN: usize = 11;
pub const POSITION_TRAPEZOID_BODY_LEN: usize = 15;
pub const SPEED_BODY_LEN: usize = 8;
pub const ENABLE_BODY_LEN: usize = 4;
pub const HOMING_BODY_LEN: usize = 4;

/// 直通位置指令参数
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionDirect {
    /// 电机端角度（度）
    pub angle_deg: f64,
    /// 转速（RPM）
    pub speed_rpm: f64,
    pub absolute: bool,
}

/// 梯形曲线位置指令参数
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionTrapezoid {
    pub angle_deg: f64,
    pub max_speed_rpm: f64,
    pub accel: u16,
    pub decel: u16,
    pub absolute: bool,
}

/// 速度模式参数
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpeedCommand {
    pub speed_rpm: f64,
    pub accel: u16,
}

fn direction_of(value: f64) -> u8 {
    if value < 0.0 { 1 } else { 0 }
}

fn signed(dir: u8, magnitude_x10: u64) -> f64 {
    let v = magnitude_x10 as f64 / 10.0;
    if dir == 1 { -v } else { v }
}

/// 整数参数钳位到 u16
pub fn clamp_u16(value: i64) -> u16 {
    value.clamp(0, u16::MAX as i64) as u16
}

fn check_frame(body: &[u8], fn_code: u8, len: usize) -> Result<(), ProtocolError> {
    require_len(body, len)?;
    if body[0] != fn_code {
        return Err(ProtocolError::UnknownSubCommand(body[0]));
    }
    if body[len - 1] != ZDT_TRAILER {
        return Err(ProtocolError::ParseError(format!(
            "missing 0x6B trailer for sub-command 0x{:02X}",
            fn_code
        )));
    }
    Ok(())
}

/// `FB dir spd×10(u16) pos×10(u32) abs sync 6B`
pub fn encode_position_direct(
    angle_deg: f64,
    speed_rpm: f64,
    absolute: bool,
) -> Result<ZdtBody, ProtocolError> {
    let pos = scale_x10(angle_deg, "position", u32::MAX as u64)? as u32;
    let spd = scale_x10(speed_rpm, "speed", u16::MAX as u64)? as u16;
    let mut body = ZdtBody::new();
    body.push(ZDT_FN_POSITION_DIRECT);
    body.push(direction_of(angle_deg));
    body.extend_from_slice(&spd.to_be_bytes());
    body.extend_from_slice(&pos.to_be_bytes());
    body.push(absolute as u8);
    body.push(0);
    body.push(ZDT_TRAILER);
    Ok(body)
}

pub fn decode_position_direct(body: &[u8]) -> Result<PositionDirect, ProtocolError> {
    check_frame(body, ZDT_FN_POSITION_DIRECT, POSITION_DIRECT_BODY_LEN)?;
    let spd = bytes_to_u16_be([body[2], body[3]]);
    let pos = bytes_to_u32_be([body[4], body[5], body[6], body[7]]);
    Ok(PositionDirect {
        angle_deg: signed(body[1], pos as u64),
        speed_rpm: spd as f64 / 10.0,
        absolute: body[8] != 0,
    })
}

/// `FD dir acc(u16) dec(u16) spd×10(u16) pos×10(u32) abs sync 6B`
///
/// 加/减速度钳位到 `[0, 65535]`。
pub fn encode_position_trapezoid(
    angle_deg: f64,
    max_speed_rpm: f64,
    accel: i64,
    decel: i64,
    absolute: bool,
) -> Result<ZdtBody, ProtocolError> {
    let pos = scale_x10(angle_deg, "position", u32::MAX as u64)? as u32;
    let spd = scale_x10(max_speed_rpm, "max_speed", u16::MAX as u64)? as u16;
    let mut body = ZdtBody::new();
    body.push(ZDT_FN_POSITION_TRAPEZOID);
    body.push(direction_of(angle_deg));
    body.extend_from_slice(&clamp_u16(accel).to_be_bytes());
    body.extend_from_slice(&clamp_u16(decel).to_be_bytes());
    body.extend_from_slice(&spd.to_be_bytes());
    body.extend_from_slice(&pos.to_be_bytes());
    body.push(absolute as u8);
    body.push(0);
    body.push(ZDT_TRAILER);
    Ok(body)
}

pub fn decode_position_trapezoid(body: &[u8]) -> Result<PositionTrapezoid, ProtocolError> {
    check_frame(body, ZDT_FN_POSITION_TRAPEZOID, POSITION_TRAPEZOID_BODY_LEN)?;
    let pos = bytes_to_u32_be([body[8], body[9], body[10], body[11]]);
    Ok(PositionTrapezoid {
        angle_deg: signed(body[1], pos as u64),
        accel: bytes_to_u16_be([body[2], body[3]]),
        decel: bytes_to_u16_be([body[4], body[5]]),
        max_speed_rpm: bytes_to_u16_be([body[6], body[7]]) as f64 / 10.0,
        absolute: body[12] != 0,
    })
}

/// `F6 dir acc(u16) spd×10(u16) sync 6B`（注意加速度在前）
pub fn encode_speed(speed_rpm: f64, accel: i64) -> Result<ZdtBody, ProtocolError> {
    let spd = scale_x10(speed_rpm, "speed", u16::MAX as u64)? as u16;
    let mut body = ZdtBody::new();
    body.push(ZDT_FN_SPEED);
    body.push(direction_of(speed_rpm));
    body.extend_from_slice(&clamp_u16(accel).to_be_bytes());
    body.extend_from_slice(&spd.to_be_bytes());
    body.push(0);
    body.push(ZDT_TRAILER);
    Ok(body)
}

pub fn decode_speed(body: &[u8]) -> Result<SpeedCommand, ProtocolError> {
    check_frame(body, ZDT_FN_SPEED, SPEED_BODY_LEN)?;
    let spd = bytes_to_u16_be([body[4], body[5]]);
    Ok(SpeedCommand {
        speed_rpm: signed(body[1], spd as u64),
        accel: bytes_to_u16_be([body[2], body[3]]),
    })
}

/// `9A mode sync 6B`
pub fn encode_homing(mode: u8) -> ZdtBody {
    let mut body = ZdtBody::new();
    body.extend_from_slice(&[ZDT_FN_HOMING, mode, 0, ZDT_TRAILER]);
    body
}

/// `F3 enabled sync 6B`
pub fn encode_enable(enabled: bool) -> ZdtBody {
    let mut body = ZdtBody::new();
    body.extend_from_slice(&[ZDT_FN_ENABLE, enabled as u8, 0, ZDT_TRAILER]);
    body
}

/// 已解析的子指令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZdtCommand {
    PositionDirect(PositionDirect),
    PositionTrapezoid(PositionTrapezoid),
    Speed(SpeedCommand),
    Enable { enabled: bool },
    Homing { mode: u8 },
}

impl ZdtCommand {
    /// 由功能码得到子指令体长度
    pub fn body_len(fn_code: u8) -> Option<usize> {
        match fn_code {
            ZDT_FN_POSITION_DIRECT => Some(POSITION_DIRECT_BODY_LEN),
            ZDT_FN_POSITION_TRAPEZOID => Some(POSITION_TRAPEZOID_BODY_LEN),
            ZDT_FN_SPEED => Some(SPEED_BODY_LEN),
            ZDT_FN_ENABLE => Some(ENABLE_BODY_LEN),
            ZDT_FN_HOMING => Some(HOMING_BODY_LEN),
            _ => None,
        }
    }

    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let fn_code = *body.first().ok_or(ProtocolError::InvalidLength {
            expected: 1,
            actual: 0,
        })?;
        match fn_code {
            ZDT_FN_POSITION_DIRECT => decode_position_direct(body).map(Self::PositionDirect),
            ZDT_FN_POSITION_TRAPEZOID => {
                decode_position_trapezoid(body).map(Self::PositionTrapezoid)
            },
            ZDT_FN_SPEED => decode_speed(body).map(Self::Speed),
            ZDT_FN_ENABLE => {
                check_frame(body, ZDT_FN_ENABLE, ENABLE_BODY_LEN)?;
                Ok(Self::Enable {
                    enabled: body[1] != 0,
                })
            },
            ZDT_FN_HOMING => {
                check_frame(body, ZDT_FN_HOMING, HOMING_BODY_LEN)?;
                Ok(Self::Homing { mode: body[1] })
            },
            other => Err(ProtocolError::UnknownSubCommand(other)),
        }
    }

    /// 位置类指令的目标电机端角度
    pub fn target_angle(&self) -> Option<f64> {
        match self {
            Self::PositionDirect(p) => Some(p.angle_deg),
            Self::PositionTrapezoid(p) => Some(p.angle_deg),
            _ => None,
        }
    }

    /// 指令类别（同一 Y42 帧内只允许一种）
    pub fn kind(&self) -> ZdtCommandKind {
        match self {
            Self::PositionDirect(_) | Self::PositionTrapezoid(_) => ZdtCommandKind::Position,
            Self::Speed(_) => ZdtCommandKind::Speed,
            Self::Enable { .. } => ZdtCommandKind::Enable,
            Self::Homing { .. } => ZdtCommandKind::Homing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZdtCommandKind {
    Position,
    Speed,
    Enable,
    Homing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_position_direct_layout() {
        // 45° × 50 减速比 = 2250° 电机端，500 RPM
        let body = encode_position_direct(2250.0, 500.0, true).unwrap();
        assert_eq!(
            body.as_slice(),
            &[0xFB, 0x00, 0x13, 0x88, 0x00, 0x00, 0x57, 0xE4, 0x01, 0x00, 0x6B]
        );
    }

    #[test]
    fn test_position_direct_negative_sets_direction() {
        let body = encode_position_direct(-12.3, 100.0, false).unwrap();
        assert_eq!(body[1], 1);
        assert_eq!(&body[4..8], &123u32.to_be_bytes());
        assert_eq!(body[8], 0);
    }

    #[test]
    fn test_trapezoid_clamps_accel_decel() {
        let body = encode_position_trapezoid(10.0, 200.0, 70_000, -5, true).unwrap();
        assert_eq!(body.len(), POSITION_TRAPEZOID_BODY_LEN);
        assert_eq!(&body[2..4], &[0xFF, 0xFF]);
        assert_eq!(&body[4..6], &[0x00, 0x00]);
        assert_eq!(&body[6..8], &2000u16.to_be_bytes());
        assert_eq!(*body.last().unwrap(), ZDT_TRAILER);

        let decoded = decode_position_trapezoid(&body).unwrap();
        assert_eq!(decoded.accel, u16::MAX);
        assert_eq!(decoded.decel, 0);
        assert!((decoded.angle_deg - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_speed_layout_accel_first() {
        let body = encode_speed(-30.0, 1000).unwrap();
        assert_eq!(
            body.as_slice(),
            &[0xF6, 0x01, 0x03, 0xE8, 0x01, 0x2C, 0x00, 0x6B]
        );
        let decoded = decode_speed(&body).unwrap();
        assert_eq!(decoded.accel, 1000);
        assert!((decoded.speed_rpm + 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_homing_and_enable_bodies() {
        assert_eq!(encode_homing(4).as_slice(), &[0x9A, 0x04, 0x00, 0x6B]);
        assert_eq!(encode_enable(true).as_slice(), &[0xF3, 0x01, 0x00, 0x6B]);
    }

    #[test]
    fn test_speed_out_of_range() {
        assert!(matches!(
            encode_speed(7000.0, 0),
            Err(ProtocolError::OutOfRange { field: "speed", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_short_or_bad_trailer() {
        assert!(matches!(
            decode_position_direct(&[0xFB, 0, 0]),
            Err(ProtocolError::InvalidLength { .. })
        ));
        let mut body = encode_position_direct(1.0, 1.0, true).unwrap();
        body[10] = 0x00;
        assert!(matches!(
            decode_position_direct(&body),
            Err(ProtocolError::ParseError(_))
        ));
        assert!(matches!(
            ZdtCommand::decode(&[0x11, 0x00]),
            Err(ProtocolError::UnknownSubCommand(0x11))
        ));
    }

    #[test]
    fn test_command_kind_and_target() {
        let body = encode_position_direct(-90.0, 10.0, true).unwrap();
        let cmd = ZdtCommand::decode(&body).unwrap();
        assert_eq!(cmd.kind(), ZdtCommandKind::Position);
        assert_eq!(cmd.target_angle(), Some(-90.0));

        let cmd = ZdtCommand::decode(&encode_homing(2)).unwrap();
        assert_eq!(cmd, ZdtCommand::Homing { mode: 2 });
        assert_eq!(cmd.target_angle(), None);
    }

    proptest! {
        /// 编码后解码在 0.1 分辨率内一致
        #[test]
        fn prop_position_direct_roundtrip(
            angle in -300_000.0f64..300_000.0,
            speed in 0.0f64..6553.0,
            absolute in any::<bool>(),
        ) {
            let body = encode_position_direct(angle, speed, absolute).unwrap();
            let decoded = decode_position_direct(&body).unwrap();
            prop_assert!((decoded.angle_deg - angle).abs() <= 0.05 + 1e-6);
            prop_assert!((decoded.speed_rpm - speed).abs() <= 0.05 + 1e-6);
            prop_assert_eq!(decoded.absolute, absolute);
        }

        #[test]
        fn prop_speed_roundtrip(speed in -6553.0f64..6553.0, accel in 0i64..65536) {
            let body = encode_speed(speed, accel).unwrap();
            let decoded = decode_speed(&body).unwrap();
            prop_assert!((decoded.speed_rpm - speed).abs() <= 0.05 + 1e-6);
            prop_assert_eq!(decoded.accel as i64, accel);
        }
    }
}
