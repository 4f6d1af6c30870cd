//! 参数块：驱动参数、回零参数、PID、电阻电感
//!
//! 读取结果长度随固件版本变化，解析失败时回退默认值并保留原始字节。

use crate::ProtocolError;
use crate::command::Command;
use crate::opcode::Opcode;
use crate::require_len;

/// 驱动参数区长度
pub const DRIVE_PARAMETERS_LEN: usize = 33;

/// 回零参数写入 args 长度（含 save 标志）
pub const HOMING_PARAMETERS_ARGS_LEN: usize = 16;

fn le_u16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

/// 驱动参数（0x38 读取 / 0x51 写入）
///
/// 参数区 33 字节，多字节字段为小端。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriveParameters {
    pub lock_enabled: bool,
    pub control_mode: u8,
    pub pulse_port_function: u8,
    pub serial_port_function: u8,
    pub enable_pin_mode: u8,
    pub motor_direction: u8,
    pub subdivision: u16,
    pub subdivision_interpolation: bool,
    pub auto_screen_off: bool,
    pub lpf_intensity: u8,
    /// mA
    pub open_loop_current: u16,
    /// mA
    pub closed_loop_max_current: u16,
    /// RPM
    pub max_speed_limit: u16,
    pub current_loop_bandwidth: u16,
    pub uart_baudrate: u8,
    pub can_baudrate: u8,
    pub checksum_mode: u8,
    pub response_mode: u8,
    pub position_precision: bool,
    pub stall_protection_enabled: bool,
    pub stall_protection_speed: u16,
    pub stall_protection_current: u16,
    pub stall_protection_time: u16,
    /// 0.1° 单位
    pub position_arrival_window: u16,

    /// 设备返回的原始字节
    #[cfg_attr(feature = "serde", serde(default))]
    pub raw: Vec<u8>,
    /// 是否按 33 字节布局成功解析
    #[cfg_attr(feature = "serde", serde(default))]
    pub parsed_ok: bool,
}

impl Default for DriveParameters {
    fn default() -> Self {
        Self {
            lock_enabled: false,
            control_mode: 1,
            pulse_port_function: 0,
            serial_port_function: 0,
            enable_pin_mode: 0,
            motor_direction: 0,
            subdivision: 256,
            subdivision_interpolation: false,
            auto_screen_off: false,
            lpf_intensity: 0,
            open_loop_current: 1500,
            closed_loop_max_current: 2000,
            max_speed_limit: 3000,
            current_loop_bandwidth: 1500,
            uart_baudrate: 5,
            can_baudrate: 3,
            checksum_mode: 0,
            response_mode: 0,
            position_precision: false,
            stall_protection_enabled: false,
            stall_protection_speed: 50,
            stall_protection_current: 1500,
            stall_protection_time: 1000,
            position_arrival_window: 10,
            raw: Vec::new(),
            parsed_ok: false,
        }
    }
}

impl DriveParameters {
    /// 尽力解析，不会失败
    ///
    /// - 34 字节：跳过首字节（保存标志）
    /// - 不足 33 字节：默认值，`parsed_ok = false`
    pub fn from_raw(raw: &[u8]) -> Self {
        let mut p = Self {
            raw: raw.to_vec(),
            ..Default::default()
        };
        let block = if raw.len() == DRIVE_PARAMETERS_LEN + 1 {
            &raw[1..]
        } else {
            raw
        };
        if block.len() < DRIVE_PARAMETERS_LEN {
            return p;
        }

        p.lock_enabled = block[0] != 0;
        p.control_mode = block[1];
        p.pulse_port_function = block[2];
        p.serial_port_function = block[3];
        p.enable_pin_mode = block[4];
        p.motor_direction = block[5];
        p.subdivision = le_u16(block, 6);
        p.subdivision_interpolation = block[8] != 0;
        p.auto_screen_off = block[9] != 0;
        p.lpf_intensity = block[10];
        p.open_loop_current = le_u16(block, 11);
        p.closed_loop_max_current = le_u16(block, 13);
        p.max_speed_limit = le_u16(block, 15);
        p.current_loop_bandwidth = le_u16(block, 17);
        p.uart_baudrate = block[19];
        p.can_baudrate = block[20];
        p.checksum_mode = block[21];
        p.response_mode = block[22];
        p.position_precision = block[23] != 0;
        p.stall_protection_enabled = block[24] != 0;
        p.stall_protection_speed = le_u16(block, 25);
        p.stall_protection_current = le_u16(block, 27);
        p.stall_protection_time = le_u16(block, 29);
        p.position_arrival_window = le_u16(block, 31);
        p.parsed_ok = true;
        p
    }

    /// 33 字节参数区
    pub fn encode_block(&self) -> [u8; DRIVE_PARAMETERS_LEN] {
        let mut b = [0u8; DRIVE_PARAMETERS_LEN];
        b[0] = self.lock_enabled as u8;
        b[1] = self.control_mode;
        b[2] = self.pulse_port_function;
        b[3] = self.serial_port_function;
        b[4] = self.enable_pin_mode;
        b[5] = self.motor_direction;
        b[6..8].copy_from_slice(&self.subdivision.to_le_bytes());
        b[8] = self.subdivision_interpolation as u8;
        b[9] = self.auto_screen_off as u8;
        b[10] = self.lpf_intensity;
        b[11..13].copy_from_slice(&self.open_loop_current.to_le_bytes());
        b[13..15].copy_from_slice(&self.closed_loop_max_current.to_le_bytes());
        b[15..17].copy_from_slice(&self.max_speed_limit.to_le_bytes());
        b[17..19].copy_from_slice(&self.current_loop_bandwidth.to_le_bytes());
        b[19] = self.uart_baudrate;
        b[20] = self.can_baudrate;
        b[21] = self.checksum_mode;
        b[22] = self.response_mode;
        b[23] = self.position_precision as u8;
        b[24] = self.stall_protection_enabled as u8;
        b[25..27].copy_from_slice(&self.stall_protection_speed.to_le_bytes());
        b[27..29].copy_from_slice(&self.stall_protection_current.to_le_bytes());
        b[29..31].copy_from_slice(&self.stall_protection_time.to_le_bytes());
        b[31..33].copy_from_slice(&self.position_arrival_window.to_le_bytes());
        b
    }

    /// 0x51 写入指令：`save(u8) || 参数区`（34 字节）
    pub fn to_command(&self, save_to_chip: bool) -> Command {
        let mut args = Vec::with_capacity(DRIVE_PARAMETERS_LEN + 1);
        args.push(save_to_chip as u8);
        args.extend_from_slice(&self.encode_block());
        Command::raw(Opcode::ModifyDriveParameters, args)
    }
}

/// 回零参数（0x37 读取 / 0x50 写入）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HomingParameters {
    pub mode: u8,
    pub direction: u8,
    /// RPM
    pub speed: f64,
    pub timeout_ms: u32,
    /// 旧固件的堵转电流阈值（mA）
    pub current_threshold: i16,
    pub collision_detection_speed: u16,
    pub collision_detection_current: u16,
    pub collision_detection_time: u16,
    pub auto_homing_enabled: bool,
}

impl Default for HomingParameters {
    fn default() -> Self {
        Self {
            mode: 4,
            direction: 0,
            speed: 50.0,
            timeout_ms: 30,
            current_threshold: 1000,
            collision_detection_speed: 50,
            collision_detection_current: 500,
            collision_detection_time: 100,
            auto_homing_enabled: false,
        }
    }
}

impl HomingParameters {
    /// 解析读取结果
    ///
    /// - 15 字节：ZDT 原始字段（大端）
    /// - ≥8 字节：旧布局 `<BBHHh`（speed×10）
    /// - 其他：`None`，调用方回退默认值
    pub fn from_raw(raw: &[u8]) -> Option<Self> {
        let defaults = Self::default();
        if raw.len() == 15 {
            return Some(Self {
                mode: raw[0],
                direction: raw[1],
                speed: u16::from_be_bytes([raw[2], raw[3]]) as f64,
                timeout_ms: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
                current_threshold: defaults.current_threshold,
                collision_detection_speed: u16::from_be_bytes([raw[8], raw[9]]),
                collision_detection_current: u16::from_be_bytes([raw[10], raw[11]]),
                collision_detection_time: u16::from_be_bytes([raw[12], raw[13]]),
                auto_homing_enabled: raw[14] != 0,
            });
        }
        if raw.len() >= 8 {
            return Some(Self {
                mode: raw[0],
                direction: raw[1],
                speed: le_u16(raw, 2) as f64 / 10.0,
                timeout_ms: le_u16(raw, 4) as u32,
                current_threshold: i16::from_le_bytes([raw[6], raw[7]]),
                ..defaults
            });
        }
        None
    }

    /// 0x50 写入指令（16 字节，小端）
    ///
    /// `save, mode, direction, speed(u16), timeout_ms(u32), coll_speed(u16),
    /// coll_current(u16), coll_time(u16), auto`
    pub fn to_command(&self, save_to_chip: bool) -> Result<Command, ProtocolError> {
        let speed = self.speed.round();
        if !speed.is_finite() || !(0.0..=u16::MAX as f64).contains(&speed) {
            return Err(ProtocolError::OutOfRange {
                field: "homing.speed",
                value: self.speed,
            });
        }
        let mut args = Vec::with_capacity(HOMING_PARAMETERS_ARGS_LEN);
        args.push(save_to_chip as u8);
        args.push(self.mode);
        args.push(self.direction);
        args.extend_from_slice(&(speed as u16).to_le_bytes());
        args.extend_from_slice(&self.timeout_ms.to_le_bytes());
        args.extend_from_slice(&self.collision_detection_speed.to_le_bytes());
        args.extend_from_slice(&self.collision_detection_current.to_le_bytes());
        args.extend_from_slice(&self.collision_detection_time.to_le_bytes());
        args.push(self.auto_homing_enabled as u8);
        Ok(Command::raw(Opcode::ModifyHomingParams, args))
    }

    /// 旧固件的 8 字节写入格式 `<BBHHh`（speed×10，超时按 u16 截断）
    pub fn to_legacy_command(&self) -> Result<Command, ProtocolError> {
        let speed = crate::scale_x10(self.speed, "homing.speed", u16::MAX as u64)? as u16;
        let timeout = self.timeout_ms.min(u16::MAX as u32) as u16;
        let mut args = Vec::with_capacity(8);
        args.push(self.mode);
        args.push(self.direction);
        args.extend_from_slice(&speed.to_le_bytes());
        args.extend_from_slice(&timeout.to_le_bytes());
        args.extend_from_slice(&self.current_threshold.to_le_bytes());
        Ok(Command::raw(Opcode::ModifyHomingParams, args))
    }
}

/// PID 参数（0x36）
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PidParameters {
    /// 16 字节 `<iiii>`
    Zdt {
        trapezoid_position_kp: i32,
        direct_position_kp: i32,
        speed_kp: i32,
        speed_ki: i32,
    },
    /// 12 字节 `<fff>`（旧固件）
    Float { kp: f32, ki: f32, kd: f32 },
    /// 无法识别，保留原始字节
    Raw(Vec<u8>),
}

impl PidParameters {
    pub fn from_raw(raw: &[u8]) -> Self {
        let i32_at = |at: usize| i32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let f32_at = |at: usize| f32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        if raw.len() >= 16 {
            Self::Zdt {
                trapezoid_position_kp: i32_at(0),
                direct_position_kp: i32_at(4),
                speed_kp: i32_at(8),
                speed_ki: i32_at(12),
            }
        } else if raw.len() >= 12 {
            Self::Float {
                kp: f32_at(0),
                ki: f32_at(4),
                kd: f32_at(8),
            }
        } else {
            Self::Raw(raw.to_vec())
        }
    }
}

impl Default for PidParameters {
    fn default() -> Self {
        Self::Raw(Vec::new())
    }
}

/// 相电阻 / 相电感（0x35）：`<ff>`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResistanceInductance {
    pub resistance: f32,
    pub inductance: f32,
}

impl ResistanceInductance {
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        require_len(raw, 8)?;
        Ok(Self {
            resistance: f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            inductance: f32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_parameters_short_uses_defaults() {
        let p = DriveParameters::from_raw(&[1, 2, 3]);
        assert!(!p.parsed_ok);
        assert_eq!(p.raw, vec![1, 2, 3]);
        assert_eq!(p.subdivision, 256);
        assert_eq!(p.max_speed_limit, 3000);
        assert_eq!(p.position_arrival_window, 10);
    }

    #[test]
    fn test_drive_parameters_block_roundtrip() {
        let p = DriveParameters {
            control_mode: 2,
            subdivision: 16,
            max_speed_limit: 1200,
            stall_protection_enabled: true,
            position_arrival_window: 3,
            ..Default::default()
        };
        let block = p.encode_block();
        assert_eq!(&block[6..8], &[16, 0]);
        let parsed = DriveParameters::from_raw(&block);
        assert!(parsed.parsed_ok);
        assert_eq!(parsed.control_mode, 2);
        assert_eq!(parsed.max_speed_limit, 1200);
        assert!(parsed.stall_protection_enabled);
        assert_eq!(parsed.position_arrival_window, 3);
    }

    #[test]
    fn test_drive_parameters_34_byte_skips_flag() {
        let mut raw = vec![0xEE];
        raw.extend_from_slice(&DriveParameters::default().encode_block());
        raw[2] = 7; // control_mode
        let parsed = DriveParameters::from_raw(&raw);
        assert!(parsed.parsed_ok);
        assert_eq!(parsed.control_mode, 7);
        assert_eq!(parsed.raw.len(), 34);
    }

    #[test]
    fn test_drive_parameters_command() {
        let cmd = DriveParameters::default().to_command(true);
        assert_eq!(cmd.opcode(), Opcode::ModifyDriveParameters);
        assert_eq!(cmd.args().len(), 34);
        assert_eq!(cmd.args()[0], 1);
    }

    #[test]
    fn test_homing_parameters_layouts() {
        let raw15 = [
            4, 1, 0x00, 0x1E, 0x00, 0x00, 0x75, 0x30, 0x01, 0x2C, 0x03, 0x20, 0x00, 0x3C, 1,
        ];
        let p = HomingParameters::from_raw(&raw15).unwrap();
        assert_eq!(p.mode, 4);
        assert_eq!(p.speed, 30.0);
        assert_eq!(p.timeout_ms, 30000);
        assert_eq!(p.collision_detection_speed, 300);
        assert_eq!(p.collision_detection_current, 800);
        assert_eq!(p.collision_detection_time, 60);
        assert!(p.auto_homing_enabled);

        let raw8 = [2, 0, 0xF4, 0x01, 0x10, 0x00, 0xE8, 0x03];
        let p = HomingParameters::from_raw(&raw8).unwrap();
        assert_eq!(p.mode, 2);
        assert_eq!(p.speed, 50.0);
        assert_eq!(p.timeout_ms, 16);
        assert_eq!(p.current_threshold, 1000);

        assert!(HomingParameters::from_raw(&[1, 2]).is_none());
    }

    #[test]
    fn test_homing_parameters_command_layout() {
        let p = HomingParameters {
            speed: 30.0,
            timeout_ms: 10000,
            ..Default::default()
        };
        let cmd = p.to_command(false).unwrap();
        let a = cmd.args();
        assert_eq!(a.len(), HOMING_PARAMETERS_ARGS_LEN);
        assert_eq!(&a[..3], &[0, 4, 0]);
        assert_eq!(&a[3..5], &[30, 0]);
        assert_eq!(u32::from_le_bytes(a[5..9].try_into().unwrap()), 10000);
        assert_eq!(a[15], 0);

        let legacy = p.to_legacy_command().unwrap();
        assert_eq!(legacy.args(), &[4, 0, 0x2C, 0x01, 0x10, 0x27, 0xE8, 0x03]);
    }

    #[test]
    fn test_pid_and_resistance() {
        let mut raw = Vec::new();
        for v in [100i32, 200, 300, 400] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(
            PidParameters::from_raw(&raw),
            PidParameters::Zdt { speed_ki: 400, .. }
        ));
        assert!(matches!(PidParameters::from_raw(&raw[..12]), PidParameters::Float { .. }));
        assert_eq!(PidParameters::from_raw(&[1]), PidParameters::Raw(vec![1]));

        let mut raw = 1.5f32.to_le_bytes().to_vec();
        raw.extend_from_slice(&0.25f32.to_le_bytes());
        let ri = ResistanceInductance::parse(&raw).unwrap();
        assert_eq!(ri.resistance, 1.5);
        assert_eq!(ri.inductance, 0.25);
        assert!(ResistanceInductance::parse(&raw[..4]).is_err());
    }
}
