//! UCP 操作码
//!
//! 0x20-0x2F 为 ZDT 原生读取，0x60-0x69 为厂商无关的标准化读取（float32 LE）。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// UCP 操作码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Opcode {
    // 基础控制
    Enable = 0x01,
    Stop = 0x02,
    /// 旧版预加载 + 广播触发同步（禁止下发）
    SyncMotion = 0x03,

    // 运动控制
    SpeedMode = 0x10,
    TorqueMode = 0x11,
    PositionDirect = 0x12,
    PositionTrapezoid = 0x13,

    // 原生读取
    ReadRealtimePosition = 0x20,
    ReadRealtimeSpeed = 0x21,
    ReadTemperature = 0x22,
    ReadMotorStatus = 0x23,
    ReadHomingStatus = 0x24,
    ReadBusVoltage = 0x25,
    ReadBusCurrent = 0x26,
    ReadPhaseCurrent = 0x27,
    ReadPositionError = 0x28,
    ReadTargetPosition = 0x29,
    ReadRealtimeTargetPosition = 0x2A,
    ReadEncoderRaw = 0x2B,
    ReadEncoderCalibrated = 0x2C,
    ReadPulseCount = 0x2D,
    ReadInputPulse = 0x2E,
    ReadVersion = 0x2F,

    // 特殊
    Y42MultiMotor = 0x30,
    ReadResistanceInductance = 0x35,
    ReadPid = 0x36,
    ReadHomingParams = 0x37,
    ReadDriveParameters = 0x38,
    ReadSystemStatus = 0x39,

    // 触发类
    SetZero = 0x40,
    TriggerHoming = 0x41,
    ForceStopHoming = 0x42,
    TriggerEncoderCalibration = 0x43,
    ClearPosition = 0x44,
    ReleaseStallProtection = 0x45,
    FactoryReset = 0x46,

    // 参数修改
    ModifyHomingParams = 0x50,
    ModifyDriveParameters = 0x51,
    ModifyMotorId = 0x52,

    // 标准化读取
    ReadPositionStd = 0x60,
    ReadSpeedStd = 0x61,
    ReadTemperatureStd = 0x62,
    ReadVoltageStd = 0x63,
    ReadCurrentStd = 0x64,
    ReadPhaseCurrentStd = 0x65,
    ReadPositionErrorStd = 0x66,
    ReadTargetPositionStd = 0x67,
    ReadStatusFlagsStd = 0x69,

    // 轨迹
    TrajectoryUpload = 0x70,
    TrajectoryExecute = 0x71,
    TrajectoryStop = 0x72,
    TrajectoryStatus = 0x73,
}

impl Opcode {
    pub fn code(self) -> u8 {
        self.into()
    }

    /// 是否为只读操作（不会引起运动或参数变化）
    pub fn is_read(self) -> bool {
        let code = self.code();
        (0x20..=0x2F).contains(&code)
            || (0x35..=0x39).contains(&code)
            || (0x60..=0x69).contains(&code)
            || self == Opcode::TrajectoryStatus
    }

    /// 是否携带目标位置（需要经过关节限位检查）
    pub fn carries_position(self) -> bool {
        matches!(
            self,
            Opcode::PositionDirect
                | Opcode::PositionTrapezoid
                | Opcode::Y42MultiMotor
                | Opcode::TrajectoryUpload
        )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip_u8() {
        assert_eq!(Opcode::try_from(0x12).unwrap(), Opcode::PositionDirect);
        assert_eq!(Opcode::try_from(0x73).unwrap(), Opcode::TrajectoryStatus);
        assert_eq!(u8::from(Opcode::ModifyMotorId), 0x52);
        assert!(Opcode::try_from(0x68).is_err());
        assert!(Opcode::try_from(0xFF).is_err());
    }

    #[test]
    fn test_opcode_classes() {
        assert!(Opcode::ReadVersion.is_read());
        assert!(Opcode::ReadStatusFlagsStd.is_read());
        assert!(Opcode::TrajectoryStatus.is_read());
        assert!(!Opcode::Enable.is_read());
        assert!(!Opcode::Y42MultiMotor.is_read());

        assert!(Opcode::PositionDirect.carries_position());
        assert!(Opcode::Y42MultiMotor.carries_position());
        assert!(!Opcode::SpeedMode.carries_position());
    }

    #[test]
    fn test_opcode_display() {
        assert_eq!(Opcode::Enable.to_string(), "Enable(0x01)");
    }
}
