//! 单轴直通指令
//!
//! 直通 UCP args 全部为小端字节序，由桥接板转换为 ZDT 指令后下发。
//! 同步标志位（sync）恒为 0：多轴同步只走 Y42 聚合帧。

use crate::ProtocolError;
use crate::opcode::Opcode;
use crate::trajectory::{TRAJECTORY_POINT_SIZE, TrajectoryPoint, UploadMode};
use crate::y42::{parse_y42_frame, split_y42_args};

/// 一条待下发的 UCP 指令（构建后不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: Opcode,
    args: Vec<u8>,
}

/// 指令中携带的单个目标位置（电机端角度）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisTarget {
    pub axis: u8,
    pub drive_angle_deg: f64,
    /// 轨迹指令中的点序号
    pub point: Option<usize>,
}

fn round_i32(value: f64, field: &'static str) -> Result<i32, ProtocolError> {
    let scaled = (value * 10.0).round();
    if !scaled.is_finite() || scaled < i32::MIN as f64 || scaled > i32::MAX as f64 {
        return Err(ProtocolError::OutOfRange { field, value });
    }
    Ok(scaled as i32)
}

fn round_u16(value: f64, field: &'static str) -> Result<u16, ProtocolError> {
    let scaled = (value * 10.0).round();
    if !scaled.is_finite() || scaled < 0.0 || scaled > u16::MAX as f64 {
        return Err(ProtocolError::OutOfRange { field, value });
    }
    Ok(scaled as u16)
}

impl Command {
    /// 使用任意 args 构建（原始指令通道）
    pub fn raw(opcode: Opcode, args: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            args: args.into(),
        }
    }

    /// 无参数读取
    pub fn read(opcode: Opcode) -> Self {
        Self::raw(opcode, Vec::new())
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// `<BB`: enabled, sync
    pub fn enable(enabled: bool) -> Self {
        Self::raw(Opcode::Enable, vec![enabled as u8, 0])
    }

    /// `<B`: sync
    pub fn stop() -> Self {
        Self::raw(Opcode::Stop, vec![0])
    }

    /// `<iHBB`: pos×10, speed×10, absolute, sync
    pub fn position_direct(
        angle_deg: f64,
        speed_rpm: f64,
        absolute: bool,
    ) -> Result<Self, ProtocolError> {
        let pos = round_i32(angle_deg, "position")?;
        let spd = round_u16(speed_rpm.abs(), "speed")?;
        let mut args = Vec::with_capacity(8);
        args.extend_from_slice(&pos.to_le_bytes());
        args.extend_from_slice(&spd.to_le_bytes());
        args.push(absolute as u8);
        args.push(0);
        Ok(Self::raw(Opcode::PositionDirect, args))
    }

    /// `<iHHHBB`: pos×10, vmax×10, accel, decel, absolute, sync
    pub fn position_trapezoid(
        angle_deg: f64,
        max_speed_rpm: f64,
        accel: u16,
        decel: u16,
        absolute: bool,
    ) -> Result<Self, ProtocolError> {
        let pos = round_i32(angle_deg, "position")?;
        let vmax = round_u16(max_speed_rpm.abs(), "max_speed")?;
        let mut args = Vec::with_capacity(12);
        args.extend_from_slice(&pos.to_le_bytes());
        args.extend_from_slice(&vmax.to_le_bytes());
        args.extend_from_slice(&accel.to_le_bytes());
        args.extend_from_slice(&decel.to_le_bytes());
        args.push(absolute as u8);
        args.push(0);
        Ok(Self::raw(Opcode::PositionTrapezoid, args))
    }

    /// `<hHB`: rpm×10（超出 i16 报错）, accel, sync
    pub fn speed(speed_rpm: f64, accel: u16) -> Result<Self, ProtocolError> {
        let scaled = (speed_rpm * 10.0).round();
        if !scaled.is_finite() || scaled < i16::MIN as f64 || scaled > i16::MAX as f64 {
            return Err(ProtocolError::OutOfRange {
                field: "speed",
                value: speed_rpm,
            });
        }
        let mut args = Vec::with_capacity(5);
        args.extend_from_slice(&(scaled as i16).to_le_bytes());
        args.extend_from_slice(&accel.to_le_bytes());
        args.push(0);
        Ok(Self::raw(Opcode::SpeedMode, args))
    }

    /// `<hHB`: current_ma, slope, sync
    pub fn torque(current_ma: i16, slope: u16) -> Self {
        let mut args = Vec::with_capacity(5);
        args.extend_from_slice(&current_ma.to_le_bytes());
        args.extend_from_slice(&slope.to_le_bytes());
        args.push(0);
        Self::raw(Opcode::TorqueMode, args)
    }

    /// `<BB`: mode, sync
    pub fn trigger_homing(mode: u8) -> Self {
        Self::raw(Opcode::TriggerHoming, vec![mode, 0])
    }

    /// `<B`: save_to_chip
    pub fn set_zero(save_to_chip: bool) -> Self {
        Self::raw(Opcode::SetZero, vec![save_to_chip as u8])
    }

    /// `<BB`: save_to_chip, new_id（1..=255）
    pub fn modify_motor_id(new_id: u8, save_to_chip: bool) -> Result<Self, ProtocolError> {
        if new_id == 0 {
            return Err(ProtocolError::InvalidValue {
                field: "motor_id",
                value: 0,
            });
        }
        Ok(Self::raw(
            Opcode::ModifyMotorId,
            vec![save_to_chip as u8, new_id],
        ))
    }

    /// Y42 聚合下发：`expected_ack_axis || frame`
    pub fn y42(expected_ack_axis: u8, frame: &[u8]) -> Self {
        Self::raw(
            Opcode::Y42MultiMotor,
            crate::y42::y42_request_args(expected_ack_axis, frame),
        )
    }

    /// 同步标志位（仅对携带该字段的指令返回）
    pub fn sync_flag(&self) -> Option<bool> {
        let idx = match self.opcode {
            Opcode::Enable => 1,
            Opcode::Stop => 0,
            Opcode::PositionDirect => 7,
            Opcode::PositionTrapezoid => 11,
            Opcode::SpeedMode | Opcode::TorqueMode => 4,
            Opcode::TriggerHoming => 1,
            _ => return None,
        };
        self.args.get(idx).map(|b| *b != 0)
    }

    /// 解析指令中携带的全部目标位置
    ///
    /// `axis` 为直通指令的目标轴；Y42 与轨迹指令自带轴信息。
    pub fn position_targets(&self, axis: u8) -> Result<Vec<AxisTarget>, ProtocolError> {
        match self.opcode {
            Opcode::PositionDirect | Opcode::PositionTrapezoid => {
                crate::require_len(&self.args, 4)?;
                let pos = i32::from_le_bytes([self.args[0], self.args[1], self.args[2], self.args[3]]);
                Ok(vec![AxisTarget {
                    axis,
                    drive_angle_deg: pos as f64 / 10.0,
                    point: None,
                }])
            },
            Opcode::Y42MultiMotor => {
                let (_, frame) = split_y42_args(&self.args)?;
                Ok(parse_y42_frame(frame)?
                    .into_iter()
                    .filter_map(|sub| {
                        sub.command.target_angle().map(|angle| AxisTarget {
                            axis: sub.axis,
                            drive_angle_deg: angle,
                            point: None,
                        })
                    })
                    .collect())
            },
            Opcode::TrajectoryUpload => {
                let points = match self.args.first().map(|m| UploadMode::try_from(*m)) {
                    Some(Ok(UploadMode::Single)) => {
                        crate::require_len(&self.args, 1 + TRAJECTORY_POINT_SIZE)?;
                        vec![TrajectoryPoint::decode(&self.args[1..1 + TRAJECTORY_POINT_SIZE])?]
                    },
                    Some(Ok(UploadMode::Bulk)) => {
                        crate::require_len(&self.args, 2)?;
                        let n = self.args[1] as usize;
                        crate::require_len(&self.args, 2 + n * TRAJECTORY_POINT_SIZE)?;
                        self.args[2..2 + n * TRAJECTORY_POINT_SIZE]
                            .chunks_exact(TRAJECTORY_POINT_SIZE)
                            .map(TrajectoryPoint::decode)
                            .collect::<Result<Vec<_>, _>>()?
                    },
                    _ => Vec::new(),
                };
                Ok(points
                    .iter()
                    .enumerate()
                    .flat_map(|(idx, pt)| {
                        pt.positions
                            .iter()
                            .enumerate()
                            .map(move |(i, angle)| AxisTarget {
                                axis: (i + 1) as u8,
                                drive_angle_deg: *angle,
                                point: Some(idx),
                            })
                    })
                    .collect())
            },
            _ => Ok(Vec::new()),
        }
    }
}
