//! 轨迹点编码、抽稀与状态解析
//!
//! 点格式（38 字节，小端）：
//!
//! ```text
//! interval_ms(u16) | 6 × [ position×100(i32) | speed×10(u16) ]
//! ```
//!
//! 上传模式：0=开始（清空缓存）、1=单点追加、2=完成、3=批量追加 `[3][n][n×38B]`。

use crate::ProtocolError;
use crate::command::Command;
use crate::opcode::Opcode;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 单点编码长度
pub const TRAJECTORY_POINT_SIZE: usize = 2 + 6 * (4 + 2);

/// 桥接板轨迹缓存容量（超过后上传前先抽稀）
pub const MAX_TRAJECTORY_POINTS: usize = 120;

/// 单次上传 args 的安全上限
pub const SAFE_MAX_UPLOAD_ARGS: usize = 200;

/// 批量模式每包最多点数
pub const fn max_points_per_batch() -> usize {
    let n = (SAFE_MAX_UPLOAD_ARGS - 2) / TRAJECTORY_POINT_SIZE;
    if n < 2 { 2 } else { n }
}

/// 上传模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum UploadMode {
    Start = 0,
    Single = 1,
    Finish = 2,
    Bulk = 3,
}

/// 轨迹点
///
/// 位置为电机端角度（度），速度为 RPM。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrajectoryPoint {
    /// 距上一个点的时间间隔（毫秒）
    pub interval_ms: u16,
    pub positions: [f64; 6],
    pub speeds: [f64; 6],
}

impl TrajectoryPoint {
    pub fn new(interval_ms: u16, positions: [f64; 6], speeds: [f64; 6]) -> Self {
        Self {
            interval_ms,
            positions,
            speeds,
        }
    }

    pub fn encode(&self) -> Result<[u8; TRAJECTORY_POINT_SIZE], ProtocolError> {
        let mut out = [0u8; TRAJECTORY_POINT_SIZE];
        out[..2].copy_from_slice(&self.interval_ms.to_le_bytes());
        for i in 0..6 {
            let pos = (self.positions[i] * 100.0).round();
            if !pos.is_finite() || pos < i32::MIN as f64 || pos > i32::MAX as f64 {
                return Err(ProtocolError::OutOfRange {
                    field: "trajectory.position",
                    value: self.positions[i],
                });
            }
            let spd = (self.speeds[i].abs() * 10.0).round();
            if !spd.is_finite() || spd > u16::MAX as f64 {
                return Err(ProtocolError::OutOfRange {
                    field: "trajectory.speed",
                    value: self.speeds[i],
                });
            }
            let base = 2 + i * 6;
            out[base..base + 4].copy_from_slice(&(pos as i32).to_le_bytes());
            out[base + 4..base + 6].copy_from_slice(&(spd as u16).to_le_bytes());
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        crate::require_len(bytes, TRAJECTORY_POINT_SIZE)?;
        let mut positions = [0.0; 6];
        let mut speeds = [0.0; 6];
        for i in 0..6 {
            let base = 2 + i * 6;
            let pos = i32::from_le_bytes([
                bytes[base],
                bytes[base + 1],
                bytes[base + 2],
                bytes[base + 3],
            ]);
            let spd = u16::from_le_bytes([bytes[base + 4], bytes[base + 5]]);
            positions[i] = pos as f64 / 100.0;
            speeds[i] = spd as f64 / 10.0;
        }
        Ok(Self {
            interval_ms: u16::from_le_bytes([bytes[0], bytes[1]]),
            positions,
            speeds,
        })
    }
}

/// 抽稀轨迹到最多 `max_points` 个点，保持总时长不变
///
/// - 保留首尾点，中间按原序列均匀取索引（严格递增）
/// - 被丢弃点的 `interval_ms` 累加到下一个保留点
/// - 首个保留点沿用自身间隔
///
/// 累加后的间隔超过 `u16::MAX` 时返回 `OutOfRange`，不截断时长。
pub fn decimate_keep_timing(
    points: &[TrajectoryPoint],
    max_points: usize,
) -> Result<Vec<TrajectoryPoint>, ProtocolError> {
    let n = points.len();
    if max_points == 0 || n <= max_points {
        return Ok(points.to_vec());
    }
    if n <= 2 || max_points == 1 {
        // 单点容量：只保留终点，累加全部间隔
        let mut last = points[n - 1];
        last.interval_ms = sum_intervals(points)?;
        return Ok(vec![last]);
    }

    let mut keep = Vec::with_capacity(max_points);
    let mut last: Option<usize> = None;
    for i in 0..max_points {
        let mut idx = ((i * (n - 1)) as f64 / (max_points - 1) as f64).round() as usize;
        if let Some(prev) = last {
            if idx <= prev {
                idx = prev + 1;
            }
        }
        idx = idx.min(n - 1);
        keep.push(idx);
        last = Some(idx);
    }
    if let Some(tail) = keep.last_mut() {
        *tail = n - 1;
    }
    keep.dedup();

    let mut out = Vec::with_capacity(keep.len());
    let mut prev: Option<usize> = None;
    for idx in keep {
        let mut pt = points[idx];
        if let Some(p) = prev {
            pt.interval_ms = sum_intervals(&points[p + 1..=idx])?;
        }
        out.push(pt);
        prev = Some(idx);
    }
    Ok(out)
}

fn sum_intervals(points: &[TrajectoryPoint]) -> Result<u16, ProtocolError> {
    let total: u32 = points.iter().map(|p| p.interval_ms as u32).sum();
    u16::try_from(total).map_err(|_| ProtocolError::OutOfRange {
        field: "trajectory.interval_ms",
        value: total as f64,
    })
}

/// mode=0：开始上传（清空缓存）
pub fn upload_start() -> Command {
    Command::raw(Opcode::TrajectoryUpload, vec![UploadMode::Start.into()])
}

/// mode=1：单点追加
pub fn upload_single(point: &TrajectoryPoint) -> Result<Command, ProtocolError> {
    let mut args = Vec::with_capacity(1 + TRAJECTORY_POINT_SIZE);
    args.push(UploadMode::Single.into());
    args.extend_from_slice(&point.encode()?);
    Ok(Command::raw(Opcode::TrajectoryUpload, args))
}

/// mode=3：批量追加
pub fn upload_bulk(points: &[TrajectoryPoint]) -> Result<Command, ProtocolError> {
    let n = u8::try_from(points.len()).map_err(|_| ProtocolError::InvalidValue {
        field: "trajectory.batch",
        value: points.len() as i64,
    })?;
    let mut args = Vec::with_capacity(2 + points.len() * TRAJECTORY_POINT_SIZE);
    args.push(UploadMode::Bulk.into());
    args.push(n);
    for pt in points {
        args.extend_from_slice(&pt.encode()?);
    }
    if args.len() != 2 + points.len() * TRAJECTORY_POINT_SIZE {
        return Err(ProtocolError::FrameLengthMismatch {
            declared: 2 + points.len() * TRAJECTORY_POINT_SIZE,
            actual: args.len(),
        });
    }
    Ok(Command::raw(Opcode::TrajectoryUpload, args))
}

/// mode=2：完成上传
pub fn upload_finish() -> Command {
    Command::raw(Opcode::TrajectoryUpload, vec![UploadMode::Finish.into()])
}

/// 桥接板上报的轨迹执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceTrajectoryState {
    Idle,
    Uploading,
    Ready,
    Running,
    Completed,
    Error,
    Unknown(u8),
}

impl From<u8> for DeviceTrajectoryState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Uploading,
            2 => Self::Ready,
            3 => Self::Running,
            4 => Self::Completed,
            5 => Self::Error,
            other => Self::Unknown(other),
        }
    }
}

/// 轨迹状态响应（0x73）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrajectoryStatusReport {
    pub state: DeviceTrajectoryState,
    pub total_points: u16,
    pub current_index: u16,
    pub last_y42_status: u8,
    pub last_y42_err_code: u16,
    /// 新版固件附带的调试计数（旧固件为 0）
    pub y42_success_count: u16,
    pub y42_fail_count: u16,
}

impl TrajectoryStatusReport {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        crate::require_len(data, 8)?;
        let (success, fail) = if data.len() >= 12 {
            (
                u16::from_le_bytes([data[8], data[9]]),
                u16::from_le_bytes([data[10], data[11]]),
            )
        } else {
            (0, 0)
        };
        Ok(Self {
            state: DeviceTrajectoryState::from(data[0]),
            total_points: u16::from_le_bytes([data[1], data[2]]),
            current_index: u16::from_le_bytes([data[3], data[4]]),
            last_y42_status: data[5],
            last_y42_err_code: u16::from_le_bytes([data[6], data[7]]),
            y42_success_count: success,
            y42_fail_count: fail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pts(intervals: &[u16]) -> Vec<TrajectoryPoint> {
        intervals
            .iter()
            .enumerate()
            .map(|(i, iv)| TrajectoryPoint::new(*iv, [i as f64; 6], [10.0; 6]))
            .collect()
    }

    #[test]
    fn test_point_size_and_batch() {
        assert_eq!(TRAJECTORY_POINT_SIZE, 38);
        assert_eq!(max_points_per_batch(), 5);
    }

    #[test]
    fn test_point_encoding_layout() {
        let pt = TrajectoryPoint::new(20, [12.34, -1.0, 0.0, 0.0, 0.0, 0.0], [5.5; 6]);
        let bytes = pt.encode().unwrap();
        assert_eq!(&bytes[..2], &[20, 0]);
        assert_eq!(i32::from_le_bytes(bytes[2..6].try_into().unwrap()), 1234);
        assert_eq!(u16::from_le_bytes(bytes[6..8].try_into().unwrap()), 55);
        assert_eq!(i32::from_le_bytes(bytes[8..12].try_into().unwrap()), -100);

        let decoded = TrajectoryPoint::decode(&bytes).unwrap();
        assert_eq!(decoded.interval_ms, 20);
        assert!((decoded.positions[0] - 12.34).abs() < 1e-9);
    }

    #[test]
    fn test_decimate_noop_when_small() {
        let p = pts(&[10, 20, 30]);
        assert_eq!(decimate_keep_timing(&p, 5).unwrap(), p);
    }

    #[test]
    fn test_decimate_keeps_ends_and_time() {
        let p = pts(&[20; 10]);
        let out = decimate_keep_timing(&p, 4).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].positions[0], 0.0);
        assert_eq!(out[3].positions[0], 9.0);
        let before: u32 = p.iter().map(|x| x.interval_ms as u32).sum();
        let after: u32 = out.iter().map(|x| x.interval_ms as u32).sum();
        assert_eq!(before, after);
        // 索引 0,3,6,9 → 后续点各累加 3 个间隔
        assert_eq!(out[1].interval_ms, 60);
    }

    #[test]
    fn test_decimate_single_capacity() {
        let p = pts(&[5, 6, 7]);
        let out = decimate_keep_timing(&p, 1).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].interval_ms, 18);
        assert_eq!(out[0].positions[0], 2.0);
    }

    #[test]
    fn test_decimate_rejects_interval_overflow() {
        // 121 个点抽到 120 个，必有一对 60000ms 间隔合并
        let p = pts(&[60_000; 121]);
        let err = decimate_keep_timing(&p, 120).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::OutOfRange { field: "trajectory.interval_ms", value } if value == 120_000.0
        ));

        let p = pts(&[40_000, 30_000, 30_000]);
        assert!(decimate_keep_timing(&p, 1).is_err());
        // 合并后恰好 65535 仍然合法
        let p = pts(&[1, 30_000, 35_535]);
        assert_eq!(decimate_keep_timing(&p, 1).unwrap()[0].interval_ms, 65_535);
    }

    #[test]
    fn test_bulk_upload_layout() {
        let p = pts(&[20, 20]);
        let cmd = upload_bulk(&p).unwrap();
        assert_eq!(cmd.opcode(), Opcode::TrajectoryUpload);
        assert_eq!(cmd.args()[0], 3);
        assert_eq!(cmd.args()[1], 2);
        assert_eq!(cmd.args().len(), 2 + 2 * 38);

        assert_eq!(upload_start().args(), &[0]);
        assert_eq!(upload_finish().args(), &[2]);
        assert_eq!(upload_single(&p[0]).unwrap().args().len(), 39);
    }

    #[test]
    fn test_status_report_parse() {
        let data = [3, 100, 0, 42, 0, 0, 0x34, 0x40];
        let report = TrajectoryStatusReport::parse(&data).unwrap();
        assert_eq!(report.state, DeviceTrajectoryState::Running);
        assert_eq!(report.total_points, 100);
        assert_eq!(report.current_index, 42);
        assert_eq!(report.last_y42_err_code, 0x4034);
        assert_eq!(report.y42_success_count, 0);

        let data = [4, 10, 0, 10, 0, 0, 0, 0, 9, 0, 1, 0];
        let report = TrajectoryStatusReport::parse(&data).unwrap();
        assert_eq!(report.state, DeviceTrajectoryState::Completed);
        assert_eq!(report.y42_success_count, 9);
        assert_eq!(report.y42_fail_count, 1);

        assert!(TrajectoryStatusReport::parse(&[0; 7]).is_err());
    }

    proptest! {
        /// 抽稀后总时长不变且点数不超过容量
        #[test]
        fn prop_decimation_preserves_total_time(
            intervals in prop::collection::vec(any::<u16>(), 1..400),
            cap in 1usize..130,
        ) {
            let p = pts(&intervals);
            let before: u32 = p.iter().map(|x| x.interval_ms as u32).sum();
            match decimate_keep_timing(&p, cap) {
                Ok(out) => {
                    let after: u32 = out.iter().map(|x| x.interval_ms as u32).sum();
                    prop_assert_eq!(before, after);
                    prop_assert!(out.len() <= cap);
                    prop_assert_eq!(
                        out.last().map(|x| x.positions[0]),
                        p.last().map(|x| x.positions[0])
                    );
                },
                Err(err) => {
                    // 只有合并后的间隔确实放不下时才报错
                    let is_out_of_range = matches!(err, ProtocolError::OutOfRange { .. });
                    prop_assert!(is_out_of_range);
                    prop_assert!(before > u16::MAX as u32);
                },
            }
        }
    }
}
