//! 输入验证模块
//!
//! 轴号列表、`轴:角度` 目标列表与轨迹文件的解析和检查

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use ucp_sdk::client::config::AXIS_COUNT;
use ucp_sdk::protocol::TrajectoryPoint;

/// 验证单个轴号（1..=6）
pub fn validate_axis(axis: u8) -> Result<u8> {
    if axis == 0 || axis as usize > AXIS_COUNT {
        bail!("轴号 {} 超出范围 [1, {}]", axis, AXIS_COUNT);
    }
    Ok(axis)
}

/// 验证数值有限
pub fn validate_finite(name: &str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        bail!("{} 无效: {}", name, value);
    }
    Ok(value)
}

/// 解析轴号列表：`1,2,3`，空字符串表示全部轴
pub fn parse_axes(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    if text.is_empty() || text == "all" {
        return Ok((1..=AXIS_COUNT as u8).collect());
    }
    let mut axes = Vec::new();
    for part in text.split(',') {
        let axis: u8 = part.trim().parse().with_context(|| format!("无效轴号: {:?}", part))?;
        let axis = validate_axis(axis)?;
        if axes.contains(&axis) {
            bail!("轴号 {} 重复", axis);
        }
        axes.push(axis);
    }
    Ok(axes)
}

/// 解析同步目标：`1:10.5,2:-3`
pub fn parse_targets(text: &str) -> Result<Vec<(u8, f64)>> {
    let mut targets: Vec<(u8, f64)> = Vec::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (axis, angle) = part
            .split_once(':')
            .with_context(|| format!("目标格式应为 轴:角度，得到 {:?}", part))?;
        let axis: u8 = axis.trim().parse().with_context(|| format!("无效轴号: {:?}", axis))?;
        let angle: f64 = angle.trim().parse().with_context(|| format!("无效角度: {:?}", angle))?;
        let axis = validate_axis(axis)?;
        validate_finite("角度", angle)?;
        if targets.iter().any(|(a, _)| *a == axis) {
            bail!("轴号 {} 重复", axis);
        }
        targets.push((axis, angle));
    }
    if targets.is_empty() {
        bail!("至少需要一个目标");
    }
    Ok(targets)
}

/// 轨迹文件中的一个点
#[derive(Debug, Deserialize)]
struct PointRecord {
    interval_ms: u16,
    positions: [f64; AXIS_COUNT],
    #[serde(default)]
    speeds: Option<[f64; AXIS_COUNT]>,
}

/// 读取 JSON 轨迹文件（`[{interval_ms, positions[6], speeds[6]}, ...]`）
///
/// 缺省 `speeds` 时使用 `default_speed`。
pub fn load_trajectory(path: &Path, default_speed: f64) -> Result<Vec<TrajectoryPoint>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("读取轨迹文件失败: {}", path.display()))?;
    parse_trajectory(&text, default_speed)
}

pub fn parse_trajectory(text: &str, default_speed: f64) -> Result<Vec<TrajectoryPoint>> {
    let records: Vec<PointRecord> = serde_json::from_str(text).context("轨迹 JSON 格式错误")?;
    if records.is_empty() {
        bail!("轨迹为空");
    }
    records
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let speeds = r.speeds.unwrap_or([default_speed; AXIS_COUNT]);
            if r.positions.iter().chain(speeds.iter()).any(|v| !v.is_finite()) {
                bail!("第 {} 个点包含无效数值", i);
            }
            Ok(TrajectoryPoint::new(r.interval_ms, r.positions, speeds))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_axes() {
        assert_eq!(parse_axes("1, 3,5").unwrap(), vec![1, 3, 5]);
        assert_eq!(parse_axes("all").unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert!(parse_axes("0").is_err());
        assert!(parse_axes("7").is_err());
        assert!(parse_axes("1,1").is_err());
        assert!(parse_axes("x").is_err());
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!(parse_targets("1:10.5,2:-3").unwrap(), vec![(1, 10.5), (2, -3.0)]);
        assert!(parse_targets("1=10").is_err());
        assert!(parse_targets("1:10,1:5").is_err());
        assert!(parse_targets("1:nan").is_err());
        assert!(parse_targets("").is_err());
    }

    #[test]
    fn test_parse_trajectory() {
        let text = r#"[
            {"interval_ms": 20, "positions": [0, 1, 2, 3, 4, 5], "speeds": [10, 10, 10, 10, 10, 10]},
            {"interval_ms": 20, "positions": [1, 2, 3, 4, 5, 6]}
        ]"#;
        let points = parse_trajectory(text, 30.0).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].speeds, [30.0; 6]);
        assert_eq!(points[0].interval_ms, 20);

        assert!(parse_trajectory("[]", 30.0).is_err());
        assert!(parse_trajectory(r#"[{"interval_ms": 20, "positions": [0, 1]}]"#, 30.0).is_err());
    }
}
