//! 关节限位守卫
//!
//! 在任何携带目标位置的指令下发前，从即将发送的指令体中解出全部目标角度，
//! 换算为关节角度后与限位比较。任一轴越限则整条指令被拒绝，不产生任何串口请求。

use crate::config::{ConfigContext, JointLimit};
use crate::error::ControlError;
use std::fmt;
use std::sync::Arc;
use tracing::error;
use ucp_protocol::Command;

/// 单个越限项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitViolation {
    pub axis: u8,
    /// 换算后的关节角度（度）
    pub joint_deg: f64,
    /// 指令中的电机端角度（度）
    pub drive_deg: f64,
    pub limit: JointLimit,
    /// 轨迹指令中的点序号
    pub point: Option<usize>,
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "axis {} joint {:.2}° outside [{:.2}°, {:.2}°]",
            self.axis, self.joint_deg, self.limit.min, self.limit.max
        )?;
        if let Some(point) = self.point {
            write!(f, " (point {point})")?;
        }
        Ok(())
    }
}

/// 关节限位守卫
#[derive(Debug, Clone)]
pub struct JointLimitGuard {
    config: Arc<ConfigContext>,
}

impl JointLimitGuard {
    pub fn new(config: Arc<ConfigContext>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<ConfigContext> {
        &self.config
    }

    /// 检查一条即将发送的指令
    ///
    /// `axis` 为直通指令的目标轴；Y42 与轨迹指令使用指令体内的轴号。
    /// 未配置限位时跳过检查（只警告一次）。
    pub fn check(&self, axis: u8, cmd: &Command, operation: &'static str) -> Result<(), ControlError> {
        if !cmd.opcode().carries_position() {
            return Ok(());
        }
        let snapshot = self.config.snapshot();
        let Some(limits) = snapshot.joint_limits else {
            self.config.warn_missing_limits_once();
            return Ok(());
        };

        let targets = cmd
            .position_targets(axis)
            .map_err(|e| ControlError::decode(axis, operation, e))?;

        let violations: Vec<LimitViolation> = targets
            .iter()
            .filter_map(|target| {
                let limit = limits.get(target.axis)?;
                let joint_deg = snapshot.motor.drive_to_joint(target.axis, target.drive_angle_deg);
                (!limit.contains(joint_deg)).then_some(LimitViolation {
                    axis: target.axis,
                    joint_deg,
                    drive_deg: target.drive_angle_deg,
                    limit,
                    point: target.point,
                })
            })
            .collect();

        if violations.is_empty() {
            return Ok(());
        }
        for v in &violations {
            error!(
                axis = v.axis,
                operation,
                joint_deg = v.joint_deg,
                drive_deg = v.drive_deg,
                min = v.limit.min,
                max = v.limit.max,
                "joint limit violation, command rejected"
            );
        }
        Err(ControlError::LimitViolation {
            operation,
            violations,
        })
    }

    /// 检查单个关节角度（多轴聚合前的预检）
    pub fn check_joint(&self, axis: u8, joint_deg: f64) -> Option<LimitViolation> {
        let snapshot = self.config.snapshot();
        let limit = snapshot.joint_limits?.get(axis)?;
        (!limit.contains(joint_deg)).then(|| LimitViolation {
            axis,
            joint_deg,
            drive_deg: snapshot.motor.joint_to_drive(axis, joint_deg),
            limit,
            point: None,
        })
    }
}
