//! 移动命令

use super::connection::Session;
use crate::validation::validate_finite;
use anyhow::{Result, bail};
use clap::Args;
use std::time::Duration;
use ucp_sdk::DriveUnitOps;
use ucp_sdk::client::unit::DEFAULT_POSITION_POLL;

/// 移动命令参数
#[derive(Args, Debug)]
pub struct MoveCommand {
    /// 轴号（1-6）
    #[arg(short, long, default_value_t = 1)]
    pub axis: u8,

    /// 目标关节角度（度）
    #[arg(allow_hyphen_values = true)]
    pub angle: f64,

    /// 电机端速度（RPM）
    #[arg(short, long, default_value_t = 100.0)]
    pub speed: f64,

    /// 相对当前位置移动
    #[arg(short, long)]
    pub relative: bool,

    /// 使用梯形加减速曲线
    #[arg(long)]
    pub trapezoid: bool,

    /// 梯形加速度
    #[arg(long, default_value_t = 1000, requires = "trapezoid")]
    pub accel: u16,

    /// 梯形减速度
    #[arg(long, default_value_t = 1000, requires = "trapezoid")]
    pub decel: u16,

    /// 等待到位
    #[arg(short, long)]
    pub wait: bool,

    /// 等待超时（秒）
    #[arg(short, long, default_value_t = 10.0)]
    pub timeout: f64,
}

impl MoveCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        validate_finite("角度", self.angle)?;
        if !(self.speed.is_finite() && self.speed > 0.0) {
            bail!("速度必须为正数: {}", self.speed);
        }

        let unit = session.unit(self.axis)?;
        let absolute = !self.relative;
        println!(
            "⏳ 轴 {} {} {:.2}° @ {:.1} RPM",
            self.axis,
            if absolute { "移动到" } else { "相对移动" },
            self.angle,
            self.speed
        );

        if self.trapezoid {
            unit.move_to_position_trapezoid(
                self.angle, self.speed, self.accel, self.decel, absolute,
            )?;
        } else {
            unit.move_to_position(self.angle, self.speed, absolute)?;
        }

        if self.wait {
            let timeout = Duration::from_secs_f64(self.timeout.max(0.0));
            if unit.wait_for_position(timeout, DEFAULT_POSITION_POLL)? {
                println!("✅ 已到位: {:.2}°", unit.get_position()?);
            } else {
                bail!("等待到位超时（{:.1}s）", self.timeout);
            }
        } else {
            println!("✅ 指令已发送");
        }
        Ok(())
    }
}
