//! 速度模式命令

use super::connection::Session;
use crate::validation::validate_finite;
use anyhow::Result;
use clap::Args;
use ucp_sdk::DriveUnitOps;

/// 速度命令参数
#[derive(Args, Debug)]
pub struct SpeedCommand {
    /// 轴号（1-6）
    #[arg(short, long, default_value_t = 1)]
    pub axis: u8,

    /// 电机端转速（RPM，负值反转，0 停止）
    #[arg(allow_hyphen_values = true)]
    pub rpm: f64,

    /// 加速度档位（0 为立即）
    #[arg(long, default_value_t = 10)]
    pub accel: u16,
}

impl SpeedCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        validate_finite("转速", self.rpm)?;
        let unit = session.unit(self.axis)?;
        unit.set_speed(self.rpm, self.accel)?;
        println!("✅ 轴 {} 速度 {:.1} RPM", self.axis, self.rpm);
        Ok(())
    }
}
