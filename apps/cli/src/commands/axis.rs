//! 单轴开关与停止命令

use super::connection::Session;
use anyhow::Result;
use clap::Args;
use ucp_sdk::DriveUnitOps;

/// 目标轴
#[derive(Args, Debug)]
pub struct AxisArgs {
    /// 轴号（1-6）
    #[arg(short, long, default_value_t = 1)]
    pub axis: u8,
}

pub fn enable(args: &AxisArgs, session: &Session) -> Result<()> {
    let unit = session.unit(args.axis)?;
    unit.enable()?;
    println!("✅ 轴 {} 已使能", args.axis);
    Ok(())
}

pub fn disable(args: &AxisArgs, session: &Session) -> Result<()> {
    let unit = session.unit(args.axis)?;
    unit.disable()?;
    println!("✅ 轴 {} 已失能", args.axis);
    Ok(())
}

/// 停止命令参数
#[derive(Args, Debug)]
pub struct StopCommand {
    #[command(flatten)]
    pub target: AxisArgs,

    /// 急停：停止后立即失能
    #[arg(short, long)]
    pub emergency: bool,
}

impl StopCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let unit = session.unit(self.target.axis)?;
        if self.emergency {
            println!("🛑 急停（停止 + 失能）...");
            unit.emergency_stop()?;
        } else {
            println!("🛑 停止运动...");
            unit.stop()?;
        }
        println!("✅ 轴 {} 已停止", self.target.axis);
        Ok(())
    }
}
