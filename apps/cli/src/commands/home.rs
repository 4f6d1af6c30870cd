//! 回零命令

use super::connection::Session;
use anyhow::{Result, bail};
use clap::Args;
use std::time::Duration;
use ucp_sdk::DriveUnitOps;
use ucp_sdk::client::DEFAULT_HOMING_MODE;
use ucp_sdk::client::unit::DEFAULT_HOMING_POLL;

/// 回零命令参数
#[derive(Args, Debug)]
pub struct HomeCommand {
    /// 轴号（1-6）
    #[arg(short, long, default_value_t = 1)]
    pub axis: u8,

    /// 回零模式（0-5）
    #[arg(short, long, default_value_t = DEFAULT_HOMING_MODE)]
    pub mode: u8,

    /// 等待回零完成
    #[arg(short, long)]
    pub wait: bool,

    /// 等待超时（秒）
    #[arg(short, long, default_value_t = 30.0)]
    pub timeout: f64,

    /// 中止正在进行的回零
    #[arg(long, conflicts_with_all = ["wait", "mode"])]
    pub abort: bool,
}

impl HomeCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let unit = session.unit(self.axis)?;
        if self.abort {
            unit.force_stop_homing()?;
            println!("🛑 已中止回零");
            return Ok(());
        }

        println!("🏠 轴 {} 回零（模式 {}）...", self.axis, self.mode);
        unit.trigger_homing(self.mode)?;
        if !self.wait {
            println!("✅ 回零已触发");
            return Ok(());
        }

        let timeout = Duration::from_secs_f64(self.timeout.max(0.0));
        if unit.wait_for_homing(timeout, DEFAULT_HOMING_POLL)? {
            println!("✅ 回零完成");
            Ok(())
        } else {
            bail!("回零未在 {:.1}s 内完成", self.timeout)
        }
    }
}
