//! 状态查询命令

use super::connection::Session;
use anyhow::Result;
use clap::Args;
use ucp_sdk::DriveUnitOps;

/// 状态查询命令参数
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// 轴号（1-6）
    #[arg(short, long, default_value_t = 1)]
    pub axis: u8,
}

fn mark(flag: bool) -> &'static str {
    if flag { "✅" } else { "—" }
}

impl StatusCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let unit = session.unit(self.axis)?;
        let flags = unit.get_status()?;
        println!("📊 轴 {} 状态:", self.axis);
        println!("  使能:     {}", mark(flags.enabled()));
        println!("  到位:     {}", mark(flags.in_position()));
        println!("  堵转:     {}", mark(flags.stall_detected()));
        println!("  堵转保护: {}", mark(flags.stall_protection()));

        match unit.get_temperature() {
            Ok(t) => println!("  温度:     {t:.1} °C"),
            Err(e) => println!("  温度:     ❌ {e}"),
        }
        match unit.get_bus_voltage() {
            Ok(v) => println!("  总线电压: {v:.2} V"),
            Err(e) => println!("  总线电压: ❌ {e}"),
        }
        match unit.get_version() {
            Ok(v) => println!("  固件:     {} / 硬件 {}", v.firmware(), v.hardware()),
            Err(e) => println!("  固件:     ❌ {e}"),
        }
        Ok(())
    }
}
