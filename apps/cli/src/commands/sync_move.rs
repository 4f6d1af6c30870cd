//! Y42 多轴同步移动命令

use super::connection::Session;
use crate::validation::parse_targets;
use anyhow::{Result, bail};
use clap::Args;
use ucp_sdk::{SyncOptions, SyncOutcome};

/// 同步移动命令参数
#[derive(Args, Debug)]
pub struct SyncMoveCommand {
    /// 目标列表 `轴:角度`（如 1:10,2:-5.5）
    #[arg(allow_hyphen_values = true)]
    pub targets: String,

    /// 电机端速度（RPM）
    #[arg(short, long, default_value_t = 100.0)]
    pub speed: f64,

    /// 相对当前位置移动
    #[arg(short, long)]
    pub relative: bool,

    /// 首选应答轴
    #[arg(long)]
    pub ack: Option<u8>,

    /// 应答超时视为失败（诊断用）
    #[arg(long)]
    pub strict: bool,
}

impl SyncMoveCommand {
    fn options(&self) -> SyncOptions {
        let options = if self.strict {
            SyncOptions::diagnostic()
        } else {
            SyncOptions::motion()
        };
        match self.ack {
            Some(axis) => options.preferred_ack(axis),
            None => options,
        }
    }

    pub fn execute(&self, session: &Session) -> Result<()> {
        let targets = parse_targets(&self.targets)?;
        if !(self.speed.is_finite() && self.speed > 0.0) {
            bail!("速度必须为正数: {}", self.speed);
        }

        let sync = session.synchronizer()?;
        for (axis, angle) in &targets {
            println!("  J{axis} → {angle:.2}°");
        }
        match sync.sync_position_with(&targets, self.speed, !self.relative, self.options())? {
            SyncOutcome::Acknowledged { axis } => println!("✅ 同步指令已确认（应答轴 {axis}）"),
            SyncOutcome::Unacknowledged => println!("⚠️ 同步指令已发送，但没有轴应答"),
        }
        Ok(())
    }
}
