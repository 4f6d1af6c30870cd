//! 轨迹命令
//!
//! `run` 在同一进程内上传并执行，运行期间 Ctrl-C 会发送轨迹停止。

use super::connection::Session;
use crate::validation::load_trajectory;
use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;
use ucp_sdk::{PlayerState, TrajectoryPlayer};

/// 轨迹文件参数
#[derive(Args, Debug)]
pub struct TrajectoryFile {
    /// JSON 轨迹文件：`[{interval_ms, positions[6], speeds[6]}, ...]`
    pub file: PathBuf,

    /// 点内未给出速度时使用的速度（RPM）
    #[arg(long, default_value_t = 100.0)]
    pub default_speed: f64,
}

/// 轨迹命令
#[derive(Subcommand, Debug)]
pub enum TrajCommand {
    /// 上传轨迹
    Upload {
        #[command(flatten)]
        file: TrajectoryFile,
    },

    /// 上传并执行轨迹，等待播放结束
    Run {
        #[command(flatten)]
        file: TrajectoryFile,

        /// 状态轮询间隔（毫秒）
        #[arg(long, default_value_t = 200)]
        interval: u64,

        /// 最长等待（秒）
        #[arg(short, long, default_value_t = 120.0)]
        timeout: f64,
    },

    /// 停止轨迹播放
    Stop,

    /// 查询设备端轨迹状态
    Status,
}

impl TrajCommand {
    pub fn execute(self, session: &Session) -> Result<()> {
        match self {
            TrajCommand::Upload { file } => {
                let player = session.player()?;
                upload(&player, &file)
            },
            TrajCommand::Run {
                file,
                interval,
                timeout,
            } => {
                let player = Arc::new(session.player()?);
                let interrupted = install_stop_handler(&player)?;
                upload(&player, &file)?;
                if interrupted.load(Ordering::Acquire) {
                    bail!("已被 Ctrl-C 中断");
                }
                run(&player, Duration::from_millis(interval.max(10)), timeout)
            },
            TrajCommand::Stop => {
                let player = session.player()?;
                player.stop()?;
                println!("🛑 轨迹已停止");
                Ok(())
            },
            TrajCommand::Status => {
                let player = session.player()?;
                let progress = player.poll_status()?;
                let device = progress.device;
                println!("📊 轨迹状态:");
                println!("  设备状态: {:?}", device.state);
                println!("  进度:     {}/{}", progress.current_index, progress.total_points);
                println!(
                    "  Y42:      状态 {} 错误码 0x{:04X}（成功 {} / 失败 {}）",
                    device.last_y42_status,
                    device.last_y42_err_code,
                    device.y42_success_count,
                    device.y42_fail_count
                );
                Ok(())
            },
        }
    }
}

fn upload(player: &TrajectoryPlayer, file: &TrajectoryFile) -> Result<()> {
    let points = load_trajectory(&file.file, file.default_speed)?;
    println!("⏫ 上传 {} 个轨迹点...", points.len());
    let report = player.upload(&points)?;
    if report.uploaded_points < report.original_points {
        println!(
            "  抽稀: {} → {} 个点",
            report.original_points, report.uploaded_points
        );
    }
    if report.single_mode {
        println!("  ⚠️ 设备不支持批量上传，已使用单点模式");
    }
    println!("✅ 上传完成（{} 次请求）", report.requests);
    Ok(())
}

/// 注册 Ctrl-C：上传中止于下一批次之前，执行中则停止播放
fn install_stop_handler(player: &Arc<TrajectoryPlayer>) -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    let on_signal = Arc::clone(player);
    ctrlc::set_handler(move || {
        println!("\n🛑 收到 Ctrl-C，停止轨迹...");
        flag.store(true, Ordering::Release);
        if let Err(e) = on_signal.stop() {
            warn!(error = %e, "trajectory stop on Ctrl-C failed");
        }
    })
    .context("注册 Ctrl-C 处理失败")?;
    Ok(interrupted)
}

fn run(player: &Arc<TrajectoryPlayer>, interval: Duration, timeout: f64) -> Result<()> {
    player.execute()?;
    println!("▶️ 轨迹开始执行");

    let deadline = Instant::now() + Duration::from_secs_f64(timeout.max(0.0));
    let watcher = player.spawn_watcher(interval);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Ok(update) = watcher.receiver().recv_timeout(remaining) else {
            break;
        };
        let progress = update?;
        println!("  {}/{}  [{}]", progress.current_index, progress.total_points, progress.state);
        if progress.state.is_terminal() {
            break;
        }
    }
    drop(watcher);

    match player.state() {
        PlayerState::Completed => {
            println!("✅ 轨迹执行完成");
            Ok(())
        },
        PlayerState::Stopped => {
            println!("🛑 轨迹已被停止");
            Ok(())
        },
        PlayerState::Error => bail!("设备报告轨迹执行错误"),
        PlayerState::Running => {
            player.stop()?;
            bail!("等待轨迹结束超时（{timeout:.1}s），已发送停止")
        },
        other => bail!("意外的播放状态: {other}"),
    }
}
