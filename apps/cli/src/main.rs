//! # UCP CLI
//!
//! 通过桥接板控制 ZDT 驱动单元的命令行工具。每条命令独立完成
//! 连接 → 执行 → 断开。
//!
//! ```bash
//! # 配置默认串口与限位目录
//! ucp-cli config set --port /dev/ttyACM0 --config-dir ./config
//!
//! ucp-cli enable -a 1
//! ucp-cli move -a 1 30 --speed 200 --wait
//! ucp-cli sync-move 1:10,2:-5 --speed 150
//! ucp-cli traj run path.json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod validation;

use commands::{
    AxisArgs, CliConfig, ConfigCommand, ConnectionArgs, HomeCommand, MoveCommand,
    PositionCommand, Session, SpeedCommand, StatusCommand, StopCommand, SyncMoveCommand,
    TrajCommand,
};

/// UCP CLI - 驱动单元命令行工具
#[derive(Parser, Debug)]
#[command(name = "ucp-cli")]
#[command(about = "Command-line interface for UCP drive units", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 列出可用串口
    Ports,

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 使能
    Enable(AxisArgs),

    /// 失能
    Disable(AxisArgs),

    /// 停止运动（--emergency 同时失能）
    Stop(StopCommand),

    /// 位置模式移动
    Move(MoveCommand),

    /// 速度模式
    Speed(SpeedCommand),

    /// 查询关节位置
    Position(PositionCommand),

    /// 查询电机状态、温度与电压
    Status(StatusCommand),

    /// 回零
    Home(HomeCommand),

    /// Y42 多轴同步位置移动
    SyncMove(SyncMoveCommand),

    /// 轨迹上传 / 执行 / 停止 / 状态
    #[command(subcommand)]
    Traj(TrajCommand),
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,ucp_cli=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let session = || -> Result<Session> {
        Ok(Session::new(cli.connection.clone(), CliConfig::load()?))
    };

    match cli.command {
        Commands::Ports => commands::ports::list_ports(),
        Commands::Config(cmd) => cmd.execute(),
        Commands::Enable(ref args) => commands::axis::enable(args, &session()?),
        Commands::Disable(ref args) => commands::axis::disable(args, &session()?),
        Commands::Stop(ref cmd) => cmd.execute(&session()?),
        Commands::Move(ref cmd) => cmd.execute(&session()?),
        Commands::Speed(ref cmd) => cmd.execute(&session()?),
        Commands::Position(ref cmd) => cmd.execute(&session()?),
        Commands::Status(ref cmd) => cmd.execute(&session()?),
        Commands::Home(ref cmd) => cmd.execute(&session()?),
        Commands::SyncMove(ref cmd) => cmd.execute(&session()?),
        Commands::Traj(cmd) => {
            let session = session()?;
            cmd.execute(&session)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_move_with_global_port() {
        let cli = Cli::try_parse_from(["ucp-cli", "move", "-a", "2", "-15.5", "--port", "COM3"])
            .unwrap();
        assert_eq!(cli.connection.port.as_deref(), Some("COM3"));
        match cli.command {
            Commands::Move(cmd) => {
                assert_eq!(cmd.axis, 2);
                assert_eq!(cmd.angle, -15.5);
                assert!(!cmd.relative);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_traj_run() {
        let cli = Cli::try_parse_from(["ucp-cli", "traj", "run", "path.json", "--interval", "50"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Traj(TrajCommand::Run { interval: 50, .. })));
    }

    #[test]
    fn test_trapezoid_flags_require_trapezoid() {
        assert!(Cli::try_parse_from(["ucp-cli", "move", "10", "--accel", "500"]).is_err());
        assert!(
            Cli::try_parse_from(["ucp-cli", "move", "10", "--trapezoid", "--accel", "500"]).is_ok()
        );
    }
}
