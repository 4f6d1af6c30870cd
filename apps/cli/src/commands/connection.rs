//! 连接参数
//!
//! 命令行参数优先，其次是配置文件；都未指定串口时自动探测。

use super::config::CliConfig;
use crate::validation::validate_axis;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use ucp_sdk::{DriveUnit, DriveUnitBuilder, Synchronizer, TrajectoryPlayer};

/// 通用连接参数
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// 串口（覆盖配置）
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// 波特率（覆盖配置）
    #[arg(short, long, global = true)]
    pub baud: Option<u32>,

    /// 关节限位 / 电机配置目录（覆盖配置）
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
}

/// 一次命令执行的连接上下文
pub struct Session {
    args: ConnectionArgs,
    config: CliConfig,
}

impl Session {
    pub fn new(args: ConnectionArgs, config: CliConfig) -> Self {
        Self { args, config }
    }

    pub fn port(&self) -> Option<&str> {
        self.args.port.as_deref().or(self.config.port.as_deref())
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.args.baud.or(self.config.baud_rate)
    }

    pub fn config_dir(&self) -> Option<&PathBuf> {
        self.args.config_dir.as_ref().or(self.config.config_dir.as_ref())
    }

    fn builder(&self) -> DriveUnitBuilder {
        let mut builder = DriveUnitBuilder::new();
        if let Some(port) = self.port() {
            builder = builder.port(port);
        }
        if let Some(baud) = self.baud_rate() {
            builder = builder.baud_rate(baud);
        }
        if let Some(dir) = self.config_dir() {
            builder = builder.config_dir(dir);
        }
        builder
    }

    /// 打开单轴控制器
    pub fn unit(&self, axis: u8) -> Result<DriveUnit> {
        let axis = validate_axis(axis)?;
        println!("🔌 连接驱动单元 (轴 {axis})...");
        self.builder().axis(axis).build().context("连接驱动单元失败")
    }

    /// 打开多个轴（共享同一串口）
    pub fn units(&self, axes: &[u8]) -> Result<Vec<DriveUnit>> {
        axes.iter()
            .map(|&axis| {
                let axis = validate_axis(axis)?;
                self.builder().axis(axis).build().context("连接驱动单元失败")
            })
            .collect()
    }

    pub fn synchronizer(&self) -> Result<Synchronizer> {
        println!("🔌 连接桥接板...");
        self.builder().build_synchronizer().context("连接桥接板失败")
    }

    pub fn player(&self) -> Result<TrajectoryPlayer> {
        println!("🔌 连接桥接板...");
        self.builder().build_trajectory_player().context("连接桥接板失败")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let config = CliConfig {
            port: Some("/dev/ttyUSB0".into()),
            baud_rate: Some(115_200),
            config_dir: Some("/etc/ucp".into()),
        };
        let args = ConnectionArgs {
            port: Some("/dev/ttyACM1".into()),
            baud: None,
            config_dir: None,
        };
        let session = Session::new(args, config);
        assert_eq!(session.port(), Some("/dev/ttyACM1"));
        assert_eq!(session.baud_rate(), Some(115_200));
        assert_eq!(session.config_dir(), Some(&PathBuf::from("/etc/ucp")));
    }

    #[test]
    fn test_defaults_are_empty() {
        let session = Session::new(ConnectionArgs::default(), CliConfig::default());
        assert_eq!(session.port(), None);
        assert_eq!(session.baud_rate(), None);
        assert!(session.unit(0).is_err());
    }
}
