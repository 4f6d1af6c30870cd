//! 配置管理命令
//!
//! CLI 配置保存在 `<config_dir>/ucp/config.toml`，可用 `UCP_CLI_CONFIG` 覆盖路径。

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use ucp_sdk::client::{ConfigContext, ConfigSources};

/// 覆盖配置文件路径的环境变量
pub const CONFIG_ENV: &str = "UCP_CLI_CONFIG";

/// 配置文件路径
pub fn config_file() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("ucp");
    path.push("config.toml");
    Ok(path)
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// 默认串口
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// 默认波特率
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,

    /// `joint_limits.json` / `motor_config.json` 所在目录
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,
}

impl CliConfig {
    /// 加载配置（文件不存在时返回默认值）
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, format!("# UCP CLI Configuration\n\n{content}"))
            .context("写入配置文件失败")?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(match key {
            "port" => self.port.clone(),
            "baud_rate" | "baud" => self.baud_rate.map(|b| b.to_string()),
            "config_dir" => self.config_dir.as_ref().map(|p| p.display().to_string()),
            other => bail!("未知配置项: {other}"),
        })
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 默认串口（如 /dev/ttyACM0, COM3）
        #[arg(long)]
        port: Option<String>,

        /// 默认波特率
        #[arg(long)]
        baud: Option<u32>,

        /// 关节限位 / 电机配置目录
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称（port / baud_rate / config_dir / all）
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置：配置文件与关节限位文件是否可加载
    Check,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Set {
                port,
                baud,
                config_dir,
            } => Self::set_(port, baud, config_dir),
            ConfigCommand::Get { key } => Self::get_(&key),
            ConfigCommand::Check => Self::check_(),
        }
    }

    fn set_(port: Option<String>, baud: Option<u32>, config_dir: Option<PathBuf>) -> Result<()> {
        if port.is_none() && baud.is_none() && config_dir.is_none() {
            bail!("至少指定一个配置项（--port / --baud / --config-dir）");
        }
        let mut config = CliConfig::load()?;
        if let Some(port) = port {
            println!("✅ 设置默认串口: {port}");
            config.port = Some(port);
        }
        if let Some(baud) = baud {
            println!("✅ 设置默认波特率: {baud}");
            config.baud_rate = Some(baud);
        }
        if let Some(dir) = config_dir {
            println!("✅ 设置配置目录: {}", dir.display());
            config.config_dir = Some(dir);
        }
        config.save()
    }

    fn get_(key: &str) -> Result<()> {
        let config = CliConfig::load()?;
        if key == "all" {
            println!("UCP CLI 配置:");
            println!("  串口: {:?}", config.port);
            println!("  波特率: {:?}", config.baud_rate);
            println!("  配置目录: {:?}", config.config_dir);
            return Ok(());
        }
        match config.get(key)? {
            Some(value) => println!("{value}"),
            None => println!("(未设置)"),
        }
        Ok(())
    }

    fn check_() -> Result<()> {
        let path = config_file()?;
        let config = CliConfig::load_from(&path)?;
        println!("配置文件: {}", path.display());
        println!("  串口: {:?}", config.port);
        println!("  波特率: {:?}", config.baud_rate);

        match &config.config_dir {
            Some(dir) => {
                let context = ConfigContext::load(ConfigSources::from_dir(dir))
                    .with_context(|| format!("加载配置目录失败: {}", dir.display()))?;
                match context.joint_limits() {
                    Some(limits) => {
                        println!("  关节限位:");
                        for (i, limit) in limits.as_array().iter().enumerate() {
                            println!("    J{}: [{:.1}°, {:.1}°]", i + 1, limit.min, limit.max);
                        }
                    },
                    None => println!("  ⚠️ 未找到关节限位，限位检查将被跳过"),
                }
            },
            None => println!("  ⚠️ 未设置配置目录，使用默认减速比且不检查限位"),
        }
        Ok(())
    }
}
