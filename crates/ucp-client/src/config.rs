//! 关节限位与电机配置
//!
//! [`ConfigContext`] 持有当前配置快照（`ArcSwap`，读无锁），
//! 只有显式调用 [`ConfigContext::reload`] 才会重新读取文件。
//!
//! ## 文件格式
//!
//! 关节限位（`joint_limits.json` 或 `dh_parameters_config.json`）：
//!
//! ```json
//! { "joint_limits": { "1": [-180, 180], "2": [-90, 90], "3": [-90, 90],
//!                     "4": [-180, 180], "5": [-90, 90], "6": [-180, 180] } }
//! ```
//!
//! `joint_limits` 可以嵌套在任意层级，也可以是 6 个 `[min, max]` 组成的数组。
//! `min > max` 时自动交换。
//!
//! 电机配置（`motor_config.json`），缺省的轴沿用默认值：
//!
//! ```json
//! { "motor_reducer_ratios": { "1": 50.0 }, "motor_directions": { "1": -1 } }
//! ```

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

/// 关节数
pub const AXIS_COUNT: usize = 6;

const DEFAULT_RATIOS: [f64; AXIS_COUNT] = [50.0, 50.0, 50.0, 30.0, 30.0, 30.0];
const DEFAULT_DIRECTIONS: [i8; AXIS_COUNT] = [-1, 1, 1, -1, -1, 1];

pub const JOINT_LIMITS_FILE: &str = "joint_limits.json";
pub const DH_PARAMETERS_FILE: &str = "dh_parameters_config.json";
pub const MOTOR_CONFIG_FILE: &str = "motor_config.json";

/// 配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 单个关节的角度范围（度，闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    pub min: f64,
    pub max: f64,
}

impl JointLimit {
    /// 反序的边界自动交换
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { min: a, max: b }
        } else {
            Self { min: b, max: a }
        }
    }

    pub fn contains(&self, angle_deg: f64) -> bool {
        angle_deg >= self.min && angle_deg <= self.max
    }
}

/// 6 个关节的限位
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits([JointLimit; AXIS_COUNT]);

impl JointLimits {
    pub fn new(limits: [JointLimit; AXIS_COUNT]) -> Self {
        Self(limits)
    }

    /// 所有关节使用相同的对称范围 `[-bound, bound]`
    pub fn symmetric(bound: f64) -> Self {
        Self([JointLimit::new(-bound, bound); AXIS_COUNT])
    }

    /// 按轴号（1..=6）取限位
    pub fn get(&self, axis: u8) -> Option<JointLimit> {
        let idx = (axis as usize).checked_sub(1)?;
        self.0.get(idx).copied()
    }

    pub fn as_array(&self) -> &[JointLimit; AXIS_COUNT] {
        &self.0
    }

    /// 从 JSON 文本解析；文档中没有完整的 6 轴限位时返回 `None`
    pub fn from_json_str(text: &str) -> Result<Option<Self>, ConfigError> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::find_in(&value))
    }

    /// 递归查找 `joint_limits` 键
    fn find_in(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => {
                if let Some(limits) = map.get("joint_limits").and_then(Self::parse_block) {
                    return Some(limits);
                }
                map.values().find_map(Self::find_in)
            },
            Value::Array(items) => items.iter().find_map(Self::find_in),
            _ => None,
        }
    }

    fn parse_block(block: &Value) -> Option<Self> {
        let pairs: Vec<&Value> = match block {
            Value::Object(map) => (1..=AXIS_COUNT)
                .map(|i| map.get(&i.to_string()))
                .collect::<Option<Vec<_>>>()?,
            Value::Array(items) if items.len() == AXIS_COUNT => items.iter().collect(),
            _ => return None,
        };
        let mut limits = [JointLimit::new(0.0, 0.0); AXIS_COUNT];
        for (slot, pair) in limits.iter_mut().zip(pairs) {
            let pair = pair.as_array()?;
            if pair.len() != 2 {
                return None;
            }
            *slot = JointLimit::new(pair[0].as_f64()?, pair[1].as_f64()?);
        }
        Some(Self(limits))
    }
}

/// 单轴电机参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// 减速比（电机端角度 / 关节角度）
    pub reducer_ratio: f64,
    /// 方向（±1）
    pub direction: i8,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            reducer_ratio: 1.0,
            direction: 1,
        }
    }
}

impl AxisConfig {
    fn factor(&self) -> f64 {
        self.reducer_ratio * self.direction as f64
    }
}

/// 电机配置（减速比与方向）
///
/// - 关节 → 电机：`drive = joint × ratio × dir`
/// - 电机 → 关节：`joint = drive / (ratio × dir)`
#[derive(Debug, Clone, PartialEq)]
pub struct MotorConfig {
    axes: BTreeMap<u8, AxisConfig>,
}

impl Default for MotorConfig {
    fn default() -> Self {
        let axes = (1..=AXIS_COUNT as u8)
            .map(|axis| {
                let i = axis as usize - 1;
                (
                    axis,
                    AxisConfig {
                        reducer_ratio: DEFAULT_RATIOS[i],
                        direction: DEFAULT_DIRECTIONS[i],
                    },
                )
            })
            .collect();
        Self { axes }
    }
}

#[derive(Debug, Default, Deserialize)]
struct MotorConfigFile {
    #[serde(default)]
    motor_reducer_ratios: BTreeMap<String, f64>,
    #[serde(default)]
    motor_directions: BTreeMap<String, f64>,
}

impl MotorConfig {
    /// 所有轴减速比 1、方向 1
    pub fn identity() -> Self {
        Self {
            axes: BTreeMap::new(),
        }
    }

    /// 未配置的轴返回减速比 1、方向 1
    pub fn axis(&self, axis: u8) -> AxisConfig {
        self.axes.get(&axis).copied().unwrap_or_default()
    }

    pub fn set_axis(&mut self, axis: u8, config: AxisConfig) {
        self.axes.insert(axis, config);
    }

    pub fn joint_to_drive(&self, axis: u8, joint_deg: f64) -> f64 {
        joint_deg * self.axis(axis).factor()
    }

    pub fn drive_to_joint(&self, axis: u8, drive_deg: f64) -> f64 {
        drive_deg / self.axis(axis).factor()
    }

    /// 在默认值上叠加 JSON 中的字段
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let file: MotorConfigFile = serde_json::from_str(text)?;
        let mut config = Self::default();
        for (key, ratio) in file.motor_reducer_ratios {
            let axis = parse_axis_key(&key)?;
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "reducer ratio for axis {axis} must be positive, got {ratio}"
                )));
            }
            config.axes.entry(axis).or_default().reducer_ratio = ratio;
        }
        for (key, dir) in file.motor_directions {
            let axis = parse_axis_key(&key)?;
            config.axes.entry(axis).or_default().direction = if dir < 0.0 { -1 } else { 1 };
        }
        Ok(config)
    }
}

fn parse_axis_key(key: &str) -> Result<u8, ConfigError> {
    match key.trim().parse::<u8>() {
        Ok(axis) if axis > 0 => Ok(axis),
        _ => Err(ConfigError::Invalid(format!("invalid axis key {key:?}"))),
    }
}

/// 配置文件位置
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    pub joint_limits: Option<PathBuf>,
    pub motor_config: Option<PathBuf>,
}

impl ConfigSources {
    /// 在目录中查找 `joint_limits.json`（优先）/ `dh_parameters_config.json` 与 `motor_config.json`
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let joint_limits = [JOINT_LIMITS_FILE, DH_PARAMETERS_FILE]
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file());
        let motor_config = Some(dir.join(MOTOR_CONFIG_FILE)).filter(|p| p.is_file());
        Self {
            joint_limits,
            motor_config,
        }
    }
}

/// 配置快照（不可变）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    /// `None` 表示未配置限位，限位检查被跳过
    pub joint_limits: Option<JointLimits>,
    pub motor: MotorConfig,
}

impl ConfigSnapshot {
    fn load(sources: &ConfigSources) -> Result<Self, ConfigError> {
        let joint_limits = match read_optional(sources.joint_limits.as_deref())? {
            Some(text) => JointLimits::from_json_str(&text)?,
            None => None,
        };
        let motor = match read_optional(sources.motor_config.as_deref())? {
            Some(text) => MotorConfig::from_json_str(&text)?,
            None => MotorConfig::default(),
        };
        Ok(Self {
            joint_limits,
            motor,
        })
    }
}

/// 文件不存在视为未配置
fn read_optional(path: Option<&Path>) -> Result<Option<String>, ConfigError> {
    let Some(path) = path else {
        return Ok(None);
    };
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, using defaults");
            Ok(None)
        },
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// 共享配置上下文
#[derive(Debug)]
pub struct ConfigContext {
    sources: ConfigSources,
    current: ArcSwap<ConfigSnapshot>,
    missing_limits_warned: AtomicBool,
}

impl Default for ConfigContext {
    fn default() -> Self {
        Self::from_snapshot(ConfigSnapshot::default())
    }
}

impl ConfigContext {
    /// 从文件加载
    pub fn load(sources: ConfigSources) -> Result<Self, ConfigError> {
        let snapshot = ConfigSnapshot::load(&sources)?;
        info!(
            joint_limits = snapshot.joint_limits.is_some(),
            sources = ?sources,
            "configuration loaded"
        );
        Ok(Self {
            sources,
            current: ArcSwap::from_pointee(snapshot),
            missing_limits_warned: AtomicBool::new(false),
        })
    }

    /// 内存配置（不关联文件，`reload` 保持不变）
    pub fn from_snapshot(snapshot: ConfigSnapshot) -> Self {
        Self {
            sources: ConfigSources::default(),
            current: ArcSwap::from_pointee(snapshot),
            missing_limits_warned: AtomicBool::new(false),
        }
    }

    pub fn with_limits(joint_limits: JointLimits, motor: MotorConfig) -> Self {
        Self::from_snapshot(ConfigSnapshot {
            joint_limits: Some(joint_limits),
            motor,
        })
    }

    /// 重新读取配置文件；失败时保留当前快照
    pub fn reload(&self) -> Result<(), ConfigError> {
        if self.sources == ConfigSources::default() {
            return Ok(());
        }
        let snapshot = ConfigSnapshot::load(&self.sources)?;
        self.current.store(Arc::new(snapshot));
        self.missing_limits_warned.store(false, Ordering::Relaxed);
        info!("configuration reloaded");
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn joint_limits(&self) -> Option<JointLimits> {
        self.current.load().joint_limits
    }

    pub fn motor(&self) -> MotorConfig {
        self.current.load().motor.clone()
    }

    /// 替换限位（运行时调整）
    pub fn set_joint_limits(&self, joint_limits: Option<JointLimits>) {
        let mut next = (*self.snapshot()).clone();
        next.joint_limits = joint_limits;
        self.current.store(Arc::new(next));
    }

    pub fn set_motor_config(&self, motor: MotorConfig) {
        let mut next = (*self.snapshot()).clone();
        next.motor = motor;
        self.current.store(Arc::new(next));
    }

    pub fn sources(&self) -> &ConfigSources {
        &self.sources
    }

    /// 限位缺失时只警告一次
    pub(crate) fn warn_missing_limits_once(&self) {
        if !self.missing_limits_warned.swap(true, Ordering::Relaxed) {
            warn!("joint limits not configured, limit check skipped");
        }
    }
}
