//! # UCP Client
//!
//! 驱动单元的用户接口层：
//!
//! - [`DriveUnitOps`] / [`DriveUnit`]：单轴控制、读取与参数操作（物理单位：度、RPM、mA）
//! - [`JointLimitGuard`]：所有携带目标位置的指令在发送前都经过关节限位检查
//! - [`Synchronizer`]：Y42 多轴聚合同步（带应答轴回退）
//! - [`TrajectoryPlayer`]：轨迹抽稀、分批上传与播放状态机
//! - [`ConfigContext`]：关节限位与减速比配置（无锁读取，显式重载）
//!
//! 串口连接默认来自 [`ConnectionPool::global`](ucp_driver::ConnectionPool::global)，
//! 同一串口上的多个轴共享一个客户端。

pub mod builder;
pub mod config;
pub mod error;
pub mod guard;
pub mod sync;
pub mod trajectory;
pub mod unit;

pub use builder::{DriveUnitBuilder, PoolRef};
pub use config::{
    AxisConfig, ConfigContext, ConfigError, ConfigSnapshot, ConfigSources, JointLimit,
    JointLimits, MotorConfig,
};
pub use error::{ControlError, Fault};
pub use guard::{JointLimitGuard, LimitViolation};
pub use sync::{SyncOptions, SyncOutcome, Synchronizer};
pub use trajectory::{
    PlayerState, StatusWatcher, TrajectoryPlayer, TrajectoryProgress, UploadReport,
};
pub use unit::{DEFAULT_HOMING_MODE, DriveUnit, DriveUnitOps, SafeMotion, UnitTimeouts};
