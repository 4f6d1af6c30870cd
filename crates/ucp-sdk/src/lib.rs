//! UCP SDK - ZDT 步进伺服驱动单元 Rust SDK
//!
//! 主机通过 USB 串口连接桥接板，桥接板再把 UCP 请求转发到各轴驱动器。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **串口层** (`serial`): 字节链路抽象，真实串口与模拟链路
//! - **协议层** (`protocol`): UCP 帧、ZDT 指令、Y42 聚合帧、轨迹点编码
//! - **驱动层** (`driver`): 请求/响应交换、连接池、错误分类与重试
//! - **客户端层** (`client`): 单轴控制、限位守卫、多轴同步、轨迹播放
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use ucp_sdk::prelude::*;
//!
//! ucp_sdk::init_logger();
//! let unit = DriveUnitBuilder::new().port("/dev/ttyACM0").axis(1).build()?;
//! unit.enable()?;
//! unit.move_to_position(15.0, 300.0, true)?;
//! # Ok::<(), ControlError>(())
//! ```

pub use ucp_client as client;
pub use ucp_driver as driver;
pub use ucp_protocol as protocol;
pub use ucp_serial as serial;

mod logging;
pub mod prelude;

pub use logging::{LoggerError, init_logger, try_init_logger};

// 客户端层（推荐入口）
pub use client::{
    ConfigContext, ControlError, DriveUnit, DriveUnitBuilder, DriveUnitOps, JointLimitGuard,
    JointLimits, MotorConfig, PlayerState, SafeMotion, SyncOptions, SyncOutcome, Synchronizer,
    TrajectoryPlayer,
};

// 驱动层
pub use driver::{ConnectionPool, DriverError, RetryPolicy, UcpClient, UcpClientBuilder};

// 协议层
pub use protocol::{Opcode, ProtocolError, Request, Response, TrajectoryPoint};

// 串口层
pub use serial::{DEFAULT_BAUD_RATE, SerialError, SerialLink};
