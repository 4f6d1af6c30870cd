//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use ucp_sdk::prelude::*;
//! ```

pub use crate::client::{
    ConfigContext, ControlError, DriveUnit, DriveUnitBuilder, DriveUnitOps, PlayerState,
    SyncOptions, SyncOutcome, Synchronizer, TrajectoryPlayer,
};
pub use crate::driver::{DriverError, SharedClient};
pub use crate::protocol::{ProtocolError, TrajectoryPoint};
pub use crate::serial::SerialError;
