//! 命令定义和实现

pub mod axis;
pub mod config;
pub mod connection;
pub mod home;
pub mod r#move;
pub mod ports;
pub mod position;
pub mod speed;
pub mod status;
pub mod sync_move;
pub mod traj;

pub use axis::{AxisArgs, StopCommand};
pub use config::{CliConfig, ConfigCommand};
pub use connection::{ConnectionArgs, Session};
pub use home::HomeCommand;
pub use r#move::MoveCommand;
pub use position::PositionCommand;
pub use speed::SpeedCommand;
pub use status::StatusCommand;
pub use sync_move::SyncMoveCommand;
pub use traj::TrajCommand;
