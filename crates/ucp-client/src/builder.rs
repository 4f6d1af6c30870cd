//! DriveUnit / Synchronizer 构建器
//!
//! 默认从全局连接池获取串口客户端，`DriveUnit` 析构时自动归还引用。

use crate::config::{ConfigContext, ConfigSources};
use crate::error::ControlError;
use crate::sync::Synchronizer;
use crate::trajectory::TrajectoryPlayer;
use crate::unit::{DriveUnit, UnitTimeouts};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use ucp_driver::{ConnectionPool, RetryPolicy, SharedClient};
use ucp_serial::DEFAULT_BAUD_RATE;

/// 连接池引用
#[derive(Clone)]
pub enum PoolRef {
    Global,
    Owned(Arc<ConnectionPool>),
}

impl PoolRef {
    pub fn get(&self) -> &ConnectionPool {
        match self {
            PoolRef::Global => ConnectionPool::global(),
            PoolRef::Owned(pool) => pool,
        }
    }
}

/// 持有期间占用一份连接池引用计数
pub(crate) struct PoolLease {
    pool: PoolRef,
    port: String,
    baud_rate: u32,
}

impl PoolLease {
    fn acquire(
        pool: PoolRef,
        port: &str,
        baud_rate: u32,
        axis: u8,
    ) -> Result<(Self, SharedClient), ControlError> {
        let client = pool
            .get()
            .acquire(port, baud_rate)
            .map_err(|e| ControlError::from_driver(axis, "connect", e))?;
        Ok((
            Self {
                pool,
                port: port.to_string(),
                baud_rate,
            },
            client,
        ))
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        debug!(port = %self.port, baud_rate = self.baud_rate, "releasing pooled connection");
        self.pool.get().release(&self.port, self.baud_rate);
    }
}

/// 构建器
///
/// ```no_run
/// use ucp_client::{DriveUnitBuilder, DriveUnitOps};
///
/// let unit = DriveUnitBuilder::new()
///     .port("/dev/ttyACM0")
///     .axis(1)
///     .config_dir("./config")
///     .build()?;
/// unit.enable()?;
/// unit.move_to_position(30.0, 200.0, true)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct DriveUnitBuilder {
    port: Option<String>,
    baud_rate: Option<u32>,
    axis: u8,
    config: Option<Arc<ConfigContext>>,
    config_dir: Option<PathBuf>,
    pool: PoolRef,
    client: Option<SharedClient>,
    read_policy: RetryPolicy,
    timeouts: UnitTimeouts,
    ack_candidates: usize,
}

impl DriveUnitBuilder {
    pub fn new() -> Self {
        Self {
            port: None,
            baud_rate: None,
            axis: 1,
            config: None,
            config_dir: None,
            pool: PoolRef::Global,
            client: None,
            read_policy: RetryPolicy::default(),
            timeouts: UnitTimeouts::default(),
            ack_candidates: crate::sync::DEFAULT_ACK_CANDIDATES,
        }
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// 默认 115200
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    pub fn axis(mut self, axis: u8) -> Self {
        self.axis = axis;
        self
    }

    /// 共享配置上下文（优先于 `config_dir`）
    pub fn config(mut self, config: Arc<ConfigContext>) -> Self {
        self.config = Some(config);
        self
    }

    /// 从目录加载 `joint_limits.json` / `motor_config.json`
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// 使用独立连接池（默认全局池）
    pub fn pool(mut self, pool: Arc<ConnectionPool>) -> Self {
        self.pool = PoolRef::Owned(pool);
        self
    }

    /// 直接使用已有客户端，不经过连接池
    pub fn client(mut self, client: SharedClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn read_policy(mut self, policy: RetryPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    pub fn timeouts(mut self, timeouts: UnitTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Y42 应答回退时最多尝试的轴数（含首选轴，限定在 1..=2）
    pub fn ack_candidates(mut self, count: usize) -> Self {
        self.ack_candidates = count.clamp(1, crate::sync::DEFAULT_ACK_CANDIDATES);
        self
    }

    fn resolve_config(&self) -> Result<Arc<ConfigContext>, ControlError> {
        if let Some(config) = &self.config {
            return Ok(config.clone());
        }
        match &self.config_dir {
            Some(dir) => Ok(Arc::new(ConfigContext::load(ConfigSources::from_dir(dir))?)),
            None => {
                warn!("no config directory given, joint limits disabled");
                Ok(Arc::new(ConfigContext::default()))
            },
        }
    }

    fn resolve_client(&self, axis: u8) -> Result<(SharedClient, Option<PoolLease>), ControlError> {
        if let Some(client) = &self.client {
            return Ok((client.clone(), None));
        }
        let port = match &self.port {
            Some(port) => port.clone(),
            None => ucp_driver::detect_port()
                .map_err(|e| ControlError::from_driver(axis, "connect", e))?,
        };
        let baud_rate = self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
        let (lease, client) = PoolLease::acquire(self.pool.clone(), &port, baud_rate, axis)?;
        Ok((client, Some(lease)))
    }

    /// 构建单轴控制器
    pub fn build(self) -> Result<DriveUnit, ControlError> {
        let config = self.resolve_config()?;
        let (client, lease) = self.resolve_client(self.axis)?;
        let unit = DriveUnit::new(self.axis, client, config)?
            .with_read_policy(self.read_policy)
            .with_timeouts(self.timeouts);
        Ok(match lease {
            Some(lease) => unit.with_lease(lease),
            None => unit,
        })
    }

    /// 构建多轴同步器（共享同一串口）
    pub fn build_synchronizer(self) -> Result<Synchronizer, ControlError> {
        let config = self.resolve_config()?;
        let (client, lease) = self.resolve_client(ucp_protocol::BROADCAST_AXIS)?;
        let sync = Synchronizer::new(client, config).with_ack_candidates(self.ack_candidates);
        Ok(match lease {
            Some(lease) => sync.with_lease(lease),
            None => sync,
        })
    }

    /// 构建轨迹播放器
    pub fn build_trajectory_player(self) -> Result<TrajectoryPlayer, ControlError> {
        let config = self.resolve_config()?;
        let (client, lease) = self.resolve_client(ucp_protocol::BROADCAST_AXIS)?;
        let player = TrajectoryPlayer::new(client, config);
        Ok(match lease {
            Some(lease) => player.with_lease(lease),
            None => player,
        })
    }
}

impl Default for DriveUnitBuilder {
    fn default() -> Self {
        Self::new()
    }
}
