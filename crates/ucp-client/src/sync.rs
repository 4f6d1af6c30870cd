//! Y42 多轴同步
//!
//! 每次同步操作把所有轴的同类子指令聚合为一个 Y42 帧，作为一次请求发给广播轴 0。
//! 桥接板广播下发后只等待 `expected_ack_axis` 的应答，因此应答轴不在线时
//! 需要换一个轴重试（最多 `ack_candidates` 个）。
//!
//! 旧式"逐轴预加载 + 广播触发"不提供。

use crate::builder::PoolLease;
use crate::config::ConfigContext;
use crate::error::ControlError;
use crate::guard::{JointLimitGuard, LimitViolation};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, error, warn};
use ucp_driver::{RequestOptions, SharedClient};
use ucp_protocol::{
    BROADCAST_AXIS, Command, Opcode, ProtocolError, Response, ZdtBody, build_y42_frame,
    encode_enable, encode_position_direct, encode_speed,
};

/// 默认最多尝试的应答轴数
pub const DEFAULT_ACK_CANDIDATES: usize = 2;

/// Y42 请求超时
pub const SYNC_TIMEOUT_MS: u16 = 2000;

/// 应答候选轴
pub type AckCandidates = SmallVec<[u8; 8]>;

/// 同步下发结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// 指定轴已应答
    Acknowledged { axis: u8 },
    /// 最后一个候选轴应答超时，按放行处理（指令可能已执行）
    Unacknowledged,
}

impl SyncOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, SyncOutcome::Acknowledged { .. })
    }
}

/// 单次同步的选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// 首选应答轴（不在本次轴集合内时忽略）
    pub preferred_ack: Option<u8>,
    /// 最后一个候选轴应答超时是否视为成功
    pub allow_ack_timeout: bool,
    pub timeout_ms: u16,
}

impl SyncOptions {
    /// 运动 / 控制：应答超时放行
    pub fn motion() -> Self {
        Self {
            preferred_ack: None,
            allow_ack_timeout: true,
            timeout_ms: SYNC_TIMEOUT_MS,
        }
    }

    /// 诊断：严格要求应答
    pub fn diagnostic() -> Self {
        Self {
            allow_ack_timeout: false,
            ..Self::motion()
        }
    }

    pub fn preferred_ack(mut self, axis: u8) -> Self {
        self.preferred_ack = Some(axis);
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::motion()
    }
}

/// 多轴同步器
pub struct Synchronizer {
    client: SharedClient,
    guard: JointLimitGuard,
    ack_candidates: usize,
    lease: Option<PoolLease>,
}

impl Synchronizer {
    pub fn new(client: SharedClient, config: Arc<ConfigContext>) -> Self {
        Self {
            client,
            guard: JointLimitGuard::new(config),
            ack_candidates: DEFAULT_ACK_CANDIDATES,
            lease: None,
        }
    }

    /// 应答候选轴数，限定在 1..=2（首选轴之外最多再换一个轴）
    pub fn with_ack_candidates(mut self, count: usize) -> Self {
        self.ack_candidates = count.clamp(1, DEFAULT_ACK_CANDIDATES);
        self
    }

    pub(crate) fn with_lease(mut self, lease: PoolLease) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn client(&self) -> &SharedClient {
        &self.client
    }

    pub fn ack_candidates(&self) -> usize {
        self.ack_candidates
    }

    /// 同步使能 / 失能
    pub fn sync_enable(&self, axes: &[u8], enabled: bool) -> Result<SyncOutcome, ControlError> {
        self.sync_enable_with(axes, enabled, SyncOptions::motion())
    }

    pub fn sync_enable_with(
        &self,
        axes: &[u8],
        enabled: bool,
        options: SyncOptions,
    ) -> Result<SyncOutcome, ControlError> {
        let subs: Vec<(u8, ZdtBody)> = axes.iter().map(|&a| (a, encode_enable(enabled))).collect();
        self.send(&subs, options, "sync_enable")
    }

    /// 同步位置（直通模式）
    ///
    /// `targets` 为 `(轴号, 关节角度)`；全部轴先做限位检查，任一越限则整帧不发送。
    pub fn sync_position(
        &self,
        targets: &[(u8, f64)],
        speed_rpm: f64,
        absolute: bool,
    ) -> Result<SyncOutcome, ControlError> {
        self.sync_position_with(targets, speed_rpm, absolute, SyncOptions::motion())
    }

    pub fn sync_position_with(
        &self,
        targets: &[(u8, f64)],
        speed_rpm: f64,
        absolute: bool,
        options: SyncOptions,
    ) -> Result<SyncOutcome, ControlError> {
        const OP: &str = "sync_position";
        let violations: Vec<LimitViolation> = targets
            .iter()
            .filter_map(|&(axis, joint_deg)| self.guard.check_joint(axis, joint_deg))
            .collect();
        if !violations.is_empty() {
            for v in &violations {
                error!(axis = v.axis, joint_deg = v.joint_deg, "{OP}: {v}");
            }
            return Err(ControlError::LimitViolation {
                operation: OP,
                violations,
            });
        }

        let motor = self.guard.config().motor();
        let subs = targets
            .iter()
            .map(|&(axis, joint_deg)| {
                let drive_deg = motor.joint_to_drive(axis, joint_deg);
                encode_position_direct(drive_deg, speed_rpm, absolute)
                    .map(|body| (axis, body))
                    .map_err(|e| ControlError::invalid(axis, OP, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.send(&subs, options, OP)
    }

    /// 同步速度（电机端 RPM，带符号）
    pub fn sync_speed(&self, speeds: &[(u8, f64)], accel: u16) -> Result<SyncOutcome, ControlError> {
        self.sync_speed_with(speeds, accel, SyncOptions::motion())
    }

    pub fn sync_speed_with(
        &self,
        speeds: &[(u8, f64)],
        accel: u16,
        options: SyncOptions,
    ) -> Result<SyncOutcome, ControlError> {
        const OP: &str = "sync_speed";
        let subs = speeds
            .iter()
            .map(|&(axis, rpm)| {
                encode_speed(rpm, accel as i64)
                    .map(|body| (axis, body))
                    .map_err(|e| ControlError::invalid(axis, OP, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.send(&subs, options, OP)
    }

    /// 按首选轴 + 升序排列应答候选，截断到 `ack_candidates`
    pub fn ack_order(&self, axes: &[u8], preferred: Option<u8>) -> AckCandidates {
        let mut sorted: AckCandidates = axes.iter().copied().collect();
        sorted.sort_unstable();
        sorted.dedup();
        let mut ordered = AckCandidates::new();
        if let Some(p) = preferred
            && sorted.contains(&p)
        {
            ordered.push(p);
        }
        ordered.extend(sorted.into_iter().filter(|a| Some(*a) != preferred));
        ordered.truncate(self.ack_candidates);
        ordered
    }

    /// 发送一组同类子指令
    pub fn send(
        &self,
        subs: &[(u8, ZdtBody)],
        options: SyncOptions,
        operation: &'static str,
    ) -> Result<SyncOutcome, ControlError> {
        if subs.is_empty() {
            return Err(ControlError::invalid(
                BROADCAST_AXIS,
                operation,
                ProtocolError::InvalidValue {
                    field: "axes",
                    value: 0,
                },
            ));
        }
        if !self.client.is_connected() {
            return Err(ControlError::NotConnected {
                axis: BROADCAST_AXIS,
                operation,
            });
        }

        let borrowed: Vec<(u8, &[u8])> = subs.iter().map(|(a, b)| (*a, &b[..])).collect();
        let frame = build_y42_frame(&borrowed)
            .map_err(|e| ControlError::invalid(BROADCAST_AXIS, operation, e))?;
        let axes: AckCandidates = subs.iter().map(|(a, _)| *a).collect();
        let candidates = self.ack_order(&axes, options.preferred_ack);

        let mut last_resp = Response::ack_timeout();
        let mut last_axis = BROADCAST_AXIS;
        for (i, &ack_axis) in candidates.iter().enumerate() {
            let last = i + 1 == candidates.len();
            let cmd = Command::y42(ack_axis, &frame);
            self.guard.check(BROADCAST_AXIS, &cmd, operation)?;

            let resp = self
                .client
                .request_with(
                    BROADCAST_AXIS,
                    Opcode::Y42MultiMotor,
                    cmd.args(),
                    options.timeout_ms,
                    RequestOptions {
                        suppress_error_log: !last,
                    },
                )
                .map_err(|e| ControlError::from_driver(BROADCAST_AXIS, operation, e))?;

            if resp.is_ok() {
                debug!(operation, axes = subs.len(), ack_axis, "Y42 acknowledged");
                return Ok(SyncOutcome::Acknowledged { axis: ack_axis });
            }
            last_axis = ack_axis;
            let timed_out = resp.is_ack_timeout();
            last_resp = resp;
            if timed_out && !last {
                debug!(operation, ack_axis, "Y42 ack timeout, trying next axis");
                continue;
            }
            break;
        }

        if last_resp.is_ack_timeout() && options.allow_ack_timeout {
            warn!(
                operation,
                ack_axis = last_axis,
                "Y42 ack timeout accepted, command may have been executed"
            );
            return Ok(SyncOutcome::Unacknowledged);
        }
        match ControlError::from_response(last_axis, operation, &last_resp) {
            Some(err) => Err(err),
            None => Ok(SyncOutcome::Acknowledged { axis: last_axis }),
        }
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("port", &self.client.port())
            .field("ack_candidates", &self.ack_candidates)
            .field("pooled", &self.lease.is_some())
            .finish()
    }
}
