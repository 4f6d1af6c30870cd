//! 轨迹上传与播放
//!
//! 状态机：
//!
//! ```text
//! Idle ──upload()──▶ Uploading ──▶ Ready ──execute()──▶ Running ──▶ Completed
//!                        │                                 │    └──▶ Error
//!                        └──▶ Error                        └─stop()─▶ Stopped
//! ```
//!
//! 上传全部发往广播轴 0：开始 → 批量追加（超时减半，不支持时退回单点）→ 完成。
//! 全部点在发送任何请求前先过一遍关节限位检查，每个批次发送时再检查一次。

use crate::builder::PoolLease;
use crate::config::ConfigContext;
use crate::error::ControlError;
use crate::guard::JointLimitGuard;
use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use ucp_driver::{RequestOptions, SharedClient};
use ucp_protocol::{
    BROADCAST_AXIS, Command, DeviceTrajectoryState, ERR_BULK_UNSUPPORTED, MAX_TRAJECTORY_POINTS,
    Opcode, ProtocolError, Response, STATUS_TIMEOUT, STATUS_UNKNOWN, TrajectoryPoint,
    TrajectoryStatusReport, decimate_keep_timing, max_points_per_batch, upload_bulk, upload_finish,
    upload_single, upload_start,
};

pub const UPLOAD_TIMEOUT_MS: u16 = 5000;
pub const EXECUTE_TIMEOUT_MS: u16 = 2000;
pub const STOP_TIMEOUT_MS: u16 = 1000;
pub const STATUS_TIMEOUT_MS: u16 = 1000;

/// 本地播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    Idle,
    Uploading,
    Ready,
    Running,
    Completed,
    Error,
    Stopped,
}

impl PlayerState {
    /// 播放已结束（完成 / 出错 / 被停止）
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// 上传统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UploadReport {
    /// 调用方给出的点数
    pub original_points: usize,
    /// 抽稀后实际上传的点数
    pub uploaded_points: usize,
    /// 成功的请求数（不含开始 / 完成）
    pub requests: usize,
    /// 批次超时后减半的次数
    pub shrinks: usize,
    /// 是否退回了单点模式
    pub single_mode: bool,
}

/// 一次状态查询的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrajectoryProgress {
    pub state: PlayerState,
    pub total_points: u16,
    pub current_index: u16,
    pub device: TrajectoryStatusReport,
}

/// 轨迹播放器
///
/// 可放入 `Arc` 在多个线程间共享（例如 Ctrl-C 处理中调用 [`stop`](Self::stop)）。
pub struct TrajectoryPlayer {
    client: SharedClient,
    guard: JointLimitGuard,
    state: Mutex<PlayerState>,
    cancel: AtomicBool,
    lease: Option<PoolLease>,
}

impl TrajectoryPlayer {
    pub fn new(client: SharedClient, config: Arc<ConfigContext>) -> Self {
        Self {
            client,
            guard: JointLimitGuard::new(config),
            state: Mutex::new(PlayerState::Idle),
            cancel: AtomicBool::new(false),
            lease: None,
        }
    }

    pub(crate) fn with_lease(mut self, lease: PoolLease) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn client(&self) -> &SharedClient {
        &self.client
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock()
    }

    /// 请求在下一个批次之前中止上传
    pub fn cancel_upload(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// 状态迁移；进入 Completed / Error 时只在边沿记录一次日志
    fn transition(&self, next: PlayerState) -> PlayerState {
        let mut state = self.state.lock();
        let prev = *state;
        if prev != next {
            *state = next;
            match next {
                PlayerState::Completed => info!("trajectory completed"),
                PlayerState::Error => error!(from = %prev, "trajectory entered error state"),
                _ => debug!(from = %prev, to = %next, "trajectory state"),
            }
        }
        prev
    }

    fn transact(
        &self,
        cmd: &Command,
        timeout_ms: u16,
        operation: &'static str,
        quiet: bool,
    ) -> Result<Response, ControlError> {
        if !self.client.is_connected() {
            return Err(ControlError::NotConnected {
                axis: BROADCAST_AXIS,
                operation,
            });
        }
        self.guard.check(BROADCAST_AXIS, cmd, operation)?;
        self.client
            .request_with(
                BROADCAST_AXIS,
                cmd.opcode(),
                cmd.args(),
                timeout_ms,
                RequestOptions {
                    suppress_error_log: quiet,
                },
            )
            .map_err(|e| ControlError::from_driver(BROADCAST_AXIS, operation, e))
    }

    fn execute_checked(
        &self,
        cmd: &Command,
        timeout_ms: u16,
        operation: &'static str,
    ) -> Result<Response, ControlError> {
        let resp = self.transact(cmd, timeout_ms, operation, false)?;
        match ControlError::from_response(BROADCAST_AXIS, operation, &resp) {
            Some(err) => Err(err),
            None => Ok(resp),
        }
    }

    /// 上传轨迹
    ///
    /// 点数超过设备容量时先抽稀（保持总时长）。限位检查失败时不发送任何请求，状态不变。
    pub fn upload(&self, points: &[TrajectoryPoint]) -> Result<UploadReport, ControlError> {
        const OP: &str = "trajectory_upload";
        let current = self.state();
        if matches!(current, PlayerState::Uploading | PlayerState::Running) {
            return Err(ControlError::InvalidState {
                operation: OP,
                state: current,
            });
        }
        if points.is_empty() {
            return Err(ControlError::invalid(
                BROADCAST_AXIS,
                OP,
                ProtocolError::InvalidValue {
                    field: "trajectory.points",
                    value: 0,
                },
            ));
        }

        let pts = if points.len() > MAX_TRAJECTORY_POINTS {
            let decimated = decimate_keep_timing(points, MAX_TRAJECTORY_POINTS)
                .map_err(|e| ControlError::invalid(BROADCAST_AXIS, OP, e))?;
            info!(
                original = points.len(),
                decimated = decimated.len(),
                "trajectory decimated to device capacity"
            );
            decimated
        } else {
            points.to_vec()
        };

        for pt in &pts {
            let cmd = upload_single(pt).map_err(|e| ControlError::invalid(BROADCAST_AXIS, OP, e))?;
            self.guard.check(BROADCAST_AXIS, &cmd, OP)?;
        }

        {
            let mut state = self.state.lock();
            if matches!(*state, PlayerState::Uploading | PlayerState::Running) {
                return Err(ControlError::InvalidState {
                    operation: OP,
                    state: *state,
                });
            }
            *state = PlayerState::Uploading;
        }
        self.cancel.store(false, Ordering::Release);
        match self.upload_points(&pts) {
            Ok(mut report) => {
                report.original_points = points.len();
                self.transition(PlayerState::Ready);
                info!(
                    points = report.uploaded_points,
                    requests = report.requests,
                    single_mode = report.single_mode,
                    "trajectory uploaded"
                );
                Ok(report)
            },
            Err(ControlError::Cancelled { operation }) => {
                warn!("trajectory upload cancelled");
                self.transition(PlayerState::Idle);
                Err(ControlError::Cancelled { operation })
            },
            Err(e) => {
                self.transition(PlayerState::Error);
                Err(e)
            },
        }
    }

    fn upload_points(&self, pts: &[TrajectoryPoint]) -> Result<UploadReport, ControlError> {
        const OP: &str = "trajectory_upload";
        let mut report = UploadReport {
            uploaded_points: pts.len(),
            ..UploadReport::default()
        };
        self.execute_checked(&upload_start(), UPLOAD_TIMEOUT_MS, OP)?;

        let mut idx = 0;
        let mut batch = max_points_per_batch();
        while idx < pts.len() {
            if self.cancel.load(Ordering::Acquire) {
                return Err(ControlError::Cancelled { operation: OP });
            }

            let n = batch.min(pts.len() - idx);
            if report.single_mode || n == 1 {
                let cmd = upload_single(&pts[idx])
                    .map_err(|e| ControlError::invalid(BROADCAST_AXIS, OP, e))?;
                self.execute_checked(&cmd, UPLOAD_TIMEOUT_MS, OP)?;
                idx += 1;
                report.requests += 1;
                continue;
            }

            let cmd = upload_bulk(&pts[idx..idx + n])
                .map_err(|e| ControlError::invalid(BROADCAST_AXIS, OP, e))?;
            let resp = self.transact(&cmd, UPLOAD_TIMEOUT_MS, OP, true)?;
            if resp.is_ok() {
                idx += n;
                report.requests += 1;
                continue;
            }

            if resp.err_code == ERR_BULK_UNSUPPORTED
                && matches!(resp.status, STATUS_UNKNOWN | STATUS_TIMEOUT)
            {
                warn!("bulk upload not supported by firmware, switching to single-point mode");
                report.single_mode = true;
                continue;
            }
            if resp.is_ack_timeout() || resp.status == STATUS_TIMEOUT {
                batch = (n / 2).max(1);
                report.shrinks += 1;
                if batch == 1 {
                    warn!(at = idx, "bulk upload keeps timing out, switching to single-point mode");
                    report.single_mode = true;
                } else {
                    warn!(at = idx, from = n, to = batch, "bulk upload timeout, shrinking batch");
                }
                continue;
            }
            match ControlError::from_response(BROADCAST_AXIS, OP, &resp) {
                Some(err) => return Err(err),
                None => idx += n,
            }
        }

        self.execute_checked(&upload_finish(), UPLOAD_TIMEOUT_MS, OP)?;
        Ok(report)
    }

    /// 开始执行已上传的轨迹
    pub fn execute(&self) -> Result<(), ControlError> {
        const OP: &str = "trajectory_execute";
        let current = self.state();
        if !matches!(
            current,
            PlayerState::Ready | PlayerState::Completed | PlayerState::Stopped
        ) {
            return Err(ControlError::InvalidState {
                operation: OP,
                state: current,
            });
        }
        self.execute_checked(&Command::read(Opcode::TrajectoryExecute), EXECUTE_TIMEOUT_MS, OP)?;
        self.transition(PlayerState::Running);
        Ok(())
    }

    /// 停止轨迹（任何状态下都会下发）
    ///
    /// 上传进行中时同时请求在下一个批次之前中止上传。
    pub fn stop(&self) -> Result<(), ControlError> {
        self.cancel.store(true, Ordering::Release);
        self.execute_checked(
            &Command::read(Opcode::TrajectoryStop),
            STOP_TIMEOUT_MS,
            "trajectory_stop",
        )?;
        if self.state() == PlayerState::Running {
            self.transition(PlayerState::Stopped);
        }
        Ok(())
    }

    /// 查询设备端进度，并据此推进本地状态
    pub fn poll_status(&self) -> Result<TrajectoryProgress, ControlError> {
        const OP: &str = "trajectory_status";
        let resp = self.execute_checked(&Command::read(Opcode::TrajectoryStatus), STATUS_TIMEOUT_MS, OP)?;
        let device = TrajectoryStatusReport::parse(&resp.data)
            .map_err(|e| ControlError::decode(BROADCAST_AXIS, OP, e))?;

        if self.state() == PlayerState::Running {
            match device.state {
                DeviceTrajectoryState::Completed => {
                    self.transition(PlayerState::Completed);
                },
                DeviceTrajectoryState::Error => {
                    if self.transition(PlayerState::Error) != PlayerState::Error {
                        error!(
                            current = device.current_index,
                            total = device.total_points,
                            y42_status = device.last_y42_status,
                            y42_err = device.last_y42_err_code,
                            "device reported trajectory error"
                        );
                    }
                },
                _ => {},
            }
        }

        Ok(TrajectoryProgress {
            state: self.state(),
            total_points: device.total_points,
            current_index: device.current_index,
            device,
        })
    }

    /// 轮询直到播放结束或超时，返回最终本地状态
    pub fn wait_until_done(
        &self,
        timeout: Duration,
        interval: Duration,
    ) -> Result<PlayerState, ControlError> {
        let deadline = Instant::now() + timeout;
        loop {
            let progress = self.poll_status()?;
            if progress.state.is_terminal() || Instant::now() >= deadline {
                return Ok(progress.state);
            }
            spin_sleep::sleep(interval);
        }
    }

    /// 后台线程周期查询状态，结果通过通道送出；播放结束或出错后线程退出
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> StatusWatcher {
        let (tx, rx) = unbounded();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let player = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("ucp-trajectory-watch".into())
            .spawn(move || watch_loop(&player, interval, &tx, &stop_rx))
            .map_err(|e| warn!(error = %e, "failed to spawn trajectory watcher"))
            .ok();
        StatusWatcher {
            rx,
            stop_tx,
            handle,
        }
    }
}

fn watch_loop(
    player: &TrajectoryPlayer,
    interval: Duration,
    tx: &Sender<Result<TrajectoryProgress, ControlError>>,
    stop_rx: &Receiver<()>,
) {
    loop {
        let item = player.poll_status();
        let done = match &item {
            Ok(p) => p.state.is_terminal(),
            Err(_) => true,
        };
        if tx.send(item).is_err() || done {
            return;
        }
        select! {
            recv(stop_rx) -> _ => return,
            default(interval) => {},
        }
    }
}

/// 状态监视线程句柄，析构时停止线程
pub struct StatusWatcher {
    rx: Receiver<Result<TrajectoryProgress, ControlError>>,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl StatusWatcher {
    pub fn receiver(&self) -> &Receiver<Result<TrajectoryProgress, ControlError>> {
        &self.rx
    }
}

impl Drop for StatusWatcher {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl fmt::Debug for TrajectoryPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrajectoryPlayer")
            .field("port", &self.client.port())
            .field("state", &self.state())
            .field("pooled", &self.lease.is_some())
            .finish()
    }
}
