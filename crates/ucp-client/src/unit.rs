//! 单轴驱动单元控制
//!
//! [`DriveUnitOps`] 是密封 trait，只由本 crate 实现。全部操作都经由
//! [`DriveUnitOps::transact`]：连接检查、拒绝旧式同步、关节限位检查之后，
//! 才调用实现者提供的 `send_raw`。
//!
//! [`DriveUnit`] 是基于共享 [`UcpClient`](ucp_driver::UcpClient) 的标准实现；
//! [`SafeMotion`] 是去掉了失能 / 急停的受限视图，适合交给上层规划器使用。
//!
//! 角度约定：对外接口一律使用关节角度（度），下发前按 `MotorConfig`
//! 换算为电机端角度；速度为电机端 RPM，不做换算。

use crate::builder::PoolLease;
use crate::config::ConfigContext;
use crate::error::ControlError;
use crate::guard::JointLimitGuard;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use ucp_driver::{RequestOptions, RetryPolicy, SharedClient};
use ucp_protocol::{
    Command, DriveParameters, ERR_ACK_TIMEOUT, ERR_DEVICE_BUSY, FirmwareVersion,
    HomingParameters, HomingStatusFlags, MotorStatusFlags, Opcode, PidParameters, ProtocolError,
    ResistanceInductance, Response, STATUS_CAN_TIMEOUT, StandardQuantity, StandardStatusFlags,
    parse_current, parse_encoder, parse_position, parse_pulse_count, parse_speed,
    parse_standard_f32, parse_temperature, parse_voltage,
};

/// 默认回零模式（多圈无限位碰撞回零）
pub const DEFAULT_HOMING_MODE: u8 = 4;

/// 各类操作的请求超时（毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitTimeouts {
    /// 使能 / 停止 / 清零等普通指令
    pub command_ms: u16,
    /// 位置运动
    pub motion_ms: u16,
    /// 速度模式（设备忙视为成功）
    pub speed_ms: u16,
    /// 回零触发
    pub homing_ms: u16,
    /// 参数写入
    pub params_ms: u16,
}

impl Default for UnitTimeouts {
    fn default() -> Self {
        Self {
            command_ms: 500,
            motion_ms: 2000,
            speed_ms: 200,
            homing_ms: 300,
            params_ms: 2000,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// 驱动单元操作集
///
/// 实现者只提供身份、限位守卫与原始收发；所有控制、读取、参数操作均为默认方法。
pub trait DriveUnitOps: sealed::Sealed + Send + Sync {
    /// 目标轴号（1..=255）
    fn axis(&self) -> u8;

    fn guard(&self) -> &JointLimitGuard;

    fn config(&self) -> &ConfigContext {
        self.guard().config()
    }

    fn is_connected(&self) -> bool;

    fn timeouts(&self) -> UnitTimeouts {
        UnitTimeouts::default()
    }

    /// 读取类操作的重试策略
    fn read_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// 发送一条已通过检查的指令，返回设备原始响应
    #[doc(hidden)]
    fn send_raw(
        &self,
        cmd: &Command,
        timeout_ms: u16,
        operation: &'static str,
        quiet: bool,
    ) -> Result<Response, ControlError>;

    /// 单次收发
    ///
    /// 依次完成：连接检查、拒绝旧式同步标志、关节限位检查、发送。
    /// 返回设备原始响应（包括非零 status），分类由调用方完成。
    fn transact(
        &self,
        cmd: &Command,
        timeout_ms: u16,
        operation: &'static str,
        quiet: bool,
    ) -> Result<Response, ControlError> {
        let axis = self.axis();
        if !self.is_connected() {
            return Err(ControlError::NotConnected { axis, operation });
        }
        if cmd.opcode() == Opcode::SyncMotion || cmd.sync_flag() == Some(true) {
            return Err(ControlError::UnsupportedSyncMode { axis, operation });
        }
        self.guard().check(axis, cmd, operation)?;
        self.send_raw(cmd, timeout_ms, operation, quiet)
    }

    // ==================== 控制 ====================

    fn enable(&self) -> Result<(), ControlError> {
        execute(self, &Command::enable(true), self.timeouts().command_ms, "enable").map(drop)
    }

    fn disable(&self) -> Result<(), ControlError> {
        execute(self, &Command::enable(false), self.timeouts().command_ms, "disable").map(drop)
    }

    fn stop(&self) -> Result<(), ControlError> {
        execute(self, &Command::stop(), self.timeouts().command_ms, "stop").map(drop)
    }

    /// 急停：停止后失能
    ///
    /// 两步都会执行；任一步失败只记录警告，最终返回第一个错误。
    fn emergency_stop(&self) -> Result<(), ControlError> {
        warn!(axis = self.axis(), "emergency stop");
        let stopped = self.stop();
        if let Err(e) = &stopped {
            warn!(axis = self.axis(), error = %e, "emergency stop: stop failed, disabling anyway");
        }
        let disabled = self.disable();
        if let Err(e) = &disabled {
            warn!(axis = self.axis(), error = %e, "emergency stop: disable failed");
        }
        stopped.and(disabled)
    }

    /// 直通位置模式
    ///
    /// `angle_deg` 为关节角度；`absolute = false` 时为相对当前位置的增量。
    fn move_to_position(
        &self,
        angle_deg: f64,
        speed_rpm: f64,
        absolute: bool,
    ) -> Result<(), ControlError> {
        const OP: &str = "move_to_position";
        let drive_deg = self.config().motor().joint_to_drive(self.axis(), angle_deg);
        let cmd = Command::position_direct(drive_deg, speed_rpm, absolute)
            .map_err(|e| ControlError::invalid(self.axis(), OP, e))?;
        debug!(axis = self.axis(), joint_deg = angle_deg, drive_deg, speed_rpm, absolute, "{OP}");
        execute(self, &cmd, self.timeouts().motion_ms, OP).map(drop)
    }

    /// 梯形曲线位置模式
    fn move_to_position_trapezoid(
        &self,
        angle_deg: f64,
        max_speed_rpm: f64,
        accel: u16,
        decel: u16,
        absolute: bool,
    ) -> Result<(), ControlError> {
        const OP: &str = "move_to_position_trapezoid";
        let drive_deg = self.config().motor().joint_to_drive(self.axis(), angle_deg);
        let cmd = Command::position_trapezoid(drive_deg, max_speed_rpm, accel, decel, absolute)
            .map_err(|e| ControlError::invalid(self.axis(), OP, e))?;
        execute(self, &cmd, self.timeouts().motion_ms, OP).map(drop)
    }

    /// 速度模式
    ///
    /// 高频调用场景下设备常回 0x0101（忙），此时视为已接受。
    fn set_speed(&self, speed_rpm: f64, accel: u16) -> Result<(), ControlError> {
        const OP: &str = "set_speed";
        let cmd =
            Command::speed(speed_rpm, accel).map_err(|e| ControlError::invalid(self.axis(), OP, e))?;
        let resp = self.transact(&cmd, self.timeouts().speed_ms, OP, true)?;
        if resp.err_code == ERR_DEVICE_BUSY {
            debug!(axis = self.axis(), "set_speed: device busy, treated as accepted");
            return Ok(());
        }
        check(self.axis(), OP, resp).map(drop)
    }

    /// 力矩模式：电流（mA，带符号）与电流斜率
    fn set_torque(&self, current_ma: i16, slope: u16) -> Result<(), ControlError> {
        execute(self, &Command::torque(current_ma, slope), self.timeouts().command_ms, "set_torque")
            .map(drop)
    }

    /// 直通发送任意指令（仍经过限位守卫）
    fn send_command(&self, cmd: &Command, timeout_ms: u16) -> Result<Response, ControlError> {
        self.transact(cmd, timeout_ms, "send_command", false)
    }

    /// 旧式"预加载 + 广播触发"同步已禁用
    fn sync_motion(&self) -> Result<(), ControlError> {
        Err(ControlError::UnsupportedSyncMode {
            axis: self.axis(),
            operation: "sync_motion",
        })
    }

    // ==================== 读取 ====================

    /// 当前关节角度（度）
    fn get_position(&self) -> Result<f64, ControlError> {
        let drive_deg = self.get_drive_position()?;
        Ok(self.config().motor().drive_to_joint(self.axis(), drive_deg))
    }

    /// 当前电机端角度（度，未换算）
    fn get_drive_position(&self) -> Result<f64, ControlError> {
        read_value(self, Opcode::ReadRealtimePosition, "get_position", parse_position)
    }

    /// 电机端转速（RPM）
    fn get_speed(&self) -> Result<f64, ControlError> {
        read_value(self, Opcode::ReadRealtimeSpeed, "get_speed", parse_speed)
    }

    /// 电机状态（带重试）
    fn get_status(&self) -> Result<MotorStatusFlags, ControlError> {
        let resp = read(self, Opcode::ReadMotorStatus, "get_status", self.read_policy())?;
        motor_flags(self.axis(), "get_status", &resp)
    }

    /// 电机状态（单次）
    fn get_motor_status(&self) -> Result<MotorStatusFlags, ControlError> {
        let policy = RetryPolicy::once(self.read_policy().timeout_ms);
        let resp = read(self, Opcode::ReadMotorStatus, "get_motor_status", policy)?;
        motor_flags(self.axis(), "get_motor_status", &resp)
    }

    fn is_enabled(&self) -> Result<bool, ControlError> {
        Ok(self.get_status()?.enabled())
    }

    fn is_in_position(&self) -> Result<bool, ControlError> {
        Ok(self.get_status()?.in_position())
    }

    /// °C
    fn get_temperature(&self) -> Result<f64, ControlError> {
        read_value(self, Opcode::ReadTemperature, "get_temperature", parse_temperature)
    }

    /// V
    fn get_bus_voltage(&self) -> Result<f64, ControlError> {
        read_value(self, Opcode::ReadBusVoltage, "get_bus_voltage", parse_voltage)
    }

    /// A
    fn get_bus_current(&self) -> Result<f64, ControlError> {
        read_value(self, Opcode::ReadBusCurrent, "get_bus_current", parse_current)
    }

    /// A
    fn get_phase_current(&self) -> Result<f64, ControlError> {
        read_value(self, Opcode::ReadPhaseCurrent, "get_phase_current", parse_current)
    }

    /// 位置误差（电机端度）
    fn get_position_error(&self) -> Result<f64, ControlError> {
        read_value(self, Opcode::ReadPositionError, "get_position_error", parse_position)
    }

    /// 目标位置（电机端度）
    fn get_target_position(&self) -> Result<f64, ControlError> {
        read_value(self, Opcode::ReadTargetPosition, "get_target_position", parse_position)
    }

    /// 实时设定目标位置（电机端度）
    fn get_realtime_target_position(&self) -> Result<f64, ControlError> {
        read_value(
            self,
            Opcode::ReadRealtimeTargetPosition,
            "get_realtime_target_position",
            parse_position,
        )
    }

    fn get_encoder_raw(&self) -> Result<u16, ControlError> {
        read_value(self, Opcode::ReadEncoderRaw, "get_encoder_raw", parse_encoder)
    }

    fn get_encoder_calibrated(&self) -> Result<u16, ControlError> {
        read_value(self, Opcode::ReadEncoderCalibrated, "get_encoder_calibrated", parse_encoder)
    }

    fn get_pulse_count(&self) -> Result<i32, ControlError> {
        read_value(self, Opcode::ReadPulseCount, "get_pulse_count", parse_pulse_count)
    }

    fn get_input_pulse(&self) -> Result<i32, ControlError> {
        read_value(self, Opcode::ReadInputPulse, "get_input_pulse", parse_pulse_count)
    }

    fn get_version(&self) -> Result<FirmwareVersion, ControlError> {
        read_value(self, Opcode::ReadVersion, "get_version", FirmwareVersion::parse)
    }

    fn get_homing_status(&self) -> Result<HomingStatusFlags, ControlError> {
        read_value(self, Opcode::ReadHomingStatus, "get_homing_status", HomingStatusFlags::parse)
    }

    /// 系统状态原始字节
    fn get_system_status(&self) -> Result<Vec<u8>, ControlError> {
        let resp = read(self, Opcode::ReadSystemStatus, "get_system_status", self.read_policy())?;
        Ok(resp.data)
    }

    /// 标准化浮点读取（固件换算失败时为 `None`）
    fn read_standard_f32(&self, kind: StandardQuantity) -> Result<Option<f32>, ControlError> {
        read_value(self, kind.opcode(), "read_standard_f32", parse_standard_f32)
    }

    fn read_standard_flags(&self) -> Result<StandardStatusFlags, ControlError> {
        read_value(
            self,
            Opcode::ReadStatusFlagsStd,
            "read_standard_flags",
            StandardStatusFlags::parse,
        )
    }

    // ==================== 参数（读取失败返回默认值） ====================

    fn get_pid_parameters(&self) -> PidParameters {
        match read(self, Opcode::ReadPid, "get_pid_parameters", self.read_policy()) {
            Ok(resp) => PidParameters::from_raw(&resp.data),
            Err(e) => {
                warn!(axis = self.axis(), error = %e, "PID read failed, using defaults");
                PidParameters::default()
            },
        }
    }

    fn get_resistance_inductance(&self) -> ResistanceInductance {
        read_value(
            self,
            Opcode::ReadResistanceInductance,
            "get_resistance_inductance",
            ResistanceInductance::parse,
        )
        .unwrap_or_else(|e| {
            warn!(axis = self.axis(), error = %e, "resistance/inductance read failed, using defaults");
            ResistanceInductance::default()
        })
    }

    fn get_drive_parameters(&self) -> DriveParameters {
        match read(self, Opcode::ReadDriveParameters, "get_drive_parameters", self.read_policy()) {
            Ok(resp) => {
                let params = DriveParameters::from_raw(&resp.data);
                if !params.parsed_ok {
                    warn!(
                        axis = self.axis(),
                        len = resp.data.len(),
                        "drive parameter block too short, using defaults"
                    );
                }
                params
            },
            Err(e) => {
                warn!(axis = self.axis(), error = %e, "drive parameter read failed, using defaults");
                DriveParameters::default()
            },
        }
    }

    fn get_homing_parameters(&self) -> HomingParameters {
        match read(self, Opcode::ReadHomingParams, "get_homing_parameters", self.read_policy()) {
            Ok(resp) => HomingParameters::from_raw(&resp.data).unwrap_or_else(|| {
                warn!(
                    axis = self.axis(),
                    len = resp.data.len(),
                    "unrecognized homing parameter layout, using defaults"
                );
                HomingParameters::default()
            }),
            Err(e) => {
                warn!(axis = self.axis(), error = %e, "homing parameter read failed, using defaults");
                HomingParameters::default()
            },
        }
    }

    /// 写入回零参数
    ///
    /// 先尝试完整布局；设备拒绝时退回旧固件的 8 字节布局。
    fn modify_homing_parameters(
        &self,
        params: &HomingParameters,
        save_to_chip: bool,
    ) -> Result<(), ControlError> {
        const OP: &str = "modify_homing_parameters";
        let timeout = self.timeouts().params_ms;
        let full = params
            .to_command(save_to_chip)
            .map_err(|e| ControlError::invalid(self.axis(), OP, e))?;
        let resp = self.transact(&full, timeout, OP, true)?;
        if resp.is_ok() {
            return Ok(());
        }
        info!(
            axis = self.axis(),
            status = resp.status,
            err = resp.err_code,
            "full homing parameter layout rejected, retrying legacy layout"
        );
        let legacy = params
            .to_legacy_command()
            .map_err(|e| ControlError::invalid(self.axis(), OP, e))?;
        execute(self, &legacy, timeout, OP).map(drop)
    }

    fn modify_drive_parameters(
        &self,
        params: &DriveParameters,
        save_to_chip: bool,
    ) -> Result<(), ControlError> {
        execute(
            self,
            &params.to_command(save_to_chip),
            self.timeouts().params_ms,
            "modify_drive_parameters",
        )
        .map(drop)
    }

    /// 修改电机 ID（新 ID 生效后本对象的轴号不再有效）
    fn set_motor_id(&self, new_id: u8, save_to_chip: bool) -> Result<(), ControlError> {
        const OP: &str = "set_motor_id";
        let cmd = Command::modify_motor_id(new_id, save_to_chip)
            .map_err(|e| ControlError::invalid(self.axis(), OP, e))?;
        execute(self, &cmd, self.timeouts().params_ms, OP)?;
        info!(axis = self.axis(), new_id, save_to_chip, "motor id changed");
        Ok(())
    }

    // ==================== 回零 / 维护 ====================

    /// 触发回零
    ///
    /// 驱动板开始回零后常以忙或应答超时回复，两者都视为已触发。
    fn trigger_homing(&self, mode: u8) -> Result<(), ControlError> {
        const OP: &str = "trigger_homing";
        let resp = self.transact(&Command::trigger_homing(mode), self.timeouts().homing_ms, OP, true)?;
        let accepted = resp.is_ok()
            || resp.err_code == ERR_DEVICE_BUSY
            || (resp.status == STATUS_CAN_TIMEOUT && resp.err_code == ERR_ACK_TIMEOUT);
        if accepted {
            debug!(axis = self.axis(), mode, status = resp.status, "homing triggered");
            return Ok(());
        }
        check(self.axis(), OP, resp).map(drop)
    }

    fn set_zero_position(&self, save_to_chip: bool) -> Result<(), ControlError> {
        execute(
            self,
            &Command::set_zero(save_to_chip),
            self.timeouts().command_ms,
            "set_zero_position",
        )
        .map(drop)
    }

    fn force_stop_homing(&self) -> Result<(), ControlError> {
        warn_on_err(self, Opcode::ForceStopHoming, "force_stop_homing")
    }

    fn trigger_encoder_calibration(&self) -> Result<(), ControlError> {
        warn_on_err(self, Opcode::TriggerEncoderCalibration, "trigger_encoder_calibration")
    }

    fn clear_position(&self) -> Result<(), ControlError> {
        execute(
            self,
            &Command::read(Opcode::ClearPosition),
            self.timeouts().command_ms,
            "clear_position",
        )
        .map(drop)
    }

    fn release_stall_protection(&self) -> Result<(), ControlError> {
        execute(
            self,
            &Command::read(Opcode::ReleaseStallProtection),
            self.timeouts().command_ms,
            "release_stall_protection",
        )
        .map(drop)
    }

    /// 恢复出厂设置
    fn factory_reset(&self) -> Result<(), ControlError> {
        warn!(axis = self.axis(), "factory reset requested");
        execute(
            self,
            &Command::read(Opcode::FactoryReset),
            self.timeouts().params_ms,
            "factory_reset",
        )
        .map(drop)
    }

    // ==================== 等待 ====================

    /// 轮询到位标志，超时返回 `Ok(false)`
    ///
    /// 设备错误按"未到位"处理；链路错误直接返回。
    fn wait_for_position(&self, timeout: Duration, interval: Duration) -> Result<bool, ControlError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.get_status() {
                Ok(flags) if flags.in_position() => return Ok(true),
                Ok(_) => {},
                Err(e @ (ControlError::NotConnected { .. } | ControlError::TransportFatal { .. })) => {
                    return Err(e);
                },
                Err(e) => debug!(axis = self.axis(), error = %e, "wait_for_position: status read failed"),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            spin_sleep::sleep(interval);
        }
    }

    /// 轮询回零状态
    ///
    /// 回零结束时返回 `Ok(!failed)`；超时返回 `Ok(false)`。
    fn wait_for_homing(&self, timeout: Duration, interval: Duration) -> Result<bool, ControlError> {
        let deadline = Instant::now() + timeout;
        loop {
            let flags = self.get_homing_status()?;
            if !flags.homing_in_progress() {
                return Ok(!flags.homing_failed());
            }
            if Instant::now() >= deadline {
                warn!(axis = self.axis(), ?timeout, "homing did not finish in time");
                return Ok(false);
            }
            spin_sleep::sleep(interval);
        }
    }
}

/// 默认等待超时
pub const DEFAULT_POSITION_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_POSITION_POLL: Duration = Duration::from_millis(200);
pub const DEFAULT_HOMING_WAIT: Duration = Duration::from_secs(30);
pub const DEFAULT_HOMING_POLL: Duration = Duration::from_millis(500);

// ============================================================================
// 默认方法共用的收发辅助
// ============================================================================

fn check(axis: u8, operation: &'static str, resp: Response) -> Result<Response, ControlError> {
    match ControlError::from_response(axis, operation, &resp) {
        Some(err) => Err(err),
        None => Ok(resp),
    }
}

fn execute<U: DriveUnitOps + ?Sized>(
    unit: &U,
    cmd: &Command,
    timeout_ms: u16,
    operation: &'static str,
) -> Result<Response, ControlError> {
    let resp = unit.transact(cmd, timeout_ms, operation, false)?;
    check(unit.axis(), operation, resp)
}

/// 读取；只对可恢复响应重试，非最后一次尝试不输出错误日志
fn read<U: DriveUnitOps + ?Sized>(
    unit: &U,
    opcode: Opcode,
    operation: &'static str,
    policy: RetryPolicy,
) -> Result<Response, ControlError> {
    let cmd = Command::read(opcode);
    let resp = policy.run(|last| unit.transact(&cmd, policy.timeout_ms, operation, !last))?;
    check(unit.axis(), operation, resp)
}

fn read_value<U, T>(
    unit: &U,
    opcode: Opcode,
    operation: &'static str,
    parse: fn(&[u8]) -> Result<T, ProtocolError>,
) -> Result<T, ControlError>
where
    U: DriveUnitOps + ?Sized,
{
    let resp = read(unit, opcode, operation, unit.read_policy())?;
    parse(&resp.data).map_err(|e| ControlError::decode(unit.axis(), operation, e))
}

/// 空数据视为全部标志为假
fn motor_flags(
    axis: u8,
    operation: &'static str,
    resp: &Response,
) -> Result<MotorStatusFlags, ControlError> {
    if resp.data.is_empty() {
        return Ok(MotorStatusFlags::default());
    }
    MotorStatusFlags::parse(&resp.data).map_err(|e| ControlError::decode(axis, operation, e))
}

fn warn_on_err<U: DriveUnitOps + ?Sized>(
    unit: &U,
    opcode: Opcode,
    operation: &'static str,
) -> Result<(), ControlError> {
    execute(unit, &Command::read(opcode), unit.timeouts().command_ms, operation)
        .map(drop)
        .inspect_err(|e| warn!(axis = unit.axis(), error = %e, "{operation} failed"))
}

// ============================================================================
// DriveUnit
// ============================================================================

/// 基于共享串口客户端的驱动单元
pub struct DriveUnit {
    axis: u8,
    client: SharedClient,
    guard: JointLimitGuard,
    read_policy: RetryPolicy,
    timeouts: UnitTimeouts,
    lease: Option<PoolLease>,
}

impl DriveUnit {
    /// 使用已连接（或稍后连接）的客户端创建
    pub fn new(
        axis: u8,
        client: SharedClient,
        config: Arc<ConfigContext>,
    ) -> Result<Self, ControlError> {
        if axis == 0 {
            return Err(ControlError::invalid(
                axis,
                "new",
                ProtocolError::InvalidValue {
                    field: "axis",
                    value: 0,
                },
            ));
        }
        Ok(Self {
            axis,
            client,
            guard: JointLimitGuard::new(config),
            read_policy: RetryPolicy::default(),
            timeouts: UnitTimeouts::default(),
            lease: None,
        })
    }

    pub fn with_read_policy(mut self, policy: RetryPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    pub fn with_timeouts(mut self, timeouts: UnitTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// 析构时归还连接池引用
    pub(crate) fn with_lease(mut self, lease: PoolLease) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn client(&self) -> &SharedClient {
        &self.client
    }

    pub fn config_context(&self) -> &Arc<ConfigContext> {
        self.guard.config()
    }

    /// 受限操作视图（无失能 / 急停）
    pub fn safe(&self) -> SafeMotion<'_> {
        SafeMotion { unit: self }
    }
}

impl sealed::Sealed for DriveUnit {}

impl DriveUnitOps for DriveUnit {
    fn axis(&self) -> u8 {
        self.axis
    }

    fn guard(&self) -> &JointLimitGuard {
        &self.guard
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    fn timeouts(&self) -> UnitTimeouts {
        self.timeouts
    }

    fn read_policy(&self) -> RetryPolicy {
        self.read_policy
    }

    fn send_raw(
        &self,
        cmd: &Command,
        timeout_ms: u16,
        operation: &'static str,
        quiet: bool,
    ) -> Result<Response, ControlError> {
        self.client
            .request_with(
                self.axis,
                cmd.opcode(),
                cmd.args(),
                timeout_ms,
                RequestOptions {
                    suppress_error_log: quiet,
                },
            )
            .map_err(|e| ControlError::from_driver(self.axis, operation, e))
    }
}

impl std::fmt::Debug for DriveUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveUnit")
            .field("axis", &self.axis)
            .field("port", &self.client.port())
            .field("baud_rate", &self.client.baud_rate())
            .field("pooled", &self.lease.is_some())
            .finish()
    }
}

// ============================================================================
// SafeMotion
// ============================================================================

/// 受限操作视图
///
/// 只暴露运动、停止与状态读取；失能和急停必须直接通过 [`DriveUnitOps`] 调用。
#[derive(Clone, Copy)]
pub struct SafeMotion<'a> {
    unit: &'a dyn DriveUnitOps,
}

impl<'a> SafeMotion<'a> {
    pub fn new(unit: &'a dyn DriveUnitOps) -> Self {
        Self { unit }
    }

    pub fn axis(&self) -> u8 {
        self.unit.axis()
    }

    pub fn enable(&self) -> Result<(), ControlError> {
        self.unit.enable()
    }

    pub fn stop(&self) -> Result<(), ControlError> {
        self.unit.stop()
    }

    pub fn move_to_position(
        &self,
        angle_deg: f64,
        speed_rpm: f64,
        absolute: bool,
    ) -> Result<(), ControlError> {
        self.unit.move_to_position(angle_deg, speed_rpm, absolute)
    }

    pub fn move_to_position_trapezoid(
        &self,
        angle_deg: f64,
        max_speed_rpm: f64,
        accel: u16,
        decel: u16,
        absolute: bool,
    ) -> Result<(), ControlError> {
        self.unit
            .move_to_position_trapezoid(angle_deg, max_speed_rpm, accel, decel, absolute)
    }

    pub fn set_speed(&self, speed_rpm: f64, accel: u16) -> Result<(), ControlError> {
        self.unit.set_speed(speed_rpm, accel)
    }

    pub fn get_position(&self) -> Result<f64, ControlError> {
        self.unit.get_position()
    }

    pub fn get_speed(&self) -> Result<f64, ControlError> {
        self.unit.get_speed()
    }

    pub fn get_status(&self) -> Result<MotorStatusFlags, ControlError> {
        self.unit.get_status()
    }

    pub fn wait_for_position(&self, timeout: Duration, interval: Duration) -> Result<bool, ControlError> {
        self.unit.wait_for_position(timeout, interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AxisConfig, JointLimits, MotorConfig};
    use ucp_driver::UcpClient;
    use ucp_serial::{MockHandle, MockLink, MockReply};

    fn unit_with(config: ConfigContext, axis: u8) -> (DriveUnit, MockHandle) {
        let link = MockLink::new();
        let handle = link.handle();
        let client = Arc::new(UcpClient::from_link("mock", 115_200, Box::new(link)));
        let unit = DriveUnit::new(axis, client, Arc::new(config)).unwrap();
        (unit, handle)
    }

    fn limited(axis: u8) -> (DriveUnit, MockHandle) {
        let mut motor = MotorConfig::identity();
        motor.set_axis(
            axis,
            AxisConfig {
                reducer_ratio: 50.0,
                direction: 1,
            },
        );
        unit_with(ConfigContext::with_limits(JointLimits::symmetric(90.0), motor), axis)
    }

    /// 测试位置指令的关节→电机换算与编码
    #[test]
    fn test_move_to_position_encoding() {
        let (unit, handle) = unit_with(ConfigContext::default(), 3);
        handle.push_response(Response::ok(vec![]));
        unit.move_to_position(45.0, 500.0, true).unwrap();

        let req = &handle.requests()[0];
        assert_eq!(req.motor_id, 3);
        assert_eq!(req.opcode, Opcode::PositionDirect);
        assert_eq!(req.timeout_ms, 2000);
        let pos = i32::from_le_bytes([req.args[0], req.args[1], req.args[2], req.args[3]]);
        let spd = u16::from_le_bytes([req.args[4], req.args[5]]);
        assert_eq!(pos, 22500);
        assert_eq!(spd, 5000);
        assert_eq!(req.args[6], 1);
        assert_eq!(req.args[7], 0);
    }

    /// 测试越限时不产生任何请求
    #[test]
    fn test_limit_violation_sends_nothing() {
        let (unit, handle) = limited(1);
        let err = unit.move_to_position(92.0, 100.0, true).unwrap_err();
        assert!(matches!(err, ControlError::LimitViolation { .. }));
        assert_eq!(handle.request_count(), 0);

        handle.push_response(Response::ok(vec![]));
        unit.move_to_position(90.0, 100.0, true).unwrap();
        assert_eq!(handle.request_count(), 1);
    }

    /// 测试直通发送同样经过限位守卫
    #[test]
    fn test_send_command_is_guarded() {
        let (unit, handle) = limited(1);
        let cmd = Command::position_direct(100.0 * 50.0, 10.0, true).unwrap();
        assert!(matches!(
            unit.send_command(&cmd, 500),
            Err(ControlError::LimitViolation { .. })
        ));
        assert_eq!(handle.request_count(), 0);
    }

    /// 测试旧式同步被拒绝
    #[test]
    fn test_legacy_sync_rejected() {
        let (unit, handle) = unit_with(ConfigContext::default(), 2);
        assert!(matches!(
            unit.sync_motion(),
            Err(ControlError::UnsupportedSyncMode { axis: 2, .. })
        ));
        let flagged = Command::raw(Opcode::Enable, vec![1, 1]);
        assert!(matches!(
            unit.send_command(&flagged, 500),
            Err(ControlError::UnsupportedSyncMode { .. })
        ));
        assert_eq!(handle.request_count(), 0);
    }

    /// 测试所有经 transact 的路径都先做检查再发送
    #[test]
    fn test_transact_checks_before_send() {
        let (unit, handle) = limited(1);
        let over = Command::position_direct(91.0 * 50.0, 10.0, true).unwrap();
        assert!(matches!(
            unit.transact(&over, 500, "raw_position", false),
            Err(ControlError::LimitViolation { .. })
        ));
        let flagged = Command::raw(Opcode::Enable, vec![1, 1]);
        assert!(matches!(
            unit.transact(&flagged, 500, "raw_enable", false),
            Err(ControlError::UnsupportedSyncMode { axis: 1, .. })
        ));
        assert_eq!(handle.request_count(), 0);

        handle.push_response(Response::ok(vec![]));
        let within = Command::position_direct(89.0 * 50.0, 10.0, true).unwrap();
        assert!(unit.transact(&within, 500, "raw_position", false).unwrap().is_ok());
        assert_eq!(handle.request_count(), 1);
    }

    /// 测试未连接时立即失败
    #[test]
    fn test_not_connected() {
        let (unit, handle) = unit_with(ConfigContext::default(), 1);
        unit.client().disconnect();
        assert!(matches!(
            unit.enable(),
            Err(ControlError::NotConnected { axis: 1, operation: "enable" })
        ));
        assert_eq!(handle.request_count(), 0);
    }

    /// 测试读取重试：忙 → 超时 → 成功
    #[test]
    fn test_get_position_retries_recoverable() {
        let (unit, handle) = unit_with(ConfigContext::default(), 3);
        handle.push_response(Response::error(4, 0x0101));
        handle.push_response(Response::ack_timeout());
        // 符号 0 + 900（×10）→ 电机端 90°，关节 1.8°
        handle.push_response(Response::ok(vec![0, 0, 0, 0x03, 0x84]));
        let joint = unit.get_position().unwrap();
        assert!((joint - 90.0 / 50.0).abs() < 1e-9);
        assert_eq!(handle.request_count(), 3);
        assert!(handle.requests().iter().all(|r| r.timeout_ms == 300));
    }

    /// 测试不可恢复错误不重试
    #[test]
    fn test_read_param_error_not_retried() {
        let (unit, handle) = unit_with(ConfigContext::default(), 1);
        handle.push_response(Response::error(5, 0));
        let err = unit.get_speed().unwrap_err();
        assert!(matches!(err, ControlError::ParamError(_)));
        assert_eq!(err.operation(), "get_speed");
        assert_eq!(handle.request_count(), 1);
    }

    /// 测试速度模式下设备忙视为成功
    #[test]
    fn test_set_speed_busy_is_ok() {
        let (unit, handle) = unit_with(ConfigContext::default(), 1);
        handle.push_response(Response::error(4, 0x0101));
        unit.set_speed(120.0, 10).unwrap();
        assert_eq!(handle.requests()[0].timeout_ms, 200);

        handle.push_response(Response::error(5, 0));
        assert!(unit.set_speed(120.0, 10).is_err());
    }

    /// 测试急停两步都执行
    #[test]
    fn test_emergency_stop_runs_both_steps() {
        let (unit, handle) = unit_with(ConfigContext::default(), 4);
        handle.push_response(Response::error(5, 0));
        handle.push_response(Response::ok(vec![]));
        assert!(unit.emergency_stop().is_err());
        let ops: Vec<Opcode> = handle.requests().iter().map(|r| r.opcode).collect();
        assert_eq!(ops, vec![Opcode::Stop, Opcode::Enable]);
        assert_eq!(handle.requests()[1].args, vec![0, 0]);
    }

    /// 测试回零触发接受忙与应答超时
    #[test]
    fn test_trigger_homing_accepts_busy_and_ack_timeout() {
        let (unit, handle) = unit_with(ConfigContext::default(), 1);
        handle.push_response(Response::error(4, 0x0101));
        unit.trigger_homing(DEFAULT_HOMING_MODE).unwrap();
        handle.push_reply(MockReply::Silence);
        unit.trigger_homing(DEFAULT_HOMING_MODE).unwrap();
        handle.push_response(Response::error(2, 0));
        assert!(matches!(
            unit.trigger_homing(DEFAULT_HOMING_MODE),
            Err(ControlError::BusError(_))
        ));
        assert_eq!(handle.requests()[0].args, vec![4, 0]);
    }

    /// 测试参数读取失败返回默认值
    #[test]
    fn test_parameter_reads_default_on_failure() {
        let (unit, handle) = unit_with(ConfigContext::default(), 1);
        handle.push_response(Response::error(5, 0));
        assert_eq!(unit.get_drive_parameters(), DriveParameters::default());
        handle.push_response(Response::error(5, 0));
        assert_eq!(unit.get_pid_parameters(), PidParameters::default());
        handle.push_response(Response::ok(vec![1, 2]));
        assert_eq!(unit.get_homing_parameters(), HomingParameters::default());
    }

    /// 测试回零参数写入的旧布局回退
    #[test]
    fn test_modify_homing_parameters_legacy_fallback() {
        let (unit, handle) = unit_with(ConfigContext::default(), 1);
        handle.push_response(Response::error(5, 0));
        handle.push_response(Response::ok(vec![]));
        unit.modify_homing_parameters(&HomingParameters::default(), false)
            .unwrap();
        let reqs = handle.requests();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].opcode, Opcode::ModifyHomingParams);
        assert_eq!(reqs[1].args.len(), 8);
    }

    /// 测试空状态数据视为全假
    #[test]
    fn test_empty_status_is_all_false() {
        let (unit, handle) = unit_with(ConfigContext::default(), 1);
        handle.push_response(Response::ok(vec![]));
        let flags = unit.get_status().unwrap();
        assert!(!flags.enabled());
        assert!(!flags.in_position());

        handle.push_response(Response::ok(vec![0x03]));
        assert!(unit.is_in_position().unwrap());
    }

    /// 测试到位等待
    #[test]
    fn test_wait_for_position() {
        let (unit, handle) = unit_with(ConfigContext::default(), 1);
        handle.push_response(Response::ok(vec![0x01]));
        handle.push_response(Response::error(5, 0));
        handle.push_response(Response::ok(vec![0x03]));
        let reached = unit
            .wait_for_position(Duration::from_secs(2), Duration::from_millis(1))
            .unwrap();
        assert!(reached);
        assert_eq!(handle.request_count(), 3);
    }

    /// 测试回零等待：结束后按失败位返回
    #[test]
    fn test_wait_for_homing() {
        let (unit, handle) = unit_with(ConfigContext::default(), 1);
        handle.push_response(Response::ok(vec![0x04]));
        handle.push_response(Response::ok(vec![0x08]));
        let ok = unit
            .wait_for_homing(Duration::from_secs(2), Duration::from_millis(1))
            .unwrap();
        assert!(!ok);
    }

    /// 测试标准化读取 NaN → None
    #[test]
    fn test_standard_reads() {
        let (unit, handle) = unit_with(ConfigContext::default(), 1);
        handle.push_response(Response::ok(f32::NAN.to_le_bytes().to_vec()));
        assert_eq!(unit.read_standard_f32(StandardQuantity::Speed).unwrap(), None);
        handle.push_response(Response::ok(12.5f32.to_le_bytes().to_vec()));
        assert_eq!(
            unit.read_standard_f32(StandardQuantity::Temperature).unwrap(),
            Some(12.5)
        );
        assert_eq!(handle.requests()[1].opcode, Opcode::ReadTemperatureStd);
    }

    /// 测试受限视图
    #[test]
    fn test_safe_motion_view() {
        let (unit, handle) = limited(2);
        let safe = unit.safe();
        assert_eq!(safe.axis(), 2);
        assert!(safe.move_to_position(-91.0, 50.0, true).is_err());
        handle.push_response(Response::ok(vec![]));
        safe.stop().unwrap();
        assert_eq!(handle.requests()[0].opcode, Opcode::Stop);
    }

    /// 测试非法轴号
    #[test]
    fn test_axis_zero_rejected() {
        let client = Arc::new(UcpClient::from_link("mock", 115_200, Box::new(MockLink::new())));
        assert!(matches!(
            DriveUnit::new(0, client, Arc::new(ConfigContext::default())),
            Err(ControlError::InvalidArgument { .. })
        ));
    }
}
