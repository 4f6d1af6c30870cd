//! UCP 请求/响应客户端
//!
//! 一个 `UcpClient` 独占一条串口链路。链路为半双工：
//! 写请求与读响应在同一把锁内完成，并发调用方按到达顺序串行（不保证公平）。
//!
//! 单次交换流程：
//!
//! 1. 丢弃接收缓冲区残留字节（上一次超时请求的迟到响应）
//! 2. 分配 seq（从 1 开始，回绕时跳过 0），编码并写入请求帧
//! 3. 在截止时间 `max(600ms, timeout + 500ms)` 内读取，
//!    类型或 seq 不匹配的帧直接跳过
//! 4. 截止时间到达仍无响应：返回合成的 `Response::ack_timeout()`（3 / 0x4034）

use crate::classify::{ErrorLogGate, ResponseExt};
use crate::error::DriverError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};
use ucp_protocol::{DRIVER_ZDT, FrameDecoder, FrameType, Opcode, Request, Response};
use ucp_serial::{SerialError, SerialLink};

/// 默认请求超时（桥接板侧等待驱动板应答的时间）
pub const DEFAULT_TIMEOUT_MS: u16 = 500;

/// 主机侧读截止时间下限
const MIN_READ_DEADLINE: Duration = Duration::from_millis(600);

/// 主机侧在桥接板超时之外额外等待的时间
const READ_DEADLINE_SLACK: Duration = Duration::from_millis(500);

/// 单次阻塞读的最长等待
const READ_POLL: Duration = Duration::from_millis(20);

/// 打开链路的工厂函数（端口名, 波特率）
pub type LinkOpener =
    Arc<dyn Fn(&str, u32) -> Result<Box<dyn SerialLink>, SerialError> + Send + Sync>;

/// 默认链路工厂：真实串口
pub fn default_opener() -> LinkOpener {
    Arc::new(open_native)
}

#[cfg(feature = "native-backend")]
fn open_native(port: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>, SerialError> {
    Ok(Box::new(ucp_serial::SerialPortLink::open(port, baud_rate)?))
}

#[cfg(not(feature = "native-backend"))]
fn open_native(port: &str, _baud_rate: u32) -> Result<Box<dyn SerialLink>, SerialError> {
    Err(SerialError::Device(ucp_serial::SerialDeviceError::new(
        ucp_serial::SerialDeviceErrorKind::NotFound,
        format!("{port}: serial backend not compiled (enable `native-backend`)"),
    )))
}

/// 单次请求选项
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// 不输出错误日志（重试中的非最后一次尝试）
    pub suppress_error_log: bool,
}

/// 客户端统计（只增不减）
#[derive(Debug, Default)]
struct ClientCounters {
    requests: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
    skipped_frames: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub requests: u64,
    /// 本地合成的超时响应数
    pub timeouts: u64,
    /// 非 0 状态响应数
    pub errors: u64,
    /// 因类型/seq 不匹配被跳过的帧
    pub skipped_frames: u64,
    pub crc_errors: u64,
}

struct LinkState {
    link: Option<Box<dyn SerialLink>>,
    decoder: FrameDecoder,
    seq: u16,
}

impl LinkState {
    fn next_seq(&mut self) -> u16 {
        self.seq = self.seq.wrapping_add(1);
        if self.seq == 0 {
            self.seq = 1;
        }
        self.seq
    }
}

/// UCP 客户端
pub struct UcpClient {
    port: String,
    baud_rate: u32,
    driver: u8,
    default_timeout_ms: u16,
    opener: LinkOpener,
    state: Mutex<LinkState>,
    log_gate: ErrorLogGate,
    counters: ClientCounters,
}

impl std::fmt::Debug for UcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UcpClient")
            .field("port", &self.port)
            .field("baud_rate", &self.baud_rate)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl UcpClient {
    /// 创建客户端（未连接），使用真实串口
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self::with_opener(port, baud_rate, default_opener())
    }

    /// 使用自定义链路工厂创建（未连接）
    pub fn with_opener(port: impl Into<String>, baud_rate: u32, opener: LinkOpener) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            driver: DRIVER_ZDT,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            opener,
            state: Mutex::new(LinkState {
                link: None,
                decoder: FrameDecoder::new(),
                seq: 0,
            }),
            log_gate: ErrorLogGate::new(),
            counters: ClientCounters::default(),
        }
    }

    /// 包装一条已打开的链路（已连接）
    ///
    /// 断开后无法重新连接。
    pub fn from_link(name: impl Into<String>, baud_rate: u32, link: Box<dyn SerialLink>) -> Self {
        let name = name.into();
        let port = name.clone();
        let client = Self::with_opener(
            name,
            baud_rate,
            Arc::new(move |_: &str, _: u32| -> Result<Box<dyn SerialLink>, SerialError> {
                Err(SerialError::Device(ucp_serial::SerialDeviceError::new(
                    ucp_serial::SerialDeviceErrorKind::NoDevice,
                    format!("{port}: link cannot be reopened"),
                )))
            }),
        );
        client.state.lock().link = Some(link);
        client
    }

    pub(crate) fn set_driver(&mut self, driver: u8) {
        self.driver = driver;
    }

    pub(crate) fn set_default_timeout(&mut self, timeout_ms: u16) {
        self.default_timeout_ms = timeout_ms;
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn default_timeout_ms(&self) -> u16 {
        self.default_timeout_ms
    }

    /// 打开链路（幂等）
    pub fn connect(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if state.link.is_some() {
            return Ok(());
        }
        let link = (self.opener)(&self.port, self.baud_rate)?;
        state.link = Some(link);
        state.decoder.clear();
        debug!(port = %self.port, baud_rate = self.baud_rate, "UCP link connected");
        Ok(())
    }

    /// 关闭链路（幂等）
    pub fn disconnect(&self) {
        self.disconnect_if(|| true);
    }

    /// 在客户端锁内再次确认后关闭链路，返回是否真正关闭
    ///
    /// 连接池用它避免关闭一个刚被重新获取的连接。
    pub fn disconnect_if<F: FnOnce() -> bool>(&self, still_unused: F) -> bool {
        let mut state = self.state.lock();
        if state.link.is_none() || !still_unused() {
            return false;
        }
        state.link = None;
        state.decoder.clear();
        debug!(port = %self.port, "UCP link disconnected");
        true
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().link.is_some()
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            skipped_frames: self.counters.skipped_frames.load(Ordering::Relaxed),
            crc_errors: self.state.lock().decoder.crc_errors(),
        }
    }

    /// 发送请求并等待响应
    ///
    /// 超时不是错误：返回 status=3 / err=0x4034 的响应。
    /// 其他链路故障作为 `DriverError` 返回。
    pub fn request(
        &self,
        motor_id: u8,
        opcode: Opcode,
        args: &[u8],
        timeout_ms: u16,
    ) -> Result<Response, DriverError> {
        self.request_with(motor_id, opcode, args, timeout_ms, RequestOptions::default())
    }

    /// 带选项的请求（重试中的非最后一次尝试不输出错误日志）
    pub fn request_with(
        &self,
        motor_id: u8,
        opcode: Opcode,
        args: &[u8],
        timeout_ms: u16,
        options: RequestOptions,
    ) -> Result<Response, DriverError> {
        let req = Request::new(motor_id, opcode, args, timeout_ms).with_driver(self.driver);
        self.call(&req, options)
    }

    /// 使用默认超时发送
    pub fn request_default(
        &self,
        motor_id: u8,
        opcode: Opcode,
        args: &[u8],
    ) -> Result<Response, DriverError> {
        self.request(motor_id, opcode, args, self.default_timeout_ms)
    }

    /// 发送完整请求
    pub fn call(&self, req: &Request, options: RequestOptions) -> Result<Response, DriverError> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let resp = self.exchange(req)?;

        if resp.is_ok() {
            self.log_gate.reset();
        } else {
            if resp.is_ack_timeout() {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            if !options.suppress_error_log && self.log_gate.should_log(&resp) {
                self.log_error(req, &resp);
            }
        }
        Ok(resp)
    }

    fn log_error(&self, req: &Request, resp: &Response) {
        let opcode = req.opcode.code();
        if resp.is_recoverable() {
            warn!(
                port = %self.port,
                axis = req.motor_id,
                opcode,
                status = resp.status,
                err_code = resp.err_code,
                diag = %resp.diag_hex(),
                "[UCP][ERR] recoverable response"
            );
        } else {
            error!(
                port = %self.port,
                axis = req.motor_id,
                opcode,
                status = resp.status,
                err_code = resp.err_code,
                diag = %resp.diag_hex(),
                "[UCP][ERR] request failed"
            );
        }
    }

    fn exchange(&self, req: &Request) -> Result<Response, DriverError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let seq = state.next_seq();
        let Some(link) = state.link.as_mut() else {
            return Err(DriverError::NotConnected {
                port: self.port.clone(),
            });
        };

        let dropped = link.clear_input()?;
        if dropped > 0 {
            trace!(port = %self.port, dropped, "stale input drained before request");
        }
        state.decoder.clear();

        let bytes = req.into_frame(seq).encode()?;
        trace!(
            port = %self.port,
            seq,
            axis = req.motor_id,
            opcode = req.opcode.code(),
            tx = %hex::encode(&bytes),
            "UCP request"
        );
        link.write_all(&bytes)?;

        let wait = MIN_READ_DEADLINE.max(Duration::from_millis(req.timeout_ms as u64) + READ_DEADLINE_SLACK);
        let deadline = Instant::now() + wait;
        let mut buf = [0u8; 512];
        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!(port = %self.port, seq, opcode = req.opcode.code(), "UCP response timeout");
                return Ok(Response::ack_timeout());
            }
            match link.read_timeout(&mut buf, (deadline - now).min(READ_POLL)) {
                Ok(n) => state.decoder.push(&buf[..n]),
                Err(SerialError::Timeout) => continue,
                Err(e) => return Err(e.into()),
            }
            while let Some(frame) = state.decoder.next_frame() {
                if frame.frame_type != FrameType::Response || frame.seq != seq {
                    self.counters.skipped_frames.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        port = %self.port,
                        expected = seq,
                        got = frame.seq,
                        frame_type = ?frame.frame_type,
                        "skipping unexpected frame"
                    );
                    continue;
                }
                let resp = Response::from_payload(&frame.payload);
                trace!(
                    port = %self.port,
                    seq,
                    status = resp.status,
                    err_code = resp.err_code,
                    data = %hex::encode(&resp.data),
                    "UCP response"
                );
                return Ok(resp);
            }
        }
    }
}
