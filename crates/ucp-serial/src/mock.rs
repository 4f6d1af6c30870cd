//! 模拟桥接板链路
//!
//! 每次写入被解析为 UCP 请求并记录；回复按脚本（FIFO）或 responder 闭包生成，
//! 自动使用请求的 seq 编码响应帧。无脚本也无 responder 时不回复。
//!
//! ```ignore
//! use ucp_protocol::Response;
//! use ucp_serial::{MockLink, MockReply};
//!
//! let link = MockLink::new();
//! let handle = link.handle();
//! handle.push_reply(MockReply::Respond(Response::ok(vec![])));
//! handle.push_reply(MockReply::Silence);
//! ```

use crate::{SerialError, SerialLink};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use ucp_protocol::{Request, Response, UcpFrame};

/// 空闲读取的最长等待
const IDLE_POLL: Duration = Duration::from_millis(5);

/// 对单次请求的回复动作
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 使用请求 seq 回复
    Respond(Response),
    /// 使用指定 seq 回复（模拟过期/错序响应）
    RespondWithSeq(u16, Response),
    /// 追加原始字节（噪声、半帧、坏 CRC）
    Raw(Vec<u8>),
    /// 不回复，触发调用方超时
    Silence,
    /// 下一次读取返回 IO 错误
    ReadError(std::io::ErrorKind),
    /// 依次执行多个动作
    Sequence(Vec<MockReply>),
}

type Responder = Box<dyn FnMut(&Request) -> MockReply + Send>;

#[derive(Default)]
struct MockState {
    written: Vec<Vec<u8>>,
    requests: Vec<(u16, Request)>,
    script: VecDeque<MockReply>,
    responder: Option<Responder>,
    rx: VecDeque<u8>,
    read_error: Option<std::io::ErrorKind>,
    write_error: Option<std::io::ErrorKind>,
    cleared: usize,
}

impl MockState {
    fn apply(&mut self, seq: u16, reply: MockReply) {
        match reply {
            MockReply::Respond(resp) => self.enqueue_response(seq, &resp),
            MockReply::RespondWithSeq(other, resp) => self.enqueue_response(other, &resp),
            MockReply::Raw(bytes) => self.rx.extend(bytes),
            MockReply::Silence => {},
            MockReply::ReadError(kind) => self.read_error = Some(kind),
            MockReply::Sequence(items) => {
                for item in items {
                    self.apply(seq, item);
                }
            },
        }
    }

    fn enqueue_response(&mut self, seq: u16, resp: &Response) {
        if let Ok(bytes) = resp.into_frame(seq).encode() {
            self.rx.extend(bytes);
        }
    }
}

/// 模拟链路（交给 `UcpClient` 持有）
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
    read_timeout: Duration,
}

/// 测试侧句柄：编排回复、检查已发送请求
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            read_timeout: IDLE_POLL,
        }
    }

    /// 每个请求都用同一个闭包回复
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&Request) -> MockReply + Send + 'static,
    {
        let link = Self::new();
        link.handle().set_responder(responder);
        link
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// 追加一条脚本回复（优先于 responder）
    pub fn push_reply(&self, reply: MockReply) {
        self.state.lock().script.push_back(reply);
    }

    pub fn push_response(&self, resp: Response) {
        self.push_reply(MockReply::Respond(resp));
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&Request) -> MockReply + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
    }

    /// 直接注入接收字节（模拟上一次请求残留的迟到响应）
    pub fn inject_rx(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }

    /// 下一次写入失败
    pub fn fail_next_write(&self, kind: std::io::ErrorKind) {
        self.state.lock().write_error = Some(kind);
    }

    /// 已解析的请求（按发送顺序）
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.iter().map(|(_, r)| r.clone()).collect()
    }

    /// 已发送请求的 seq
    pub fn sequences(&self) -> Vec<u16> {
        self.state.lock().requests.iter().map(|(s, _)| *s).collect()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// 原始写入字节（每次 write_all 一条）
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// clear_input 丢弃的字节总数
    pub fn cleared_bytes(&self) -> usize {
        self.state.lock().cleared
    }

    pub fn pending_replies(&self) -> usize {
        self.state.lock().script.len()
    }
}

impl SerialLink for MockLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let mut state = self.state.lock();
        if let Some(kind) = state.write_error.take() {
            return Err(SerialError::Io(std::io::Error::new(kind, "mock write failure")));
        }
        state.written.push(bytes.to_vec());

        let Ok(frame) = UcpFrame::decode(bytes) else {
            return Ok(());
        };
        let Ok(request) = Request::from_payload(&frame.payload) else {
            return Ok(());
        };
        let reply = match state.script.pop_front() {
            Some(reply) => reply,
            None => match state.responder.as_mut() {
                Some(responder) => responder(&request),
                None => MockReply::Silence,
            },
        };
        state.requests.push((frame.seq, request));
        state.apply(frame.seq, reply);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        {
            let mut state = self.state.lock();
            if let Some(kind) = state.read_error.take() {
                return Err(SerialError::Io(std::io::Error::new(kind, "mock read failure")));
            }
            if !state.rx.is_empty() {
                let n = buf.len().min(state.rx.len());
                for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }
        std::thread::sleep(self.read_timeout.min(IDLE_POLL));
        Err(SerialError::Timeout)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        self.read_timeout = timeout;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, SerialError> {
        Ok(self.state.lock().rx.len())
    }

    fn clear_input(&mut self) -> Result<usize, SerialError> {
        let mut state = self.state.lock();
        let n = state.rx.len();
        state.rx.clear();
        state.cleared += n;
        Ok(n)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucp_protocol::{FrameDecoder, Opcode};

    fn send(link: &mut MockLink, seq: u16, req: &Request) {
        let bytes = req.into_frame(seq).encode().unwrap();
        link.write_all(&bytes).unwrap();
    }

    fn read_frame(link: &mut MockLink) -> Option<UcpFrame> {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 256];
        for _ in 0..4 {
            match link.read(&mut buf) {
                Ok(n) => decoder.push(&buf[..n]),
                Err(SerialError::Timeout) => {},
                Err(e) => panic!("unexpected: {e}"),
            }
            if let Some(frame) = decoder.next_frame() {
                return Some(frame);
            }
        }
        None
    }

    #[test]
    fn test_scripted_reply_uses_request_seq() {
        let mut link = MockLink::new();
        let handle = link.handle();
        handle.push_response(Response::ok(vec![1, 2]));

        send(&mut link, 7, &Request::new(1, Opcode::ReadVersion, vec![], 300));
        let frame = read_frame(&mut link).unwrap();
        assert_eq!(frame.seq, 7);
        assert_eq!(Response::from_payload(&frame.payload).data, vec![1, 2]);
        assert_eq!(handle.request_count(), 1);
        assert_eq!(handle.requests()[0].opcode, Opcode::ReadVersion);
    }

    #[test]
    fn test_silence_times_out() {
        let mut link = MockLink::new();
        link.handle().push_reply(MockReply::Silence);
        send(&mut link, 1, &Request::new(1, Opcode::Stop, vec![0], 300));
        let mut buf = [0u8; 16];
        assert!(matches!(link.read(&mut buf), Err(SerialError::Timeout)));
    }

    #[test]
    fn test_responder_fallback() {
        let mut link = MockLink::with_responder(|req| {
            MockReply::Respond(Response::ok(vec![req.motor_id]))
        });
        send(&mut link, 3, &Request::new(9, Opcode::ReadTemperature, vec![], 300));
        let frame = read_frame(&mut link).unwrap();
        assert_eq!(Response::from_payload(&frame.payload).data, vec![9]);
    }

    #[test]
    fn test_clear_input_and_errors() {
        let mut link = MockLink::new();
        let handle = link.handle();
        handle.inject_rx(&[0x55, 0xAA, 0x01]);
        assert_eq!(link.clear_input().unwrap(), 3);
        assert_eq!(handle.cleared_bytes(), 3);

        handle.fail_next_write(std::io::ErrorKind::BrokenPipe);
        let bytes = Request::new(1, Opcode::Stop, vec![0], 300).into_frame(1).encode().unwrap();
        assert!(link.write_all(&bytes).is_err());
        assert!(link.write_all(&bytes).is_ok());
    }
}
