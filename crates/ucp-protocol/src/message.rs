//! UCP 请求/响应报文（TLV 负载）

use crate::ProtocolError;
use crate::constants::*;
use crate::frame::{FrameType, UcpFrame, iter_tlvs, push_tlv};
use crate::opcode::Opcode;

/// UCP 请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub motor_id: u8,
    pub driver: u8,
    pub opcode: Opcode,
    pub timeout_ms: u16,
    pub args: Vec<u8>,
}

impl Request {
    pub fn new(motor_id: u8, opcode: Opcode, args: impl Into<Vec<u8>>, timeout_ms: u16) -> Self {
        Self {
            motor_id,
            driver: DRIVER_ZDT,
            opcode,
            timeout_ms,
            args: args.into(),
        }
    }

    pub fn with_driver(mut self, driver: u8) -> Self {
        self.driver = driver;
        self
    }

    /// 构建 TLV 负载（ARGS 即使为空也会携带）
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(20 + self.args.len());
        push_tlv(&mut payload, TAG_MOTOR_ID, &[self.motor_id]);
        push_tlv(&mut payload, TAG_DRIVER, &[self.driver]);
        push_tlv(&mut payload, TAG_OPCODE, &[self.opcode.code()]);
        push_tlv(&mut payload, TAG_TIMEOUT_MS, &self.timeout_ms.to_le_bytes());
        push_tlv(&mut payload, TAG_ARGS, &self.args);
        payload
    }

    pub fn into_frame(&self, seq: u16) -> UcpFrame {
        UcpFrame::new(FrameType::Request, seq, self.encode_payload())
    }

    /// 从请求帧负载解析（桥接板侧 / 测试用）
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut motor_id = None;
        let mut driver = DRIVER_ZDT;
        let mut opcode = None;
        let mut timeout_ms = 0u16;
        let mut args = Vec::new();
        for (tag, value) in iter_tlvs(payload) {
            match (tag, value) {
                (TAG_MOTOR_ID, [id]) => motor_id = Some(*id),
                (TAG_DRIVER, [d]) => driver = *d,
                (TAG_OPCODE, [op]) => {
                    opcode = Some(
                        Opcode::try_from(*op).map_err(|_| ProtocolError::UnknownOpcode(*op))?,
                    )
                },
                (TAG_TIMEOUT_MS, [lo, hi]) => timeout_ms = u16::from_le_bytes([*lo, *hi]),
                (TAG_ARGS, v) => args = v.to_vec(),
                _ => {},
            }
        }
        let motor_id = motor_id.ok_or_else(|| ProtocolError::ParseError("missing MOTOR_ID".into()))?;
        let opcode = opcode.ok_or_else(|| ProtocolError::ParseError("missing OPCODE".into()))?;
        Ok(Self {
            motor_id,
            driver,
            opcode,
            timeout_ms,
            args,
        })
    }
}

/// UCP 响应
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Response {
    /// 状态码（0 = 成功）
    pub status: u8,
    pub err_code: u16,
    pub data: Vec<u8>,
    pub diag: Vec<u8>,
}

impl Response {
    /// 成功响应
    pub fn ok(data: impl Into<Vec<u8>>) -> Self {
        Self {
            status: STATUS_OK,
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn error(status: u8, err_code: u16) -> Self {
        Self {
            status,
            err_code,
            ..Default::default()
        }
    }

    /// 本地等待超时时合成的响应（status=3, err=0x4034）
    pub fn ack_timeout() -> Self {
        Self::error(STATUS_CAN_TIMEOUT, ERR_ACK_TIMEOUT)
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn is_ack_timeout(&self) -> bool {
        self.status == STATUS_CAN_TIMEOUT && self.err_code == ERR_ACK_TIMEOUT
    }

    /// 从响应帧负载解析；缺失的 STATUS 视为 0xFF，缺失的 ERR_CODE 视为 0
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut resp = Response {
            status: STATUS_MISSING,
            ..Default::default()
        };
        for (tag, value) in iter_tlvs(payload) {
            match tag {
                TAG_STATUS => {
                    if let Some(&s) = value.first() {
                        resp.status = s;
                    }
                },
                TAG_ERR_CODE => {
                    if value.len() == 2 {
                        resp.err_code = u16::from_le_bytes([value[0], value[1]]);
                    }
                },
                TAG_DATA => resp.data = value.to_vec(),
                TAG_DIAG => resp.diag = value.to_vec(),
                _ => {},
            }
        }
        resp
    }

    /// 编码为 TLV 负载（用于模拟桥接板）
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(12 + self.data.len() + self.diag.len());
        push_tlv(&mut payload, TAG_STATUS, &[self.status]);
        push_tlv(&mut payload, TAG_ERR_CODE, &self.err_code.to_le_bytes());
        if !self.data.is_empty() {
            push_tlv(&mut payload, TAG_DATA, &self.data);
        }
        if !self.diag.is_empty() {
            push_tlv(&mut payload, TAG_DIAG, &self.diag);
        }
        payload
    }

    pub fn into_frame(&self, seq: u16) -> UcpFrame {
        UcpFrame::new(FrameType::Response, seq, self.encode_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_payload_layout() {
        let req = Request::new(3, Opcode::ReadRealtimePosition, Vec::new(), 300);
        let payload = req.encode_payload();
        assert_eq!(
            payload,
            vec![
                TAG_MOTOR_ID, 1, 0, 3, //
                TAG_DRIVER, 1, 0, DRIVER_ZDT, //
                TAG_OPCODE, 1, 0, 0x20, //
                TAG_TIMEOUT_MS, 2, 0, 0x2C, 0x01, //
                TAG_ARGS, 0, 0,
            ]
        );
    }

    #[test]
    fn test_request_payload_parse() {
        let req = Request::new(5, Opcode::SpeedMode, vec![1, 2, 3, 4, 0], 200);
        let parsed = Request::from_payload(&req.encode_payload()).unwrap();
        assert_eq!(parsed, req);
        assert!(Request::from_payload(&[]).is_err());
    }

    #[test]
    fn test_response_defaults_when_tlvs_missing() {
        let resp = Response::from_payload(&[]);
        assert_eq!(resp.status, STATUS_MISSING);
        assert_eq!(resp.err_code, 0);
        assert!(resp.data.is_empty());
    }

    #[test]
    fn test_response_payload_parse() {
        let resp = Response {
            status: 4,
            err_code: ERR_DEVICE_BUSY,
            data: vec![1, 2],
            diag: vec![0xDE, 0xAD],
        };
        let parsed = Response::from_payload(&resp.encode_payload());
        assert_eq!(parsed, resp);
    }

    #[test]
    fn test_ack_timeout_response() {
        let resp = Response::ack_timeout();
        assert!(resp.is_ack_timeout());
        assert!(!resp.is_ok());
        assert_eq!(resp.status, 3);
        assert_eq!(resp.err_code, 0x4034);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_response_serde_json() {
        let resp = Response::error(5, 0x0203);
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }
}
