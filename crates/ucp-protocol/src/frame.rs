//! UCP 外层帧
//!
//! ```text
//! 0x55 0xAA | ver(u8) | type(u8) | seq(u16 LE) | len(u16 LE) | payload | crc16(u16 LE)
//! ```
//!
//! CRC16-IBM（init 0xFFFF，反射多项式 0xA001）覆盖 `ver..payload`。
//! 负载为 TLV 序列：`tag(u8) | len(u16 LE) | value`。

use crate::ProtocolError;
use crate::constants::{
    FRAME_CRC_LEN, FRAME_HEADER, FRAME_HEADER_LEN, MAX_DECODER_BUFFER, MAX_PAYLOAD_LEN,
    PROTOCOL_VERSION,
};

/// CRC16-IBM（MODBUS 变体）
pub fn crc16_ibm(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in data {
        crc ^= b as u16;
        for _ in 0..8 {
            let lsb = crc & 1;
            crc >>= 1;
            if lsb != 0 {
                crc ^= 0xA001;
            }
        }
    }
    crc
}

/// 追加一个 TLV 块
pub fn push_tlv(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
}

/// 逐个迭代 TLV 块，遇到截断的尾部即停止
pub fn iter_tlvs(buf: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0usize;
    std::iter::from_fn(move || {
        if i + 3 > buf.len() {
            return None;
        }
        let tag = buf[i];
        let len = u16::from_le_bytes([buf[i + 1], buf[i + 2]]) as usize;
        let start = i + 3;
        if start + len > buf.len() {
            return None;
        }
        i = start + len;
        Some((tag, &buf[start..start + len]))
    })
}

/// 帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameType {
    Request,
    Response,
    /// 未知类型（保留原始值，交由上层丢弃）
    Other(u8),
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => FrameType::Request,
            0x02 => FrameType::Response,
            other => FrameType::Other(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(value: FrameType) -> Self {
        match value {
            FrameType::Request => 0x01,
            FrameType::Response => 0x02,
            FrameType::Other(v) => v,
        }
    }
}

/// UCP 外层帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UcpFrame {
    pub version: u8,
    pub frame_type: FrameType,
    pub seq: u16,
    pub payload: Vec<u8>,
}

impl UcpFrame {
    pub fn new(frame_type: FrameType, seq: u16, payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            frame_type,
            seq,
            payload,
        }
    }

    /// 编码为线上字节
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: MAX_PAYLOAD_LEN,
                actual: self.payload.len(),
            });
        }
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + self.payload.len() + FRAME_CRC_LEN);
        out.extend_from_slice(&FRAME_HEADER);
        out.push(self.version);
        out.push(self.frame_type.into());
        out.extend_from_slice(&self.seq.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.payload);
        let crc = crc16_ibm(&out[2..]);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    /// 从完整的一帧字节中解析（要求恰好一帧）
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < FRAME_HEADER_LEN + FRAME_CRC_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: FRAME_HEADER_LEN + FRAME_CRC_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[..2] != FRAME_HEADER {
            return Err(ProtocolError::ParseError(format!(
                "bad frame header {:02X} {:02X}",
                bytes[0], bytes[1]
            )));
        }
        let payload_len = u16::from_le_bytes([bytes[6], bytes[7]]) as usize;
        let total = FRAME_HEADER_LEN + payload_len + FRAME_CRC_LEN;
        if bytes.len() != total {
            return Err(ProtocolError::FrameLengthMismatch {
                declared: total,
                actual: bytes.len(),
            });
        }
        let body_end = FRAME_HEADER_LEN + payload_len;
        let expected = crc16_ibm(&bytes[2..body_end]);
        let actual = u16::from_le_bytes([bytes[body_end], bytes[body_end + 1]]);
        if expected != actual {
            return Err(ProtocolError::CrcMismatch { expected, actual });
        }
        Ok(Self {
            version: bytes[2],
            frame_type: FrameType::from(bytes[3]),
            seq: u16::from_le_bytes([bytes[4], bytes[5]]),
            payload: bytes[FRAME_HEADER_LEN..body_end].to_vec(),
        })
    }
}

/// 流式解帧器
///
/// 串口读到的任意分片都可以 `push` 进来，`next_frame` 逐帧取出。
/// - 在噪声中重新定位 `0x55 0xAA`
/// - CRC 错误时丢弃 1 字节继续搜索
/// - 缓冲区超过上限时只保留尾部
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    crc_errors: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.enforce_cap();
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// 累计 CRC 错误次数
    pub fn crc_errors(&self) -> u64 {
        self.crc_errors
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// 尝试取出下一帧，数据不足时返回 `None`
    pub fn next_frame(&mut self) -> Option<UcpFrame> {
        loop {
            let Some(start) = self.buf.windows(2).position(|w| w == FRAME_HEADER) else {
                self.trim_noise();
                return None;
            };
            if start > 0 {
                self.buf.drain(..start);
            }
            if self.buf.len() < FRAME_HEADER_LEN {
                return None;
            }
            let payload_len = u16::from_le_bytes([self.buf[6], self.buf[7]]) as usize;
            if payload_len > MAX_PAYLOAD_LEN {
                // 长度字段不可信，跳过这个帧头
                self.buf.drain(..1);
                continue;
            }
            let total = FRAME_HEADER_LEN + payload_len + FRAME_CRC_LEN;
            if self.buf.len() < total {
                return None;
            }
            match UcpFrame::decode(&self.buf[..total]) {
                Ok(frame) => {
                    self.buf.drain(..total);
                    return Some(frame);
                },
                Err(_) => {
                    self.crc_errors += 1;
                    self.buf.drain(..1);
                },
            }
        }
    }

    /// 没有帧头时只保留最后一个字节（可能是半个帧头）
    fn trim_noise(&mut self) {
        if self.buf.len() > 1 {
            let keep_from = self.buf.len() - 1;
            self.buf.drain(..keep_from);
        }
    }

    fn enforce_cap(&mut self) {
        if self.buf.len() > MAX_DECODER_BUFFER {
            let keep_from = self.buf.len() - MAX_DECODER_BUFFER;
            self.buf.drain(..keep_from);
        }
    }
}
