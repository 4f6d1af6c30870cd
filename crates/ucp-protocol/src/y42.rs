//! Y42 多轴聚合帧
//!
//! ```text
//! 0xAA | len(u16 BE) | [axis_id(u8) || zdt_body]+ | 0x6B
//! ```
//!
//! `len` 为长度字段之后的全部字节数（包含结尾 0x6B）。
//! 经 UCP 下发时 args 为 `expected_ack_axis(u8) || frame`，motor_id 使用广播地址 0。

use crate::ProtocolError;
use crate::constants::{Y42_MARKER, ZDT_TRAILER};
use crate::zdt::ZdtCommand;

/// 帧头(1) + 长度(2)
const Y42_PREFIX_LEN: usize = 3;

/// 聚合帧中的一条子指令
#[derive(Debug, Clone, PartialEq)]
pub struct Y42SubCommand {
    pub axis: u8,
    pub command: ZdtCommand,
}

/// 构建 Y42 聚合帧
///
/// 长度字段与实际负载不一致属于编码逻辑错误，返回 `FrameLengthMismatch`。
pub fn build_y42_frame(sub_commands: &[(u8, &[u8])]) -> Result<Vec<u8>, ProtocolError> {
    if sub_commands.is_empty() {
        return Err(ProtocolError::InvalidValue {
            field: "y42.sub_commands",
            value: 0,
        });
    }
    let payload_len: usize = sub_commands.iter().map(|(_, body)| 1 + body.len()).sum();
    let declared = payload_len + 1;
    let declared_u16 = u16::try_from(declared).map_err(|_| ProtocolError::OutOfRange {
        field: "y42.length",
        value: declared as f64,
    })?;

    let mut frame = Vec::with_capacity(Y42_PREFIX_LEN + declared);
    frame.push(Y42_MARKER);
    frame.extend_from_slice(&declared_u16.to_be_bytes());
    for (axis, body) in sub_commands {
        frame.push(*axis);
        frame.extend_from_slice(body);
    }
    frame.push(ZDT_TRAILER);

    let actual = frame.len() - Y42_PREFIX_LEN;
    if actual != declared {
        return Err(ProtocolError::FrameLengthMismatch { declared, actual });
    }
    Ok(frame)
}

/// 解析 Y42 聚合帧为子指令列表
pub fn parse_y42_frame(frame: &[u8]) -> Result<Vec<Y42SubCommand>, ProtocolError> {
    if frame.len() < Y42_PREFIX_LEN + 1 {
        return Err(ProtocolError::InvalidLength {
            expected: Y42_PREFIX_LEN + 1,
            actual: frame.len(),
        });
    }
    if frame[0] != Y42_MARKER {
        return Err(ProtocolError::ParseError(format!(
            "bad Y42 marker 0x{:02X}",
            frame[0]
        )));
    }
    let declared = u16::from_be_bytes([frame[1], frame[2]]) as usize;
    let actual = frame.len() - Y42_PREFIX_LEN;
    if declared != actual {
        return Err(ProtocolError::FrameLengthMismatch { declared, actual });
    }
    if frame[frame.len() - 1] != ZDT_TRAILER {
        return Err(ProtocolError::ParseError("missing Y42 trailer".into()));
    }

    let payload = &frame[Y42_PREFIX_LEN..frame.len() - 1];
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < payload.len() {
        let axis = payload[i];
        let fn_code = *payload.get(i + 1).ok_or(ProtocolError::InvalidLength {
            expected: i + 2,
            actual: payload.len(),
        })?;
        let len = ZdtCommand::body_len(fn_code).ok_or(ProtocolError::UnknownSubCommand(fn_code))?;
        let end = i + 1 + len;
        if end > payload.len() {
            return Err(ProtocolError::InvalidLength {
                expected: end,
                actual: payload.len(),
            });
        }
        let command = ZdtCommand::decode(&payload[i + 1..end])?;
        out.push(Y42SubCommand { axis, command });
        i = end;
    }
    Ok(out)
}

/// 构建 Y42 的 UCP args：`expected_ack_axis || frame`
pub fn y42_request_args(expected_ack_axis: u8, frame: &[u8]) -> Vec<u8> {
    let mut args = Vec::with_capacity(1 + frame.len());
    args.push(expected_ack_axis);
    args.extend_from_slice(frame);
    args
}

/// 拆分 Y42 的 UCP args
pub fn split_y42_args(args: &[u8]) -> Result<(u8, &[u8]), ProtocolError> {
    match args.split_first() {
        Some((ack, frame)) => Ok((*ack, frame)),
        None => Err(ProtocolError::InvalidLength {
            expected: 1,
            actual: 0,
        }),
    }
}
