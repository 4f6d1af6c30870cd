//! 协议常量定义
//!
//! 外层帧、TLV 标签、驱动类型、状态码与错误码。

// ============================================================================
// 外层帧
// ============================================================================

/// 帧头（0x55 0xAA）
pub const FRAME_HEADER: [u8; 2] = [0x55, 0xAA];

/// 协议版本
pub const PROTOCOL_VERSION: u8 = 0x01;

/// 帧头(2) + ver(1) + type(1) + seq(2) + len(2)
pub const FRAME_HEADER_LEN: usize = 8;

/// CRC16 长度
pub const FRAME_CRC_LEN: usize = 2;

/// 单帧负载上限（桥接板固件限制）
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// 解帧缓冲区上限，超出后只保留尾部
pub const MAX_DECODER_BUFFER: usize = 2048;

// ============================================================================
// TLV 标签
// ============================================================================

pub const TAG_MOTOR_ID: u8 = 0x01;
pub const TAG_DRIVER: u8 = 0x02;
pub const TAG_OPCODE: u8 = 0x03;
pub const TAG_TIMEOUT_MS: u8 = 0x04;
pub const TAG_ARGS: u8 = 0x05;

pub const TAG_STATUS: u8 = 0x10;
pub const TAG_ERR_CODE: u8 = 0x11;
pub const TAG_DATA: u8 = 0x12;
pub const TAG_DIAG: u8 = 0x13;

// ============================================================================
// 驱动板类型
// ============================================================================

/// ZDT 闭环步进驱动板
pub const DRIVER_ZDT: u8 = 0x01;

/// 广播地址（Y42 聚合帧、轨迹命令使用）
pub const BROADCAST_AXIS: u8 = 0x00;

// ============================================================================
// 状态码
// ============================================================================

pub const STATUS_OK: u8 = 0;
pub const STATUS_UNKNOWN: u8 = 1;
pub const STATUS_TIMEOUT: u8 = 2;
pub const STATUS_CAN_TIMEOUT: u8 = 3;
pub const STATUS_CAN_ERROR: u8 = 4;
pub const STATUS_PARAM_ERROR: u8 = 5;
pub const STATUS_UNSUPPORTED: u8 = 6;
pub const STATUS_BUSY: u8 = 7;
pub const STATUS_NOT_READY: u8 = 8;

/// 响应中缺少 STATUS TLV 时的取值
pub const STATUS_MISSING: u8 = 0xFF;

// ============================================================================
// 错误码
// ============================================================================

/// 设备忙 / 瞬态不可用
pub const ERR_DEVICE_BUSY: u16 = 0x0101;

/// 等待 ACK / 响应超时
pub const ERR_ACK_TIMEOUT: u16 = 0x4034;

/// 轨迹缓存已满
pub const ERR_TRAJECTORY_FULL: u16 = 0x7003;

/// 固件不支持批量追加（mode=3）
pub const ERR_BULK_UNSUPPORTED: u16 = 0x7005;

// ============================================================================
// ZDT 子指令
// ============================================================================

/// ZDT 指令结尾校验字节（固定校验模式）
pub const ZDT_TRAILER: u8 = 0x6B;

pub const ZDT_FN_POSITION_DIRECT: u8 = 0xFB;
pub const ZDT_FN_POSITION_TRAPEZOID: u8 = 0xFD;
pub const ZDT_FN_SPEED: u8 = 0xF6;
pub const ZDT_FN_ENABLE: u8 = 0xF3;
pub const ZDT_FN_HOMING: u8 = 0x9A;

/// Y42 聚合帧起始字节
pub const Y42_MARKER: u8 = 0xAA;
