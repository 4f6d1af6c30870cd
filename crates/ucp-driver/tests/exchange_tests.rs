//! 请求/响应交换集成测试
//!
//! 覆盖噪声字节、坏 CRC、错序响应与读取重试。

use std::time::{Duration, Instant};
use ucp_driver::{ErrorClass, ResponseExt, RetryPolicy, UcpClient};
use ucp_protocol::{Opcode, Response};
use ucp_serial::{MockHandle, MockLink, MockReply};

fn client() -> (UcpClient, MockHandle) {
    let link = MockLink::new();
    let handle = link.handle();
    (UcpClient::from_link("mock", 115_200, Box::new(link)), handle)
}

/// 响应前的噪声与坏 CRC 帧被丢弃，正确帧仍被接收
#[test]
fn test_noise_and_bad_crc_before_response() {
    let (client, handle) = client();
    let mut corrupt = Response::ok(vec![9]).into_frame(1).encode().unwrap();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;

    handle.push_reply(MockReply::Sequence(vec![
        MockReply::Raw(vec![0x00, 0x13, 0x55]),
        MockReply::Raw(corrupt),
        MockReply::Respond(Response::ok(vec![0x01, 0x00])),
    ]));

    let resp = client.request(2, Opcode::ReadVersion, &[], 300).unwrap();
    assert_eq!(resp.data, vec![0x01, 0x00]);
    assert_eq!(client.stats().crc_errors, 1);
}

/// 设备返回的错误响应原样交给调用方（不是 Err）
#[test]
fn test_device_error_is_response() {
    let (client, handle) = client();
    handle.push_response(Response::error(5, 0x0203));
    let resp = client.request(1, Opcode::PositionDirect, &[0; 8], 500).unwrap();
    assert_eq!(resp.class(), ErrorClass::ParamError);
    assert!(!resp.is_recoverable());
    assert_eq!(client.stats().errors, 1);
}

/// 读取重试：前两次设备忙，第三次成功
#[test]
fn test_retry_policy_over_client() {
    let (client, handle) = client();
    handle.push_response(Response::error(4, 0x0101));
    handle.push_response(Response::error(3, 0));
    handle.push_response(Response::ok(vec![0, 0x01, 0x2C]));

    let policy = RetryPolicy {
        delay: Duration::from_millis(1),
        ..Default::default()
    };
    let resp = policy
        .run(|_| client.request(1, Opcode::ReadRealtimeSpeed, &[], policy.timeout_ms))
        .unwrap();
    assert!(resp.is_ok());
    assert_eq!(handle.request_count(), 3);
}

/// 超时后迟到的响应不会污染下一次请求
#[test]
fn test_late_response_after_timeout_is_ignored() {
    let (client, handle) = client();
    handle.push_reply(MockReply::Silence);
    let start = Instant::now();
    let resp = client.request(1, Opcode::ReadTemperature, &[], 50).unwrap();
    assert!(resp.is_ack_timeout());
    assert!(start.elapsed() < Duration::from_millis(1500));

    // 上一请求（seq=1）的迟到响应 + 本次响应
    handle.inject_rx(&Response::ok(vec![0xEE]).into_frame(1).encode().unwrap());
    handle.push_response(Response::ok(vec![0x01, 0x20]));
    let resp = client.request(1, Opcode::ReadTemperature, &[], 300).unwrap();
    assert_eq!(resp.data, vec![0x01, 0x20]);
    assert_eq!(handle.sequences(), vec![1, 2]);
}

/// 写入失败作为链路错误返回
#[test]
fn test_write_failure_is_error() {
    let (client, handle) = client();
    handle.fail_next_write(std::io::ErrorKind::BrokenPipe);
    let err = client.request(1, Opcode::Stop, &[0], 300).unwrap_err();
    assert!(err.is_fatal());
}
