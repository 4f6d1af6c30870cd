//! 连接池集成测试
//!
//! 使用 MockLink 代替真实串口，验证引用计数与并发获取/释放。

use proptest::prelude::*;
use serial_test::serial;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use ucp_driver::{ConnectionPool, LinkOpener};
use ucp_protocol::{Opcode, Response};
use ucp_serial::{MockLink, MockReply, SerialError, SerialLink};

fn counting_opener(opened: Arc<AtomicUsize>) -> LinkOpener {
    Arc::new(move |_: &str, _: u32| -> Result<Box<dyn SerialLink>, SerialError> {
        opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockLink::with_responder(|_| {
            MockReply::Respond(Response::ok(vec![]))
        })))
    })
}

/// 两个线程反复获取/释放同一键，结束后不留条目
#[test]
fn test_two_threads_leave_no_entry() {
    let opened = Arc::new(AtomicUsize::new(0));
    let pool = Arc::new(ConnectionPool::with_opener(counting_opener(opened.clone())));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let client = pool.acquire("/dev/ttyMOCK", 115_200).unwrap();
                    assert!(client.is_connected());
                    pool.release("/dev/ttyMOCK", 115_200);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(pool.is_empty());
    assert_eq!(pool.ref_count("/dev/ttyMOCK", 115_200), 0);
    assert!(opened.load(Ordering::SeqCst) >= 1);
}

/// 持有连接期间，并发请求在同一客户端上串行执行
#[test]
fn test_shared_client_serializes_requests() {
    let pool = Arc::new(ConnectionPool::with_opener(counting_opener(Arc::new(
        AtomicUsize::new(0),
    ))));
    let client = pool.acquire("/dev/ttyMOCK", 115_200).unwrap();

    let handles: Vec<_> = (1..=4u8)
        .map(|axis| {
            let client = client.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    let resp = client.request(axis, Opcode::Stop, &[0], 300).unwrap();
                    assert!(resp.is_ok());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(client.stats().requests, 40);
    assert_eq!(client.stats().skipped_frames, 0);
    pool.release("/dev/ttyMOCK", 115_200);
    assert!(!client.is_connected());
}

/// 进程级连接池：键不存在时 release 为空操作
#[test]
#[serial]
fn test_global_pool_release_unknown() {
    let pool = ConnectionPool::global();
    let before = pool.len();
    pool.release("/dev/ucp-never-opened", 9600);
    assert_eq!(pool.len(), before);
    assert!(std::ptr::eq(pool, ConnectionPool::global()));
}

#[derive(Debug, Clone)]
enum Op {
    Acquire(u8),
    Release(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![(0u8..3).prop_map(Op::Acquire), (0u8..3).prop_map(Op::Release)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// 任意顺序的 acquire/release：引用计数 = max(0, 模型计数)，归零即移除
    #[test]
    fn prop_refcount_matches_model(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let pool = ConnectionPool::with_opener(counting_opener(Arc::new(AtomicUsize::new(0))));
        let mut model = [0usize; 3];

        for op in ops {
            match op {
                Op::Acquire(k) => {
                    pool.acquire(&format!("p{k}"), 115_200).unwrap();
                    model[k as usize] += 1;
                },
                Op::Release(k) => {
                    pool.release(&format!("p{k}"), 115_200);
                    model[k as usize] = model[k as usize].saturating_sub(1);
                },
            }
            for (k, expected) in model.iter().enumerate() {
                let port = format!("p{k}");
                prop_assert_eq!(pool.ref_count(&port, 115_200), *expected);
                prop_assert_eq!(pool.contains(&port, 115_200), *expected > 0);
                prop_assert_eq!(pool.is_connected(&port, 115_200), *expected > 0);
            }
        }
    }
}
