//! 串口连接池
//!
//! 以 `(端口名, 波特率)` 为键共享 `UcpClient`，按引用计数管理生命周期：
//! 首次 `acquire` 建立连接，最后一次 `release` 断开并移除。
//!
//! 表结构的修改都在一把互斥锁内完成；打开/关闭串口在锁外进行，
//! 由条目状态与客户端内部锁做二次确认：
//!
//! - `acquire` 在锁内计数 +1，锁外调用幂等的 `connect()`
//! - `release` 计数归零后，在客户端锁内再次确认无人持有才真正断开

use crate::client::{LinkOpener, UcpClient};
use crate::error::DriverError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// 共享客户端句柄
pub type SharedClient = Arc<UcpClient>;

/// 客户端工厂（端口名, 波特率）
pub type ClientFactory = Arc<dyn Fn(&str, u32) -> UcpClient + Send + Sync>;

/// 连接键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    pub port: String,
    pub baud_rate: u32,
}

impl ConnectionKey {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.port, self.baud_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Connecting,
    Connected,
    Closing,
}

struct PoolEntry {
    client: SharedClient,
    ref_count: usize,
    state: EntryState,
}

/// 连接池条目快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntryInfo {
    pub key: ConnectionKey,
    pub ref_count: usize,
    pub connected: bool,
}

/// 连接池
pub struct ConnectionPool {
    entries: Mutex<HashMap<ConnectionKey, PoolEntry>>,
    factory: ClientFactory,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_POOL: OnceLock<ConnectionPool> = OnceLock::new();

impl ConnectionPool {
    /// 使用真实串口的连接池
    pub fn new() -> Self {
        Self::with_factory(Arc::new(|port: &str, baud: u32| UcpClient::new(port, baud)))
    }

    /// 使用自定义客户端工厂
    pub fn with_factory(factory: ClientFactory) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// 使用自定义链路工厂（所有客户端共用）
    pub fn with_opener(opener: LinkOpener) -> Self {
        Self::with_factory(Arc::new(move |port: &str, baud: u32| {
            UcpClient::with_opener(port, baud, opener.clone())
        }))
    }

    /// 进程级连接池
    pub fn global() -> &'static ConnectionPool {
        GLOBAL_POOL.get_or_init(ConnectionPool::new)
    }

    /// 获取（必要时创建并连接）共享客户端
    ///
    /// 连接失败时回滚本次计数，计数归零的条目被移除。
    pub fn acquire(&self, port: &str, baud_rate: u32) -> Result<SharedClient, DriverError> {
        let key = ConnectionKey::new(port, baud_rate);
        let (client, needs_connect) = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_insert_with(|| {
                debug!(key = %key, "creating pool entry");
                PoolEntry {
                    client: Arc::new((self.factory)(port, baud_rate)),
                    ref_count: 0,
                    state: EntryState::Connecting,
                }
            });
            entry.ref_count += 1;
            if entry.state == EntryState::Closing {
                entry.state = EntryState::Connecting;
            }
            (entry.client.clone(), entry.state != EntryState::Connected)
        };

        if needs_connect {
            if let Err(e) = client.connect() {
                warn!(key = %key, error = %e, "pool connect failed");
                let mut entries = self.entries.lock();
                if let Some(entry) = entries.get_mut(&key)
                    && Arc::ptr_eq(&entry.client, &client)
                {
                    entry.ref_count = entry.ref_count.saturating_sub(1);
                    if entry.ref_count == 0 {
                        entries.remove(&key);
                    }
                }
                return Err(e);
            }
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(&key)
                && Arc::ptr_eq(&entry.client, &client)
                && entry.state == EntryState::Connecting
            {
                entry.state = EntryState::Connected;
                info!(key = %key, "serial connection established");
            }
        }

        Ok(client)
    }

    /// 释放一次引用；归零时断开并移除
    pub fn release(&self, port: &str, baud_rate: u32) {
        let key = ConnectionKey::new(port, baud_rate);
        let client = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&key) else {
                warn!(key = %key, "release on unknown connection ignored");
                return;
            };
            entry.ref_count = entry.ref_count.saturating_sub(1);
            debug!(key = %key, ref_count = entry.ref_count, "pool release");
            if entry.ref_count > 0 {
                return;
            }
            entry.state = EntryState::Closing;
            entry.client.clone()
        };

        // 锁顺序：客户端 → 连接表
        let closed = client.disconnect_if(|| {
            let entries = self.entries.lock();
            match entries.get(&key) {
                None => true,
                Some(entry) => entry.ref_count == 0 && Arc::ptr_eq(&entry.client, &client),
            }
        });

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&key)
            && entry.ref_count == 0
            && Arc::ptr_eq(&entry.client, &client)
        {
            entries.remove(&key);
            if closed {
                info!(key = %key, "serial connection closed");
            }
        }
    }

    /// 当前引用计数（不存在为 0）
    pub fn ref_count(&self, port: &str, baud_rate: u32) -> usize {
        self.entries
            .lock()
            .get(&ConnectionKey::new(port, baud_rate))
            .map_or(0, |e| e.ref_count)
    }

    pub fn contains(&self, port: &str, baud_rate: u32) -> bool {
        self.entries
            .lock()
            .contains_key(&ConnectionKey::new(port, baud_rate))
    }

    pub fn is_connected(&self, port: &str, baud_rate: u32) -> bool {
        let client = self
            .entries
            .lock()
            .get(&ConnectionKey::new(port, baud_rate))
            .map(|e| e.client.clone());
        client.is_some_and(|c| c.is_connected())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// 断开并清空全部连接（进程退出时调用）
    ///
    /// 仍持有 `SharedClient` 的调用方之后的请求返回 `NotConnected`。
    pub fn disconnect_all(&self) {
        let drained: Vec<(ConnectionKey, PoolEntry)> = self.entries.lock().drain().collect();
        for (key, entry) in drained {
            entry.client.disconnect();
            info!(key = %key, ref_count = entry.ref_count, "serial connection force-closed");
        }
    }

    /// 连接表快照（按键排序）
    pub fn info(&self) -> Vec<PoolEntryInfo> {
        let snapshot: Vec<(ConnectionKey, usize, SharedClient)> = self
            .entries
            .lock()
            .iter()
            .map(|(k, e)| (k.clone(), e.ref_count, e.client.clone()))
            .collect();
        let mut infos: Vec<PoolEntryInfo> = snapshot
            .into_iter()
            .map(|(key, ref_count, client)| PoolEntryInfo {
                key,
                ref_count,
                connected: client.is_connected(),
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ucp_serial::{MockLink, SerialDeviceError, SerialDeviceErrorKind, SerialError, SerialLink};

    fn mock_pool() -> (ConnectionPool, Arc<AtomicUsize>) {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = opened.clone();
        let pool = ConnectionPool::with_opener(Arc::new(move |_: &str, _: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockLink::new()) as Box<dyn SerialLink>)
        }));
        (pool, opened)
    }

    #[test]
    fn test_acquire_shares_client() {
        let (pool, opened) = mock_pool();
        let a = pool.acquire("/dev/ttyACM0", 115_200).unwrap();
        let b = pool.acquire("/dev/ttyACM0", 115_200).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.ref_count("/dev/ttyACM0", 115_200), 2);
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        // 不同波特率是不同的键
        let c = pool.acquire("/dev/ttyACM0", 921_600).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_release_to_zero_disconnects_and_removes() {
        let (pool, _) = mock_pool();
        let client = pool.acquire("p", 115_200).unwrap();
        pool.acquire("p", 115_200).unwrap();
        pool.release("p", 115_200);
        assert!(client.is_connected());
        assert!(pool.is_connected("p", 115_200));
        pool.release("p", 115_200);
        assert!(!client.is_connected());
        assert!(!pool.contains("p", 115_200));
        assert_eq!(pool.ref_count("p", 115_200), 0);
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let (pool, _) = mock_pool();
        pool.release("nope", 9600);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_connect_failure_rolls_back() {
        let pool = ConnectionPool::with_opener(Arc::new(|port: &str, _: u32| -> Result<Box<dyn SerialLink>, SerialError> {
            Err(SerialError::Device(SerialDeviceError::new(
                SerialDeviceErrorKind::NotFound,
                port,
            )))
        }));
        let err = pool.acquire("/dev/missing", 115_200).unwrap_err();
        assert!(err.is_fatal());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_reacquire_after_release_reconnects() {
        let (pool, opened) = mock_pool();
        pool.acquire("p", 115_200).unwrap();
        pool.release("p", 115_200);
        let client = pool.acquire("p", 115_200).unwrap();
        assert!(client.is_connected());
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_info_and_disconnect_all() {
        let (pool, _) = mock_pool();
        pool.acquire("b", 115_200).unwrap();
        pool.acquire("a", 115_200).unwrap();
        pool.acquire("a", 115_200).unwrap();
        let info = pool.info();
        assert_eq!(info.len(), 2);
        assert_eq!(info[0].key, ConnectionKey::new("a", 115_200));
        assert_eq!(info[0].ref_count, 2);
        assert!(info[0].connected);

        pool.disconnect_all();
        assert!(pool.is_empty());
    }
}
