//! Builder 模式实现
//!
//! 提供链式构造 `UcpClient` 实例的便捷方式。

use crate::client::{DEFAULT_TIMEOUT_MS, LinkOpener, UcpClient};
use crate::error::DriverError;
use ucp_protocol::DRIVER_ZDT;
use ucp_serial::DEFAULT_BAUD_RATE;

/// UcpClient Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use ucp_driver::UcpClientBuilder;
///
/// // 指定串口
/// let client = UcpClientBuilder::new()
///     .port("/dev/ttyACM0")
///     .baud_rate(115_200)
///     .build()
///     .unwrap();
///
/// // 不指定串口：自动选择第一个 USB 串口
/// let client = UcpClientBuilder::new().build().unwrap();
/// ```
pub struct UcpClientBuilder {
    /// 串口名（`/dev/ttyACM0`、`COM3`）
    port: Option<String>,
    baud_rate: Option<u32>,
    /// 驱动板类型（UCP `driver` TLV）
    driver: u8,
    default_timeout_ms: u16,
    opener: Option<LinkOpener>,
}

impl UcpClientBuilder {
    pub fn new() -> Self {
        Self {
            port: None,
            baud_rate: None,
            driver: DRIVER_ZDT,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            opener: None,
        }
    }

    /// 设置串口（可选，默认自动探测）
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// 设置波特率（可选，默认 115200）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    pub fn driver(mut self, driver: u8) -> Self {
        self.driver = driver;
        self
    }

    /// 设置默认请求超时（`request_default` 使用）
    pub fn default_timeout_ms(mut self, timeout_ms: u16) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// 自定义链路工厂（测试或非串口链路）
    pub fn opener(mut self, opener: LinkOpener) -> Self {
        self.opener = Some(opener);
        self
    }

    /// 构建客户端但不连接
    pub fn build_disconnected(self) -> Result<UcpClient, DriverError> {
        let port = match self.port {
            Some(port) => port,
            None => detect_port()?,
        };
        let baud_rate = self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
        let mut client = match self.opener {
            Some(opener) => UcpClient::with_opener(port, baud_rate, opener),
            None => UcpClient::new(port, baud_rate),
        };
        client.set_driver(self.driver);
        client.set_default_timeout(self.default_timeout_ms);
        Ok(client)
    }

    /// 构建并连接
    ///
    /// # Errors
    /// - `DriverError::Serial`: 串口打开失败
    /// - `DriverError::InvalidInput`: 未指定串口且未找到可用串口
    pub fn build(self) -> Result<UcpClient, DriverError> {
        let client = self.build_disconnected()?;
        client.connect()?;
        Ok(client)
    }
}

impl Default for UcpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 选择第一个 USB 串口，没有则选第一个串口
#[cfg(feature = "native-backend")]
pub fn detect_port() -> Result<String, DriverError> {
    let ports = ucp_serial::available_ports()?;
    let chosen = ports
        .iter()
        .find(|p| p.kind == "usb")
        .or_else(|| ports.first())
        .map(|p| p.name.clone());
    match chosen {
        Some(name) => {
            tracing::info!(port = %name, "auto-selected serial port");
            Ok(name)
        },
        None => Err(DriverError::InvalidInput("no serial port found".into())),
    }
}

#[cfg(not(feature = "native-backend"))]
pub fn detect_port() -> Result<String, DriverError> {
    Err(DriverError::InvalidInput(
        "serial port must be specified without `native-backend`".into(),
    ))
}
