//! 基于 `serialport` 的真实串口后端

use crate::{SerialDeviceError, SerialDeviceErrorKind, SerialError, SerialLink};
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, trace};

/// 打开串口时的初始读超时
const INITIAL_READ_TIMEOUT: Duration = Duration::from_millis(20);

impl From<serialport::Error> for SerialError {
    fn from(e: serialport::Error) -> Self {
        let kind = match e.kind {
            serialport::ErrorKind::NoDevice => SerialDeviceErrorKind::NoDevice,
            serialport::ErrorKind::InvalidInput => SerialDeviceErrorKind::InvalidConfig,
            serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                SerialDeviceErrorKind::NotFound
            },
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                SerialDeviceErrorKind::AccessDenied
            },
            serialport::ErrorKind::Io(std::io::ErrorKind::ResourceBusy) => {
                SerialDeviceErrorKind::Busy
            },
            serialport::ErrorKind::Io(_) => SerialDeviceErrorKind::Backend,
            serialport::ErrorKind::Unknown => SerialDeviceErrorKind::Unknown,
        };
        SerialError::Device(SerialDeviceError::new(kind, e.description))
    }
}

/// 真实串口链路
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    name: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialPortLink {
    /// 打开串口（8N1，无流控）
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, SerialError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(INITIAL_READ_TIMEOUT)
            .open()?;
        debug!(port = port_name, baud_rate, "serial port opened");
        Ok(Self {
            port,
            name: port_name.to_string(),
            baud_rate,
            read_timeout: INITIAL_READ_TIMEOUT,
        })
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl SerialLink for SerialPortLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        if bytes.is_empty() {
            return Ok(());
        }
        trace!(port = %self.name, tx = %hex::encode(bytes), "serial write");
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.port.read(buf) {
            Ok(0) => Err(SerialError::Timeout),
            Ok(n) => {
                trace!(port = %self.name, rx = %hex::encode(&buf[..n]), "serial read");
                Ok(n)
            },
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Err(SerialError::Timeout)
            },
            Err(e) => Err(SerialError::Io(e)),
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        if timeout != self.read_timeout {
            self.port.set_timeout(timeout)?;
            self.read_timeout = timeout;
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, SerialError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn clear_input(&mut self) -> Result<usize, SerialError> {
        let pending = self.bytes_available()?;
        if pending > 0 {
            self.port.clear(ClearBuffer::Input)?;
            debug!(port = %self.name, dropped = pending, "stale input discarded");
        }
        Ok(pending)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 可用串口信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    /// `usb` / `pci` / `bluetooth` / `unknown`
    pub kind: &'static str,
    /// USB 设备的 VID:PID 与产品名
    pub description: Option<String>,
}

/// 枚举系统串口
pub fn available_ports() -> Result<Vec<PortInfo>, SerialError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let (kind, description) = match p.port_type {
                SerialPortType::UsbPort(usb) => (
                    "usb",
                    Some(format!(
                        "{:04x}:{:04x} {}",
                        usb.vid,
                        usb.pid,
                        usb.product.unwrap_or_default()
                    )),
                ),
                SerialPortType::PciPort => ("pci", None),
                SerialPortType::BluetoothPort => ("bluetooth", None),
                SerialPortType::Unknown => ("unknown", None),
            };
            PortInfo {
                name: p.port_name,
                kind,
                description,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_is_device_error() {
        let err = match SerialPortLink::open("/dev/ucp-definitely-missing", 115_200) {
            Ok(_) => panic!("missing port should not open"),
            Err(e) => e,
        };
        assert!(matches!(err, SerialError::Device(_)));
    }

    #[test]
    fn test_error_kind_mapping() {
        let e = serialport::Error::new(serialport::ErrorKind::NoDevice, "unplugged");
        match SerialError::from(e) {
            SerialError::Device(d) => {
                assert_eq!(d.kind, SerialDeviceErrorKind::NoDevice);
                assert!(d.is_fatal());
            },
            other => panic!("unexpected: {other:?}"),
        }
        let e = serialport::Error::new(serialport::ErrorKind::InvalidInput, "bad baud");
        assert!(matches!(
            SerialError::from(e),
            SerialError::Device(SerialDeviceError {
                kind: SerialDeviceErrorKind::InvalidConfig,
                ..
            })
        ));
    }
}
