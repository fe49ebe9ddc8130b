//! 驱动层错误类型定义

use std::path::PathBuf;

use sipm_protocol::ProtocolError;
use sipm_usb::{ChunkError, TransportError};
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 设备枚举失败
    #[error("Failed to enumerate devices: {0}")]
    Enumeration(#[source] TransportError),

    /// 打开设备失败
    #[error("Failed to open device {device}: {source}")]
    DeviceOpenFailed {
        device: String,
        source: TransportError,
    },

    /// 声明接口失败
    #[error("Failed to claim interface {interface} on {device}: {source}")]
    InterfaceClaimFailed {
        device: String,
        interface: u8,
        source: TransportError,
    },

    /// 读取 ARM version 块（获取序列号）失败
    #[error("Bootstrap exchange failed on endpoint 0x{endpoint:02X}: {source}")]
    BootstrapFailed { endpoint: u8, source: ChunkError },

    /// 序列号未注册
    #[error("Serial number not found: {0}")]
    SerialNotFound(String),

    /// 序列号重复
    #[error("Duplicate serial number: {0}")]
    DuplicateSerial(String),

    /// 写入失败
    #[error("Failed to write to endpoint 0x{endpoint:02X} of {serial}: {source}")]
    WriteBytesFailed {
        serial: String,
        endpoint: u8,
        source: ChunkError,
    },

    /// 读取失败
    #[error("Failed to read from endpoint 0x{endpoint:02X} of {serial}: {source}")]
    ReadBytesFailed {
        serial: String,
        endpoint: u8,
        source: ChunkError,
    },

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// 配置文件读取失败
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DriverError {
    /// 出错的序列号（如果有）
    pub fn serial(&self) -> Option<&str> {
        match self {
            DriverError::SerialNotFound(serial)
            | DriverError::DuplicateSerial(serial)
            | DriverError::WriteBytesFailed { serial, .. }
            | DriverError::ReadBytesFailed { serial, .. } => Some(serial),
            _ => None,
        }
    }

    /// 底层传输错误（如果有）
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            DriverError::Enumeration(source)
            | DriverError::DeviceOpenFailed { source, .. }
            | DriverError::InterfaceClaimFailed { source, .. } => Some(source),
            DriverError::BootstrapFailed { source, .. }
            | DriverError::WriteBytesFailed { source, .. }
            | DriverError::ReadBytesFailed { source, .. } => source.transport_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::SerialNotFound("ABCD".to_string());
        assert_eq!(format!("{}", err), "Serial number not found: ABCD");

        let err = DriverError::WriteBytesFailed {
            serial: "ABCD".to_string(),
            endpoint: 0x02,
            source: ChunkError::Transport {
                chunk: 3,
                offset: 768,
                source: TransportError::Timeout,
            },
        };
        let msg = format!("{}", err);
        assert!(msg.contains("0x02"), "message: {}", msg);
        assert!(msg.contains("ABCD"), "message: {}", msg);
        assert!(msg.contains("Chunk 3"), "message: {}", msg);

        let err = DriverError::ReadBytesFailed {
            serial: "ABCD".to_string(),
            endpoint: 0x82,
            source: ChunkError::ShortChunk {
                chunk: 0,
                expected: 256,
                actual: 3,
            },
        };
        assert!(format!("{}", err).contains("0x82"));
    }

    #[test]
    fn test_serial_accessor() {
        let err = DriverError::DuplicateSerial("XYZ".to_string());
        assert_eq!(err.serial(), Some("XYZ"));
        assert_eq!(DriverError::Config("bad".into()).serial(), None);
    }

    #[test]
    fn test_transport_error_accessor() {
        let err = DriverError::ReadBytesFailed {
            serial: "S".to_string(),
            endpoint: 0x82,
            source: ChunkError::Transport {
                chunk: 0,
                offset: 0,
                source: TransportError::Disconnected,
            },
        };
        assert!(err.transport_error().is_some_and(|e| e.is_disconnected()));

        let err = DriverError::Enumeration(TransportError::NoDevice);
        assert!(err.transport_error().is_some());
        assert!(DriverError::SerialNotFound("S".into()).transport_error().is_none());
    }

    #[test]
    fn test_from_protocol_error() {
        let err: DriverError = ProtocolError::InvalidLength {
            expected: 4,
            actual: 1,
        }
        .into();
        assert!(matches!(err, DriverError::Protocol(_)));
    }
}
