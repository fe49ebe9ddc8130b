//! 传输层错误类型

use thiserror::Error;

/// 传输层错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    /// USB 错误（来自 rusb）
    #[cfg(feature = "usb")]
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// 传输超时
    #[error("Transfer timeout")]
    Timeout,

    /// 设备不存在（已拔出或从未打开）
    #[error("No such device")]
    NoDevice,

    /// 传输过程中设备断开
    #[error("Device disconnected")]
    Disconnected,

    /// 句柄/设备不属于当前后端
    #[error("Handle does not belong to this transport backend")]
    HandleMismatch,

    /// 模拟设备报告的错误
    #[error("Simulated device error: {0}")]
    Simulated(String),
}

impl TransportError {
    /// 检查是否为超时错误
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            #[cfg(feature = "usb")]
            TransportError::Usb(rusb::Error::Timeout) => true,
            _ => false,
        }
    }

    /// 检查设备是否已不可用
    pub fn is_disconnected(&self) -> bool {
        match self {
            TransportError::NoDevice | TransportError::Disconnected => true,
            #[cfg(feature = "usb")]
            TransportError::Usb(rusb::Error::NoDevice) => true,
            _ => false,
        }
    }
}
