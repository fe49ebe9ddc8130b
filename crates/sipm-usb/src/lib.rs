//! # SiPM USB Transport Layer
//!
//! 批量传输抽象层，提供统一的 `Transport` 接口以及分块传输引擎。
//!
//! ## 后端
//!
//! - `UsbTransport`: libusb 硬件后端（`usb` feature，默认启用）
//! - `SimTransport`: 进程内模拟探测器，不依赖硬件
//! - `AnyTransport`: 构造时选定后端的标签枚举

use std::fmt;
use std::time::Duration;

pub mod any;
pub mod chunked;
pub mod error;
pub mod sim;

#[cfg(feature = "usb")]
pub mod usb;

pub use any::{AnyDevice, AnyHandle, AnyTransport};
pub use chunked::{
    ChunkError, ChunkPlan, ChunkedTransfer, ShortChunk, ShortChunkPolicy, TransferReport,
    chunk_plan,
};
pub use error::TransportError;
pub use sim::{Fault, SimDevice, SimHandle, SimTransport, TransferRecord};

#[cfg(feature = "usb")]
pub use usb::{UsbDevice, UsbHandle, UsbTransport};

/// 设备在后端中的位置
///
/// 设备保持连接期间唯一。USB 后端为总线号和设备地址，模拟后端为总线 0 加设备索引。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DeviceAddress {
    pub bus: u8,
    pub address: u32,
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:03}", self.bus, self.address)
    }
}

/// 批量传输能力
///
/// 对应一个 USB 后端：枚举（已按 vendor ID 过滤）、打开、声明接口、带超时的批量读写、关闭。
///
/// 短传输不是错误：`bulk_write` / `bulk_read` 返回实际传输的字节数，
/// 由调用方决定如何处理。只有后端失败才返回 `Err`。
pub trait Transport {
    /// 可打开的设备描述
    type Device: fmt::Debug;
    /// 已打开的设备句柄
    type Handle;

    /// 枚举匹配 vendor ID 的设备
    fn devices(&mut self) -> Result<Vec<Self::Device>, TransportError>;

    /// 设备位置，用于识别已经打开的设备
    fn device_address(&self, device: &Self::Device) -> DeviceAddress;

    /// 打开设备
    fn open(&mut self, device: &Self::Device) -> Result<Self::Handle, TransportError>;

    /// 声明接口（必要时先卸载内核驱动）
    fn claim_interface(
        &mut self,
        handle: &mut Self::Handle,
        interface: u8,
    ) -> Result<(), TransportError>;

    /// 向 OUT 端点写入，返回实际写入字节数
    fn bulk_write(
        &mut self,
        handle: &mut Self::Handle,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// 从 IN 端点读取，返回实际读取字节数
    fn bulk_read(
        &mut self,
        handle: &mut Self::Handle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// 释放接口并关闭句柄
    fn close(&mut self, handle: Self::Handle);
}
