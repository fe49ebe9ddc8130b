//! SiPM SDK - Bridgeport SiPM 探测器 Rust SDK
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 寄存器块、命令头、解码器
//! - **传输层** (`usb`): `Transport` 抽象、分块传输、libusb 与模拟后端
//! - **驱动层** (`driver`): 设备注册、读写分发、回读校验、会话配置
//!
//! # 快速开始
//!
//! ```no_run
//! use sipm_sdk::prelude::*;
//!
//! let mut manager = ManagerBuilder::new().build()?;
//! for serial in manager.serials() {
//!     let mut histogram = LegacyHistogramBlock::legacy_histogram();
//!     histogram.set_transfer_direction(MemoryType::Ram, TransferDirection::Read);
//!     manager.read_into(&serial, &mut histogram)?;
//!     let bins = histogram.binned_histogram()?;
//!     println!("{}: {} counts in bin 100", serial, bins[100]);
//! }
//! # Ok::<(), DriverError>(())
//! ```

pub use sipm_driver as driver;
pub use sipm_protocol as protocol;
pub use sipm_usb as usb;

pub mod prelude;

pub use sipm_driver::{Backend, DeviceManager, DriverError, ManagerBuilder, SessionConfig};
pub use sipm_protocol::ProtocolError;
pub use sipm_usb::{AnyTransport, SimTransport, Transport, TransportError};

/// 默认构建器创建的 manager 类型
pub type Manager = DeviceManager<AnyTransport>;
