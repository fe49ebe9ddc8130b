//! # SiPM Driver
//!
//! 设备会话层：
//! - 启动：枚举 Bridgeport 设备，读取序列号并注册
//! - 按序列号分发寄存器块的写/读（分块传输）
//! - 写入回读校验
//! - 会话配置（TOML）
//!
//! # Example
//!
//! ```no_run
//! use sipm_driver::ManagerBuilder;
//! use sipm_protocol::{ListModeBlock, MemoryType, TransferDirection};
//!
//! let mut manager = ManagerBuilder::new().build()?;
//! for serial in manager.serials() {
//!     let mut block = ListModeBlock::list_mode();
//!     block.set_transfer_direction(MemoryType::Ram, TransferDirection::Read);
//!     manager.read_into(&serial, &mut block)?;
//!     println!("{}: {} events", serial, block.list_mode_events()?.len());
//! }
//! # Ok::<(), sipm_driver::DriverError>(())
//! ```

mod builder;
mod config;
mod error;
mod manager;
pub mod registry;
pub mod verify;

pub use builder::{Backend, ManagerBuilder};
pub use config::SessionConfig;
pub use error::DriverError;
pub use manager::DeviceManager;
pub use registry::DeviceRegistry;
pub use verify::{RegisterMismatch, compare_registers};
