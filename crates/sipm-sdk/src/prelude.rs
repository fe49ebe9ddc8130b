//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use sipm_sdk::prelude::*;
//! ```

pub use crate::Manager;

// 驱动层
pub use sipm_driver::{
    Backend, DeviceManager, DriverError, ManagerBuilder, RegisterMismatch, SessionConfig,
};

// 寄存器块与解码
pub use sipm_protocol::{
    ArmCalibrationBlock, ArmControlBlock, ArmStatusBlock, ArmVersionBlock, CommandKind,
    FpgaActionBlock, FpgaControlBlock, FpgaResultsBlock, FpgaStatisticsBlock, FpgaTraceBlock,
    LegacyHistogramBlock, ListModeBlock, ListModeEvent, MemoryType, ProtocolError, RegisterBlock,
    TimeSliceBlock, TransferDirection,
};

// 传输层
pub use sipm_usb::{AnyTransport, ShortChunkPolicy, SimTransport, Transport, TransportError};
