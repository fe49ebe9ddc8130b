//! # SiPM Protocol
//!
//! Bridgeport SiPM 探测器 USB 命令协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 端点、包尺寸等协议常量
//! - `header`: 4 字节命令头编码/解码
//! - `kind`: 命令种类静态配置表
//! - `register`: 类型化寄存器块
//! - `preset`: 寄存器预设值
//! - `decode`: 序列号、直方图、list-mode 解码
//!
//! ## 字节序
//!
//! 命令头固定为 little-endian。寄存器数据按 host 字节序编解码，
//! 只保证在 little-endian 主机上与设备一致。

pub mod constants;
pub mod decode;
pub mod header;
pub mod kind;
pub mod preset;
pub mod register;

// 重新导出常用类型
pub use constants::*;
pub use decode::{
    HISTOGRAM_BINS, ListModeEvent, ListModeFormatError, SERIAL_LEN, SERIAL_OFFSET, bin_histogram,
    decode_serial_number, parse_list_mode,
};
pub use header::{CommandHeader, MemoryType, TransferDirection, TransferType};
pub use kind::{CommandKind, CommandSpec, RegisterClass, RegisterType};
pub use register::*;

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(
        "Register layout mismatch for {kind}: expected {expected_count} x {expected_type:?}, got {actual_count} x {actual_type:?}"
    )]
    LayoutMismatch {
        kind: CommandKind,
        expected_type: RegisterType,
        expected_count: usize,
        actual_type: RegisterType,
        actual_count: usize,
    },

    #[error("Command kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: CommandKind,
        actual: CommandKind,
    },

    #[error("Invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("List mode format error: {0}")]
    ListModeFormat(#[from] ListModeFormatError),
}
