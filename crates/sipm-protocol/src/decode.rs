//! 寄存器解码
//!
//! - 序列号：ARM version 块的 8..24 字节
//! - 直方图：4096 个 `u32` 计数截断为 `u16`
//! - List mode：带时间戳的事件流

use thiserror::Error;

use crate::ProtocolError;
use crate::constants::ADC_CLOCK_HZ;
use crate::kind::CommandKind;
use crate::register::RegisterBlock;

/// 序列号在 ARM version 寄存器中的起始偏移
pub const SERIAL_OFFSET: usize = 8;
/// 序列号字节数
pub const SERIAL_LEN: usize = 16;

/// 直方图 bin 数
pub const HISTOGRAM_BINS: usize = 4096;

/// 第一个 list-mode 事件所在的寄存器索引
pub const LIST_MODE_FIRST_EVENT: usize = 4;
/// 每个 list-mode 事件占用的寄存器数
pub const LIST_MODE_EVENT_WORDS: usize = 3;

const EVENT_COUNT_MASK: u16 = 0x0FFF;
const MODE_SHIFT: u16 = 15;

/// 解码 ARM 序列号
///
/// 第 8..24 字节逐字节渲染为两位大写十六进制，拼接成 32 个字符。
pub fn decode_serial_number(registers: &[u8; 64]) -> String {
    hex::encode_upper(&registers[SERIAL_OFFSET..SERIAL_OFFSET + SERIAL_LEN])
}

/// 直方图降位
///
/// 截断到 16 位，溢出回绕是设备既有行为。
pub fn bin_histogram(registers: &[u32; HISTOGRAM_BINS]) -> [u16; HISTOGRAM_BINS] {
    registers.map(|counts| counts as u16)
}

/// 单个 list-mode 事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListModeEvent {
    /// 相对时间戳（ADC 时钟周期）
    pub timestamp: u32,
    /// 能量 bin（丢弃了 ADC 码的低 4 位）
    pub energy: u16,
}

impl ListModeEvent {
    /// 时间戳换算为秒（40 MHz ADC 时钟）
    pub fn seconds(&self) -> f64 {
        f64::from(self.timestamp) / ADC_CLOCK_HZ
    }
}

/// List-mode 缓冲区格式错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListModeFormatError {
    /// mode 位为 1；只支持高时间精度的 mode 0 编码
    #[error("List mode bit is set; only mode 0 (high time precision) is supported")]
    UnsupportedMode,

    /// 事件数超出缓冲区
    #[error("List mode buffer truncated: {count} events need {needed} registers, got {available}")]
    Truncated {
        count: usize,
        needed: usize,
        available: usize,
    },
}

/// 解析 list-mode 寄存器
///
/// 寄存器 0 (detail) 的低 12 位为事件数，最高位为 mode。
/// 事件从索引 4 开始，每个事件 3 个寄存器：
///
/// ```text
/// reg[i]     energy ADC code（/16）
/// reg[i + 1] timestamp 低 16 位
/// reg[i + 2] timestamp 高 16 位
/// ```
///
/// 解析在 `4 + 3 * count` 处停止，之后的寄存器被忽略。
pub fn parse_list_mode(registers: &[u16]) -> Result<Vec<ListModeEvent>, ListModeFormatError> {
    let Some(&detail) = registers.first() else {
        return Err(ListModeFormatError::Truncated {
            count: 0,
            needed: 1,
            available: 0,
        });
    };

    if detail >> MODE_SHIFT == 1 {
        return Err(ListModeFormatError::UnsupportedMode);
    }

    let count = usize::from(detail & EVENT_COUNT_MASK);
    let end = LIST_MODE_FIRST_EVENT + LIST_MODE_EVENT_WORDS * count;
    if count > 0 && end > registers.len() {
        return Err(ListModeFormatError::Truncated {
            count,
            needed: end,
            available: registers.len(),
        });
    }

    let events = registers
        .get(LIST_MODE_FIRST_EVENT..end)
        .unwrap_or_default()
        .chunks_exact(LIST_MODE_EVENT_WORDS)
        .map(|event| ListModeEvent {
            timestamp: u32::from(event[1]) | (u32::from(event[2]) << 16),
            energy: event[0] / 16,
        })
        .collect();

    Ok(events)
}

impl RegisterBlock<u8, 64> {
    /// 从读数据区解码序列号（仅限 ARM version 块）
    pub fn serial_number(&self) -> Result<String, ProtocolError> {
        self.expect_kind(CommandKind::ArmVersion)?;
        Ok(decode_serial_number(&self.read_registers()))
    }
}

impl RegisterBlock<u32, 4096> {
    /// 从读数据区生成 16 位直方图（仅限 legacy histogram 块）
    pub fn binned_histogram(&self) -> Result<[u16; HISTOGRAM_BINS], ProtocolError> {
        self.expect_kind(CommandKind::LegacyHistogram)?;
        Ok(bin_histogram(&self.read_registers()))
    }
}

impl RegisterBlock<u16, 1024> {
    /// 从读数据区解析 list-mode 事件（仅限 list-mode 块）
    pub fn list_mode_events(&self) -> Result<Vec<ListModeEvent>, ProtocolError> {
        self.expect_kind(CommandKind::ListMode)?;
        Ok(parse_list_mode(&self.read_registers())?)
    }
}
