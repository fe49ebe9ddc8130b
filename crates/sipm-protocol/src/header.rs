//! 命令头编码
//!
//! 命令包的前 4 字节是一个 little-endian 的 32 位描述字：
//!
//! ```text
//! bit 31..16  byte count
//! bit 12      memory type (0 = RAM, 1 = NVRAM)
//! bit 11..4   command id
//! bit 3..0    transfer type (+ 0x800 short write flag)
//! ```
//!
//! 各字段通过**加法**组合而非按位或。短写标志 0x800 落在 command id 的位区间内，
//! 这是设备线格式本身的特性，编码时必须原样保留。

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ProtocolError;
use crate::constants::{CMD_PACKET_SIZE, HEADER_SIZE, SHORT_WRITE_FLAG};
use crate::kind::CommandSpec;

/// 寄存器所在的存储区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MemoryType {
    /// 易失存储（默认）
    #[default]
    Ram = 0,
    /// 非易失存储
    Nvram = 1,
}

/// 传输方向（相对 host）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferDirection {
    /// host → device
    Write,
    /// device → host
    Read,
}

/// 传输类型代码（命令头 bit 0..3）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TransferType {
    FpgaWrite = 1,
    FpgaRead = 2,
    ArmWrite = 3,
    ArmRead = 4,
}

impl TransferType {
    /// 是否为写类型
    pub fn is_write(self) -> bool {
        matches!(self, TransferType::FpgaWrite | TransferType::ArmWrite)
    }

    /// 传输方向
    pub fn direction(self) -> TransferDirection {
        if self.is_write() {
            TransferDirection::Write
        } else {
            TransferDirection::Read
        }
    }
}

/// 命令头（4 字节描述字）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHeader(u32);

impl CommandHeader {
    /// 按字段组合命令头
    ///
    /// 计算 `(byte_count << 16) + (memory << 12) + (command_id << 4) + flags`，
    /// 使用回绕加法，与设备固件的解析方式一致。
    pub fn new(byte_count: u32, memory: MemoryType, command_id: u8, flags: u32) -> Self {
        let word = (byte_count << 16)
            .wrapping_add(u32::from(u8::from(memory)) << 12)
            .wrapping_add(u32::from(command_id) << 4)
            .wrapping_add(flags);
        Self(word)
    }

    /// 编码为线上字节（little-endian）
    pub fn encode(byte_count: u32, memory: MemoryType, command_id: u8, flags: u32) -> [u8; 4] {
        Self::new(byte_count, memory, command_id, flags).to_bytes()
    }

    /// 为某种命令和方向生成命令头
    ///
    /// - 写方向：`flags = write_type [+ 0x800]`，`byte_count` 固定为 64（完整命令包）
    /// - 读方向：`flags = read_type`，`byte_count` 为期望读取的数据字节数
    pub fn for_command(spec: &CommandSpec, memory: MemoryType, direction: TransferDirection) -> Self {
        let (byte_count, flags) = match direction {
            TransferDirection::Write => {
                let mut flags = u32::from(u8::from(spec.write_type()));
                if spec.short_write_possible() {
                    flags += SHORT_WRITE_FLAG;
                }
                (CMD_PACKET_SIZE as u32, flags)
            },
            TransferDirection::Read => {
                (spec.data_len() as u32, u32::from(u8::from(spec.read_type())))
            },
        };
        Self::new(byte_count, memory, spec.command_id, flags)
    }

    /// 从线上字节解析
    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    /// 从命令包起始处解析
    ///
    /// # Errors
    /// - `ProtocolError::InvalidLength`：包长度不足 4 字节
    pub fn parse(packet: &[u8]) -> Result<Self, ProtocolError> {
        match packet.get(..HEADER_SIZE) {
            Some(raw) => {
                let mut bytes = [0u8; HEADER_SIZE];
                bytes.copy_from_slice(raw);
                Ok(Self::from_bytes(bytes))
            },
            None => Err(ProtocolError::InvalidLength {
                expected: HEADER_SIZE,
                actual: packet.len(),
            }),
        }
    }

    /// 线上字节（little-endian）
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        self.0.to_le_bytes()
    }

    /// 原始 32 位描述字
    pub fn word(self) -> u32 {
        self.0
    }

    /// bit 16..31：字节数
    pub fn byte_count(self) -> u32 {
        self.0 >> 16
    }

    /// bit 12：存储区
    pub fn memory_type(self) -> MemoryType {
        if self.0 & (1 << 12) != 0 {
            MemoryType::Nvram
        } else {
            MemoryType::Ram
        }
    }

    /// bit 4..11 原始值（短写时包含 0x800 带来的最高位）
    pub fn command_field(self) -> u8 {
        ((self.0 >> 4) & 0xFF) as u8
    }

    /// 去掉短写标志后的 command id
    ///
    /// 仅对小于 0x80 的 id 有意义，更大的 id 与短写标志位重叠。
    pub fn command_id(self) -> u8 {
        (((self.0 & !SHORT_WRITE_FLAG) >> 4) & 0xFF) as u8
    }

    /// bit 0..3：传输类型（未知代码返回 `None`）
    pub fn transfer_type(self) -> Option<TransferType> {
        TransferType::try_from((self.0 & 0xF) as u8).ok()
    }

    /// 是否携带短写标志
    pub fn is_short_write(self) -> bool {
        self.0 & SHORT_WRITE_FLAG != 0
    }
}

impl From<CommandHeader> for u32 {
    fn from(header: CommandHeader) -> Self {
        header.0
    }
}
