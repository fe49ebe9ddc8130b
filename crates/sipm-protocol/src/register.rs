//! 寄存器块
//!
//! `RegisterBlock<T, N>` 保存一条在途命令的全部状态：64 字节命令包、写数据区和读数据区。
//! 寄存器数组与字节之间的转换使用显式的 `to_ne_bytes` / `from_ne_bytes`。
//!
//! # 字节序
//!
//! 寄存器数据按 **host 字节序** 编解码，与设备固件（little-endian ARM）在 x86/ARM
//! 主机上一致。跨字节序架构使用不在支持范围内。命令头例外，始终为 little-endian。

use std::fmt;
use std::marker::PhantomData;

use crate::ProtocolError;
use crate::constants::{CMD_PACKET_SIZE, HEADER_SIZE};
use crate::header::{CommandHeader, MemoryType, TransferDirection};
use crate::kind::{CommandKind, CommandSpec, RegisterType};
use crate::preset;

/// 可作为寄存器元素的标量类型
pub trait Register: Copy + Default + PartialEq + fmt::Debug + 'static {
    /// 对应的寄存器类型标签
    const TYPE: RegisterType;

    /// 写入 `out`（长度等于寄存器宽度）
    fn write_bytes(self, out: &mut [u8]);

    /// 从 `bytes`（长度等于寄存器宽度）读取
    fn read_bytes(bytes: &[u8]) -> Self;
}

macro_rules! impl_register {
    ($ty:ty, $tag:ident) => {
        impl Register for $ty {
            const TYPE: RegisterType = RegisterType::$tag;

            fn write_bytes(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes());
            }

            fn read_bytes(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_ne_bytes(raw)
            }
        }

        const _: () = assert!(RegisterType::$tag.width() == std::mem::size_of::<$ty>());
    };
}

impl_register!(u8, U8);
impl_register!(u16, U16);
impl_register!(u32, U32);
impl_register!(i16, I16);
impl_register!(f32, F32);

/// 一条命令的寄存器块
///
/// - `command`：固定 64 字节，前 4 字节为命令头；可短写时后 60 字节携带写数据
/// - `write_data` / `read_data`：长度为 `size_of::<T>() * N`，创建后不再改变
///
/// 寄存器块代表一条在途命令，没有实现 `Clone`，复制会导致命令与数据失去同步。
pub struct RegisterBlock<T: Register, const N: usize> {
    kind: CommandKind,
    command: [u8; CMD_PACKET_SIZE],
    write_data: Box<[u8]>,
    read_data: Box<[u8]>,
    _registers: PhantomData<[T; N]>,
}

impl<T: Register, const N: usize> RegisterBlock<T, N> {
    /// 单个寄存器宽度
    pub const REGISTER_WIDTH: usize = T::TYPE.width();
    /// 数据区字节数
    pub const DATA_LEN: usize = T::TYPE.width() * N;

    /// 创建指定命令种类的寄存器块（全部清零）
    ///
    /// # Errors
    /// - `ProtocolError::LayoutMismatch`：`T` 或 `N` 与命令配置表不符
    pub fn new(kind: CommandKind) -> Result<Self, ProtocolError> {
        let spec = kind.spec();
        if spec.register_type != T::TYPE || spec.count != N {
            return Err(ProtocolError::LayoutMismatch {
                kind,
                expected_type: spec.register_type,
                expected_count: spec.count,
                actual_type: T::TYPE,
                actual_count: N,
            });
        }
        Ok(Self::with_kind(kind))
    }

    /// 具名构造器使用，布局已由配置表测试覆盖
    fn with_kind(kind: CommandKind) -> Self {
        debug_assert_eq!(kind.spec().register_type, T::TYPE);
        debug_assert_eq!(kind.spec().count, N);
        Self {
            kind,
            command: [0u8; CMD_PACKET_SIZE],
            write_data: vec![0u8; Self::DATA_LEN].into_boxed_slice(),
            read_data: vec![0u8; Self::DATA_LEN].into_boxed_slice(),
            _registers: PhantomData,
        }
    }

    /// 创建并预装写寄存器
    fn with_preset(kind: CommandKind, preset: &[T; N]) -> Self {
        let mut block = Self::with_kind(kind);
        block.set_write_registers(preset);
        block
    }

    /// 命令种类
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// 命令静态配置
    pub fn spec(&self) -> &'static CommandSpec {
        self.kind.spec()
    }

    /// 数据能否折叠进命令包
    pub fn short_write_possible(&self) -> bool {
        CMD_PACKET_SIZE - HEADER_SIZE >= Self::DATA_LEN
    }

    /// 数据区字节数
    pub fn data_len(&self) -> usize {
        Self::DATA_LEN
    }

    /// 装载写寄存器
    ///
    /// 逐字节复制到写数据区；如果可以短写，同时复制到命令包 offset 4 处，
    /// 命令包剩余部分清零。
    pub fn set_write_registers(&mut self, values: &[T; N]) {
        for (value, out) in values
            .iter()
            .zip(self.write_data.chunks_exact_mut(Self::REGISTER_WIDTH))
        {
            value.write_bytes(out);
        }

        if self.short_write_possible() {
            let payload = &mut self.command[HEADER_SIZE..];
            payload.fill(0);
            payload[..Self::DATA_LEN].copy_from_slice(&self.write_data);
        }
    }

    /// 设置传输方向，重写命令头（`command[0..4]`）
    pub fn set_transfer_direction(&mut self, memory: MemoryType, direction: TransferDirection) {
        let header = CommandHeader::for_command(self.kind.spec(), memory, direction);
        self.command[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    /// 当前命令头
    pub fn header(&self) -> CommandHeader {
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&self.command[..HEADER_SIZE]);
        CommandHeader::from_bytes(raw)
    }

    /// 从读数据区重建寄存器数组
    pub fn read_registers(&self) -> [T; N] {
        Self::registers_from(&self.read_data)
    }

    /// 从写数据区重建寄存器数组
    pub fn write_registers(&self) -> [T; N] {
        Self::registers_from(&self.write_data)
    }

    fn registers_from(bytes: &[u8]) -> [T; N] {
        let mut registers = [T::default(); N];
        for (register, raw) in registers
            .iter_mut()
            .zip(bytes.chunks_exact(Self::REGISTER_WIDTH))
        {
            *register = T::read_bytes(raw);
        }
        registers
    }

    /// 写数据区是否全为零
    pub fn write_data_is_empty(&self) -> bool {
        self.write_data.iter().all(|&b| b == 0)
    }

    /// 命令包（64 字节）
    pub fn command(&self) -> &[u8; CMD_PACKET_SIZE] {
        &self.command
    }

    /// 写数据区
    pub fn write_data(&self) -> &[u8] {
        &self.write_data
    }

    /// 读数据区
    pub fn read_data(&self) -> &[u8] {
        &self.read_data
    }

    /// 读数据区（可变，由传输层填充）
    pub fn read_data_mut(&mut self) -> &mut [u8] {
        &mut self.read_data
    }

    pub(crate) fn expect_kind(&self, expected: CommandKind) -> Result<(), ProtocolError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(ProtocolError::KindMismatch {
                expected,
                actual: self.kind,
            })
        }
    }
}

impl<T: Register, const N: usize> fmt::Debug for RegisterBlock<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = format!("0x{:08X}", self.header().word());
        f.debug_struct("RegisterBlock")
            .field("kind", &self.kind)
            .field("header", &header)
            .field("data_len", &Self::DATA_LEN)
            .finish()
    }
}

// ============================================================================
// 各命令种类的具名构造器
// ============================================================================

pub type ArmStatusBlock = RegisterBlock<f32, 7>;
pub type ArmControlBlock = RegisterBlock<f32, 16>;
pub type ArmCalibrationBlock = RegisterBlock<f32, 64>;
pub type ArmVersionBlock = RegisterBlock<u8, 64>;
pub type FpgaControlBlock = RegisterBlock<u16, 16>;
pub type FpgaResultsBlock = RegisterBlock<u16, 16>;
pub type FpgaStatisticsBlock = RegisterBlock<u32, 16>;
pub type FpgaTraceBlock = RegisterBlock<i16, 1024>;
pub type FpgaActionBlock = RegisterBlock<u16, 4>;
pub type LegacyHistogramBlock = RegisterBlock<u32, 4096>;
pub type ListModeBlock = RegisterBlock<u16, 1024>;
pub type TimeSliceBlock = RegisterBlock<u16, 1024>;

impl RegisterBlock<f32, 7> {
    pub fn arm_status() -> Self {
        Self::with_kind(CommandKind::ArmStatus)
    }
}

impl RegisterBlock<f32, 16> {
    /// 预装 list-mode 优化参数
    pub fn arm_control() -> Self {
        Self::with_preset(CommandKind::ArmControl, &preset::ARM_CTRL_LM_OPTIMIZED)
    }
}

impl RegisterBlock<f32, 64> {
    pub fn arm_calibration() -> Self {
        Self::with_kind(CommandKind::ArmCalibration)
    }
}

impl RegisterBlock<u8, 64> {
    pub fn arm_version() -> Self {
        Self::with_kind(CommandKind::ArmVersion)
    }
}

impl RegisterBlock<u16, 16> {
    /// 预装 list-mode 优化参数
    pub fn fpga_control() -> Self {
        Self::with_preset(CommandKind::FpgaControl, &preset::FPGA_CTRL_LM_OPTIMIZED)
    }

    pub fn fpga_results() -> Self {
        Self::with_kind(CommandKind::FpgaResults)
    }
}

impl RegisterBlock<u32, 16> {
    pub fn fpga_statistics() -> Self {
        Self::with_kind(CommandKind::FpgaStatistics)
    }
}

impl RegisterBlock<i16, 1024> {
    pub fn fpga_trace() -> Self {
        Self::with_kind(CommandKind::FpgaTrace)
    }
}

impl RegisterBlock<u16, 4> {
    /// 预装"开始新的 list-mode 采集"动作
    pub fn fpga_action() -> Self {
        Self::with_preset(CommandKind::FpgaAction, &preset::FPGA_ACTION_START_LIST)
    }
}

impl RegisterBlock<u32, 4096> {
    pub fn legacy_histogram() -> Self {
        Self::with_kind(CommandKind::LegacyHistogram)
    }
}

impl RegisterBlock<u16, 1024> {
    pub fn list_mode() -> Self {
        Self::with_kind(CommandKind::ListMode)
    }

    pub fn time_slice() -> Self {
        Self::with_kind(CommandKind::TimeSlice)
    }
}
