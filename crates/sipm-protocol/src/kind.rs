//! 命令种类静态配置表
//!
//! 每种命令对应一个固定的寄存器类型、寄存器数量、command id 以及读写类型代码。
//! 命令集合是封闭的，因此用枚举 + 静态表表达，不需要动态分发。

use std::fmt;

use crate::constants::SHORT_WRITE_CAPACITY;
use crate::header::TransferType;

/// 寄存器元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterType {
    U8,
    U16,
    U32,
    I16,
    F32,
}

impl RegisterType {
    /// 单个寄存器的字节宽度
    pub const fn width(self) -> usize {
        match self {
            RegisterType::U8 => 1,
            RegisterType::U16 | RegisterType::I16 => 2,
            RegisterType::U32 | RegisterType::F32 => 4,
        }
    }
}

/// 命令所属的处理器（决定读写类型代码）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterClass {
    /// ARM 处理器：写 3 / 读 4
    Arm,
    /// FPGA：写 1 / 读 2
    Fpga,
}

/// 命令种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandKind {
    ArmStatus,
    ArmControl,
    ArmCalibration,
    ArmVersion,
    FpgaControl,
    FpgaResults,
    FpgaStatistics,
    FpgaTrace,
    FpgaAction,
    LegacyHistogram,
    ListMode,
    TimeSlice,
}

/// 单种命令的静态配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub kind: CommandKind,
    pub register_type: RegisterType,
    pub count: usize,
    pub command_id: u8,
    pub class: RegisterClass,
}

impl CommandSpec {
    const fn new(
        kind: CommandKind,
        register_type: RegisterType,
        count: usize,
        command_id: u8,
        class: RegisterClass,
    ) -> Self {
        Self {
            kind,
            register_type,
            count,
            command_id,
            class,
        }
    }

    /// 数据区字节数（`width × count`）
    pub const fn data_len(&self) -> usize {
        self.register_type.width() * self.count
    }

    /// 数据能否折叠进命令包（`60 >= data_len`）
    pub const fn short_write_possible(&self) -> bool {
        SHORT_WRITE_CAPACITY >= self.data_len()
    }

    /// 读类型代码
    pub fn read_type(&self) -> TransferType {
        match self.class {
            RegisterClass::Arm => TransferType::ArmRead,
            RegisterClass::Fpga => TransferType::FpgaRead,
        }
    }

    /// 写类型代码
    pub fn write_type(&self) -> TransferType {
        match self.class {
            RegisterClass::Arm => TransferType::ArmWrite,
            RegisterClass::Fpga => TransferType::FpgaWrite,
        }
    }
}

use CommandKind as K;
use RegisterClass::{Arm, Fpga};
use RegisterType::{F32, I16, U8, U16, U32};

static COMMAND_TABLE: [CommandSpec; 12] = [
    CommandSpec::new(K::ArmStatus, F32, 7, 1, Arm),
    CommandSpec::new(K::ArmControl, F32, 16, 2, Arm),
    CommandSpec::new(K::ArmCalibration, F32, 64, 3, Arm),
    CommandSpec::new(K::ArmVersion, U8, 64, 0, Arm),
    CommandSpec::new(K::FpgaControl, U16, 16, 0, Fpga),
    CommandSpec::new(K::FpgaResults, U16, 16, 2, Fpga),
    CommandSpec::new(K::FpgaStatistics, U32, 16, 1, Fpga),
    CommandSpec::new(K::FpgaTrace, I16, 1024, 4, Fpga),
    CommandSpec::new(K::FpgaAction, U16, 4, 7, Fpga),
    CommandSpec::new(K::LegacyHistogram, U32, 4096, 3, Fpga),
    CommandSpec::new(K::ListMode, U16, 1024, 5, Fpga),
    CommandSpec::new(K::TimeSlice, U16, 1024, 8, Fpga),
];

impl CommandKind {
    /// 所有命令种类（与配置表顺序一致）
    pub const ALL: [CommandKind; 12] = [
        K::ArmStatus,
        K::ArmControl,
        K::ArmCalibration,
        K::ArmVersion,
        K::FpgaControl,
        K::FpgaResults,
        K::FpgaStatistics,
        K::FpgaTrace,
        K::FpgaAction,
        K::LegacyHistogram,
        K::ListMode,
        K::TimeSlice,
    ];

    /// 查表获取静态配置
    pub fn spec(self) -> &'static CommandSpec {
        &COMMAND_TABLE[self as usize]
    }

    /// 根据命令头中的传输类型和 command id 反查命令种类
    ///
    /// ARM 与 FPGA 的 id 空间相互独立，因此需要同时给出传输类型。
    pub fn identify(transfer_type: TransferType, command_id: u8) -> Option<CommandKind> {
        let class = match transfer_type {
            TransferType::ArmRead | TransferType::ArmWrite => Arm,
            TransferType::FpgaRead | TransferType::FpgaWrite => Fpga,
        };
        COMMAND_TABLE
            .iter()
            .find(|spec| spec.class == class && spec.command_id == command_id)
            .map(|spec| spec.kind)
    }

    /// 命令名称（与 Bridgeport 文档一致）
    pub fn name(self) -> &'static str {
        match self {
            K::ArmStatus => "arm_status",
            K::ArmControl => "arm_ctrl",
            K::ArmCalibration => "arm_cal",
            K::ArmVersion => "arm_version",
            K::FpgaControl => "fpga_ctrl",
            K::FpgaResults => "fpga_results",
            K::FpgaStatistics => "fpga_statistics",
            K::FpgaTrace => "fpga_trace",
            K::FpgaAction => "fpga_action",
            K::LegacyHistogram => "fpga_histogram",
            K::ListMode => "fpga_list_mode",
            K::TimeSlice => "fpga_time_slice",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
