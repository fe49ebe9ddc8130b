//! 寄存器预设值
//!
//! 由 Bridgeport 的 `mca_api` / `mca3k_data` 工具从保存的优化配置中计算得到。
//! 这些参数针对 EXACT FSR 调优，不一定适合其它晶体（例如 CeBr3）。

/// ARM 控制寄存器：list-mode 优化参数
pub const ARM_CTRL_LM_OPTIMIZED: [f32; 16] = [
    0.0,
    0.0,
    1.0,
    27.0,
    1.0,
    0.1,
    25.0,
    34.0,
    4800.0,
    20000.0,
    0.0,
    0.0,
    0.0,
    0.0,
    0.0,
    0.0,
];

/// FPGA 控制寄存器：list-mode 优化参数
pub const FPGA_CTRL_LM_OPTIMIZED: [u16; 16] = [
    17800, 20, 34, 72, 60, 65280, 100, 1092, 0, 0, 0, 0, 3906, 0, 33008, 32768,
];

/// FPGA 动作：清除全部状态并开始 list-mode 采集
///
/// - reg 0 = 0b1111：清除所有计数器和缓冲区
/// - reg 2 = 0b1000：启用 list mode
pub const FPGA_ACTION_START_LIST: [u16; 4] = [0b1111, 0, 0b1000, 0];

/// FPGA 动作：清除全部状态并开始直方图采集
///
/// - reg 2 = 0b0001：启用直方图模式
pub const FPGA_ACTION_START_HISTOGRAM: [u16; 4] = [0b1111, 0, 0b0001, 0];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_presets_differ_only_in_mode() {
        assert_eq!(FPGA_ACTION_START_LIST[0], FPGA_ACTION_START_HISTOGRAM[0]);
        assert_ne!(FPGA_ACTION_START_LIST[2], FPGA_ACTION_START_HISTOGRAM[2]);
    }

    #[test]
    fn test_arm_ctrl_gain_is_f32_exact() {
        assert_eq!(ARM_CTRL_LM_OPTIMIZED[5], 0.1f32);
    }
}
