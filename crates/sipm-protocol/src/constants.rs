//! 协议常量定义
//!
//! USB 端点、命令包尺寸和设备缓冲区限制。

// ============================================================================
// USB 设备标识
// ============================================================================

/// Bridgeport Instruments 的 USB Vendor ID
pub const BRIDGEPORT_VID: u16 = 0x1fa4;

/// 探测器使用的 USB 接口号
pub const DETECTOR_INTERFACE: u8 = 1;

// ============================================================================
// USB Endpoints
// ============================================================================

/// 命令 OUT 端点（host → device）
pub const CMD_OUT_EP: u8 = 0x01;
/// 命令 IN 端点（读写路径不使用）
pub const CMD_IN_EP: u8 = 0x81;
/// 数据 OUT 端点（host → device）
pub const DATA_OUT_EP: u8 = 0x02;
/// 数据 IN 端点（device → host）
pub const DATA_IN_EP: u8 = 0x82;

/// 端点地址中的方向位（置位表示 IN）
pub const ENDPOINT_DIR_IN: u8 = 0x80;

// ============================================================================
// 包尺寸与传输参数
// ============================================================================

/// 命令包固定长度（字节）
pub const CMD_PACKET_SIZE: usize = 64;

/// 命令头长度（字节），位于命令包起始处
pub const HEADER_SIZE: usize = 4;

/// 短写时命令包中可容纳的数据字节数
pub const SHORT_WRITE_CAPACITY: usize = CMD_PACKET_SIZE - HEADER_SIZE;

/// 设备内部 ARM 处理器的暂存缓冲区大小，单次批量传输不得超过此值
pub const CHUNK_SIZE: usize = 256;

/// 每个分块的传输超时（毫秒）
pub const TRANSFER_TIMEOUT_MS: u64 = 1000;

/// 短写标志：数据已折叠进命令包，无需额外的数据传输
pub const SHORT_WRITE_FLAG: u32 = 0x800;

/// 探测器 ADC 时钟频率（Hz），list-mode 时间戳以此为单位
pub const ADC_CLOCK_HZ: f64 = 40e6;

/// 判断端点是否为 IN 方向
pub fn is_in_endpoint(endpoint: u8) -> bool {
    endpoint & ENDPOINT_DIR_IN != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_direction() {
        assert!(!is_in_endpoint(CMD_OUT_EP));
        assert!(is_in_endpoint(CMD_IN_EP));
        assert!(!is_in_endpoint(DATA_OUT_EP));
        assert!(is_in_endpoint(DATA_IN_EP));
    }

    #[test]
    fn test_short_write_capacity() {
        assert_eq!(SHORT_WRITE_CAPACITY, 60);
    }
}
