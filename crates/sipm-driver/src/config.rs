//! 会话配置
//!
//! 默认值与设备线格式一致（256 字节分块、1000 ms 超时、接口 1）。
//! 可以从 TOML 加载：
//!
//! ```toml
//! chunk_size = 256
//! timeout_ms = 1000
//! interface_number = 1
//! short_chunk_policy = "continue"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sipm_protocol::{CHUNK_SIZE, DETECTOR_INTERFACE, TRANSFER_TIMEOUT_MS};
use sipm_usb::{ChunkedTransfer, ShortChunkPolicy};

use crate::error::DriverError;

/// 会话配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// 单个分块的最大字节数（不超过设备缓冲区 256 字节）
    pub chunk_size: usize,
    /// 每个分块的超时（毫秒）
    pub timeout_ms: u64,
    /// 声明的 USB 接口号
    pub interface_number: u8,
    /// 短分块处理策略
    pub short_chunk_policy: ShortChunkPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            timeout_ms: TRANSFER_TIMEOUT_MS,
            interface_number: DETECTOR_INTERFACE,
            short_chunk_policy: ShortChunkPolicy::Continue,
        }
    }
}

impl SessionConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(text: &str) -> Result<Self, DriverError> {
        let config: SessionConfig = toml::from_str(text)
            .map_err(|e| DriverError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DriverError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, DriverError> {
        toml::to_string_pretty(self)
            .map_err(|e| DriverError::Config(format!("Failed to serialize TOML: {}", e)))
    }

    /// 校验取值范围
    ///
    /// # Errors
    /// - `chunk_size` 为 0 或超过设备缓冲区
    /// - `timeout_ms` 为 0
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.chunk_size == 0 || self.chunk_size > CHUNK_SIZE {
            return Err(DriverError::Config(format!(
                "chunk_size must be in 1..={}, got {}",
                CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.timeout_ms == 0 {
            return Err(DriverError::Config("timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 按配置构造分块传输引擎
    pub fn transfer_engine(&self) -> ChunkedTransfer {
        ChunkedTransfer::new(self.chunk_size, self.timeout(), self.short_chunk_policy)
    }
}
