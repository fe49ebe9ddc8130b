//! Builder 模式实现
//!
//! 提供链式构造 `DeviceManager<AnyTransport>` 的便捷方式。

use std::path::PathBuf;

#[cfg(feature = "usb")]
use sipm_usb::UsbTransport;
use sipm_usb::{AnyTransport, SimTransport};
use tracing::info;

use crate::config::SessionConfig;
use crate::error::DriverError;
use crate::manager::DeviceManager;

/// 后端选择
#[derive(Debug)]
pub enum Backend {
    /// libusb 硬件后端（默认）
    #[cfg(feature = "usb")]
    Usb,
    /// 模拟后端
    Sim(SimTransport),
}

impl Default for Backend {
    #[cfg(feature = "usb")]
    fn default() -> Self {
        Backend::Usb
    }

    #[cfg(not(feature = "usb"))]
    fn default() -> Self {
        Backend::Sim(SimTransport::new())
    }
}

/// Manager Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use sipm_driver::{Backend, ManagerBuilder, SessionConfig};
/// use sipm_usb::SimTransport;
///
/// // 连接所有真实设备
/// let manager = ManagerBuilder::new().build().unwrap();
///
/// // 使用模拟探测器和自定义配置
/// let sim = SimTransport::new().with_detector([0x11; 16]);
/// let manager = ManagerBuilder::new()
///     .backend(Backend::Sim(sim))
///     .config(SessionConfig { timeout_ms: 200, ..Default::default() })
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct ManagerBuilder {
    backend: Backend,
    config: Option<SessionConfig>,
    config_path: Option<PathBuf>,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 选择后端（默认硬件后端）
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// 设置会话配置
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 从 TOML 文件加载会话配置（`config()` 优先）
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// 创建 manager 并连接所有设备
    ///
    /// # Errors
    /// - `DriverError::Config` / `DriverError::ConfigIo`: 配置无效或无法读取
    /// - `connect_all` 的所有错误
    pub fn build(self) -> Result<DeviceManager<AnyTransport>, DriverError> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => SessionConfig::load(path)?,
            (None, None) => SessionConfig::default(),
        };

        let transport = match self.backend {
            #[cfg(feature = "usb")]
            Backend::Usb => AnyTransport::Usb(UsbTransport::new()),
            Backend::Sim(sim) => AnyTransport::Sim(sim),
        };
        let backend = transport.backend_name();

        let mut manager = DeviceManager::with_config(transport, config)?;
        let serials = manager.connect_all()?;
        info!("Connected {} device(s) via {} backend", serials.len(), backend);
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_build_with_sim_backend() {
        let sim = SimTransport::new().with_detector([0x11; 16]).with_detector([0x22; 16]);
        let manager = ManagerBuilder::new().backend(Backend::Sim(sim)).build().unwrap();
        assert_eq!(manager.serials(), vec!["11".repeat(16), "22".repeat(16)]);
        assert_eq!(manager.transport().backend_name(), "sim");
        assert_eq!(manager.config(), &SessionConfig::default());
    }

    #[test]
    fn test_build_with_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_ms = 50").unwrap();
        file.flush().unwrap();

        let manager = ManagerBuilder::new()
            .backend(Backend::Sim(SimTransport::new()))
            .config_file(file.path())
            .build()
            .unwrap();
        assert_eq!(manager.config().timeout_ms, 50);
        assert!(manager.serials().is_empty());
    }

    #[test]
    fn test_explicit_config_wins() {
        let config = SessionConfig {
            chunk_size: 32,
            ..Default::default()
        };
        let manager = ManagerBuilder::new()
            .backend(Backend::Sim(SimTransport::new()))
            .config_file("/nonexistent/sipm.toml")
            .config(config.clone())
            .build()
            .unwrap();
        assert_eq!(manager.config(), &config);
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let result = ManagerBuilder::new()
            .backend(Backend::Sim(SimTransport::new()))
            .config(SessionConfig {
                timeout_ms: 0,
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[cfg(feature = "usb")]
    #[test]
    #[ignore] // 需要真实设备和 USB 权限
    fn test_build_with_usb_backend() {
        let manager = ManagerBuilder::new().build().unwrap();
        for serial in manager.serials() {
            assert_eq!(serial.len(), 32);
        }
    }
}
