//! libusb 硬件后端
//!
//! 通过 rusb 访问真实探测器：按 vendor ID 扫描、打开、自动卸载内核驱动后声明接口、
//! 批量读写，关闭时释放接口并交还内核驱动。

use std::fmt;
use std::time::Duration;

use rusb::{Device, DeviceHandle, GlobalContext};
use sipm_protocol::BRIDGEPORT_VID;
use tracing::{debug, trace, warn};

use crate::{DeviceAddress, Transport};
use crate::error::TransportError;

/// 把 rusb 错误映射为传输层错误
fn map_usb_error(err: rusb::Error) -> TransportError {
    match err {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::NoDevice => TransportError::NoDevice,
        other => TransportError::Usb(other),
    }
}

/// 处理启用内核驱动自动卸载的结果
///
/// 平台不支持（Windows、部分 macOS）时不需要卸载，视为成功。
fn auto_detach_result(result: rusb::Result<()>) -> Result<(), TransportError> {
    match result {
        Ok(()) => Ok(()),
        Err(rusb::Error::NotSupported) => {
            trace!("Kernel driver auto-detach not supported on this platform");
            Ok(())
        },
        Err(e) => Err(map_usb_error(e)),
    }
}

/// 扫描到的 USB 设备
pub struct UsbDevice {
    device: Device<GlobalContext>,
    vendor_id: u16,
    product_id: u16,
}

impl UsbDevice {
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn bus_number(&self) -> u8 {
        self.device.bus_number()
    }

    pub fn address(&self) -> u8 {
        self.device.address()
    }
}

impl fmt::Debug for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UsbDevice({:04x}:{:04x} bus {} addr {})",
            self.vendor_id,
            self.product_id,
            self.bus_number(),
            self.address()
        )
    }
}

/// 已打开的 USB 设备句柄
///
/// 记录已声明的接口，关闭或 Drop 时释放。
pub struct UsbHandle {
    handle: DeviceHandle<GlobalContext>,
    claimed: Option<u8>,
}

impl UsbHandle {
    /// 已声明的接口号
    pub fn claimed_interface(&self) -> Option<u8> {
        self.claimed
    }

    /// 释放 USB 接口（交还给操作系统）
    ///
    /// 设备可能已经断开，失败时只记录日志。
    pub fn release_interface(&mut self) {
        if let Some(interface) = self.claimed.take() {
            if let Err(e) = self.handle.release_interface(interface) {
                warn!("Release of interface {} failed: {}", interface, e);
            } else {
                trace!("[Release] USB interface {} released", interface);
            }
        }
    }
}

impl Drop for UsbHandle {
    fn drop(&mut self) {
        self.release_interface();
    }
}

/// rusb 后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbTransport {
    vendor_id: u16,
}

impl Default for UsbTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport {
    /// 匹配 Bridgeport vendor ID（0x1fa4）
    pub fn new() -> Self {
        Self {
            vendor_id: BRIDGEPORT_VID,
        }
    }

    /// 匹配指定 vendor ID
    pub fn with_vendor_id(vendor_id: u16) -> Self {
        Self { vendor_id }
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }
}

impl Transport for UsbTransport {
    type Device = UsbDevice;
    type Handle = UsbHandle;

    fn devices(&mut self) -> Result<Vec<UsbDevice>, TransportError> {
        let mut found = Vec::new();

        for device in rusb::devices()?.iter() {
            let desc = match device.device_descriptor() {
                Ok(desc) => desc,
                Err(e) => {
                    trace!("Skipping device without descriptor: {}", e);
                    continue;
                },
            };

            if desc.vendor_id() != self.vendor_id {
                continue;
            }

            found.push(UsbDevice {
                device,
                vendor_id: desc.vendor_id(),
                product_id: desc.product_id(),
            });
        }

        debug!(
            "Found {} USB device(s) with vendor ID 0x{:04x}",
            found.len(),
            self.vendor_id
        );
        Ok(found)
    }

    fn device_address(&self, device: &UsbDevice) -> DeviceAddress {
        DeviceAddress {
            bus: device.bus_number(),
            address: u32::from(device.address()),
        }
    }

    fn open(&mut self, device: &UsbDevice) -> Result<UsbHandle, TransportError> {
        let handle = device.device.open().map_err(map_usb_error)?;
        Ok(UsbHandle {
            handle,
            claimed: None,
        })
    }

    fn claim_interface(
        &mut self,
        handle: &mut UsbHandle,
        interface: u8,
    ) -> Result<(), TransportError> {
        if handle.claimed == Some(interface) {
            return Ok(());
        }

        // 声明时由 libusb 卸载内核驱动，释放接口时交还
        auto_detach_result(handle.handle.set_auto_detach_kernel_driver(true))?;

        handle.handle.claim_interface(interface).map_err(map_usb_error)?;
        handle.claimed = Some(interface);
        Ok(())
    }

    fn bulk_write(
        &mut self,
        handle: &mut UsbHandle,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        handle.handle.write_bulk(endpoint, data, timeout).map_err(map_usb_error)
    }

    fn bulk_read(
        &mut self,
        handle: &mut UsbHandle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        handle.handle.read_bulk(endpoint, buf, timeout).map_err(map_usb_error)
    }

    fn close(&mut self, mut handle: UsbHandle) {
        handle.release_interface();
        // DeviceHandle 在 drop 时关闭
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipm_protocol::DETECTOR_INTERFACE;

    #[test]
    fn test_map_usb_error() {
        assert!(matches!(map_usb_error(rusb::Error::Timeout), TransportError::Timeout));
        assert!(matches!(map_usb_error(rusb::Error::NoDevice), TransportError::NoDevice));
        assert!(matches!(
            map_usb_error(rusb::Error::Access),
            TransportError::Usb(rusb::Error::Access)
        ));
    }

    #[test]
    fn test_auto_detach_unsupported_is_ignored() {
        assert!(auto_detach_result(Ok(())).is_ok());
        assert!(auto_detach_result(Err(rusb::Error::NotSupported)).is_ok());
        assert!(matches!(
            auto_detach_result(Err(rusb::Error::Access)),
            Err(TransportError::Usb(rusb::Error::Access))
        ));
    }

    #[test]
    #[ignore] // 需要真实设备和 USB 权限
    fn test_interface_is_handed_back_on_close() {
        let mut transport = UsbTransport::new();
        let device = transport
            .devices()
            .expect("USB enumeration failed")
            .into_iter()
            .next()
            .expect("no detector attached");

        // 关闭后接口交还系统，可以再次打开并声明
        for _ in 0..2 {
            let mut handle = transport.open(&device).expect("open failed");
            transport
                .claim_interface(&mut handle, DETECTOR_INTERFACE)
                .expect("claim failed");
            assert_eq!(handle.claimed_interface(), Some(DETECTOR_INTERFACE));
            transport.close(handle);
        }
    }

    #[test]
    fn test_default_vendor_id() {
        assert_eq!(UsbTransport::new().vendor_id(), 0x1fa4);
        assert_eq!(UsbTransport::with_vendor_id(0x1234).vendor_id(), 0x1234);
    }

    #[test]
    #[ignore] // 需要 USB 权限（libusb 初始化）
    fn test_scan_devices() {
        let mut transport = UsbTransport::new();
        let devices = transport.devices().expect("USB enumeration failed");
        for device in &devices {
            assert_eq!(device.vendor_id(), BRIDGEPORT_VID);
        }
    }
}
