//! 构造时选定的后端
//!
//! `AnyTransport` 把硬件后端和模拟后端收拢到同一个类型下，
//! 句柄和设备描述同样带标签，跨后端混用会返回 `HandleMismatch`。

use std::time::Duration;

use tracing::warn;

use crate::{DeviceAddress, Transport};
use crate::error::TransportError;
use crate::sim::{SimDevice, SimHandle, SimTransport};

#[cfg(feature = "usb")]
use crate::usb::{UsbDevice, UsbHandle, UsbTransport};

/// 任一后端
#[derive(Debug)]
pub enum AnyTransport {
    #[cfg(feature = "usb")]
    Usb(UsbTransport),
    Sim(SimTransport),
}

/// 任一后端的设备描述
#[derive(Debug)]
pub enum AnyDevice {
    #[cfg(feature = "usb")]
    Usb(UsbDevice),
    Sim(SimDevice),
}

/// 任一后端的句柄
pub enum AnyHandle {
    #[cfg(feature = "usb")]
    Usb(UsbHandle),
    Sim(SimHandle),
}

impl std::fmt::Debug for AnyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "usb")]
            AnyHandle::Usb(handle) => write!(f, "AnyHandle::Usb(interface {:?})", handle.claimed_interface()),
            AnyHandle::Sim(handle) => write!(f, "AnyHandle::Sim({})", handle.index()),
        }
    }
}

impl AnyTransport {
    /// 后端名称
    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "usb")]
            AnyTransport::Usb(_) => "usb",
            AnyTransport::Sim(_) => "sim",
        }
    }

    /// 模拟后端（硬件后端时返回 `None`）
    pub fn as_sim(&self) -> Option<&SimTransport> {
        match self {
            AnyTransport::Sim(sim) => Some(sim),
            #[cfg(feature = "usb")]
            _ => None,
        }
    }

    /// 模拟后端（可变）
    pub fn as_sim_mut(&mut self) -> Option<&mut SimTransport> {
        match self {
            AnyTransport::Sim(sim) => Some(sim),
            #[cfg(feature = "usb")]
            _ => None,
        }
    }
}

#[cfg(feature = "usb")]
impl From<UsbTransport> for AnyTransport {
    fn from(transport: UsbTransport) -> Self {
        AnyTransport::Usb(transport)
    }
}

impl From<SimTransport> for AnyTransport {
    fn from(transport: SimTransport) -> Self {
        AnyTransport::Sim(transport)
    }
}

impl Transport for AnyTransport {
    type Device = AnyDevice;
    type Handle = AnyHandle;

    fn devices(&mut self) -> Result<Vec<AnyDevice>, TransportError> {
        match self {
            #[cfg(feature = "usb")]
            AnyTransport::Usb(usb) => Ok(usb.devices()?.into_iter().map(AnyDevice::Usb).collect()),
            AnyTransport::Sim(sim) => Ok(sim.devices()?.into_iter().map(AnyDevice::Sim).collect()),
        }
    }

    /// 跨后端的设备描述没有位置，返回默认值
    #[allow(unreachable_patterns)]
    fn device_address(&self, device: &AnyDevice) -> DeviceAddress {
        match (self, device) {
            #[cfg(feature = "usb")]
            (AnyTransport::Usb(usb), AnyDevice::Usb(device)) => usb.device_address(device),
            (AnyTransport::Sim(sim), AnyDevice::Sim(device)) => sim.device_address(device),
            _ => DeviceAddress::default(),
        }
    }

    #[allow(unreachable_patterns)]
    fn open(&mut self, device: &AnyDevice) -> Result<AnyHandle, TransportError> {
        match (self, device) {
            #[cfg(feature = "usb")]
            (AnyTransport::Usb(usb), AnyDevice::Usb(device)) => usb.open(device).map(AnyHandle::Usb),
            (AnyTransport::Sim(sim), AnyDevice::Sim(device)) => sim.open(device).map(AnyHandle::Sim),
            _ => Err(TransportError::HandleMismatch),
        }
    }

    #[allow(unreachable_patterns)]
    fn claim_interface(
        &mut self,
        handle: &mut AnyHandle,
        interface: u8,
    ) -> Result<(), TransportError> {
        match (self, handle) {
            #[cfg(feature = "usb")]
            (AnyTransport::Usb(usb), AnyHandle::Usb(handle)) => usb.claim_interface(handle, interface),
            (AnyTransport::Sim(sim), AnyHandle::Sim(handle)) => sim.claim_interface(handle, interface),
            _ => Err(TransportError::HandleMismatch),
        }
    }

    #[allow(unreachable_patterns)]
    fn bulk_write(
        &mut self,
        handle: &mut AnyHandle,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        match (self, handle) {
            #[cfg(feature = "usb")]
            (AnyTransport::Usb(usb), AnyHandle::Usb(handle)) => {
                usb.bulk_write(handle, endpoint, data, timeout)
            },
            (AnyTransport::Sim(sim), AnyHandle::Sim(handle)) => {
                sim.bulk_write(handle, endpoint, data, timeout)
            },
            _ => Err(TransportError::HandleMismatch),
        }
    }

    #[allow(unreachable_patterns)]
    fn bulk_read(
        &mut self,
        handle: &mut AnyHandle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        match (self, handle) {
            #[cfg(feature = "usb")]
            (AnyTransport::Usb(usb), AnyHandle::Usb(handle)) => {
                usb.bulk_read(handle, endpoint, buf, timeout)
            },
            (AnyTransport::Sim(sim), AnyHandle::Sim(handle)) => {
                sim.bulk_read(handle, endpoint, buf, timeout)
            },
            _ => Err(TransportError::HandleMismatch),
        }
    }

    #[allow(unreachable_patterns)]
    fn close(&mut self, handle: AnyHandle) {
        match (self, handle) {
            #[cfg(feature = "usb")]
            (AnyTransport::Usb(usb), AnyHandle::Usb(handle)) => usb.close(handle),
            (AnyTransport::Sim(sim), AnyHandle::Sim(handle)) => sim.close(handle),
            (transport, handle) => {
                warn!(
                    "Dropping {:?} that does not belong to the {} backend",
                    handle,
                    transport.backend_name()
                );
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipm_protocol::DETECTOR_INTERFACE;

    #[test]
    fn test_sim_backend_through_any() {
        let mut transport = AnyTransport::from(SimTransport::new().with_detector([7; 16]));
        assert_eq!(transport.backend_name(), "sim");

        let devices = transport.devices().unwrap();
        assert_eq!(devices.len(), 1);
        let mut handle = transport.open(&devices[0]).unwrap();
        transport.claim_interface(&mut handle, DETECTOR_INTERFACE).unwrap();
        assert_eq!(
            transport.as_sim().and_then(|sim| sim.claimed_interface(0)),
            Some(DETECTOR_INTERFACE)
        );

        transport.close(handle);
        assert!(!transport.as_sim().is_some_and(|sim| sim.is_open(0)));
    }

    #[cfg(feature = "usb")]
    #[test]
    fn test_mismatched_device_is_rejected() {
        let mut sim = SimTransport::new().with_detector([7; 16]);
        let device = sim.devices().unwrap().remove(0);

        let mut transport = AnyTransport::from(UsbTransport::new());
        assert_eq!(transport.backend_name(), "usb");
        assert!(transport.as_sim().is_none());
        assert!(matches!(
            transport.open(&AnyDevice::Sim(device)),
            Err(TransportError::HandleMismatch)
        ));
    }
}
