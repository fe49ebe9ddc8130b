//! 会话层集成测试（模拟后端）

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use sipm_driver::{Backend, DeviceManager, DriverError, ManagerBuilder};
use sipm_protocol::{
    ArmStatusBlock, CommandKind, FpgaActionBlock, ListModeBlock, ListModeEvent, MemoryType,
    TransferDirection, preset,
};
use sipm_usb::{DeviceAddress, SimDevice, SimHandle, SimTransport, Transport, TransportError};

const SERIAL: [u8; 16] = [0xC0, 0xFF, 0xEE, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01];
const SERIAL_HEX: &str = "C0FFEE00000000000000000000000001";

/// 统计 close 调用次数的后端包装
struct CountingTransport {
    inner: SimTransport,
    closed: Rc<Cell<usize>>,
}

impl Transport for CountingTransport {
    type Device = SimDevice;
    type Handle = SimHandle;

    fn devices(&mut self) -> Result<Vec<SimDevice>, TransportError> {
        self.inner.devices()
    }

    fn device_address(&self, device: &SimDevice) -> DeviceAddress {
        self.inner.device_address(device)
    }

    fn open(&mut self, device: &SimDevice) -> Result<SimHandle, TransportError> {
        self.inner.open(device)
    }

    fn claim_interface(&mut self, handle: &mut SimHandle, interface: u8) -> Result<(), TransportError> {
        self.inner.claim_interface(handle, interface)
    }

    fn bulk_write(
        &mut self,
        handle: &mut SimHandle,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.inner.bulk_write(handle, endpoint, data, timeout)
    }

    fn bulk_read(
        &mut self,
        handle: &mut SimHandle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.inner.bulk_read(handle, endpoint, buf, timeout)
    }

    fn close(&mut self, handle: SimHandle) {
        self.closed.set(self.closed.get() + 1);
        self.inner.close(handle);
    }
}

fn list_mode_registers(events: &[(u16, u32)]) -> Vec<u8> {
    let mut registers = [0u16; 1024];
    registers[0] = events.len() as u16;
    for (i, &(adc, timestamp)) in events.iter().enumerate() {
        let base = 4 + 3 * i;
        registers[base] = adc;
        registers[base + 1] = timestamp as u16;
        registers[base + 2] = (timestamp >> 16) as u16;
    }
    registers.iter().flat_map(|r| r.to_ne_bytes()).collect()
}

#[test]
fn list_mode_acquisition_end_to_end() {
    let mut sim = SimTransport::new().with_detector(SERIAL);
    let data = list_mode_registers(&[(32, 100), (64, 65541), (1600, 40_000_000)]);
    sim.set_registers(0, CommandKind::ListMode, MemoryType::Ram, &data)
        .unwrap();

    let mut manager = ManagerBuilder::new().backend(Backend::Sim(sim)).build().unwrap();
    assert_eq!(manager.serials(), vec![SERIAL_HEX.to_string()]);

    // 启动 list-mode 采集
    let mut action = FpgaActionBlock::fpga_action();
    action.set_transfer_direction(MemoryType::Ram, TransferDirection::Write);
    manager.write_from(SERIAL_HEX, &action).unwrap();

    let stored = manager
        .transport()
        .as_sim()
        .and_then(|sim| sim.registers(0, CommandKind::FpgaAction, MemoryType::Ram))
        .unwrap();
    let expected: Vec<u8> = preset::FPGA_ACTION_START_LIST
        .iter()
        .flat_map(|r| r.to_ne_bytes())
        .collect();
    assert_eq!(stored, expected);

    let mut block = ListModeBlock::list_mode();
    block.set_transfer_direction(MemoryType::Ram, TransferDirection::Read);
    manager.read_into(SERIAL_HEX, &mut block).unwrap();

    let events = block.list_mode_events().unwrap();
    assert_eq!(
        events,
        vec![
            ListModeEvent {
                timestamp: 100,
                energy: 2
            },
            ListModeEvent {
                timestamp: 65541,
                energy: 4
            },
            ListModeEvent {
                timestamp: 40_000_000,
                energy: 100
            },
        ]
    );
    assert!((events[2].seconds() - 1.0).abs() < 1e-9);
}

#[test]
fn nvram_and_ram_are_independent() {
    let sim = SimTransport::new().with_detector(SERIAL);
    let mut manager = ManagerBuilder::new().backend(Backend::Sim(sim)).build().unwrap();

    let mut status = ArmStatusBlock::arm_status();
    let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
    let mismatches = manager
        .write_and_verify(SERIAL_HEX, &mut status, &values, MemoryType::Nvram)
        .unwrap();
    assert!(mismatches.is_empty());

    let mut ram = ArmStatusBlock::arm_status();
    ram.set_transfer_direction(MemoryType::Ram, TransferDirection::Read);
    manager.read_into(SERIAL_HEX, &mut ram).unwrap();
    assert_eq!(ram.read_registers(), [0.0; 7]);
}

#[test]
fn drop_releases_every_handle() {
    let closed = Rc::new(Cell::new(0));
    let transport = CountingTransport {
        inner: SimTransport::new()
            .with_detector([1; 16])
            .with_detector([2; 16])
            .with_detector([3; 16]),
        closed: Rc::clone(&closed),
    };

    let mut manager = DeviceManager::new(transport);
    assert_eq!(manager.connect_all().unwrap().len(), 3);
    manager.release(&"01".repeat(16)).unwrap();
    assert_eq!(closed.get(), 1);

    drop(manager);
    assert_eq!(closed.get(), 3);
}

#[test]
fn repeated_connect_keeps_existing_sessions() {
    let closed = Rc::new(Cell::new(0));
    let transport = CountingTransport {
        inner: SimTransport::new().with_detector([1; 16]).with_detector([2; 16]),
        closed: Rc::clone(&closed),
    };

    let mut manager = DeviceManager::new(transport);
    assert_eq!(manager.connect_all().unwrap().len(), 2);
    assert!(manager.connect_all().unwrap().is_empty());
    assert_eq!(closed.get(), 0);
    assert_eq!(manager.serials().len(), 2);

    // 已有会话仍可正常读写
    let mut status = ArmStatusBlock::arm_status();
    status.set_transfer_direction(MemoryType::Ram, TransferDirection::Read);
    manager.read_into(&"02".repeat(16), &mut status).unwrap();
}

#[test]
fn disconnected_device_reports_transport_error() {
    let sim = SimTransport::new().with_detector(SERIAL);
    let mut manager = ManagerBuilder::new().backend(Backend::Sim(sim)).build().unwrap();
    manager
        .transport_mut()
        .as_sim_mut()
        .unwrap()
        .inject_fault(0, sipm_usb::Fault::Disconnect);

    let mut block = ListModeBlock::list_mode();
    block.set_transfer_direction(MemoryType::Ram, TransferDirection::Read);
    let err = manager.read_into(SERIAL_HEX, &mut block).unwrap_err();
    assert_eq!(err.serial(), Some(SERIAL_HEX));
    assert!(matches!(err, DriverError::WriteBytesFailed { .. }));
    assert!(err.transport_error().is_some_and(TransportError::is_disconnected));

    // 后续操作仍然按序列号分发，错误来自后端
    let err = manager.read_into(SERIAL_HEX, &mut block).unwrap_err();
    assert!(err.transport_error().is_some_and(TransportError::is_disconnected));
}
