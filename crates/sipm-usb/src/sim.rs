//! 模拟探测器后端
//!
//! 进程内模拟 Bridgeport 探测器的命令处理：解析 64 字节命令包，
//! 按命令种类维护 RAM/NVRAM 寄存器存储，在数据端点上收发寄存器数据。
//! 每次批量传输都会记录到传输日志中，并支持故障注入，用于无硬件测试。

use std::collections::HashMap;
use std::time::Duration;

use sipm_protocol::decode::{SERIAL_LEN, SERIAL_OFFSET};
use sipm_protocol::{
    BRIDGEPORT_VID, CMD_OUT_EP, CMD_PACKET_SIZE, CommandHeader, CommandKind, DATA_IN_EP,
    DATA_OUT_EP, HEADER_SIZE, MemoryType, TransferDirection,
};
use tracing::{debug, trace, warn};

use crate::{DeviceAddress, Transport};
use crate::error::TransportError;

/// 枚举得到的模拟设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimDevice {
    index: usize,
    vendor_id: u16,
}

impl SimDevice {
    /// 设备在模拟后端中的索引
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }
}

/// 模拟设备句柄
#[derive(Debug, PartialEq, Eq)]
pub struct SimHandle {
    index: usize,
    session: u64,
}

impl SimHandle {
    /// 设备在模拟后端中的索引
    pub fn index(&self) -> usize {
        self.index
    }
}

/// 注入的故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// 本次传输超时
    Timeout,
    /// 本次传输时设备断开，之后的传输全部失败
    Disconnect,
    /// 本次传输只完成前 n 个字节
    ShortChunk(usize),
}

/// 一次批量传输的记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRecord {
    pub device: usize,
    pub endpoint: u8,
    pub requested: usize,
    /// 实际传输字节数，失败时为 `None`
    pub transferred: Option<usize>,
}

/// 设备当前等待的数据阶段
#[derive(Debug, Default)]
enum Pending {
    #[default]
    Idle,
    /// 收到长写命令，等待数据端点上的写数据
    WriteData {
        kind: CommandKind,
        memory: MemoryType,
        received: Vec<u8>,
    },
    /// 收到读命令，等待 host 从数据端点读走
    ReadData { data: Vec<u8>, cursor: usize },
}

#[derive(Debug)]
struct SimDetector {
    vendor_id: u16,
    serial: [u8; SERIAL_LEN],
    registers: HashMap<(CommandKind, MemoryType), Vec<u8>>,
    session: Option<u64>,
    claimed: Option<u8>,
    pending: Pending,
    connected: bool,
    refuse_open: bool,
    refuse_claim: bool,
}

impl SimDetector {
    fn new(vendor_id: u16, serial: [u8; SERIAL_LEN]) -> Self {
        let mut version = vec![0u8; CommandKind::ArmVersion.spec().data_len()];
        version[SERIAL_OFFSET..SERIAL_OFFSET + SERIAL_LEN].copy_from_slice(&serial);

        let mut registers = HashMap::new();
        registers.insert((CommandKind::ArmVersion, MemoryType::Ram), version);

        Self {
            vendor_id,
            serial,
            registers,
            session: None,
            claimed: None,
            pending: Pending::Idle,
            connected: true,
            refuse_open: false,
            refuse_claim: false,
        }
    }

    fn registers(&self, kind: CommandKind, memory: MemoryType) -> Vec<u8> {
        self.registers
            .get(&(kind, memory))
            .cloned()
            .unwrap_or_else(|| vec![0u8; kind.spec().data_len()])
    }

    fn store(&mut self, kind: CommandKind, memory: MemoryType, mut data: Vec<u8>) {
        data.resize(kind.spec().data_len(), 0);
        self.registers.insert((kind, memory), data);
    }

    /// 处理命令包
    fn handle_command(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        let header = CommandHeader::parse(packet)
            .map_err(|e| TransportError::Simulated(format!("bad command packet: {}", e)))?;
        let transfer_type = header.transfer_type().ok_or_else(|| {
            TransportError::Simulated(format!("unknown transfer type in header 0x{:08X}", header.word()))
        })?;
        let kind = CommandKind::identify(transfer_type, header.command_id()).ok_or_else(|| {
            TransportError::Simulated(format!("unknown command in header 0x{:08X}", header.word()))
        })?;
        let memory = header.memory_type();
        let data_len = kind.spec().data_len();

        if !matches!(self.pending, Pending::Idle) {
            warn!("Simulated device: new {} command discards pending transfer", kind);
        }

        self.pending = match transfer_type.direction() {
            TransferDirection::Write if header.is_short_write() => {
                let end = (HEADER_SIZE + data_len).min(packet.len());
                let payload = packet.get(HEADER_SIZE..end).unwrap_or_default().to_vec();
                self.store(kind, memory, payload);
                trace!("Simulated device: short write {} ({:?})", kind, memory);
                Pending::Idle
            },
            TransferDirection::Write => Pending::WriteData {
                kind,
                memory,
                received: Vec::with_capacity(data_len),
            },
            TransferDirection::Read => Pending::ReadData {
                data: self.registers(kind, memory),
                cursor: 0,
            },
        };
        Ok(())
    }

    /// 处理数据端点上的写数据
    fn accept_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let Pending::WriteData {
            kind,
            memory,
            received,
        } = &mut self.pending
        else {
            return Err(TransportError::Simulated(
                "data received without a pending write command".into(),
            ));
        };
        received.extend_from_slice(data);
        if received.len() < kind.spec().data_len() {
            return Ok(());
        }

        let (kind, memory) = (*kind, *memory);
        let received = std::mem::take(received);
        self.pending = Pending::Idle;
        self.store(kind, memory, received);
        trace!("Simulated device: long write {} ({:?}) complete", kind, memory);
        Ok(())
    }

    /// 从待读数据中取出至多 `buf.len()` 字节
    ///
    /// 游标总是前进完整的 `buf.len()`，`limit` 只限制实际写入 `buf` 的字节数。
    fn serve_data(&mut self, buf: &mut [u8], limit: usize) -> Result<usize, TransportError> {
        let Pending::ReadData { data, cursor } = &mut self.pending else {
            return Err(TransportError::Timeout);
        };

        let remaining = data.len().saturating_sub(*cursor);
        let n = buf.len().min(remaining).min(limit);
        buf[..n].copy_from_slice(&data[*cursor..*cursor + n]);
        *cursor += buf.len().min(remaining);

        if *cursor >= data.len() {
            self.pending = Pending::Idle;
        }
        Ok(n)
    }
}

/// 模拟后端
#[derive(Debug, Default)]
pub struct SimTransport {
    detectors: Vec<SimDetector>,
    log: Vec<TransferRecord>,
    faults: Vec<(usize, Fault)>,
    transfers: usize,
    next_session: u64,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一台探测器（构建器形式）
    pub fn with_detector(mut self, serial: [u8; SERIAL_LEN]) -> Self {
        self.add_detector(serial);
        self
    }

    /// 添加一台探测器，返回其索引
    pub fn add_detector(&mut self, serial: [u8; SERIAL_LEN]) -> usize {
        self.add_device(BRIDGEPORT_VID, serial)
    }

    /// 添加一台指定 vendor ID 的设备（枚举时会按 vendor ID 过滤）
    pub fn add_device(&mut self, vendor_id: u16, serial: [u8; SERIAL_LEN]) -> usize {
        self.detectors.push(SimDetector::new(vendor_id, serial));
        self.detectors.len() - 1
    }

    /// 设备数量（含不匹配 vendor ID 的设备）
    pub fn device_count(&self) -> usize {
        self.detectors.len()
    }

    /// 设备的原始序列号
    pub fn serial(&self, index: usize) -> Option<[u8; SERIAL_LEN]> {
        self.detectors.get(index).map(|d| d.serial)
    }

    /// 预置寄存器内容
    ///
    /// # Errors
    /// - `TransportError::NoDevice`：索引不存在
    /// - `TransportError::Simulated`：数据长度与命令种类不符
    pub fn set_registers(
        &mut self,
        index: usize,
        kind: CommandKind,
        memory: MemoryType,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let detector = self.detectors.get_mut(index).ok_or(TransportError::NoDevice)?;
        let expected = kind.spec().data_len();
        if data.len() != expected {
            return Err(TransportError::Simulated(format!(
                "{} expects {} bytes, got {}",
                kind,
                expected,
                data.len()
            )));
        }
        detector.store(kind, memory, data.to_vec());
        Ok(())
    }

    /// 读取寄存器存储（未写过的返回全零）
    pub fn registers(&self, index: usize, kind: CommandKind, memory: MemoryType) -> Option<Vec<u8>> {
        self.detectors.get(index).map(|d| d.registers(kind, memory))
    }

    /// 在之后第 `after` 次批量传输（0 为下一次）注入一次性故障
    pub fn inject_fault(&mut self, after: usize, fault: Fault) {
        self.faults.push((self.transfers + after, fault));
    }

    /// 打开设备时失败
    pub fn refuse_open(&mut self, index: usize) {
        if let Some(detector) = self.detectors.get_mut(index) {
            detector.refuse_open = true;
        }
    }

    /// 声明接口时失败
    pub fn refuse_claim(&mut self, index: usize) {
        if let Some(detector) = self.detectors.get_mut(index) {
            detector.refuse_claim = true;
        }
    }

    /// 设备是否处于打开状态
    pub fn is_open(&self, index: usize) -> bool {
        self.detectors.get(index).is_some_and(|d| d.session.is_some())
    }

    /// 设备已声明的接口号
    pub fn claimed_interface(&self, index: usize) -> Option<u8> {
        self.detectors.get(index).and_then(|d| d.claimed)
    }

    /// 传输日志
    pub fn transfers(&self) -> &[TransferRecord] {
        &self.log
    }

    /// 清空传输日志
    pub fn clear_transfers(&mut self) {
        self.log.clear();
    }

    fn take_fault(&mut self) -> Option<Fault> {
        let now = self.transfers;
        self.transfers += 1;
        let pos = self.faults.iter().position(|&(at, _)| at == now)?;
        Some(self.faults.swap_remove(pos).1)
    }

    /// 校验句柄仍然有效并返回对应设备
    fn detector_mut(&mut self, handle: &SimHandle) -> Result<&mut SimDetector, TransportError> {
        let detector = self
            .detectors
            .get_mut(handle.index)
            .ok_or(TransportError::HandleMismatch)?;
        if detector.session != Some(handle.session) {
            return Err(TransportError::HandleMismatch);
        }
        if !detector.connected {
            return Err(TransportError::NoDevice);
        }
        if detector.claimed.is_none() {
            return Err(TransportError::Simulated("interface not claimed".into()));
        }
        Ok(detector)
    }

    fn record(
        &mut self,
        handle: &SimHandle,
        endpoint: u8,
        requested: usize,
        result: &Result<usize, TransportError>,
    ) {
        self.log.push(TransferRecord {
            device: handle.index,
            endpoint,
            requested,
            transferred: result.as_ref().ok().copied(),
        });
    }

    /// 对本次传输应用故障，返回字节数上限
    fn apply_fault(&mut self, handle: &SimHandle, requested: usize) -> Result<usize, TransportError> {
        match self.take_fault() {
            None => Ok(requested),
            Some(Fault::ShortChunk(n)) => Ok(n.min(requested)),
            Some(Fault::Timeout) => Err(TransportError::Timeout),
            Some(Fault::Disconnect) => {
                if let Some(detector) = self.detectors.get_mut(handle.index) {
                    detector.connected = false;
                    detector.pending = Pending::Idle;
                }
                Err(TransportError::Disconnected)
            },
        }
    }

    fn write_inner(
        &mut self,
        handle: &SimHandle,
        endpoint: u8,
        data: &[u8],
    ) -> Result<usize, TransportError> {
        self.detector_mut(handle)?;
        let limit = self.apply_fault(handle, data.len())?;
        let detector = self.detector_mut(handle)?;

        match endpoint {
            CMD_OUT_EP => {
                if limit < CMD_PACKET_SIZE || data.len() != CMD_PACKET_SIZE {
                    debug!("Simulated device: truncated command packet ignored");
                } else {
                    detector.handle_command(data)?;
                }
            },
            DATA_OUT_EP => {
                // 短分块：未送达的部分在设备侧为零
                let mut received = data[..limit].to_vec();
                received.resize(data.len(), 0);
                detector.accept_data(&received)?;
            },
            other => {
                return Err(TransportError::Simulated(format!(
                    "endpoint 0x{:02X} is not an OUT endpoint",
                    other
                )));
            },
        }
        Ok(limit)
    }

    fn read_inner(
        &mut self,
        handle: &SimHandle,
        endpoint: u8,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        if endpoint != DATA_IN_EP {
            return Err(TransportError::Simulated(format!(
                "endpoint 0x{:02X} is not a readable endpoint",
                endpoint
            )));
        }
        self.detector_mut(handle)?;
        let limit = self.apply_fault(handle, buf.len())?;
        self.detector_mut(handle)?.serve_data(buf, limit)
    }
}

impl Transport for SimTransport {
    type Device = SimDevice;
    type Handle = SimHandle;

    fn devices(&mut self) -> Result<Vec<SimDevice>, TransportError> {
        Ok(self
            .detectors
            .iter()
            .enumerate()
            .filter(|(_, d)| d.connected && d.vendor_id == BRIDGEPORT_VID)
            .map(|(index, d)| SimDevice {
                index,
                vendor_id: d.vendor_id,
            })
            .collect())
    }

    fn device_address(&self, device: &SimDevice) -> DeviceAddress {
        DeviceAddress {
            bus: 0,
            address: device.index as u32,
        }
    }

    fn open(&mut self, device: &SimDevice) -> Result<SimHandle, TransportError> {
        let session = self.next_session;
        let detector = self
            .detectors
            .get_mut(device.index)
            .ok_or(TransportError::NoDevice)?;
        if !detector.connected {
            return Err(TransportError::NoDevice);
        }
        if detector.refuse_open {
            return Err(TransportError::Simulated("access denied".into()));
        }
        if detector.session.is_some() {
            return Err(TransportError::Simulated("device busy".into()));
        }

        detector.session = Some(session);
        self.next_session += 1;
        Ok(SimHandle {
            index: device.index,
            session,
        })
    }

    fn claim_interface(
        &mut self,
        handle: &mut SimHandle,
        interface: u8,
    ) -> Result<(), TransportError> {
        let detector = self
            .detectors
            .get_mut(handle.index)
            .filter(|d| d.session == Some(handle.session))
            .ok_or(TransportError::HandleMismatch)?;
        if detector.refuse_claim {
            return Err(TransportError::Simulated(format!(
                "interface {} is busy",
                interface
            )));
        }
        detector.claimed = Some(interface);
        Ok(())
    }

    fn bulk_write(
        &mut self,
        handle: &mut SimHandle,
        endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let result = self.write_inner(handle, endpoint, data);
        self.record(handle, endpoint, data.len(), &result);
        result
    }

    fn bulk_read(
        &mut self,
        handle: &mut SimHandle,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let result = self.read_inner(handle, endpoint, buf);
        self.record(handle, endpoint, buf.len(), &result);
        result
    }

    fn close(&mut self, handle: SimHandle) {
        if let Some(detector) = self.detectors.get_mut(handle.index)
            && detector.session == Some(handle.session)
        {
            detector.session = None;
            detector.claimed = None;
            detector.pending = Pending::Idle;
        }
    }
}
