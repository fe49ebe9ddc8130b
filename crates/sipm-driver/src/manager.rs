//! 设备会话管理
//!
//! `DeviceManager` 持有传输后端和序列号注册表，负责：
//!
//! - 启动：枚举、打开、声明接口，读取 ARM version 块得到序列号后注册；
//!   已经持有的设备在再次连接时跳过
//! - 按序列号分发寄存器块的写/读
//! - 释放：注销时释放接口并关闭句柄，Drop 时释放全部句柄
//!
//! 未注册的序列号一律返回 `SerialNotFound`，不会产生任何 I/O。

use std::collections::BTreeMap;

use sipm_protocol::{
    ArmVersionBlock, CMD_OUT_EP, DATA_IN_EP, DATA_OUT_EP, MemoryType, Register, RegisterBlock,
    TransferDirection,
};
use sipm_usb::{ChunkedTransfer, DeviceAddress, Transport};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::DriverError;
use crate::registry::DeviceRegistry;
use crate::verify::{RegisterMismatch, compare_registers};

/// 设备会话管理器
pub struct DeviceManager<T: Transport> {
    transport: T,
    registry: DeviceRegistry<T::Handle>,
    /// `connect_all` 打开的设备位置（按序列号）
    addresses: BTreeMap<String, DeviceAddress>,
    config: SessionConfig,
    engine: ChunkedTransfer,
}

impl<T: Transport> DeviceManager<T> {
    /// 使用默认配置创建（尚未连接任何设备）
    pub fn new(transport: T) -> Self {
        let config = SessionConfig::default();
        Self {
            transport,
            registry: DeviceRegistry::new(),
            addresses: BTreeMap::new(),
            engine: config.transfer_engine(),
            config,
        }
    }

    /// 使用指定配置创建
    ///
    /// # Errors
    /// - `DriverError::Config`: 配置取值无效
    pub fn with_config(transport: T, config: SessionConfig) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            transport,
            registry: DeviceRegistry::new(),
            addresses: BTreeMap::new(),
            engine: config.transfer_engine(),
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 传输后端
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 传输后端（可变）
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// 已注册序列号（字典序）
    pub fn serials(&self) -> Vec<String> {
        self.registry.serials()
    }

    pub fn is_registered(&self, serial: &str) -> bool {
        self.registry.contains(serial)
    }

    /// 连接所有匹配 vendor ID 的设备
    ///
    /// 对每台设备依次打开、声明接口并执行一次 ARM version 读交换，
    /// 以解码出的序列号注册。任何一步失败立即返回，已注册的设备保持注册。
    ///
    /// 可以重复调用以接入新插入的设备：本 manager 已经持有的设备（按位置识别）会被跳过。
    /// 通过 `attach` 注册的句柄没有位置信息，不参与识别。
    ///
    /// 返回本次新注册的序列号。
    pub fn connect_all(&mut self) -> Result<Vec<String>, DriverError> {
        let devices = self.transport.devices().map_err(DriverError::Enumeration)?;
        debug!("Enumerated {} device(s)", devices.len());

        let interface = self.config.interface_number;
        let mut registered = Vec::with_capacity(devices.len());

        for device in &devices {
            let address = self.transport.device_address(device);
            if let Some((serial, _)) = self.addresses.iter().find(|(_, held)| **held == address) {
                debug!("Device {} at {} already connected, skipping", serial, address);
                continue;
            }

            let label = format!("{:?}", device);
            let mut handle =
                self.transport
                    .open(device)
                    .map_err(|source| DriverError::DeviceOpenFailed {
                        device: label.clone(),
                        source,
                    })?;

            if let Err(source) = self.transport.claim_interface(&mut handle, interface) {
                self.transport.close(handle);
                return Err(DriverError::InterfaceClaimFailed {
                    device: label,
                    interface,
                    source,
                });
            }

            let serial = self.attach(handle)?;
            self.addresses.insert(serial.clone(), address);
            registered.push(serial);
        }

        Ok(registered)
    }

    /// 注册一个已打开并已声明接口的句柄
    ///
    /// 执行 ARM version 读交换得到序列号。失败或序列号重复时关闭句柄。
    pub fn attach(&mut self, mut handle: T::Handle) -> Result<String, DriverError> {
        let serial = match self.read_serial(&mut handle) {
            Ok(serial) => serial,
            Err(e) => {
                self.transport.close(handle);
                return Err(e);
            },
        };

        if let Err(handle) = self.registry.insert(serial.clone(), handle) {
            warn!("Device with serial {} is already registered, closing new handle", serial);
            self.transport.close(handle);
            return Err(DriverError::DuplicateSerial(serial));
        }

        info!("Registered device {}", serial);
        Ok(serial)
    }

    fn read_serial(&mut self, handle: &mut T::Handle) -> Result<String, DriverError> {
        let mut block = ArmVersionBlock::arm_version();
        block.set_transfer_direction(MemoryType::Ram, TransferDirection::Read);

        self.engine
            .write(&mut self.transport, handle, CMD_OUT_EP, block.command())
            .map_err(|source| DriverError::BootstrapFailed {
                endpoint: CMD_OUT_EP,
                source,
            })?;
        self.engine
            .read(&mut self.transport, handle, DATA_IN_EP, block.read_data_mut())
            .map_err(|source| DriverError::BootstrapFailed {
                endpoint: DATA_IN_EP,
                source,
            })?;

        Ok(block.serial_number()?)
    }

    /// 把寄存器块写入设备
    ///
    /// 先发送 64 字节命令包；不能短写时再从数据端点发送写数据区。
    /// 调用前需用 `set_transfer_direction` 设置写方向。
    pub fn write_from<R: Register, const N: usize>(
        &mut self,
        serial: &str,
        block: &RegisterBlock<R, N>,
    ) -> Result<(), DriverError> {
        let handle = self
            .registry
            .get_mut(serial)
            .ok_or_else(|| DriverError::SerialNotFound(serial.to_string()))?;

        if block.write_data_is_empty() {
            debug!("{}: writing {} with an all-zero payload", serial, block.kind());
        }

        self.engine
            .write(&mut self.transport, handle, CMD_OUT_EP, block.command())
            .map_err(|source| DriverError::WriteBytesFailed {
                serial: serial.to_string(),
                endpoint: CMD_OUT_EP,
                source,
            })?;

        if block.short_write_possible() {
            debug!("{}: wrote {} (short write)", serial, block.kind());
            return Ok(());
        }

        self.engine
            .write(&mut self.transport, handle, DATA_OUT_EP, block.write_data())
            .map_err(|source| DriverError::WriteBytesFailed {
                serial: serial.to_string(),
                endpoint: DATA_OUT_EP,
                source,
            })?;

        debug!("{}: wrote {} ({} bytes)", serial, block.kind(), block.data_len());
        Ok(())
    }

    /// 从设备读取寄存器块
    ///
    /// 先发送 64 字节命令包，再从数据端点读取 `width × N` 字节到读数据区。
    /// 调用前需用 `set_transfer_direction` 设置读方向。
    pub fn read_into<R: Register, const N: usize>(
        &mut self,
        serial: &str,
        block: &mut RegisterBlock<R, N>,
    ) -> Result<(), DriverError> {
        let handle = self
            .registry
            .get_mut(serial)
            .ok_or_else(|| DriverError::SerialNotFound(serial.to_string()))?;

        self.engine
            .write(&mut self.transport, handle, CMD_OUT_EP, block.command())
            .map_err(|source| DriverError::WriteBytesFailed {
                serial: serial.to_string(),
                endpoint: CMD_OUT_EP,
                source,
            })?;

        self.engine
            .read(&mut self.transport, handle, DATA_IN_EP, block.read_data_mut())
            .map_err(|source| DriverError::ReadBytesFailed {
                serial: serial.to_string(),
                endpoint: DATA_IN_EP,
                source,
            })?;

        debug!("{}: read {} ({} bytes)", serial, block.kind(), block.data_len());
        Ok(())
    }

    /// 写入寄存器并回读校验
    ///
    /// 依次设置写方向并写入、设置读方向并读回，返回不一致的寄存器。
    /// 结束时寄存器块处于读方向。
    pub fn write_and_verify<R: Register, const N: usize>(
        &mut self,
        serial: &str,
        block: &mut RegisterBlock<R, N>,
        registers: &[R; N],
        memory: MemoryType,
    ) -> Result<Vec<RegisterMismatch<R>>, DriverError> {
        block.set_write_registers(registers);
        block.set_transfer_direction(memory, TransferDirection::Write);
        self.write_from(serial, block)?;

        block.set_transfer_direction(memory, TransferDirection::Read);
        self.read_into(serial, block)?;

        let mismatches = compare_registers(registers, &block.read_registers());
        if !mismatches.is_empty() {
            warn!(
                "{}: {} of {} {} registers differ after write",
                serial,
                mismatches.len(),
                N,
                block.kind()
            );
        }
        Ok(mismatches)
    }

    /// 注销设备：释放接口并关闭句柄
    pub fn release(&mut self, serial: &str) -> Result<(), DriverError> {
        let handle = self
            .registry
            .remove(serial)
            .ok_or_else(|| DriverError::SerialNotFound(serial.to_string()))?;
        self.addresses.remove(serial);
        self.transport.close(handle);
        info!("Released device {}", serial);
        Ok(())
    }
}

impl<T: Transport> Drop for DeviceManager<T> {
    fn drop(&mut self) {
        for (serial, handle) in self.registry.drain() {
            self.transport.close(handle);
            debug!("Released device {} on drop", serial);
        }
    }
}
