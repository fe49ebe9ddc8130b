//! List-mode 采集示例
//!
//! 演示完整的 list-mode 采集流程：
//! - 写入 list-mode 优化的 ARM / FPGA 控制寄存器并回读校验
//! - 通过 FPGA action 启动采集
//! - 读取 list-mode 缓冲并打印事件
//!
//! 默认使用模拟探测器；传入 `--usb` 连接真实设备。
//!
//! ```bash
//! RUST_LOG=debug cargo run -p sipm-sdk --example list_mode_demo
//! ```

use anyhow::Context;
use sipm_sdk::prelude::*;
use sipm_sdk::protocol::preset;

const DEMO_SERIAL: [u8; 16] = [
    0x42, 0x50, 0x53, 0x49, 0x50, 0x4D, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07,
];

/// 构造模拟 list-mode 缓冲：前 4 个寄存器为头部，之后每 3 个寄存器一个事件
fn simulated_list_mode() -> Vec<u8> {
    let events: [(u16, u32); 5] = [
        (480, 1_200),
        (1_616, 2_400_000),
        (23_040, 9_000_123),
        (7_200, 20_000_000),
        (63_984, 39_999_999),
    ];

    let mut registers = [0u16; 1024];
    registers[0] = events.len() as u16;
    for (i, (adc, timestamp)) in events.into_iter().enumerate() {
        let base = 4 + 3 * i;
        registers[base] = adc;
        registers[base + 1] = timestamp as u16;
        registers[base + 2] = (timestamp >> 16) as u16;
    }
    registers.iter().flat_map(|r| r.to_ne_bytes()).collect()
}

#[cfg(feature = "usb")]
fn usb_manager() -> anyhow::Result<Manager> {
    ManagerBuilder::new()
        .backend(Backend::Usb)
        .build()
        .context("failed to connect USB detectors")
}

#[cfg(not(feature = "usb"))]
fn usb_manager() -> anyhow::Result<Manager> {
    anyhow::bail!("built without the `usb` feature")
}

fn build_manager(use_usb: bool) -> anyhow::Result<Manager> {
    if use_usb {
        return usb_manager();
    }

    let mut sim = SimTransport::new().with_detector(DEMO_SERIAL);
    sim.set_registers(0, CommandKind::ListMode, MemoryType::Ram, &simulated_list_mode())?;
    ManagerBuilder::new()
        .backend(Backend::Sim(sim))
        .build()
        .context("failed to start simulated detector")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("list_mode_demo=info".parse()?),
        )
        .init();

    let use_usb = std::env::args().any(|arg| arg == "--usb");
    let mut manager = build_manager(use_usb)?;

    let serials = manager.serials();
    if serials.is_empty() {
        println!("No detectors found");
        return Ok(());
    }
    tracing::info!("Found {} detector(s) via {}", serials.len(), manager.transport().backend_name());

    for serial in &serials {
        println!("\n📟 Detector {}", serial);

        // 1. 控制寄存器（RAM）
        let mut arm_control = ArmControlBlock::arm_control();
        let mismatches = manager.write_and_verify(
            serial,
            &mut arm_control,
            &preset::ARM_CTRL_LM_OPTIMIZED,
            MemoryType::Ram,
        )?;
        println!("  ARM control written, {} mismatch(es)", mismatches.len());

        let mut fpga_control = FpgaControlBlock::fpga_control();
        let mismatches = manager.write_and_verify(
            serial,
            &mut fpga_control,
            &preset::FPGA_CTRL_LM_OPTIMIZED,
            MemoryType::Ram,
        )?;
        println!("  FPGA control written, {} mismatch(es)", mismatches.len());

        // 2. 启动 list-mode 采集
        let mut action = FpgaActionBlock::fpga_action();
        action.set_write_registers(&preset::FPGA_ACTION_START_LIST);
        action.set_transfer_direction(MemoryType::Ram, TransferDirection::Write);
        manager.write_from(serial, &action)?;

        // 3. 读取事件
        let mut list_mode = ListModeBlock::list_mode();
        list_mode.set_transfer_direction(MemoryType::Ram, TransferDirection::Read);
        manager.read_into(serial, &mut list_mode)?;

        let events = list_mode.list_mode_events()?;
        println!("  {} event(s):", events.len());
        for event in &events {
            println!(
                "    t = {:>10.6} s  energy bin = {:>4}",
                event.seconds(),
                event.energy
            );
        }
    }

    Ok(())
}
