//! Carve four SPI controllers out of one BAR
//!
//! Runs the attach → map → stage → create sequence against the software
//! backends and prints the resulting platform devices.

use std::sync::Arc;

use fpga_spi_driver::prelude::*;
use fpga_spi_driver::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("fpga_spi_driver=debug")
        .init();

    let bus = Arc::new(SoftwareBus::new());
    let host = Arc::new(SoftwareHost::new());
    let manager = SpiControllerManager::new(bus.clone(), host.clone());
    let _module = SpiProtocolModule::load(host.clone(), manager.clone())?;

    let dev = PhysicalDeviceId::new("0000:01:00.0");
    host.attach(&dev)?;
    host.map_bar(&dev, 0xf000_0000, 0x1_0000);

    host.write(&dev, "slot_size", "0x1000\n")?;
    host.write(&dev, "window_base_offset", "0x8000\n")?;
    host.write(&dev, "chip_select_count", "1\n")?;
    host.write(&dev, "bus_driver_name", "xilinx_spi\n")?;
    host.write(&dev, "device_driver_name", "spidev\n")?;

    for index in 1..=4 {
        host.write(&dev, "chip_select", "0\n")?;
        host.write(&dev, "create_controller", &format!("{index}\n"))?;
    }

    println!("{dev}:");
    for handle in manager.controllers(&dev)? {
        println!(
            "  {:<14} {}  -> {} (cs {})",
            handle.name(),
            handle.range,
            handle.peripheral.modalias,
            handle.peripheral.chip_select
        );
    }
    println!("registered: {:?}", bus.registered_names());

    host.detach(&dev);
    println!("after detach: {} live device(s)", bus.live_devices());
    Ok(())
}
