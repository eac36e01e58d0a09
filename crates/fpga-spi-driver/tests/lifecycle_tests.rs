//! End-to-end lifecycle tests
//!
//! Drive the manager through the software host the way the multi-FPGA core
//! and an attribute writer would: protocol load, attach, BAR map, staged
//! writes, create/delete, unmap and detach.

use std::sync::Arc;

use fpga_spi_driver::layout::{AddressRange, MAX_CONTROLLERS};
use fpga_spi_driver::prelude::*;
use fpga_spi_driver::ResourceKind;

struct Rig {
    bus: Arc<SoftwareBus>,
    host: Arc<SoftwareHost>,
    manager: Arc<SpiControllerManager>,
    module: SpiProtocolModule,
}

fn rig(options: ManagerOptions) -> Rig {
    let bus = Arc::new(SoftwareBus::new());
    let host = Arc::new(SoftwareHost::new());
    let manager = SpiControllerManager::with_options(bus.clone(), host.clone(), options);
    let module = SpiProtocolModule::load(host.clone(), manager.clone()).expect("protocol load");
    Rig {
        bus,
        host,
        manager,
        module,
    }
}

fn stage(host: &SoftwareHost, dev: &PhysicalDeviceId) {
    for (attr, value) in [
        ("slot_size", "0x100\n"),
        ("window_base_offset", "0\n"),
        ("chip_select_count", "1\n"),
        ("chip_select", "0\n"),
        ("bus_driver_name", "spidev-ctrl\n"),
        ("device_driver_name", "spidev\n"),
    ] {
        host.write(dev, attr, value).expect("stage");
    }
}

#[test]
fn test_reference_scenario() {
    let rig = rig(ManagerOptions::default());
    let dev = PhysicalDeviceId::new("0000:01:00.0");

    rig.host.attach(&dev).unwrap();
    rig.host.map_bar(&dev, 0x2000, 0x1000);
    stage(&rig.host, &dev);
    assert_eq!(rig.host.write(&dev, "create_controller", "1\n").unwrap(), 2);

    let controllers = rig.manager.controllers(&dev).unwrap();
    assert_eq!(controllers.len(), 1);
    let handle = &controllers[0];
    assert_eq!(handle.range, AddressRange { start: 0x2000, end: 0x20FF });
    assert_eq!(handle.name(), "spidev-ctrl.1");

    let spec = rig.bus.device(handle.device).unwrap().spec.unwrap();
    assert_eq!(spec.parent, dev);
    assert_eq!(spec.resource.kind, ResourceKind::Memory);
    assert_eq!(spec.platform_data.num_chipselect, 1);
    assert_eq!(spec.platform_data.bits_per_word, 8);
    assert_eq!(spec.platform_data.devices.len(), 1);
    assert_eq!(spec.platform_data.devices[0].modalias.as_str(), "spidev");
    assert_eq!(spec.platform_data.devices[0].chip_select, 0);

    rig.host.detach(&dev);
    assert_eq!(rig.bus.live_devices(), 0);
    assert_eq!(rig.host.group_count(), 0);

    let err = rig.manager.create_controller(&dev, 1).unwrap_err();
    assert!(matches!(err, SpiError::DeviceNotFound { .. }));
    let err = rig.host.write(&dev, "slot_size", "1").unwrap_err();
    assert!(matches!(err, SpiError::DeviceNotFound { .. }));
}

#[test]
fn test_every_slot_round_trips() {
    let rig = rig(ManagerOptions::default());
    let dev = PhysicalDeviceId::new("0000:01:00.0");
    rig.host.attach(&dev).unwrap();
    rig.host.map_bar(&dev, 0x2000, 0x1000);
    stage(&rig.host, &dev);

    let max = i64::try_from(MAX_CONTROLLERS).unwrap();
    for index in 1..=max {
        let index_text = index.to_string();
        rig.host.write(&dev, "create_controller", &index_text).unwrap();
        let err = rig.manager.create_controller(&dev, index).unwrap_err();
        assert!(matches!(err, SpiError::AlreadyExists { .. }));

        rig.host.write(&dev, "delete_controller", &index_text).unwrap();
        assert!(rig.manager.controllers(&dev).unwrap().is_empty());

        let again = rig.manager.create_controller(&dev, index).unwrap();
        assert_eq!(again.range.start, 0x2000 + 0x100 * (u64::try_from(index).unwrap() - 1));
        rig.manager.delete_controller(&dev, index).unwrap();
    }
    assert_eq!(rig.bus.live_devices(), 0);
}

#[test]
fn test_out_of_range_indices() {
    let rig = rig(ManagerOptions::default());
    let dev = PhysicalDeviceId::new("0000:01:00.0");
    rig.host.attach(&dev).unwrap();
    rig.host.map_bar(&dev, 0x2000, 0x1000);
    stage(&rig.host, &dev);

    for text in ["0", "9", "-1"] {
        let err = rig.host.write(&dev, "create_controller", text).unwrap_err();
        assert!(matches!(err, SpiError::OutOfRange { .. }), "{text}");
        assert_eq!(err.to_errno(), -19);
        let err = rig.host.write(&dev, "delete_controller", text).unwrap_err();
        assert!(matches!(err, SpiError::OutOfRange { .. }), "{text}");
    }
    let err = rig.host.write(&dev, "delete_controller", "2").unwrap_err();
    assert!(matches!(err, SpiError::NotFound { index: 2 }));
    assert_eq!(rig.bus.live_devices(), 0);
}

#[test]
fn test_detach_destroys_sparse_slots() {
    let rig = rig(ManagerOptions::default());
    let dev = PhysicalDeviceId::new("0000:01:00.0");
    rig.host.attach(&dev).unwrap();
    rig.host.map_bar(&dev, 0x2000, 0x1000);
    stage(&rig.host, &dev);
    for index in ["1", "3", "5"] {
        rig.host.write(&dev, "create_controller", index).unwrap();
    }
    assert_eq!(
        rig.bus.registered_names(),
        ["spidev-ctrl.1", "spidev-ctrl.3", "spidev-ctrl.5"]
    );

    rig.host.detach(&dev);
    assert_eq!(rig.bus.live_devices(), 0);
    assert!(rig.manager.devices().is_empty());
}

#[test]
fn test_failure_injection_leaves_slot_empty() {
    let rig = rig(ManagerOptions::default());
    let dev = PhysicalDeviceId::new("0000:01:00.0");
    rig.host.attach(&dev).unwrap();
    rig.host.map_bar(&dev, 0x2000, 0x1000);
    stage(&rig.host, &dev);

    rig.bus.fail_next_allocation();
    let err = rig.host.write(&dev, "create_controller", "1").unwrap_err();
    assert!(matches!(err, SpiError::AllocationFailed { .. }));
    assert_eq!(err.to_errno(), -12);

    rig.bus.fail_next_configure();
    let err = rig.host.write(&dev, "create_controller", "1").unwrap_err();
    assert!(matches!(err, SpiError::AllocationFailed { .. }));

    rig.bus.fail_next_registration();
    let err = rig.host.write(&dev, "create_controller", "1").unwrap_err();
    assert!(matches!(err, SpiError::RegistrationFailed { .. }));
    assert_eq!(err.to_errno(), -5);

    assert_eq!(rig.bus.live_devices(), 0);
    assert_eq!(rig.bus.released(), 2);
    assert!(rig.manager.controllers(&dev).unwrap().is_empty());

    rig.host.write(&dev, "create_controller", "1").unwrap();
    assert_eq!(rig.bus.live_devices(), 1);
}

#[test]
fn test_slot_outside_bar_rejected() {
    let rig = rig(ManagerOptions::default());
    let dev = PhysicalDeviceId::new("0000:01:00.0");
    rig.host.attach(&dev).unwrap();
    rig.host.map_bar(&dev, 0x2000, 0x400);
    stage(&rig.host, &dev);

    rig.host.write(&dev, "create_controller", "4").unwrap();
    let err = rig.host.write(&dev, "create_controller", "5").unwrap_err();
    assert!(matches!(err, SpiError::InvalidInput { .. }));
    assert_eq!(err.to_errno(), -22);
}

#[test]
fn test_two_cards_share_driver_name() {
    let rig = rig(ManagerOptions::default());
    let a = PhysicalDeviceId::new("0000:01:00.0");
    let b = PhysicalDeviceId::new("0000:02:00.0");
    for dev in [&a, &b] {
        rig.host.attach(dev).unwrap();
        rig.host.map_bar(dev, 0x2000, 0x1000);
        stage(&rig.host, dev);
    }

    rig.host.write(&a, "create_controller", "1").unwrap();
    let err = rig.host.write(&b, "create_controller", "1").unwrap_err();
    assert!(matches!(err, SpiError::RegistrationFailed { .. }));
    assert!(rig.manager.controllers(&b).unwrap().is_empty());

    rig.host.write(&b, "bus_driver_name", "spidev-ctrl-b").unwrap();
    rig.host.write(&b, "create_controller", "1").unwrap();
    assert_eq!(rig.bus.live_devices(), 2);
}

#[test]
fn test_unmap_policies() {
    let keep = rig(ManagerOptions::default());
    let revoke = rig(ManagerOptions::default().with_revoke_on_unmap(true));
    let dev = PhysicalDeviceId::new("0000:01:00.0");

    for rig in [&keep, &revoke] {
        rig.host.attach(&dev).unwrap();
        rig.host.map_bar(&dev, 0x2000, 0x1000);
        stage(&rig.host, &dev);
        rig.host.write(&dev, "create_controller", "2").unwrap();
        rig.host.unmap_bar(&dev);
    }

    assert_eq!(keep.manager.controllers(&dev).unwrap().len(), 1);
    assert_eq!(keep.bus.live_devices(), 1);
    assert!(revoke.manager.controllers(&dev).unwrap().is_empty());
    assert_eq!(revoke.bus.live_devices(), 0);
}

#[test]
fn test_show_reads_back_staged_values() {
    let rig = rig(ManagerOptions::default());
    let dev = PhysicalDeviceId::new("0000:01:00.0");
    rig.host.attach(&dev).unwrap();
    stage(&rig.host, &dev);

    assert_eq!(rig.host.read(&dev, "slot_size").unwrap(), "256\n");
    assert_eq!(rig.host.read(&dev, "bus_driver_name").unwrap(), "spidev-ctrl\n");
    assert_eq!(rig.host.read(&dev, "create_controller").unwrap(), "");
}

#[test]
fn test_unload_detaches_everything() {
    let mut rig = rig(ManagerOptions::default());
    let dev = PhysicalDeviceId::new("0000:01:00.0");
    rig.host.attach(&dev).unwrap();
    rig.host.map_bar(&dev, 0x2000, 0x1000);
    stage(&rig.host, &dev);
    rig.host.write(&dev, "create_controller", "1").unwrap();

    rig.module.unload();
    assert_eq!(rig.bus.live_devices(), 0);
    assert!(rig.host.protocol_names().is_empty());

    // Core events no longer reach the manager.
    rig.host.attach(&dev).unwrap();
    assert!(rig.manager.devices().is_empty());
}
