use std::sync::Arc;

use test_case::test_case;

use crate::{DeviceCapabilities, DeviceSpec, DeviceSpecExt, Error, registry};

#[test_case("CPU", DeviceSpec::Cpu; "cpu")]
#[test_case("accel", DeviceSpec::Accelerator { device_id: 0 }; "accel_default")]
#[test_case("ACCEL:3", DeviceSpec::Accelerator { device_id: 3 }; "accel_indexed")]
#[test_case("gpu:1", DeviceSpec::Accelerator { device_id: 1 }; "gpu_alias")]
fn parse_device(text: &str, expected: DeviceSpec) {
    assert_eq!(<DeviceSpec as DeviceSpecExt>::parse(text).unwrap(), expected);
}

#[test_case("TPU"; "unknown")]
#[test_case("ACCEL:x"; "bad_index")]
#[test_case("CPU:0"; "cpu_index")]
fn parse_invalid_device(text: &str) {
    assert!(matches!(<DeviceSpec as DeviceSpecExt>::parse(text), Err(Error::InvalidDevice { .. })));
}

#[test]
fn test_registry_shares_devices() {
    let a = registry().get(&DeviceSpec::Accelerator { device_id: 0 }).unwrap();
    let b = crate::get_device("ACCEL:0").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.capabilities, DeviceCapabilities::DEFAULT);
    assert_eq!(a.accelerator.name(), "ACCEL:0");
}

#[test]
fn test_registry_keys_on_capabilities() {
    let spec = DeviceSpec::Accelerator { device_id: 7 };
    let small = DeviceCapabilities { local_memory_bytes: 1024, ..DeviceCapabilities::DEFAULT };
    let a = registry().get_with(&spec, small).unwrap();
    let b = registry().get(&spec).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.capabilities.local_memory_bytes, 1024);
}
