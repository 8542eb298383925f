use test_case::test_case;
use weft_codegen::{BorderPolicy, Opcode};
use weft_dtype::FieldType;

use crate::checkpoint::save_persistent;
use crate::test::context;
use crate::{Error, MemoryCheckpoint, Restorer, RestoreRegistry, Saver, Version};

#[test_case(Version::new(1, 1), Version::new(1, 2), false ; "older minor rejects newer")]
#[test_case(Version::new(1, 2), Version::new(1, 2), true ; "same version")]
#[test_case(Version::new(2, 0), Version::new(1, 2), true ; "newer major")]
#[test_case(Version::new(1, 3), Version::new(1, 2), true ; "newer minor")]
#[test_case(Version::new(1, 9), Version::new(2, 0), false ; "older major")]
fn test_version_acceptance(current: Version, stored: Version, accepted: bool) {
    assert_eq!(current.accepts(stored), accepted);
    assert_eq!(current.check(stored, "filter").is_ok(), accepted);
}

#[test]
fn test_incompatible_version_names_both() {
    let err = Version::new(1, 1).check(Version::new(1, 2), "filter").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("filter"), "{message}");
    assert!(message.contains("(1, 1)") && message.contains("(1, 2)"), "{message}");
}

#[test]
fn test_memory_checkpoint_fields() {
    let mut checkpoint = MemoryCheckpoint::new();
    checkpoint.write_int("count", -7).unwrap();
    checkpoint.write_string("label", "edges").unwrap();
    checkpoint.write_float_array("weights", &[0.5, -1.5]).unwrap();

    assert_eq!(checkpoint.len(), 3);
    assert_eq!(checkpoint.read_int("count").unwrap(), -7);
    assert_eq!(checkpoint.read_string("label").unwrap(), "edges");
    assert_eq!(checkpoint.read_float_array("weights").unwrap(), vec![0.5, -1.5]);

    assert!(matches!(checkpoint.read_int("missing"), Err(Error::MissingField { .. })));
    assert!(matches!(checkpoint.read_int("label"), Err(Error::FieldKind { .. })));
    assert!(matches!(checkpoint.read_string("weights"), Err(Error::FieldKind { .. })));
}

#[test]
fn test_constant_round_trip() {
    let ft = FieldType::vector(&[2, 2], 2).unwrap();
    let values: Vec<f32> = (0..8).map(|v| v as f32).collect();

    let mut cx = context();
    let register = cx.constant("weights", ft.clone(), values.clone()).unwrap();
    let mut checkpoint = MemoryCheckpoint::new();
    assert!(cx.save_kernel(cx.producer(register).unwrap(), &mut checkpoint).unwrap());
    assert_eq!(checkpoint.read_string("tag").unwrap(), "constant");

    let mut restored_cx = context();
    let restored = RestoreRegistry::with_builtin().restore(&checkpoint, &mut restored_cx, &[]).unwrap();
    assert_eq!(restored_cx.field_type(restored[0]).unwrap(), &ft);

    let mut scheduler = restored_cx.build().unwrap();
    scheduler.reset().unwrap();
    assert_eq!(scheduler.read(restored[0]).unwrap(), values);
}

#[test]
fn test_device_kernel_round_trip() {
    let image = FieldType::scalar(&[5, 5]).unwrap();
    let kernel = FieldType::scalar(&[3, 3]).unwrap();

    let mut cx = context();
    let a = cx.constant("image", image.clone(), vec![1.0; 25]).unwrap();
    let b = cx.constant("kernel", kernel.clone(), vec![1.0; 9]).unwrap();
    let blurred = cx.operation(Opcode::Convolve(BorderPolicy::Cyclic), &[a, b]).unwrap();
    let mut checkpoint = MemoryCheckpoint::new();
    assert!(cx.save_kernel(cx.producer(blurred).unwrap(), &mut checkpoint).unwrap());
    assert_eq!(checkpoint.read_string("opcode").unwrap(), "convolve(cyclic)");

    let mut restored_cx = context();
    let a = restored_cx.constant("image", image, vec![1.0; 25]).unwrap();
    let b = restored_cx.constant("kernel", kernel, vec![1.0; 9]).unwrap();
    let restored = RestoreRegistry::with_builtin().restore(&checkpoint, &mut restored_cx, &[a, b]).unwrap();

    let mut scheduler = restored_cx.build().unwrap();
    scheduler.reset().unwrap();
    scheduler.step().unwrap();
    assert_eq!(scheduler.read(restored[0]).unwrap(), vec![9.0; 25]);
}

#[test]
fn test_kernels_without_parameters_save_nothing() {
    let mut cx = context();
    let state = cx.recurrence("state", FieldType::scalar(&[4]).unwrap()).unwrap();
    let mut checkpoint = MemoryCheckpoint::new();
    assert!(!cx.save_kernel(cx.producer(state).unwrap(), &mut checkpoint).unwrap());
    assert!(checkpoint.is_empty());
}

#[test]
fn test_unknown_tag() {
    let mut checkpoint = MemoryCheckpoint::new();
    checkpoint.write_string("tag", "histogram").unwrap();
    let result = RestoreRegistry::with_builtin().restore(&checkpoint, &mut context(), &[]);
    assert!(matches!(result, Err(Error::UnknownTag { tag }) if tag == "histogram"));
}

#[test]
fn test_newer_checkpoint_is_rejected() {
    let mut cx = context();
    let register = cx.constant("bias", FieldType::scalar(&[2]).unwrap(), vec![1.0, 2.0]).unwrap();
    let mut checkpoint = MemoryCheckpoint::new();
    cx.save_kernel(cx.producer(register).unwrap(), &mut checkpoint).unwrap();
    checkpoint.write_int("version.minor", 4).unwrap();

    let result = RestoreRegistry::with_builtin().restore(&checkpoint, &mut context(), &[]);
    assert!(matches!(
        result,
        Err(Error::IncompatibleVersion { kernel, version, stored })
            if kernel == "constant" && version == Version::new(1, 0) && stored == Version::new(1, 4)
    ));
}

#[test]
fn test_custom_registration() {
    fn restore_bias(
        restorer: &dyn Restorer,
        cx: &mut crate::ConstructionContext,
        _inputs: &[crate::RegisterId],
    ) -> crate::Result<Vec<crate::RegisterId>> {
        let values = restorer.read_float_array("values")?;
        let ft = FieldType::scalar(&[values.len()]).unwrap();
        Ok(vec![cx.constant("bias", ft, values)?])
    }

    struct Bias(Vec<f32>);
    impl crate::Persistent for Bias {
        fn tag(&self) -> &'static str {
            "bias"
        }
        fn version(&self) -> Version {
            Version::new(2, 1)
        }
        fn save(&self, saver: &mut dyn Saver) -> crate::Result<()> {
            saver.write_float_array("values", &self.0)
        }
    }

    let mut checkpoint = MemoryCheckpoint::new();
    save_persistent(&Bias(vec![3.0, 4.0]), &mut checkpoint).unwrap();

    let mut registry = RestoreRegistry::new();
    assert!(!registry.contains("bias"));
    registry.register("bias", Version::new(2, 3), restore_bias);

    let mut cx = context();
    let restored = registry.restore(&checkpoint, &mut cx, &[]).unwrap();
    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    assert_eq!(scheduler.read(restored[0]).unwrap(), vec![3.0, 4.0]);
}
