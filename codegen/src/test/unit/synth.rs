use weft_device::DeviceCapabilities;
use weft_dtype::FieldType;

use test_case::test_case;

use crate::{
    BinaryOp, BorderPolicy, Error, FftDirection, Opcode, ReduceOp, UnaryOp, Uncached, output_type, synthesize,
};

#[test]
fn test_host_opcodes_have_no_kernel() {
    let ft = FieldType::scalar(&[4, 4]).unwrap();
    for opcode in [
        Opcode::Constant,
        Opcode::Recurrence,
        Opcode::Sensor { name: "camera".into() },
        Opcode::Actuator { name: "display".into() },
        Opcode::Host { name: "threshold".into() },
    ] {
        assert!(opcode.is_host_side());
        let result = synthesize(&opcode, std::slice::from_ref(&ft), &DeviceCapabilities::DEFAULT, &Uncached);
        assert!(matches!(result, Err(Error::HostOperation { .. })), "{opcode} synthesized");
        assert!(output_type(&opcode, std::slice::from_ref(&ft)).is_err());
    }
}

#[test]
fn test_opcode_names() {
    assert_eq!(Opcode::Binary(BinaryOp::Add).name(), "binary");
    assert_eq!(Opcode::FieldReduce(ReduceOp::Max).to_string(), "field_reduce_max");
    assert_eq!(Opcode::Fft(FftDirection::Inverse).to_string(), "fft_inverse");
    assert_eq!(Opcode::FilterAdjoint { size: 5 }.to_string(), "filter_adjoint(5)");
    assert_eq!(Opcode::Sensor { name: "camera".into() }.to_string(), "sensor(camera)");
    assert!(!Opcode::TensorReduce.is_host_side());
}

#[test_case(Opcode::Unary(UnaryOp::Sigmoid) ; "unary")]
#[test_case(Opcode::Binary(BinaryOp::Max) ; "binary")]
#[test_case(Opcode::ComplexBinary(BinaryOp::Divide) ; "complex")]
#[test_case(Opcode::Scale(-0.25) ; "scale")]
#[test_case(Opcode::Offset(3.0) ; "offset")]
#[test_case(Opcode::TensorReduce ; "tensor reduce")]
#[test_case(Opcode::FieldReduce(ReduceOp::Sum) ; "field reduce")]
#[test_case(Opcode::Convolve(BorderPolicy::Clamp) ; "convolve")]
#[test_case(Opcode::FilterAdjoint { size: 7 } ; "filter adjoint")]
#[test_case(Opcode::Fft(FftDirection::Forward) ; "fft")]
#[test_case(Opcode::Constant ; "constant")]
#[test_case(Opcode::Sensor { name: "camera".into() } ; "sensor")]
#[test_case(Opcode::Host { name: "threshold".into() } ; "host")]
fn test_opcode_parses_its_display(opcode: Opcode) {
    assert_eq!(opcode.to_string().parse::<Opcode>().unwrap(), opcode);
}

#[test_case("lerp" ; "unknown name")]
#[test_case("scale(two)" ; "bad literal")]
#[test_case("convolve(mirror" ; "unclosed")]
#[test_case("fft_sideways" ; "bad direction")]
fn test_opcode_parse_rejects(text: &str) {
    assert!(matches!(text.parse::<Opcode>(), Err(Error::UnknownOpcode { .. })));
}

#[test]
fn test_synthesized_bindings() {
    let ft = FieldType::scalar(&[8, 8]).unwrap();
    let op = synthesize(&Opcode::Binary(BinaryOp::Subtract), &[ft.clone(), ft], &DeviceCapabilities::DEFAULT, &Uncached)
        .unwrap();
    let kernel = &op.stages[0];
    let names: Vec<&str> = kernel.buffer_args.iter().map(|arg| arg.name.as_str()).collect();
    assert_eq!(names, ["a", "b", "out"]);
    assert!(kernel.buffer_args.iter().all(|arg| arg.words == 64));
    assert!(kernel.source.starts_with("// a: "));
}

#[test]
fn test_launch_rejects_wrong_buffer_length() {
    use crate::test::device_buffer;

    let ft = FieldType::scalar(&[4]).unwrap();
    let op = synthesize(&Opcode::Scale(2.0), &[ft], &DeviceCapabilities::DEFAULT, &Uncached).unwrap();
    let result = op.execute(&[device_buffer(&[1.0; 3])], &[device_buffer(&[0.0; 4])], &[]);
    assert!(matches!(result, Err(Error::Launch { .. })));
}
