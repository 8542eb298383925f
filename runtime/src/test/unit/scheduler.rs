use std::sync::Arc;
use std::time::{Duration, Instant};

use weft_codegen::{BinaryOp, FftDirection, Opcode, ReduceOp};
use weft_device::DeviceCapabilities;
use weft_dtype::FieldType;

use crate::test::{context, context_with};
use crate::{Error, PlanCache, RecordingActuator, SchedulerState, SequenceSensor};

#[test]
fn test_recurrence_delays_one_cycle() {
    let ft = FieldType::scalar(&[4]).unwrap();
    let mut cx = context();
    let state = cx.recurrence("state", ft).unwrap();
    let next = cx.operation(Opcode::Offset(1.0), &[state]).unwrap();
    let seen = cx.operation(Opcode::Scale(1.0), &[state]).unwrap();
    cx.bind_recurrence(state, next).unwrap();

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    for n in 1..=5 {
        scheduler.step().unwrap();
        assert_eq!(scheduler.read(next).unwrap(), vec![n as f32; 4]);
        assert_eq!(scheduler.read(seen).unwrap(), vec![(n - 1) as f32; 4]);
        assert_eq!(scheduler.read(state).unwrap(), vec![n as f32; 4]);
    }
    assert_eq!(scheduler.step_count(), 5);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[test]
fn test_reset_restarts() {
    let ft = FieldType::scalar(&[2]).unwrap();
    let mut cx = context();
    let state = cx.recurrence_with("state", ft, vec![10.0, 20.0]).unwrap();
    let next = cx.operation(Opcode::Scale(2.0), &[state]).unwrap();
    cx.bind_recurrence(state, next).unwrap();

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    scheduler.run(3).unwrap();
    assert_eq!(scheduler.read(state).unwrap(), vec![80.0, 160.0]);

    scheduler.reset().unwrap();
    assert_eq!(scheduler.step_count(), 0);
    assert_eq!(scheduler.read(state).unwrap(), vec![10.0, 20.0]);
    scheduler.step().unwrap();
    assert_eq!(scheduler.read(next).unwrap(), vec![20.0, 40.0]);
}

#[test]
fn test_recurrences_latch_together() {
    let ft = FieldType::scalar(&[1]).unwrap();
    let mut cx = context();
    let a = cx.recurrence_with("a", ft.clone(), vec![1.0]).unwrap();
    let b = cx.recurrence_with("b", ft, vec![2.0]).unwrap();
    cx.bind_recurrence(a, b).unwrap();
    cx.bind_recurrence(b, a).unwrap();

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    scheduler.step().unwrap();
    assert_eq!((scheduler.read(a).unwrap(), scheduler.read(b).unwrap()), (vec![2.0], vec![1.0]));
    scheduler.step().unwrap();
    assert_eq!((scheduler.read(a).unwrap(), scheduler.read(b).unwrap()), (vec![1.0], vec![2.0]));
}

#[test]
fn test_missing_binding_is_fatal_at_reset() {
    let mut cx = context();
    cx.recurrence("state", FieldType::scalar(&[4]).unwrap()).unwrap();
    let mut scheduler = cx.build().unwrap();

    assert!(matches!(scheduler.step(), Err(Error::NotReset)));
    assert!(matches!(scheduler.reset(), Err(Error::MissingBinding { register }) if register == "state"));
    assert_eq!(scheduler.state(), SchedulerState::Unreset);
}

#[test]
fn test_binding_errors() {
    let ft = FieldType::scalar(&[4]).unwrap();
    let mut cx = context();
    let state = cx.recurrence("state", ft.clone()).unwrap();
    let next = cx.operation(Opcode::Offset(1.0), &[state]).unwrap();
    let other = cx.constant("other", FieldType::scalar(&[5]).unwrap(), vec![0.0; 5]).unwrap();

    assert!(matches!(cx.bind_recurrence(state, state), Err(Error::SelfBinding { .. })));
    assert!(matches!(
        cx.bind_recurrence(state, other),
        Err(Error::RecurrenceType { expected, actual, .. }) if expected == ft && actual.points() == 5
    ));
    assert!(matches!(cx.bind_recurrence(next, state), Err(Error::NotARecurrence { .. })));

    cx.bind_recurrence(state, next).unwrap();
    assert!(matches!(cx.bind_recurrence(state, next), Err(Error::DuplicateBinding { register }) if register == "state"));
}

#[test]
fn test_sensor_skip_keeps_contents() {
    let ft = FieldType::scalar(&[2]).unwrap();
    let mut cx = context();
    let sensor = SequenceSensor::new([Some(vec![1.0, 2.0]), None, Some(vec![3.0, 4.0])]);
    let input = cx.sensor("camera", ft, sensor).unwrap();
    let doubled = cx.operation(Opcode::Scale(2.0), &[input]).unwrap();

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();

    scheduler.step().unwrap();
    assert_eq!(scheduler.read(input).unwrap(), vec![1.0, 2.0]);
    assert_eq!(scheduler.register(input).unwrap().last_update(), Some(0));

    scheduler.step().unwrap();
    assert_eq!(scheduler.read(input).unwrap(), vec![1.0, 2.0]);
    assert_eq!(scheduler.read(doubled).unwrap(), vec![2.0, 4.0]);
    assert_eq!(scheduler.register(input).unwrap().last_update(), Some(0));
    assert_eq!(scheduler.register(doubled).unwrap().last_update(), Some(1));

    scheduler.step().unwrap();
    assert_eq!(scheduler.read(doubled).unwrap(), vec![6.0, 8.0]);
    assert_eq!(scheduler.register(input).unwrap().last_update(), Some(2));
    assert!(!scheduler.register(input).unwrap().is_skipped());
}

#[test]
fn test_pipelined_sensor_lags_one_cycle() {
    let ft = FieldType::scalar(&[2]).unwrap();
    let mut cx = context();
    let sensor = SequenceSensor::new([Some(vec![1.0, 2.0]), Some(vec![3.0, 4.0])]).with_pipelining();
    let input = cx.sensor("camera", ft, sensor).unwrap();

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();

    scheduler.step().unwrap();
    assert_eq!(scheduler.read(input).unwrap(), vec![0.0, 0.0]);
    assert_eq!(scheduler.register(input).unwrap().last_update(), None);

    scheduler.step().unwrap();
    assert_eq!(scheduler.read(input).unwrap(), vec![1.0, 2.0]);
    scheduler.step().unwrap();
    assert_eq!(scheduler.read(input).unwrap(), vec![3.0, 4.0]);
    scheduler.step().unwrap();
    assert_eq!(scheduler.read(input).unwrap(), vec![3.0, 4.0]);
    assert_eq!(scheduler.register(input).unwrap().last_update(), Some(2));
}

#[test]
fn test_read_while_register_held() {
    let ft = FieldType::scalar(&[3]).unwrap();
    let mut cx = context();
    let a = cx.constant("a", ft, vec![1.0, 2.0, 3.0]).unwrap();
    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    scheduler.step().unwrap();

    let held = scheduler.register(a).unwrap();
    assert!(matches!(scheduler.read(a), Err(Error::RegisterInUse { id }) if id == a));
    drop(held);
    assert_eq!(scheduler.read(a).unwrap(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_paced_step_includes_downstream_work() {
    let ft = FieldType::scalar(&[2]).unwrap();
    let mut cx = context();
    let frames = std::iter::repeat_n(Some(vec![1.0, 2.0]), 20);
    let input = cx.sensor("input", ft.clone(), SequenceSensor::new(frames).with_rate(100.0)).unwrap();
    cx.host("slow", &[input], ft, |inputs| {
        std::thread::sleep(Duration::from_millis(5));
        inputs[0].clone()
    })
    .unwrap();

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    let started = Instant::now();
    scheduler.run(20).unwrap();
    let per_cycle = started.elapsed() / 20;
    assert!(per_cycle >= Duration::from_millis(9), "cycles ran early: {per_cycle:?}");
    assert!(per_cycle < Duration::from_millis(13), "cycles exceeded the period: {per_cycle:?}");
}

#[test]
fn test_actuator_receives_every_cycle() {
    let ft = FieldType::scalar(&[2]).unwrap();
    let mut cx = context();
    let sensor = SequenceSensor::new([Some(vec![1.0, 2.0]), Some(vec![3.0, 4.0])]);
    let input = cx.sensor("camera", ft, sensor).unwrap();
    let tripled = cx.operation(Opcode::Scale(3.0), &[input]).unwrap();
    let display = RecordingActuator::new();
    cx.actuator("display", tripled, display.clone()).unwrap();

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    assert_eq!(display.resets(), 1);
    scheduler.run(2).unwrap();
    assert_eq!(display.frames(), vec![vec![3.0, 6.0], vec![9.0, 12.0]]);
}

#[test]
fn test_host_kernel_between_device_kernels() {
    let ft = FieldType::scalar(&[3]).unwrap();
    let mut cx = context();
    let a = cx.constant("a", ft.clone(), vec![1.0, -2.0, 3.0]).unwrap();
    let b = cx.constant("b", ft.clone(), vec![4.0, 5.0, -6.0]).unwrap();
    let summed = cx.operation(Opcode::Binary(BinaryOp::Add), &[a, b]).unwrap();
    let clipped = cx
        .host("clip", &[summed], ft, |inputs| inputs[0].iter().map(|v| v.max(0.0)).collect())
        .unwrap();
    let scaled = cx.operation(Opcode::Scale(10.0), &[clipped]).unwrap();

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    scheduler.step().unwrap();
    assert_eq!(scheduler.read(clipped).unwrap(), vec![5.0, 3.0, 0.0]);
    assert_eq!(scheduler.read(scaled).unwrap(), vec![50.0, 30.0, 0.0]);
}

#[test]
fn test_exact_field_sum() {
    let ft = FieldType::scalar(&[8192]).unwrap();
    let mut cx = context();
    let input = cx.constant("input", ft, vec![4097.0; 8192]).unwrap();
    let total = cx.operation(Opcode::FieldReduce(ReduceOp::Sum), &[input]).unwrap();

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    scheduler.step().unwrap();
    assert_eq!(scheduler.read(total).unwrap(), vec![33_562_624.0]);
}

#[test]
fn test_transform_round_trip_shares_plans() {
    let plans = Arc::new(PlanCache::new());
    let ft = FieldType::complex(&[8, 8]).unwrap();
    let values: Vec<f32> = (0..128).map(|i| ((i * 7) % 11) as f32 - 5.0).collect();

    let mut cx = context_with(Arc::clone(&plans), DeviceCapabilities::DEFAULT);
    let input = cx.constant("input", ft.clone(), values.clone()).unwrap();
    let spectrum = cx.operation(Opcode::Fft(FftDirection::Forward), &[input]).unwrap();
    let restored = cx.operation(Opcode::Fft(FftDirection::Inverse), &[spectrum]).unwrap();
    let again = cx.operation(Opcode::Fft(FftDirection::Forward), &[restored]).unwrap();
    assert_eq!((plans.misses(), plans.hits()), (2, 1));

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    scheduler.step().unwrap();
    let output = scheduler.read(restored).unwrap();
    for (a, e) in output.iter().zip(&values) {
        assert!((a - e).abs() < 1e-4, "{a} vs {e}");
    }
    let first = scheduler.read(spectrum).unwrap();
    let second = scheduler.read(again).unwrap();
    for (a, e) in second.iter().zip(&first) {
        assert!((a - e).abs() < 1e-2 * e.abs().max(1.0), "{a} vs {e}");
    }
}

#[test]
fn test_copy_kernel_with_new_inputs() {
    let small = FieldType::scalar(&[4]).unwrap();
    let large = FieldType::scalar(&[8]).unwrap();
    let mut cx = context();
    let a = cx.constant("a", small, vec![1.0; 4]).unwrap();
    let b = cx.constant("b", large, vec![2.0; 8]).unwrap();
    let scaled = cx.operation(Opcode::Scale(0.5), &[a]).unwrap();
    let copy = cx.copy_kernel(cx.producer(scaled).unwrap(), &[b]).unwrap();
    let copied = cx.circuit().kernel(copy).unwrap().outputs[0];
    assert_eq!(cx.field_type(copied).unwrap().points(), 8);

    let sensor = cx.sensor("camera", FieldType::scalar(&[4]).unwrap(), SequenceSensor::default()).unwrap();
    let result = cx.copy_kernel(cx.producer(sensor).unwrap(), &[]);
    assert!(matches!(result, Err(Error::NotCopyable { .. })));

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    scheduler.step().unwrap();
    assert_eq!(scheduler.read(scaled).unwrap(), vec![0.5; 4]);
    assert_eq!(scheduler.read(copied).unwrap(), vec![1.0; 8]);
}

#[test]
fn test_pixel_input_reads_normalized() {
    let ft = FieldType::pixel(&[2, 2], 0).unwrap();
    let mut cx = context();
    let sensor = SequenceSensor::new([Some(vec![0.0, 51.0 / 255.0, 1.0, 0.2])]);
    let input = cx.sensor("camera", ft, sensor).unwrap();
    let as_float = cx.operation(Opcode::Scale(255.0), &[input]).unwrap();

    let mut scheduler = cx.build().unwrap();
    scheduler.reset().unwrap();
    scheduler.step().unwrap();
    let output = scheduler.read(as_float).unwrap();
    assert_eq!(rounded(&output), vec![0.0, 51.0, 255.0, 51.0]);
}

fn rounded(values: &[f32]) -> Vec<f32> {
    values.iter().map(|v| v.round()).collect()
}
