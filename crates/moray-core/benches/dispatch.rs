use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use moray_core::{
    ClassDescriptor, ClassSlot, Invocation, OffsetSlot, Runtime, RuntimeOptions, RuntimeResult,
    SandboxHost, Value, OBJ_HEADER_SIZE,
};
use std::sync::Arc;

fn answer(_inv: &Invocation<'_>) -> RuntimeResult<Value> {
    Ok(Value::Int(42))
}

fn answer_via_host(inv: &Invocation<'_>) -> RuntimeResult<Value> {
    inv.call_host("Answer")
}

fn bench_registry_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_fetch");

    for classes in [16usize, 256, 4096] {
        let runtime = Runtime::with_options(
            Arc::new(SandboxHost::new()),
            RuntimeOptions::with_registry_buckets(256),
        );
        let descriptors: Vec<_> = (0..classes)
            .map(|i| {
                ClassDescriptor::new(format!("Bench::Class{}", i), &ClassSlot::new())
                    .with_ivars_size(OBJ_HEADER_SIZE)
            })
            .collect();
        runtime.bootstrap(&descriptors);
        let target = format!("Bench::Class{}", classes / 2);

        group.bench_with_input(BenchmarkId::new("hit", classes), &target, |b, name| {
            b.iter(|| runtime.fetch_class(black_box(name)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("miss", classes), &"Bench::Nope", |b, name| {
            b.iter(|| runtime.fetch_class(black_box(name)))
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let host = Arc::new(SandboxHost::new());
    host.declare_class("Bench::HostAnswer", "Bench::Answer");
    host.override_method("Bench::HostAnswer", "Answer", |_, _| Ok(Value::Int(43)));
    let runtime = Runtime::new(host);

    let (class, offset) = (ClassSlot::new(), OffsetSlot::new());
    runtime.bootstrap(&[ClassDescriptor::new("Bench::Answer", &class)
        .with_ivars_size(OBJ_HEADER_SIZE)
        .novel_method_with_callback("Answer", answer, answer_via_host, &offset)]);
    let offset = offset.get().unwrap();
    let native = runtime.make_obj(&class.get().unwrap());
    let hosted = runtime.make_obj(&runtime.singleton("Bench::HostAnswer", None).unwrap());

    c.bench_function("invoke_native_slot", |b| {
        b.iter(|| native.invoke(&runtime, black_box(offset), &[]).unwrap())
    });
    c.bench_function("invoke_by_name", |b| {
        b.iter(|| native.invoke_by_name(&runtime, black_box("Answer"), &[]).unwrap())
    });
    c.bench_function("invoke_host_override", |b| {
        b.iter(|| hosted.invoke(&runtime, black_box(offset), &[]).unwrap())
    });
}

fn bench_refcount(c: &mut Criterion) {
    let runtime = Runtime::with_options(Arc::new(SandboxHost::new()), RuntimeOptions::default());
    let class = ClassSlot::new();
    runtime.bootstrap(&[ClassDescriptor::new("Bench::Counted", &class).with_ivars_size(OBJ_HEADER_SIZE)]);
    let native = runtime.make_obj(&class.get().unwrap());
    let delegated = runtime.make_obj(&class.get().unwrap());
    runtime.to_host(&delegated).unwrap();

    c.bench_function("retain_release_native", |b| {
        b.iter(|| {
            runtime.retain(black_box(&native));
            runtime.release(black_box(&native))
        })
    });
    c.bench_function("retain_release_delegated", |b| {
        b.iter(|| {
            runtime.retain(black_box(&delegated));
            runtime.release(black_box(&delegated))
        })
    });
}

criterion_group!(benches, bench_registry_fetch, bench_dispatch, bench_refcount);
criterion_main!(benches);
