use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pprof::criterion::Output;
use std::sync::Arc;

use bytepack::{
    array, bit, bits, field, Endianness, SchemaBuilder, StructLayout, Value, ValueType,
};

/// Builds the telemetry frame layout used by the throughput benchmarks.
fn frame_layout() -> Arc<StructLayout> {
    let mut builder = SchemaBuilder::new();
    let point = builder
        .define(
            "point",
            Endianness::Little,
            vec![field("x", ValueType::F64), field("y", ValueType::F64)],
        )
        .unwrap();
    builder
        .define(
            "frame",
            Endianness::Little,
            vec![
                field("stamp", ValueType::U32),
                field("pose", &point),
                field("trail", array(4, &point)),
                field("battery", ValueType::F32),
                field("enabled", bit()),
                field("mode", bits(ValueType::U8, 3)),
                field("fault", bits(ValueType::I16, 12)),
            ],
        )
        .unwrap()
}

fn point_value(x: f64, y: f64) -> Value {
    Value::record([("x", Value::F64(x)), ("y", Value::F64(y))])
}

fn frame_value(i: usize) -> Value {
    let base = i as f64;
    Value::record([
        ("stamp", Value::U32(i as u32 * 20)),
        ("pose", point_value(base * 1.5, base * -0.5)),
        (
            "trail",
            Value::Array(
                (0..4)
                    .map(|k| point_value(base + k as f64, base - k as f64))
                    .collect(),
            ),
        ),
        ("battery", Value::F32(12.6 - (i % 100) as f32 * 0.01)),
        ("enabled", Value::Bool(i % 7 != 0)),
        ("mode", Value::U8((i % 8) as u8)),
        ("fault", Value::I16((i % 4000) as i16 - 2000)),
    ])
}

fn benchmark_encode_frames(c: &mut Criterion) {
    let layout = frame_layout();
    let size = layout.size();
    let values: Vec<Value> = (0..1_000).map(frame_value).collect();
    let mut buf = vec![0u8; size * values.len()];

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes((size * values.len()) as u64));

    group.bench_function(BenchmarkId::new("1k_frames", size), |b| {
        b.iter(|| {
            for (i, value) in values.iter().enumerate() {
                layout.encode(black_box(value), &mut buf, i * size);
            }
            black_box(&buf);
        });
    });

    group.finish();
}

fn benchmark_decode_frames(c: &mut Criterion) {
    let layout = frame_layout();
    let size = layout.size();
    let values: Vec<Value> = (0..1_000).map(frame_value).collect();
    let mut buf = vec![0u8; size * values.len()];
    for (i, value) in values.iter().enumerate() {
        layout.encode(value, &mut buf, i * size);
    }

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(buf.len() as u64));

    group.bench_function(BenchmarkId::new("1k_frames", size), |b| {
        b.iter(|| {
            for i in 0..values.len() {
                black_box(layout.decode(black_box(&buf), i * size));
            }
        });
    });

    group.finish();
}

fn benchmark_bit_packed(c: &mut Criterion) {
    let mut builder = SchemaBuilder::new();
    let layout = builder
        .define(
            "packed",
            Endianness::Little,
            vec![
                field("a", bits(ValueType::U8, 4)),
                field("b", bits(ValueType::U16, 10)),
                field("c", bits(ValueType::U32, 20)),
                field("d", bits(ValueType::I32, 30)),
                field("e", bits(ValueType::U8, 4)),
                field("f", bit()),
                field("g", bits(ValueType::I8, 3)),
            ],
        )
        .unwrap();
    let value = Value::record([
        ("a", Value::U8(15)),
        ("b", Value::U16(1023)),
        ("c", Value::U32(1_048_575)),
        ("d", Value::I32(-100_050)),
        ("e", Value::U8(7)),
        ("f", Value::Bool(true)),
        ("g", Value::I8(-4)),
    ]);
    let mut buf = vec![0u8; layout.size()];

    let mut group = c.benchmark_group("bit_packed");
    group.throughput(Throughput::Bytes(layout.size() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| {
            layout.encode(black_box(&value), &mut buf, 0);
            black_box(&buf);
        });
    });
    group.bench_function("decode", |b| {
        b.iter(|| {
            black_box(layout.decode(black_box(&buf), 0));
        });
    });

    group.finish();
}

fn benchmark_define(c: &mut Criterion) {
    c.bench_function("define_frame_schema", |b| {
        b.iter(|| {
            black_box(frame_layout());
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(pprof::criterion::PProfProfiler::new(100, Output::Flamegraph(None)));
    targets =
        benchmark_encode_frames,
        benchmark_decode_frames,
        benchmark_bit_packed,
        benchmark_define
}
criterion_main!(benches);
