//! Benchmark: parse, resolve and emit C for a generated schema of N messages, plus
//! record construction through the reference runtime.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ipcmsgc::layout::{DataModel, ProtocolLayout};
use ipcmsgc::{compile, generate, load, new_record, HeapAllocator, SizeFieldMode, Value};

fn schema_source(messages: usize) -> String {
    let mut src = String::from("table (name, desc, shortname, data_fields, va_data) {\n");
    for i in 0..messages {
        let tail = if i % 2 == 0 { "_" } else { "(\"uint8_t\", \"payload\")" };
        src.push_str(&format!(
            "    (\"MSG_{i}\", \"message {i}\", \"m{i}\", [\"uint32_t id\", \"int64_t stamp\"], {tail}),\n"
        ));
    }
    src.push_str("}\n");
    src
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    for n in [2usize, 64, 512] {
        let src = schema_source(n);
        group.bench_with_input(BenchmarkId::new("compile", n), &src, |b, src| {
            b.iter(|| compile(black_box(src), "bench.schema", &[]).expect("compile"))
        });
        let (resolved, config) = load(&src, &[]).expect("load");
        group.bench_with_input(BenchmarkId::new("emit_only", n), &resolved, |b, resolved| {
            b.iter(|| generate(black_box(resolved), &config, "bench.schema").expect("generate"))
        });
    }
    group.finish();
}

fn bench_records(c: &mut Criterion) {
    let (resolved, _) = load(&schema_source(2), &[]).expect("load");
    let protocol = ProtocolLayout::compute(&resolved, DataModel::Lp64).expect("layout");
    let msg = protocol.get("MSG_1").expect("MSG_1");
    let fields = [Value::U32(7), Value::I64(-1)];
    let tail: Vec<Value> = (0..256u32).map(|i| Value::U8(i as u8)).collect();
    c.bench_function("new_record_256", |b| {
        b.iter(|| {
            new_record(&HeapAllocator, &protocol, msg, black_box(&fields), black_box(&tail), SizeFieldMode::Bytes)
                .expect("record")
        })
    });
}

criterion_group!(benches, bench_generate, bench_records);
criterion_main!(benches);
