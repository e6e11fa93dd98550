use conduit_core::elementwise::reference_registry;
use conduit_core::{HostStorage, Tensor};
use conduit_program::{Compiler, OpDesc, ProgramDesc};
use conduit_runtime::{GcMode, InterpreterConfig, InterpreterCore};
use criterion::{Criterion, criterion_group, criterion_main};
use indexmap::IndexMap;
use std::hint::black_box;
use std::sync::Arc;

const LAYERS: usize = 64;
const WIDTH: usize = 256;

/// Alternating host and two device streams, each layer reading the previous two
fn layered_desc() -> ProgramDesc {
    let mut desc = ProgramDesc::new("layered").feed("x0").feed("x1");
    for i in 2..LAYERS + 2 {
        let op = OpDesc::new(
            if i % 2 == 0 { "add" } else { "mul" },
            &[format!("x{}", i - 1).as_str(), format!("x{}", i - 2).as_str()],
            &[format!("x{}", i).as_str()],
        );
        desc = desc.op(match i % 3 {
            0 => op,
            1 => op.on_stream(0, 0),
            _ => op.on_stream(0, 1),
        });
    }
    desc.fetch(&format!("x{}", LAYERS + 1))
}

fn feeds() -> IndexMap<String, Tensor> {
    let values: Vec<f32> = (0..WIDTH).map(|i| (i % 7) as f32 * 0.01 + 0.5).collect();
    ["x0", "x1"]
        .into_iter()
        .map(|name| (name.to_string(), Tensor::from_vec(vec![WIDTH], values.clone()).unwrap()))
        .collect()
}

fn run_benchmarks(c: &mut Criterion) {
    let registry = reference_registry().unwrap();
    let program = Arc::new(Compiler::new().compile(&layered_desc(), &registry).unwrap().program);
    let mut group = c.benchmark_group("interpreter_run");

    for (label, mode) in [("deferred_gc", GcMode::Deferred), ("inline_gc", GcMode::Inline)] {
        let config = InterpreterConfig::new().with_threads(4).with_gc_mode(mode);
        let core = InterpreterCore::new(Arc::clone(&program), Arc::new(HostStorage::new()), config).unwrap();
        group.bench_function(label, |b| b.iter(|| black_box(core.run(feeds()).unwrap())));
    }

    let single = InterpreterConfig::new().with_threads(1);
    let core = InterpreterCore::new(Arc::clone(&program), Arc::new(HostStorage::new()), single).unwrap();
    group.bench_function("single_host_thread", |b| b.iter(|| black_box(core.run(feeds()).unwrap())));

    group.finish();
}

criterion_group!(benches, run_benchmarks);
criterion_main!(benches);
