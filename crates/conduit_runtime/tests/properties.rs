//! Random programs must agree with sequential evaluation.

mod common;

use common::*;
use conduit_core::{DataType, Tensor, TensorStorage};
use conduit_program::{InstrKind, OpDesc, ProgramDesc};
use conduit_runtime::InterpreterConfig;
use indexmap::IndexMap;
use proptest::prelude::*;
use proptest::sample::Index;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

const OPS: [&str; 5] = ["add", "sub", "mul", "max", "min"];

#[derive(Debug, Clone)]
struct RandomOp {
    kind: usize,
    lhs: Index,
    rhs: Index,
    place: usize,
    reuse: Option<Index>,
}

fn arb_op() -> impl Strategy<Value = RandomOp> {
    (0usize..OPS.len(), any::<Index>(), any::<Index>(), 0usize..4, proptest::option::of(any::<Index>()))
        .prop_map(|(kind, lhs, rhs, place, reuse)| RandomOp {
            kind,
            lhs,
            rhs,
            place,
            reuse,
        })
}

fn apply(kind: usize, a: i64, b: i64) -> i64 {
    match kind {
        0 => a.wrapping_add(b),
        1 => a.wrapping_sub(b),
        2 => a.wrapping_mul(b),
        3 => a.max(b),
        _ => a.min(b),
    }
}

fn place(op: OpDesc, place: usize) -> OpDesc {
    match place {
        0 => op,
        1 => op.on_stream(0, 0),
        2 => op.on_stream(0, 1),
        _ => op.on_stream(0, 0).with_kind(InstrKind::Communication),
    }
}

/// Build a program from `ops` and evaluate it in program order
fn build(feeds: &[i64], ops: &[RandomOp]) -> (ProgramDesc, IndexMap<String, Tensor>, IndexMap<String, i64>) {
    let mut desc = ProgramDesc::new("random");
    let mut env: IndexMap<String, i64> = IndexMap::new();
    let mut names = Vec::new();
    let mut intermediates: Vec<String> = Vec::new();
    let mut inputs = IndexMap::new();

    for (i, value) in feeds.iter().enumerate() {
        let name = format!("f{}", i);
        desc = desc.feed(&name);
        env.insert(name.clone(), *value);
        inputs.insert(name.clone(), Tensor::scalar(*value));
        names.push(name);
    }

    let mut last = String::new();
    for (i, op) in ops.iter().enumerate() {
        let lhs = op.lhs.get(&names).clone();
        let rhs = op.rhs.get(&names).clone();
        let out = match &op.reuse {
            Some(ix) if !intermediates.is_empty() => ix.get(&intermediates).clone(),
            _ => {
                let name = format!("t{}", i);
                intermediates.push(name.clone());
                names.push(name.clone());
                name
            }
        };
        let value = apply(op.kind, env[&lhs], env[&rhs]);
        env.insert(out.clone(), value);
        let instr = OpDesc::new(OPS[op.kind], &[lhs.as_str(), rhs.as_str()], &[out.as_str()])
            .with_dtype(DataType::I64);
        desc = desc.op(place(instr, op.place));
        last = out;
    }

    let mut expected = IndexMap::new();
    for name in [&last, &intermediates[0]] {
        if !expected.contains_key(name) {
            desc = desc.fetch(name);
            expected.insert(name.clone(), env[name]);
        }
    }
    (desc, inputs, expected)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_runs_match_sequential_evaluation(
        feeds in proptest::collection::vec(-100i64..100, 1..4),
        ops in proptest::collection::vec(arb_op(), 1..20),
    ) {
        let (desc, inputs, expected) = build(&feeds, &ops);
        let registry = make_test_registry(&Arc::new(AtomicUsize::new(0)));
        let program = compile(&desc, &registry);

        for threads in [1, 4] {
            let (core, storage) = make_core(&program, InterpreterConfig::new().with_threads(threads));
            for _ in 0..2 {
                let fetches = core.run(inputs.clone()).unwrap();
                for (name, value) in &expected {
                    prop_assert_eq!(fetches[name].as_slice::<i64>(), Some(&[*value][..]));
                }
                prop_assert_eq!(storage.stats().live_handles, expected.len() as u64);
            }
            drop(core);
            prop_assert_eq!(storage.stats().live_handles, 0);
        }
    }
}
