//! Helpers shared by the runtime integration tests.

#![allow(dead_code)]

use conduit_core::elementwise::register_elementwise;
use conduit_core::{
    Attributes, Backend, DataLayout, HostStorage, KernelError, KernelRegistry, Tensor, TensorStorage,
};
use conduit_program::{Compiler, OpDesc, Program, ProgramDesc};
use conduit_runtime::{InterpreterConfig, InterpreterCore};
use indexmap::IndexMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Reference kernels plus test-only ops:
/// `count` copies its input and bumps `counter`, `fail` always errors,
/// `slow` copies after sleeping for the `ms` attribute, `boom` panics.
pub fn make_test_registry(counter: &Arc<AtomicUsize>) -> KernelRegistry {
    let mut registry = KernelRegistry::new();
    register_elementwise(&mut registry).unwrap();

    for backend in [Backend::Cpu, Backend::Gpu] {
        let seen = Arc::clone(counter);
        let count = move |inputs: &[&Tensor], _: &Attributes| -> Result<Vec<Tensor>, KernelError> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(vec![inputs[0].clone()])
        };
        registry
            .register_all_dtypes("count", backend, DataLayout::Any, Arc::new(count))
            .unwrap();

        let fail = |_: &[&Tensor], _: &Attributes| -> Result<Vec<Tensor>, KernelError> {
            Err(KernelError::Other("injected failure".to_string()))
        };
        registry
            .register_all_dtypes("fail", backend, DataLayout::Any, Arc::new(fail))
            .unwrap();

        let slow = |inputs: &[&Tensor], attrs: &Attributes| -> Result<Vec<Tensor>, KernelError> {
            let ms = attrs.get("ms").and_then(|v| v.as_f64()).unwrap_or(0.0);
            std::thread::sleep(Duration::from_millis(ms as u64));
            Ok(vec![inputs[0].clone()])
        };
        registry
            .register_all_dtypes("slow", backend, DataLayout::Any, Arc::new(slow))
            .unwrap();

        let boom = |_: &[&Tensor], _: &Attributes| -> Result<Vec<Tensor>, KernelError> {
            panic!("kernel exploded")
        };
        registry
            .register_all_dtypes("boom", backend, DataLayout::Any, Arc::new(boom))
            .unwrap();
    }
    registry
}

pub fn compile(desc: &ProgramDesc, registry: &KernelRegistry) -> Arc<Program> {
    Arc::new(Compiler::new().compile(desc, registry).unwrap().program)
}

pub fn make_core(
    program: &Arc<Program>,
    config: InterpreterConfig,
) -> (InterpreterCore, Arc<HostStorage>) {
    let storage = Arc::new(HostStorage::new());
    let shared: Arc<dyn TensorStorage> = storage.clone();
    let core = InterpreterCore::new(Arc::clone(program), shared, config).unwrap();
    (core, storage)
}

pub fn feeds_f32(values: &[(&str, f32)]) -> IndexMap<String, Tensor> {
    values
        .iter()
        .map(|(name, value)| ((*name).to_string(), Tensor::scalar(*value)))
        .collect()
}

pub fn feeds_i32(values: &[(&str, i32)]) -> IndexMap<String, Tensor> {
    values
        .iter()
        .map(|(name, value)| ((*name).to_string(), Tensor::scalar(*value)))
        .collect()
}

/// `C := A + B` on stream 0, `E := C * D` on stream 1
pub fn two_stream_desc() -> ProgramDesc {
    ProgramDesc::new("two_stream")
        .feed("A")
        .feed("B")
        .feed("D")
        .fetch("E")
        .op(OpDesc::new("add", &["A", "B"], &["C"]).on_stream(0, 0))
        .op(OpDesc::new("mul", &["C", "D"], &["E"]).on_stream(0, 1))
}

/// `B := 2A`, `C := A + A`, `D := B * C`, all on one device stream
pub fn diamond_desc() -> ProgramDesc {
    ProgramDesc::new("diamond")
        .feed("A")
        .fetch("D")
        .op(OpDesc::new("scale", &["A"], &["B"])
            .on_stream(0, 0)
            .with_attr("factor", conduit_core::AttrValue::Float(2.0)))
        .op(OpDesc::new("add", &["A", "A"], &["C"]).on_stream(0, 0))
        .op(OpDesc::new("mul", &["B", "C"], &["D"]).on_stream(0, 0))
}

pub fn fetch_f32(fetches: &IndexMap<String, Tensor>, name: &str) -> Vec<f32> {
    fetches[name].as_slice::<f32>().unwrap().to_vec()
}
