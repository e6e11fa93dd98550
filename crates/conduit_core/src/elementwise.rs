//! Reference elementwise kernels.
//!
//! A small set of binary functors (add, sub, mul, div, floor_div, max, min)
//! plus `scale` and `assign`, registered for every dtype on both backends with
//! a layout-agnostic key. They exist so programs can be built and run without
//! an external kernel library; the scheduler does not depend on them.

use crate::dtype::{Backend, DataLayout};
use crate::error::{CoreResult, KernelError};
use crate::kernel::{Attributes, Kernel, KernelRegistry};
use crate::tensor::{Element, Tensor, TensorData};
use std::sync::Arc;

const DIV_ERROR_INFO: &str =
    "integer division by zero encountered in (floor) divide, please check the input value";

/// Arithmetic the binary functors need, with wrapping integer semantics.
trait Numeric: Element + PartialOrd {
    const INTEGRAL: bool;

    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> Self;
    fn trunc(self) -> Self;
    fn is_zero(self) -> bool;
    fn scale(self, factor: f64) -> Self;
}

macro_rules! integral {
    ($ty:ty) => {
        impl Numeric for $ty {
            const INTEGRAL: bool = true;

            fn add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }
            fn sub(self, rhs: Self) -> Self {
                self.wrapping_sub(rhs)
            }
            fn mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }
            fn div(self, rhs: Self) -> Self {
                self.wrapping_div(rhs)
            }
            fn trunc(self) -> Self {
                self
            }
            fn is_zero(self) -> bool {
                self == 0
            }
            fn scale(self, factor: f64) -> Self {
                (self as f64 * factor) as $ty
            }
        }
    };
}

macro_rules! floating {
    ($ty:ty) => {
        impl Numeric for $ty {
            const INTEGRAL: bool = false;

            fn add(self, rhs: Self) -> Self {
                self + rhs
            }
            fn sub(self, rhs: Self) -> Self {
                self - rhs
            }
            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }
            fn div(self, rhs: Self) -> Self {
                self / rhs
            }
            fn trunc(self) -> Self {
                <$ty>::trunc(self)
            }
            fn is_zero(self) -> bool {
                self == 0.0
            }
            fn scale(self, factor: f64) -> Self {
                self * factor as $ty
            }
        }
    };
}

integral!(i32);
integral!(i64);
floating!(f32);
floating!(f64);

/// Binary elementwise functor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`, integer division by zero is an error
    Div,
    /// `trunc(a / b)`, division by zero is an error for every dtype
    FloorDiv,
    /// `max(a, b)`
    Max,
    /// `min(a, b)`
    Min,
}

impl BinaryOp {
    /// Every functor
    pub const ALL: [BinaryOp; 7] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::FloorDiv,
        BinaryOp::Max,
        BinaryOp::Min,
    ];

    /// Operator name used in the dispatch table
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::FloorDiv => "floor_div",
            Self::Max => "max",
            Self::Min => "min",
        }
    }

    fn apply<T: Numeric>(self, a: T, b: T) -> Result<T, KernelError> {
        match self {
            Self::Add => Ok(a.add(b)),
            Self::Sub => Ok(a.sub(b)),
            Self::Mul => Ok(a.mul(b)),
            Self::Div => {
                if T::INTEGRAL && b.is_zero() {
                    return Err(KernelError::InvalidArgument(DIV_ERROR_INFO.to_string()));
                }
                Ok(a.div(b))
            }
            Self::FloorDiv => {
                if b.is_zero() {
                    return Err(KernelError::InvalidArgument(DIV_ERROR_INFO.to_string()));
                }
                Ok(a.div(b).trunc())
            }
            Self::Max => Ok(if a > b { a } else { b }),
            Self::Min => Ok(if a < b { a } else { b }),
        }
    }
}

/// `len` is the element count of the output shape
fn zip_with<T: Numeric>(op: BinaryOp, len: usize, lhs: &[T], rhs: &[T]) -> Result<Vec<T>, KernelError> {
    let pick = |values: &[T], i: usize| if values.len() == 1 { values[0] } else { values[i] };
    (0..len).map(|i| op.apply(pick(lhs, i), pick(rhs, i))).collect()
}

/// Output shape of a binary op: equal shapes, or one side a single element.
///
/// The result never depends on argument order: the side that is not a
/// single element wins (an empty side included), and between two single
/// elements the higher rank wins (`[1]` against a scalar gives `[1]`).
fn broadcast_shape(lhs: &Tensor, rhs: &Tensor) -> Result<Vec<usize>, KernelError> {
    if lhs.shape() == rhs.shape() {
        return Ok(lhs.shape().to_vec());
    }
    if lhs.numel() != 1 && rhs.numel() != 1 {
        return Err(KernelError::ShapeMismatch {
            left: lhs.shape().to_vec(),
            right: rhs.shape().to_vec(),
        });
    }
    let keep_lhs = match (lhs.numel() == 1, rhs.numel() == 1) {
        (true, true) => lhs.shape().len() >= rhs.shape().len(),
        (lhs_single, _) => !lhs_single,
    };
    Ok(if keep_lhs { lhs.shape() } else { rhs.shape() }.to_vec())
}

/// Binary kernel with scalar broadcasting
#[derive(Debug, Clone, Copy)]
pub struct BinaryKernel(pub BinaryOp);

impl Kernel for BinaryKernel {
    fn launch(&self, inputs: &[&Tensor], _attrs: &Attributes) -> Result<Vec<Tensor>, KernelError> {
        let [lhs, rhs] = inputs else {
            return Err(KernelError::Arity {
                expected: 2,
                got: inputs.len(),
            });
        };
        if lhs.dtype() != rhs.dtype() {
            return Err(KernelError::DTypeMismatch {
                left: lhs.dtype(),
                right: rhs.dtype(),
            });
        }

        let shape = broadcast_shape(lhs, rhs)?;
        let len = shape.iter().product();

        let op = self.0;
        let data = match (lhs.data(), rhs.data()) {
            (TensorData::I32(a), TensorData::I32(b)) => TensorData::I32(zip_with(op, len, a, b)?),
            (TensorData::I64(a), TensorData::I64(b)) => TensorData::I64(zip_with(op, len, a, b)?),
            (TensorData::F32(a), TensorData::F32(b)) => TensorData::F32(zip_with(op, len, a, b)?),
            (TensorData::F64(a), TensorData::F64(b)) => TensorData::F64(zip_with(op, len, a, b)?),
            _ => {
                return Err(KernelError::Unsupported(format!(
                    "{} on {}",
                    op.name(),
                    lhs.dtype()
                )));
            }
        };
        let out = Tensor::new(shape, data).map_err(|e| KernelError::Other(e.to_string()))?;
        Ok(vec![out])
    }
}

fn scale_all<T: Numeric>(values: &[T], factor: f64) -> Vec<T> {
    values.iter().map(|v| v.scale(factor)).collect()
}

/// Multiply every element by the `factor` attribute
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleKernel;

impl Kernel for ScaleKernel {
    fn launch(&self, inputs: &[&Tensor], attrs: &Attributes) -> Result<Vec<Tensor>, KernelError> {
        let [input] = inputs else {
            return Err(KernelError::Arity {
                expected: 1,
                got: inputs.len(),
            });
        };
        let factor = attrs
            .get("factor")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| KernelError::InvalidArgument("scale requires a numeric `factor`".to_string()))?;

        let data = match input.data() {
            TensorData::I32(v) => TensorData::I32(scale_all(v, factor)),
            TensorData::I64(v) => TensorData::I64(scale_all(v, factor)),
            TensorData::F32(v) => TensorData::F32(scale_all(v, factor)),
            TensorData::F64(v) => TensorData::F64(scale_all(v, factor)),
            TensorData::Bool(_) => return Err(KernelError::Unsupported("scale on bool".to_string())),
        };
        let out = Tensor::new(input.shape().to_vec(), data)
            .map_err(|e| KernelError::Other(e.to_string()))?;
        Ok(vec![out])
    }
}

/// Copy the single input to the single output
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignKernel;

impl Kernel for AssignKernel {
    fn launch(&self, inputs: &[&Tensor], _attrs: &Attributes) -> Result<Vec<Tensor>, KernelError> {
        match inputs {
            [input] => Ok(vec![(*input).clone()]),
            _ => Err(KernelError::Arity {
                expected: 1,
                got: inputs.len(),
            }),
        }
    }
}

/// Register the reference kernels into `registry`
///
/// # Errors
///
/// Returns error if any of the names is already registered
pub fn register_elementwise(registry: &mut KernelRegistry) -> CoreResult<()> {
    for backend in [Backend::Cpu, Backend::Gpu] {
        for op in BinaryOp::ALL {
            registry.register_all_dtypes(op.name(), backend, DataLayout::Any, Arc::new(BinaryKernel(op)))?;
        }
        registry.register_all_dtypes("scale", backend, DataLayout::Any, Arc::new(ScaleKernel))?;
        registry.register_all_dtypes("assign", backend, DataLayout::Any, Arc::new(AssignKernel))?;
    }
    Ok(())
}

/// A fresh dispatch table holding only the reference kernels
///
/// # Errors
///
/// Never fails on a fresh table; the `Result` mirrors [`register_elementwise`]
pub fn reference_registry() -> CoreResult<KernelRegistry> {
    let mut registry = KernelRegistry::new();
    register_elementwise(&mut registry)?;
    Ok(registry)
}
