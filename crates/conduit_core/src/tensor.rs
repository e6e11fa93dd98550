//! Dense host tensors.
//!
//! A tensor is an immutable value: kernels read their inputs by reference and
//! return freshly built outputs. Device placement is tracked by the variable
//! that holds the tensor, not by the tensor itself.

use crate::dtype::DataType;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Typed element buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorData {
    /// Boolean elements
    Bool(Vec<bool>),
    /// i32 elements
    I32(Vec<i32>),
    /// i64 elements
    I64(Vec<i64>),
    /// f32 elements
    F32(Vec<f32>),
    /// f64 elements
    F64(Vec<f64>),
}

impl TensorData {
    /// Element dtype
    #[must_use]
    pub const fn dtype(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::I32(_) => DataType::I32,
            Self::I64(_) => DataType::I64,
            Self::F32(_) => DataType::F32,
            Self::F64(_) => DataType::F64,
        }
    }

    /// Number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rust types that can be stored in a tensor.
pub trait Element: Copy + Send + Sync + 'static {
    /// Matching runtime dtype
    const DTYPE: DataType;

    /// Wrap a vector into tensor data
    fn wrap(values: Vec<Self>) -> TensorData;

    /// Borrow the elements if the dtype matches
    fn view(data: &TensorData) -> Option<&[Self]>;
}

macro_rules! element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DataType = DataType::$variant;

            fn wrap(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }

            fn view(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

element!(bool, Bool);
element!(i32, I32);
element!(i64, I64);
element!(f32, F32);
element!(f64, F64);

/// A dense tensor with a shape and typed elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

/// Unchecked wire form; deserialization goes through [`Tensor::new`]
#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = CoreError;

    fn try_from(raw: RawTensor) -> CoreResult<Self> {
        Self::new(raw.shape, raw.data)
    }
}

impl Tensor {
    /// Create a tensor, checking that the element count matches the shape
    ///
    /// # Errors
    ///
    /// Returns error if `data` does not hold `shape.iter().product()` elements,
    /// or if that product overflows
    pub fn new(shape: Vec<usize>, data: TensorData) -> CoreResult<Self> {
        let Some(expected) = shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim)) else {
            return Err(CoreError::Validation {
                field: "shape".to_string(),
                reason: format!("element count of {:?} overflows usize", shape),
            });
        };
        if expected != data.len() {
            return Err(CoreError::ElementCount {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Create a tensor from typed values
    ///
    /// # Errors
    ///
    /// Returns error if the element count does not match the shape
    pub fn from_vec<T: Element>(shape: Vec<usize>, values: Vec<T>) -> CoreResult<Self> {
        Self::new(shape, T::wrap(values))
    }

    /// Create a rank-0 tensor holding one value
    #[must_use]
    pub fn scalar<T: Element>(value: T) -> Self {
        Self {
            shape: Vec::new(),
            data: T::wrap(vec![value]),
        }
    }

    /// Shape
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element buffer
    #[must_use]
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Element dtype
    #[must_use]
    pub const fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    /// Number of elements
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Storage footprint in bytes
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        (self.numel() * self.dtype().size_in_bytes()) as u64
    }

    /// Borrow elements as `T`, or `None` if the dtype differs
    #[must_use]
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::view(&self.data)
    }

    /// Compare shapes and raw element bits, treating NaNs with equal payloads as equal
    #[must_use]
    pub fn bit_eq(&self, other: &Self) -> bool {
        if self.shape != other.shape {
            return false;
        }
        match (&self.data, &other.data) {
            (TensorData::F32(a), TensorData::F32(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (TensorData::F64(a), TensorData::F64(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (a, b) => a == b,
        }
    }
}
