//! Kernel dispatch table.
//!
//! Kernels are looked up by operator name and a [`KernelKey`]. The table is an
//! ordinary value built once and handed to the compiler; there is no
//! process-wide registry. Lookups happen at compile time only, the runtime
//! holds the resolved `Arc<dyn Kernel>`.

use crate::dtype::{Backend, DataLayout, DataType};
use crate::error::{CoreError, CoreResult, KernelError};
use crate::tensor::Tensor;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Attribute value attached to an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean flag
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Str(String),
}

impl AttrValue {
    /// Numeric view of the value
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Operator attributes, in declaration order
pub type Attributes = IndexMap<String, AttrValue>;

/// Backend, layout and dtype a kernel was registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KernelKey {
    /// Backend
    pub backend: Backend,
    /// Layout
    pub layout: DataLayout,
    /// Element dtype
    pub dtype: DataType,
}

impl KernelKey {
    /// Create a key
    #[must_use]
    pub const fn new(backend: Backend, layout: DataLayout, dtype: DataType) -> Self {
        Self {
            backend,
            layout,
            dtype,
        }
    }

    /// Same key with a layout-agnostic layout
    #[must_use]
    pub const fn any_layout(self) -> Self {
        Self {
            layout: DataLayout::Any,
            ..self
        }
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.backend, self.layout, self.dtype)
    }
}

/// A callable kernel.
///
/// Kernels must be pure with respect to their inputs: the same inputs and
/// attributes always produce bit-identical outputs.
pub trait Kernel: Send + Sync {
    /// Run the kernel
    ///
    /// # Errors
    ///
    /// Returns the kernel's own failure
    fn launch(&self, inputs: &[&Tensor], attrs: &Attributes) -> Result<Vec<Tensor>, KernelError>;
}

impl<F> Kernel for F
where
    F: Fn(&[&Tensor], &Attributes) -> Result<Vec<Tensor>, KernelError> + Send + Sync,
{
    fn launch(&self, inputs: &[&Tensor], attrs: &Attributes) -> Result<Vec<Tensor>, KernelError> {
        self(inputs, attrs)
    }
}

/// Dispatch table: operator name -> key -> kernel
#[derive(Clone, Default)]
pub struct KernelRegistry {
    kernels: IndexMap<String, IndexMap<KernelKey, Arc<dyn Kernel>>>,
}

impl KernelRegistry {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kernel for one key
    ///
    /// # Errors
    ///
    /// Returns error if the key is already registered for `op`
    pub fn register(
        &mut self,
        op: impl Into<String>,
        key: KernelKey,
        kernel: Arc<dyn Kernel>,
    ) -> CoreResult<()> {
        let op = op.into();
        let entries = self.kernels.entry(op.clone()).or_default();
        if entries.contains_key(&key) {
            return Err(CoreError::KernelAlreadyRegistered {
                op,
                backend: key.backend,
                layout: key.layout,
                dtype: key.dtype,
            });
        }
        entries.insert(key, kernel);
        Ok(())
    }

    /// Register one kernel under every dtype for a backend and layout
    ///
    /// # Errors
    ///
    /// Returns error if any of the keys is already registered
    pub fn register_all_dtypes(
        &mut self,
        op: impl Into<String>,
        backend: Backend,
        layout: DataLayout,
        kernel: Arc<dyn Kernel>,
    ) -> CoreResult<()> {
        let op = op.into();
        for dtype in DataType::ALL {
            self.register(op.clone(), KernelKey::new(backend, layout, dtype), Arc::clone(&kernel))?;
        }
        Ok(())
    }

    /// Look up a kernel, falling back to the layout-agnostic registration
    ///
    /// # Errors
    ///
    /// Returns `KernelNotFound` if neither the exact key nor its `Any`-layout
    /// variant is registered
    pub fn lookup(
        &self,
        op: &str,
        backend: Backend,
        layout: DataLayout,
        dtype: DataType,
    ) -> CoreResult<Arc<dyn Kernel>> {
        let key = KernelKey::new(backend, layout, dtype);
        self.kernels
            .get(op)
            .and_then(|entries| entries.get(&key).or_else(|| entries.get(&key.any_layout())))
            .cloned()
            .ok_or_else(|| CoreError::KernelNotFound {
                op: op.to_string(),
                backend,
                layout,
                dtype,
            })
    }

    /// Whether any kernel is registered for `op`
    #[must_use]
    pub fn contains(&self, op: &str) -> bool {
        self.kernels.contains_key(op)
    }

    /// Registered operator names
    pub fn ops(&self) -> impl Iterator<Item = &str> {
        self.kernels.keys().map(String::as_str)
    }

    /// Total number of (op, key) entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.kernels.values().map(IndexMap::len).sum()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.kernels.iter().map(|(op, keys)| (op, keys.keys().collect::<Vec<_>>())))
            .finish()
    }
}
