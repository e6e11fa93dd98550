//! Core error types for CONDUIT.

use crate::dtype::{Backend, DataLayout, DataType};

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// No kernel registered for the requested key
    #[error("Kernel not found: {op} ({backend}, {layout}, {dtype})")]
    KernelNotFound {
        /// Operator name
        op: String,
        /// Requested backend
        backend: Backend,
        /// Requested layout
        layout: DataLayout,
        /// Requested dtype
        dtype: DataType,
    },

    /// Kernel registered twice for the same key
    #[error("Kernel already registered: {op} ({backend}, {layout}, {dtype})")]
    KernelAlreadyRegistered {
        /// Operator name
        op: String,
        /// Backend of the duplicate key
        backend: Backend,
        /// Layout of the duplicate key
        layout: DataLayout,
        /// Dtype of the duplicate key
        dtype: DataType,
    },

    /// Storage capacity exceeded
    #[error("Capacity exceeded: requested {requested} bytes, {available} available")]
    CapacityExceeded {
        /// Bytes requested
        requested: u64,
        /// Bytes still available
        available: u64,
    },

    /// Handle released twice or never allocated
    #[error("Invalid storage handle: {handle}")]
    InvalidHandle {
        /// Raw handle value
        handle: u64,
    },

    /// Element count does not match shape
    #[error("Element count mismatch: shape {shape:?} requires {expected} elements, got {got}")]
    ElementCount {
        /// Tensor shape
        shape: Vec<usize>,
        /// Elements implied by the shape
        expected: usize,
        /// Elements supplied
        got: usize,
    },

    /// Parse error
    #[error("Parse error: {message}")]
    ParseError {
        /// Error message
        message: String,
    },

    /// Validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Offending field
        field: String,
        /// Reason
        reason: String,
    },
}

/// Error reported by a kernel invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// Precondition on an input value failed
    #[error("InvalidArgumentError: {0}")]
    InvalidArgument(String),

    /// Input shapes cannot be combined
    #[error("shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        /// Left-hand shape
        left: Vec<usize>,
        /// Right-hand shape
        right: Vec<usize>,
    },

    /// Input dtypes differ
    #[error("dtype mismatch: {left} vs {right}")]
    DTypeMismatch {
        /// Left-hand dtype
        left: DataType,
        /// Right-hand dtype
        right: DataType,
    },

    /// Wrong number of inputs
    #[error("expected {expected} inputs, got {got}")]
    Arity {
        /// Expected input count
        expected: usize,
        /// Supplied input count
        got: usize,
    },

    /// Operation not supported for this dtype
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Any other kernel failure
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::KernelNotFound {
            op: "add".to_string(),
            backend: Backend::Gpu,
            layout: DataLayout::Nchw,
            dtype: DataType::F32,
        };
        assert_eq!(format!("{}", err), "Kernel not found: add (gpu, nchw, f32)");

        let err = CoreError::InvalidHandle { handle: 7 };
        assert_eq!(format!("{}", err), "Invalid storage handle: 7");
    }

    #[test]
    fn test_kernel_error_display() {
        let err = KernelError::InvalidArgument("integer division by zero".to_string());
        assert!(format!("{}", err).starts_with("InvalidArgumentError"));

        let err = KernelError::ShapeMismatch {
            left: vec![2, 3],
            right: vec![4],
        };
        let s = format!("{}", err);
        assert!(s.contains("[2, 3]"));
        assert!(s.contains("[4]"));
    }

    #[test]
    fn test_json_error_conversion() {
        let err: CoreError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, CoreError::ParseError { .. }));
    }
}
