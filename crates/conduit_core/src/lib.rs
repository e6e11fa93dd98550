//! CONDUIT Core Types
//!
//! Pure types shared by the compiler and the runtime: identifiers, tensors,
//! device contexts, the kernel dispatch table and the storage collaborator.
//! Nothing in this crate schedules work.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod dtype;
pub mod elementwise;
pub mod error;
pub mod id;
pub mod kernel;
pub mod storage;
pub mod tensor;

// Re-exports
pub use device::{CpuContext, DeviceContext, StreamContext};
pub use dtype::{Backend, DataLayout, DataType, Place};
pub use error::{CoreError, CoreResult, KernelError};
pub use id::{EventId, InstrId, RunId, StreamId, VarId};
pub use kernel::{AttrValue, Attributes, Kernel, KernelKey, KernelRegistry};
pub use storage::{HostStorage, StorageHandle, StorageStats, TensorStorage};
pub use tensor::{Tensor, TensorData};
