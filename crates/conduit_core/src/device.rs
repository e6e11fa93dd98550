//! Device contexts.
//!
//! Every instruction carries a device context. The scheduler never looks at
//! the concrete type; it only asks where the work runs and on which compute
//! stream, so host and accelerator backends are treated uniformly.

use crate::dtype::{Backend, Place};
use std::fmt;
use std::sync::Arc;

/// Capability queries for the place an instruction runs on.
pub trait DeviceContext: Send + Sync + fmt::Debug {
    /// Where the instruction's outputs live
    fn place(&self) -> Place;

    /// Compute stream ordinal on the device, `None` for host execution
    fn stream(&self) -> Option<u32>;

    /// Backend used for kernel lookup
    fn backend(&self) -> Backend {
        self.place().backend()
    }

    /// Whether work on this context runs asynchronously to the host
    fn is_async(&self) -> bool {
        self.stream().is_some()
    }
}

/// Host execution context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuContext;

impl CpuContext {
    /// Shared handle
    #[must_use]
    pub fn shared() -> Arc<dyn DeviceContext> {
        Arc::new(Self)
    }
}

impl DeviceContext for CpuContext {
    fn place(&self) -> Place {
        Place::Cpu
    }

    fn stream(&self) -> Option<u32> {
        None
    }
}

/// A compute stream on an accelerator device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamContext {
    device: u32,
    stream: u32,
}

impl StreamContext {
    /// Create a context for `stream` on `device`
    #[must_use]
    pub const fn new(device: u32, stream: u32) -> Self {
        Self { device, stream }
    }

    /// Shared handle
    #[must_use]
    pub fn shared(device: u32, stream: u32) -> Arc<dyn DeviceContext> {
        Arc::new(Self::new(device, stream))
    }

    /// Device ordinal
    #[must_use]
    pub const fn device(&self) -> u32 {
        self.device
    }
}

impl DeviceContext for StreamContext {
    fn place(&self) -> Place {
        Place::Device(self.device)
    }

    fn stream(&self) -> Option<u32> {
        Some(self.stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_context() {
        let ctx = CpuContext;
        assert_eq!(ctx.place(), Place::Cpu);
        assert_eq!(ctx.stream(), None);
        assert_eq!(ctx.backend(), Backend::Cpu);
        assert!(!ctx.is_async());
    }

    #[test]
    fn test_stream_context() {
        let ctx = StreamContext::new(1, 2);
        assert_eq!(ctx.place(), Place::Device(1));
        assert_eq!(ctx.stream(), Some(2));
        assert_eq!(ctx.backend(), Backend::Gpu);
        assert!(ctx.is_async());
    }

    #[test]
    fn test_shared_is_trait_object() {
        let contexts: Vec<Arc<dyn DeviceContext>> =
            vec![CpuContext::shared(), StreamContext::shared(0, 1)];
        assert_eq!(contexts[1].stream(), Some(1));
    }
}
