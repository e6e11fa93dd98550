//! Instructions and variable metadata.

use conduit_core::{Attributes, DeviceContext, InstrId, Kernel, KernelKey, VarId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of scheduled work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrKind {
    /// Ordinary kernel
    #[default]
    Computation,
    /// Collective or transfer; scheduled on the device's communication stream
    Communication,
    /// Pure ordering point
    Synchronization,
}

impl fmt::Display for InstrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Computation => f.write_str("computation"),
            Self::Communication => f.write_str("communication"),
            Self::Synchronization => f.write_str("synchronization"),
        }
    }
}

/// Static facts about one variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarInfo {
    /// Variable id
    pub id: VarId,
    /// Variable name
    pub name: String,
    /// Supplied by the caller
    pub is_feed: bool,
    /// Returned to the caller
    pub is_fetch: bool,
    /// Never collected
    pub persistable: bool,
    /// Number of distinct instructions that read the variable
    pub readers: u32,
}

impl VarInfo {
    /// Whether the collector may release this variable
    #[must_use]
    pub const fn collectable(&self) -> bool {
        !self.is_fetch && !self.persistable
    }
}

/// One scheduled kernel invocation.
///
/// Immutable once the program is built. Per-run state (unmet dependency
/// counters, variable contents) lives in the runtime.
#[derive(Clone)]
pub struct Instruction {
    /// Position in the program
    pub id: InstrId,
    /// Operator name
    pub op: String,
    /// Key the kernel was resolved with
    pub kernel_key: KernelKey,
    /// Resolved kernel
    pub kernel: Arc<dyn Kernel>,
    /// Inputs, in kernel argument order
    pub inputs: Vec<VarId>,
    /// Outputs, in kernel result order
    pub outputs: Vec<VarId>,
    /// Where the instruction runs
    pub device: Arc<dyn DeviceContext>,
    /// Kind
    pub kind: InstrKind,
    /// Operator attributes
    pub attrs: Attributes,
}

impl Instruction {
    /// Inputs with duplicates removed, first occurrence order
    #[must_use]
    pub fn distinct_inputs(&self) -> Vec<VarId> {
        let mut seen = Vec::with_capacity(self.inputs.len());
        for var in &self.inputs {
            if !seen.contains(var) {
                seen.push(*var);
            }
        }
        seen
    }

    /// Whether the instruction reads `var`
    #[must_use]
    pub fn reads(&self, var: VarId) -> bool {
        self.inputs.contains(&var)
    }

    /// Whether the instruction writes `var`
    #[must_use]
    pub fn writes(&self, var: VarId) -> bool {
        self.outputs.contains(&var)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("id", &self.id)
            .field("op", &self.op)
            .field("kernel_key", &self.kernel_key)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("device", &self.device)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.op)
    }
}
