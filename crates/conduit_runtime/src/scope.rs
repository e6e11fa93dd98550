//! Variable slots for one interpreter.

use conduit_core::{StorageHandle, Tensor, VarId};
use parking_lot::RwLock;
use std::sync::Arc;

/// Current value of a variable and the storage backing it
#[derive(Debug, Clone)]
pub struct Value {
    /// Tensor contents
    pub tensor: Arc<Tensor>,
    /// Storage handle owned by the slot
    pub handle: StorageHandle,
}

/// One slot per program variable.
///
/// A slot owns its storage handle until the value is replaced or taken;
/// whoever removes a handle from a slot is responsible for releasing it.
#[derive(Debug)]
pub struct VariableScope {
    slots: Vec<RwLock<Option<Value>>>,
}

impl VariableScope {
    /// Create `len` empty slots
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| RwLock::new(None)).collect(),
        }
    }

    /// Tensor held by `var`
    #[must_use]
    pub fn read(&self, var: VarId) -> Option<Arc<Tensor>> {
        self.slots
            .get(var.index())
            .and_then(|slot| slot.read().as_ref().map(|v| Arc::clone(&v.tensor)))
    }

    /// Store a value; returns the handle it replaced
    pub fn write(&self, var: VarId, tensor: Tensor, handle: StorageHandle) -> Option<StorageHandle> {
        let slot = self.slots.get(var.index())?;
        let previous = slot.write().replace(Value {
            tensor: Arc::new(tensor),
            handle,
        });
        previous.map(|v| v.handle)
    }

    /// Empty a slot; returns the handle it held
    pub fn take(&self, var: VarId) -> Option<StorageHandle> {
        self.slots
            .get(var.index())
            .and_then(|slot| slot.write().take())
            .map(|v| v.handle)
    }

    /// Whether `var` holds a value
    #[must_use]
    pub fn is_set(&self, var: VarId) -> bool {
        self.slots.get(var.index()).is_some_and(|slot| slot.read().is_some())
    }

    /// Empty every slot for which `evict` is true; returns the handles
    pub fn drain(&self, mut evict: impl FnMut(VarId) -> bool) -> Vec<(VarId, StorageHandle)> {
        let mut handles = Vec::new();
        for (i, slot) in self.slots.iter().enumerate() {
            let var = VarId::from_index(i);
            if !evict(var) {
                continue;
            }
            if let Some(value) = slot.write().take() {
                handles.push((var, value.handle));
            }
        }
        handles
    }

    /// Number of slots holding a value
    #[must_use]
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.read().is_some()).count()
    }

    /// Number of slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
