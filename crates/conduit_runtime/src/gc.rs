//! Reader-count garbage collector.
//!
//! Every variable starts a run with the number of distinct instructions
//! that read it. Each finished instruction decrements its inputs once; the
//! caller that takes a count to zero is the only one told about it, so a
//! variable is released at most once per run. Fetch and persistable
//! variables are never reported.

use crate::error::RuntimeResult;
use conduit_core::{StorageHandle, TensorStorage, VarId};
use conduit_program::{Instruction, Program};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// When dead variables are returned to storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcMode {
    /// Release as a task on the collector lane
    #[default]
    Deferred,
    /// Release on the worker that observed the zero crossing
    Inline,
    /// Keep everything until the next run's teardown
    Disabled,
}

/// Per-variable reader counts for one program
pub struct GarbageCollector {
    mode: GcMode,
    storage: Arc<dyn TensorStorage>,
    readers: Vec<usize>,
    collectable: Vec<bool>,
    remaining: Vec<AtomicUsize>,
    collected: AtomicU64,
    teardown: AtomicU64,
}

impl GarbageCollector {
    /// Create a collector for `program` releasing into `storage`
    #[must_use]
    pub fn new(program: &Program, storage: Arc<dyn TensorStorage>, mode: GcMode) -> Self {
        let vars = program.variables();
        Self {
            mode,
            storage,
            readers: vars.iter().map(|v| v.readers as usize).collect(),
            collectable: vars.iter().map(|v| v.collectable()).collect(),
            remaining: vars.iter().map(|v| AtomicUsize::new(v.readers as usize)).collect(),
            collected: AtomicU64::new(0),
            teardown: AtomicU64::new(0),
        }
    }

    /// Release mode
    #[must_use]
    pub const fn mode(&self) -> GcMode {
        self.mode
    }

    /// Restore reader counts and zero the run counters
    pub fn reset(&self) {
        for (remaining, readers) in self.remaining.iter().zip(&self.readers) {
            remaining.store(*readers, Ordering::SeqCst);
        }
        self.collected.store(0, Ordering::Relaxed);
        self.teardown.store(0, Ordering::Relaxed);
    }

    /// Count `instr`'s reads as done.
    ///
    /// Returns the collectable variables whose count this call took to zero.
    pub fn on_instruction_finished(&self, instr: &Instruction) -> Vec<VarId> {
        let mut dead = Vec::new();
        for var in instr.distinct_inputs() {
            let Some(remaining) = self.remaining.get(var.index()) else {
                continue;
            };
            let before = remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .unwrap_or(0);
            tracing::trace!(%var, remaining = before.saturating_sub(1), "reader finished");
            if before == 1 && self.is_collectable(var) {
                dead.push(var);
            }
        }
        if self.mode == GcMode::Disabled {
            dead.clear();
        }
        dead
    }

    /// Whether a freshly written value of `var` is already dead
    #[must_use]
    pub fn is_dead_on_write(&self, var: VarId) -> bool {
        self.mode != GcMode::Disabled
            && self.is_collectable(var)
            && self.remaining(var) == Some(0)
    }

    /// Whether the collector may ever release `var`
    #[must_use]
    pub fn is_collectable(&self, var: VarId) -> bool {
        self.collectable.get(var.index()).copied().unwrap_or(false)
    }

    /// Readers of `var` that have not finished in this run
    #[must_use]
    pub fn remaining(&self, var: VarId) -> Option<usize> {
        self.remaining.get(var.index()).map(|n| n.load(Ordering::SeqCst))
    }

    /// Release a dead variable's storage
    ///
    /// # Errors
    ///
    /// Returns error if the storage rejects the handle
    pub fn release(&self, var: VarId, handle: StorageHandle) -> RuntimeResult<()> {
        self.storage.release(handle)?;
        self.collected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%var, %handle, "variable released");
        Ok(())
    }

    /// Release storage left over from an earlier run or replaced by a write
    ///
    /// # Errors
    ///
    /// Returns error if the storage rejects the handle
    pub fn release_stale(&self, handle: StorageHandle) -> RuntimeResult<()> {
        self.storage.release(handle)?;
        self.teardown.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Dead variables released in this run
    #[must_use]
    pub fn collected(&self) -> u64 {
        self.collected.load(Ordering::Relaxed)
    }

    /// Stale handles released in this run
    #[must_use]
    pub fn stale_released(&self) -> u64 {
        self.teardown.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("mode", &self.mode)
            .field("variables", &self.readers.len())
            .field("collected", &self.collected())
            .finish_non_exhaustive()
    }
}
