//! Tensor storage collaborator.
//!
//! The runtime asks the storage for a handle whenever a variable is written
//! and gives the handle back exactly once, through the garbage collector.
//! [`HostStorage`] is the in-process implementation: it only does the
//! accounting (capacity, live handles, double-release detection).

use crate::dtype::Place;
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle for an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageHandle(u64);

impl StorageHandle {
    /// Create from a raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem#{}", self.0)
    }
}

/// Allocation interface used by the runtime.
pub trait TensorStorage: Send + Sync {
    /// Reserve `bytes` on `place`
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when the request cannot be served
    fn allocate(&self, bytes: u64, place: Place) -> CoreResult<StorageHandle>;

    /// Return a handle
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the handle is not live
    fn release(&self, handle: StorageHandle) -> CoreResult<()>;

    /// Accounting snapshot
    fn stats(&self) -> StorageStats;
}

/// Storage accounting snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Handles currently live
    pub live_handles: u64,
    /// Bytes currently allocated
    pub bytes_in_use: u64,
    /// Allocations served since creation
    pub total_allocations: u64,
    /// Releases served since creation
    pub total_releases: u64,
    /// Highest `bytes_in_use` observed
    pub peak_bytes: u64,
}

#[derive(Default)]
struct Ledger {
    live: HashMap<u64, (u64, Place)>,
    bytes_in_use: u64,
    peak_bytes: u64,
    total_allocations: u64,
    total_releases: u64,
}

/// In-process storage with an optional byte budget
pub struct HostStorage {
    capacity: Option<u64>,
    next_handle: AtomicU64,
    ledger: Mutex<Ledger>,
}

impl HostStorage {
    /// Storage without a budget
    #[must_use]
    pub fn new() -> Self {
        Self {
            capacity: None,
            next_handle: AtomicU64::new(1),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Storage that refuses allocations beyond `bytes`
    #[must_use]
    pub fn with_capacity(bytes: u64) -> Self {
        Self {
            capacity: Some(bytes),
            ..Self::new()
        }
    }

    /// Byte budget, if any
    #[must_use]
    pub const fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    /// Place of a live handle
    #[must_use]
    pub fn place_of(&self, handle: StorageHandle) -> Option<Place> {
        self.ledger.lock().live.get(&handle.0).map(|(_, place)| *place)
    }
}

impl Default for HostStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorStorage for HostStorage {
    fn allocate(&self, bytes: u64, place: Place) -> CoreResult<StorageHandle> {
        let mut ledger = self.ledger.lock();
        if let Some(capacity) = self.capacity {
            let available = capacity.saturating_sub(ledger.bytes_in_use);
            if bytes > available {
                return Err(CoreError::CapacityExceeded {
                    requested: bytes,
                    available,
                });
            }
        }

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        ledger.live.insert(handle, (bytes, place));
        ledger.bytes_in_use += bytes;
        ledger.peak_bytes = ledger.peak_bytes.max(ledger.bytes_in_use);
        ledger.total_allocations += 1;
        Ok(StorageHandle(handle))
    }

    fn release(&self, handle: StorageHandle) -> CoreResult<()> {
        let mut ledger = self.ledger.lock();
        let (bytes, _) = ledger
            .live
            .remove(&handle.0)
            .ok_or(CoreError::InvalidHandle { handle: handle.0 })?;
        ledger.bytes_in_use -= bytes;
        ledger.total_releases += 1;
        Ok(())
    }

    fn stats(&self) -> StorageStats {
        let ledger = self.ledger.lock();
        StorageStats {
            live_handles: ledger.live.len() as u64,
            bytes_in_use: ledger.bytes_in_use,
            total_allocations: ledger.total_allocations,
            total_releases: ledger.total_releases,
            peak_bytes: ledger.peak_bytes,
        }
    }
}

impl fmt::Debug for HostStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostStorage")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
