//! Identifiers for CONDUIT entities.
//!
//! Runs are identified by random UUIDs. Instructions, variables, streams and
//! events are dense indices into the tables of one compiled program, so they
//! are plain integers and can index a `Vec` directly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Run identifier - identifies a single execution of a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random RunId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run_{}", self.0)
    }
}

macro_rules! index_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create from a raw index
            #[must_use]
            pub const fn from_raw(value: u32) -> Self {
                Self(value)
            }

            /// Create from a table position
            ///
            /// # Panics
            ///
            /// Panics if the index does not fit in `u32`
            #[must_use]
            pub fn from_index(index: usize) -> Self {
                Self(u32::try_from(index).expect("id index exceeds u32"))
            }

            /// Raw value
            #[must_use]
            pub const fn as_u32(&self) -> u32 {
                self.0
            }

            /// Table position
            #[must_use]
            pub const fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

index_id!(
    /// Instruction identifier - position in the program's instruction list
    InstrId,
    "instr#"
);

index_id!(
    /// Variable identifier - position in the program's variable table
    VarId,
    "var#"
);

index_id!(
    /// Stream identifier - an ordered execution lane
    StreamId,
    "stream#"
);

index_id!(
    /// Event identifier - a pre-allocated cross-stream synchronization event
    EventId,
    "event#"
);
