//! Element types, layouts, backends and placements.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element data type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Boolean
    Bool,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl DataType {
    /// Every dtype, in registration order
    pub const ALL: [DataType; 5] = [
        DataType::Bool,
        DataType::I32,
        DataType::I64,
        DataType::F32,
        DataType::F64,
    ];

    /// Size of one element in bytes
    #[must_use]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Whether this dtype is an integer type
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::I32 | Self::I64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(s)
    }
}

/// Memory layout a kernel was written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataLayout {
    /// Layout-agnostic
    #[default]
    Any,
    /// Batch, channel, height, width
    Nchw,
    /// Batch, height, width, channel
    Nhwc,
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Any => "any",
            Self::Nchw => "nchw",
            Self::Nhwc => "nhwc",
        };
        f.write_str(s)
    }
}

/// Kernel backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Host CPU
    Cpu,
    /// Accelerator with compute streams
    Gpu,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Gpu => f.write_str("gpu"),
        }
    }
}

/// Where a tensor lives or an instruction runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Place {
    /// Host memory
    #[default]
    Cpu,
    /// Device memory on the given device ordinal
    Device(u32),
}

impl Place {
    /// Backend that serves this place
    #[must_use]
    pub const fn backend(self) -> Backend {
        match self {
            Self::Cpu => Backend::Cpu,
            Self::Device(_) => Backend::Gpu,
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Device(id) => write!(f, "device:{}", id),
        }
    }
}
