//! Serializable program descriptions.
//!
//! A description is the flat, already-lowered form handed over by whatever
//! turns a model into operators: an ordered op list plus feed, fetch and
//! persistable names. JSON is the interchange format.

use crate::error::ProgramResult;
use crate::instruction::InstrKind;
use conduit_core::{AttrValue, Attributes, CpuContext, DataLayout, DataType, DeviceContext, StreamContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where an op runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementDesc {
    /// Host thread pool
    #[default]
    Cpu,
    /// A compute stream on a device
    Stream {
        /// Device ordinal
        device: u32,
        /// Stream ordinal on the device
        stream: u32,
    },
}

impl PlacementDesc {
    /// Device context for this placement
    #[must_use]
    pub fn context(&self) -> Arc<dyn DeviceContext> {
        match *self {
            Self::Cpu => CpuContext::shared(),
            Self::Stream { device, stream } => StreamContext::shared(device, stream),
        }
    }
}

fn default_dtype() -> DataType {
    DataType::F32
}

/// One operator invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpDesc {
    /// Operator name, used for kernel lookup
    pub op: String,
    /// Input variable names, in kernel argument order
    pub inputs: Vec<String>,
    /// Output variable names, in kernel result order
    pub outputs: Vec<String>,
    /// Placement
    #[serde(default)]
    pub place: PlacementDesc,
    /// Instruction kind
    #[serde(default)]
    pub kind: InstrKind,
    /// Element dtype for kernel selection
    #[serde(default = "default_dtype")]
    pub dtype: DataType,
    /// Layout for kernel selection
    #[serde(default)]
    pub layout: DataLayout,
    /// Operator attributes
    #[serde(default)]
    pub attrs: Attributes,
}

impl OpDesc {
    /// Host computation op with f32 dtype and any layout
    #[must_use]
    pub fn new(op: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            op: op.to_string(),
            inputs: inputs.iter().map(|s| (*s).to_string()).collect(),
            outputs: outputs.iter().map(|s| (*s).to_string()).collect(),
            place: PlacementDesc::Cpu,
            kind: InstrKind::Computation,
            dtype: default_dtype(),
            layout: DataLayout::Any,
            attrs: Attributes::new(),
        }
    }

    /// Place on a device stream
    #[must_use]
    pub fn on_stream(mut self, device: u32, stream: u32) -> Self {
        self.place = PlacementDesc::Stream { device, stream };
        self
    }

    /// Set the instruction kind
    #[must_use]
    pub fn with_kind(mut self, kind: InstrKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the dtype
    #[must_use]
    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Set the layout
    #[must_use]
    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attrs.insert(name.to_string(), value);
        self
    }
}

/// A whole program
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgramDesc {
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Variables supplied by the caller on every run
    #[serde(default)]
    pub feeds: Vec<String>,
    /// Variables returned to the caller
    #[serde(default)]
    pub fetches: Vec<String>,
    /// Variables that outlive a run and are never collected
    #[serde(default)]
    pub persistable: Vec<String>,
    /// Operators in program order
    #[serde(default)]
    pub ops: Vec<OpDesc>,
}

impl ProgramDesc {
    /// Empty description
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Add a feed
    #[must_use]
    pub fn feed(mut self, name: &str) -> Self {
        self.feeds.push(name.to_string());
        self
    }

    /// Add a fetch
    #[must_use]
    pub fn fetch(mut self, name: &str) -> Self {
        self.fetches.push(name.to_string());
        self
    }

    /// Mark a variable persistable
    #[must_use]
    pub fn persistable(mut self, name: &str) -> Self {
        self.persistable.push(name.to_string());
        self
    }

    /// Append an op
    #[must_use]
    pub fn op(mut self, op: OpDesc) -> Self {
        self.ops.push(op);
        self
    }

    /// Parse from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed
    pub fn from_json(json: &str) -> ProgramResult<Self> {
        let desc = serde_json::from_str(json).map_err(conduit_core::CoreError::from)?;
        Ok(desc)
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> ProgramResult<String> {
        let json = serde_json::to_string_pretty(self).map_err(conduit_core::CoreError::from)?;
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_desc_builder() {
        let op = OpDesc::new("add", &["a", "b"], &["c"])
            .on_stream(0, 1)
            .with_dtype(DataType::I64)
            .with_attr("axis", AttrValue::Int(-1));

        assert_eq!(op.inputs, vec!["a", "b"]);
        assert_eq!(op.place, PlacementDesc::Stream { device: 0, stream: 1 });
        assert_eq!(op.dtype, DataType::I64);
        assert_eq!(op.attrs["axis"], AttrValue::Int(-1));
        assert_eq!(op.kind, InstrKind::Computation);
    }

    #[test]
    fn test_from_json_defaults() {
        let json = r#"{
            "feeds": ["a", "b"],
            "fetches": ["c"],
            "ops": [{"op": "add", "inputs": ["a", "b"], "outputs": ["c"]}]
        }"#;
        let desc = ProgramDesc::from_json(json).unwrap();
        assert_eq!(desc.ops.len(), 1);
        assert_eq!(desc.ops[0].place, PlacementDesc::Cpu);
        assert_eq!(desc.ops[0].dtype, DataType::F32);
        assert_eq!(desc.ops[0].layout, DataLayout::Any);
        assert!(desc.persistable.is_empty());
    }

    #[test]
    fn test_stream_placement_json() {
        let json = r#"{"op": "mul", "inputs": ["c", "d"], "outputs": ["e"],
                       "place": {"stream": {"device": 0, "stream": 1}},
                       "kind": "communication"}"#;
        let op: OpDesc = serde_json::from_str(json).unwrap();
        assert_eq!(op.place, PlacementDesc::Stream { device: 0, stream: 1 });
        assert_eq!(op.kind, InstrKind::Communication);
        assert_eq!(op.place.context().stream(), Some(1));
    }

    #[test]
    fn test_json_round_trip_via_builder() {
        let desc = ProgramDesc::new("scale")
            .feed("x")
            .fetch("y")
            .op(OpDesc::new("scale", &["x"], &["y"]).with_attr("factor", AttrValue::Float(2.0)));
        let json = desc.to_json().unwrap();
        assert_eq!(ProgramDesc::from_json(&json).unwrap(), desc);
    }

    #[test]
    fn test_malformed_json() {
        assert!(ProgramDesc::from_json("{ not json").is_err());
    }
}
