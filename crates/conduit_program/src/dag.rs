//! Instruction dependency graph.
//!
//! Derived from program order and the variables each instruction touches:
//! a reader depends on the last writer of each input, and a writer of a
//! variable that was written before depends on that writer and on every
//! reader in between, so reassigned variables stay correct. Edges always
//! point from an earlier to a later instruction.

use crate::error::{ProgramError, ProgramResult};
use crate::instruction::Instruction;
use conduit_core::InstrId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Why an edge exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeReason {
    /// Consumer reads what the producer wrote
    ReadAfterWrite,
    /// Producer reads a variable the consumer overwrites
    WriteAfterRead,
    /// Both write the same variable
    WriteAfterWrite,
}

/// Static dependency edges of a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    /// Instructions each instruction waits for, ascending
    upstream: Vec<Vec<InstrId>>,
    /// Instructions each instruction unblocks, ascending
    downstream: Vec<Vec<InstrId>>,
    /// Reason per edge
    reasons: BTreeMap<(InstrId, InstrId), EdgeReason>,
    /// One valid sequential order
    order: Vec<InstrId>,
}

impl DependencyGraph {
    /// Build the graph for `instructions` touching `var_count` variables
    ///
    /// # Errors
    ///
    /// Returns error if an instruction refers to a variable outside the table
    pub fn build(instructions: &[Instruction], var_count: usize) -> ProgramResult<Self> {
        let mut last_writer: Vec<Option<InstrId>> = vec![None; var_count];
        let mut readers_since_write: Vec<Vec<InstrId>> = vec![Vec::new(); var_count];
        let mut reasons = BTreeMap::new();

        for instr in instructions {
            let id = instr.id;
            for var in instr.inputs.iter().chain(&instr.outputs) {
                if var.index() >= var_count {
                    return Err(ProgramError::Core(conduit_core::CoreError::Validation {
                        field: format!("{}", instr),
                        reason: format!("{} is outside the variable table", var),
                    }));
                }
            }

            for var in &instr.inputs {
                if let Some(writer) = last_writer[var.index()] {
                    if writer != id {
                        reasons.entry((writer, id)).or_insert(EdgeReason::ReadAfterWrite);
                    }
                }
            }
            for var in &instr.outputs {
                if let Some(writer) = last_writer[var.index()] {
                    if writer != id {
                        reasons.entry((writer, id)).or_insert(EdgeReason::WriteAfterWrite);
                    }
                }
                for &reader in &readers_since_write[var.index()] {
                    if reader != id {
                        reasons.entry((reader, id)).or_insert(EdgeReason::WriteAfterRead);
                    }
                }
            }

            for var in &instr.inputs {
                let readers = &mut readers_since_write[var.index()];
                if !readers.contains(&id) {
                    readers.push(id);
                }
            }
            for var in &instr.outputs {
                last_writer[var.index()] = Some(id);
                readers_since_write[var.index()].clear();
            }
        }

        Self::from_reasons(instructions.len(), reasons)
    }

    /// Build from explicit edges
    ///
    /// # Errors
    ///
    /// Returns error if an edge refers to an unknown instruction or the edges
    /// form a cycle
    pub fn from_edges(count: usize, edges: &[(InstrId, InstrId)]) -> ProgramResult<Self> {
        let reasons = edges
            .iter()
            .map(|&edge| (edge, EdgeReason::ReadAfterWrite))
            .collect();
        Self::from_reasons(count, reasons)
    }

    fn from_reasons(
        count: usize,
        reasons: BTreeMap<(InstrId, InstrId), EdgeReason>,
    ) -> ProgramResult<Self> {
        let mut upstream = vec![Vec::new(); count];
        let mut downstream = vec![Vec::new(); count];

        for &(from, to) in reasons.keys() {
            for id in [from, to] {
                if id.index() >= count {
                    return Err(ProgramError::UnknownInstruction { instruction: id });
                }
            }
            if from == to {
                return Err(ProgramError::Cycle {
                    instructions: vec![from],
                });
            }
            upstream[to.index()].push(from);
            downstream[from.index()].push(to);
        }
        for list in upstream.iter_mut().chain(downstream.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        let order = topological_sort(&upstream, &downstream)?;
        Ok(Self {
            upstream,
            downstream,
            reasons,
            order,
        })
    }

    /// Instructions `id` waits for
    #[must_use]
    pub fn dependencies(&self, id: InstrId) -> &[InstrId] {
        self.upstream.get(id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Instructions `id` unblocks
    #[must_use]
    pub fn dependents(&self, id: InstrId) -> &[InstrId] {
        self.downstream.get(id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of instructions `id` waits for
    #[must_use]
    pub fn dependency_count(&self, id: InstrId) -> usize {
        self.dependencies(id).len()
    }

    /// Instructions with no dependencies, ascending
    #[must_use]
    pub fn roots(&self) -> Vec<InstrId> {
        self.upstream
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| InstrId::from_index(i))
            .collect()
    }

    /// Reason for an edge, if it exists
    #[must_use]
    pub fn reason(&self, from: InstrId, to: InstrId) -> Option<EdgeReason> {
        self.reasons.get(&(from, to)).copied()
    }

    /// Every edge as `(producer, consumer)`, ascending
    pub fn edges(&self) -> impl Iterator<Item = (InstrId, InstrId)> + '_ {
        self.reasons.keys().copied()
    }

    /// A sequential order consistent with every edge
    #[must_use]
    pub fn topological_order(&self) -> &[InstrId] {
        &self.order
    }

    /// Whether `later` (transitively) depends on `earlier`
    #[must_use]
    pub fn depends_on(&self, later: InstrId, earlier: InstrId) -> bool {
        let mut stack = vec![later];
        let mut visited = BTreeSet::new();
        while let Some(current) = stack.pop() {
            for &dep in self.dependencies(current) {
                if dep == earlier {
                    return true;
                }
                if visited.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        false
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.upstream.len()
    }

    /// Whether the graph has no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upstream.is_empty()
    }

    /// Number of edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.reasons.len()
    }
}

/// Kahn's algorithm, smallest ready id first
fn topological_sort(
    upstream: &[Vec<InstrId>],
    downstream: &[Vec<InstrId>],
) -> ProgramResult<Vec<InstrId>> {
    let mut pending: Vec<usize> = upstream.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<InstrId> = pending
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(i, _)| InstrId::from_index(i))
        .collect();
    let mut order = Vec::with_capacity(upstream.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &downstream[next.index()] {
            let count = &mut pending[dependent.index()];
            *count -= 1;
            if *count == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < upstream.len() {
        let instructions = pending
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(i, _)| InstrId::from_index(i))
            .collect();
        return Err(ProgramError::Cycle { instructions });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstrKind;
    use conduit_core::elementwise::AssignKernel;
    use conduit_core::{Attributes, Backend, CpuContext, DataLayout, DataType, KernelKey, VarId};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn id(i: u32) -> InstrId {
        InstrId::from_raw(i)
    }

    fn make_instr(i: u32, inputs: &[u32], outputs: &[u32]) -> Instruction {
        Instruction {
            id: id(i),
            op: "assign".to_string(),
            kernel_key: KernelKey::new(Backend::Cpu, DataLayout::Any, DataType::F32),
            kernel: Arc::new(AssignKernel),
            inputs: inputs.iter().copied().map(VarId::from_raw).collect(),
            outputs: outputs.iter().copied().map(VarId::from_raw).collect(),
            device: CpuContext::shared(),
            kind: InstrKind::Computation,
            attrs: Attributes::new(),
        }
    }

    #[test]
    fn test_read_after_write() {
        // v0 -> [0] -> v1 -> [1] -> v2
        let instrs = vec![make_instr(0, &[0], &[1]), make_instr(1, &[1], &[2])];
        let graph = DependencyGraph::build(&instrs, 3).unwrap();

        assert_eq!(graph.dependencies(id(1)), &[id(0)]);
        assert_eq!(graph.dependents(id(0)), &[id(1)]);
        assert_eq!(graph.reason(id(0), id(1)), Some(EdgeReason::ReadAfterWrite));
        assert_eq!(graph.roots(), vec![id(0)]);
    }

    #[test]
    fn test_program_inputs_have_no_producer() {
        let instrs = vec![make_instr(0, &[0, 1], &[2]), make_instr(1, &[0], &[3])];
        let graph = DependencyGraph::build(&instrs, 4).unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.roots(), vec![id(0), id(1)]);
    }

    #[test]
    fn test_diamond() {
        // A writes v1; B, C read v1; D reads B's and C's outputs
        let instrs = vec![
            make_instr(0, &[0], &[1]),
            make_instr(1, &[1], &[2]),
            make_instr(2, &[1], &[3]),
            make_instr(3, &[2, 3], &[4]),
        ];
        let graph = DependencyGraph::build(&instrs, 5).unwrap();
        assert_eq!(graph.dependents(id(0)), &[id(1), id(2)]);
        assert_eq!(graph.dependencies(id(3)), &[id(1), id(2)]);
        assert!(graph.depends_on(id(3), id(0)));
        assert!(!graph.depends_on(id(1), id(2)));
        assert_eq!(graph.topological_order(), &[id(0), id(1), id(2), id(3)]);
    }

    #[test]
    fn test_write_after_read_and_write() {
        // [0] writes v1, [1] reads v1, [2] overwrites v1
        let instrs = vec![
            make_instr(0, &[0], &[1]),
            make_instr(1, &[1], &[2]),
            make_instr(2, &[0], &[1]),
        ];
        let graph = DependencyGraph::build(&instrs, 3).unwrap();
        assert_eq!(graph.reason(id(1), id(2)), Some(EdgeReason::WriteAfterRead));
        assert_eq!(graph.reason(id(0), id(2)), Some(EdgeReason::WriteAfterWrite));
        assert_eq!(graph.dependencies(id(2)), &[id(0), id(1)]);
    }

    #[test]
    fn test_in_place_update_has_no_self_edge() {
        let instrs = vec![make_instr(0, &[0], &[1]), make_instr(1, &[1], &[1])];
        let graph = DependencyGraph::build(&instrs, 2).unwrap();
        assert_eq!(graph.dependencies(id(1)), &[id(0)]);
        assert!(graph.dependencies(id(0)).is_empty());
    }

    #[test]
    fn test_variable_out_of_range() {
        let instrs = vec![make_instr(0, &[5], &[1])];
        assert!(DependencyGraph::build(&instrs, 2).is_err());
    }

    #[test]
    fn test_from_edges_cycle() {
        let err = DependencyGraph::from_edges(2, &[(id(0), id(1)), (id(1), id(0))]).unwrap_err();
        assert!(matches!(err, ProgramError::Cycle { ref instructions } if instructions.len() == 2));
    }

    #[test]
    fn test_from_edges_self_loop_and_unknown() {
        assert!(matches!(
            DependencyGraph::from_edges(1, &[(id(0), id(0))]),
            Err(ProgramError::Cycle { .. })
        ));
        assert!(matches!(
            DependencyGraph::from_edges(1, &[(id(0), id(3))]),
            Err(ProgramError::UnknownInstruction { .. })
        ));
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::build(&[], 0).unwrap();
        assert!(graph.is_empty());
        assert!(graph.roots().is_empty());
    }

    proptest! {
        #[test]
        fn prop_edges_point_forward_and_order_is_valid(
            ops in proptest::collection::vec(
                (proptest::collection::vec(0u32..6, 0..3), 0u32..6),
                1..24,
            )
        ) {
            let instrs: Vec<Instruction> = ops
                .iter()
                .enumerate()
                .map(|(i, (inputs, output))| make_instr(i as u32, inputs, &[*output]))
                .collect();
            let graph = DependencyGraph::build(&instrs, 6).unwrap();

            for (from, to) in graph.edges() {
                prop_assert!(from < to);
            }

            let order = graph.topological_order();
            prop_assert_eq!(order.len(), instrs.len());
            let mut position = vec![0usize; order.len()];
            for (pos, id) in order.iter().enumerate() {
                position[id.index()] = pos;
            }
            for (from, to) in graph.edges() {
                prop_assert!(position[from.index()] < position[to.index()]);
            }
        }
    }
}
