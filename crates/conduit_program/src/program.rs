//! Compiled programs.

use crate::dag::DependencyGraph;
use crate::error::{ProgramError, ProgramResult};
use crate::instruction::{Instruction, VarInfo};
use conduit_core::{CoreError, InstrId, VarId};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::fmt;

/// An ordered instruction list with its variable table.
///
/// Read-only once built and safe to share between interpreters through an
/// `Arc`. The dependency graph is derived on first use and cached.
pub struct Program {
    name: String,
    instructions: Vec<Instruction>,
    variables: Vec<VarInfo>,
    by_name: IndexMap<String, VarId>,
    feeds: Vec<VarId>,
    fetches: Vec<VarId>,
    graph: OnceCell<DependencyGraph>,
}

impl Program {
    /// Assemble a program from already-resolved instructions.
    ///
    /// `var_names[i]` names `VarId(i)`. Instruction ids must equal their
    /// position in `instructions`.
    ///
    /// # Errors
    ///
    /// Returns error if ids are out of place or out of range, or names repeat
    pub fn new(
        name: impl Into<String>,
        instructions: Vec<Instruction>,
        var_names: Vec<String>,
        feeds: Vec<VarId>,
        fetches: Vec<VarId>,
        persistable: Vec<VarId>,
    ) -> ProgramResult<Self> {
        let mut by_name = IndexMap::with_capacity(var_names.len());
        for (i, var_name) in var_names.iter().enumerate() {
            if by_name.insert(var_name.clone(), VarId::from_index(i)).is_some() {
                return Err(ProgramError::DuplicateName {
                    name: var_name.clone(),
                    list: "variables",
                });
            }
        }

        let in_range = |var: &VarId| var.index() < var_names.len();
        for (position, instr) in instructions.iter().enumerate() {
            if instr.id.index() != position {
                return Err(ProgramError::UnknownInstruction { instruction: instr.id });
            }
            if !instr.inputs.iter().chain(&instr.outputs).all(in_range) {
                return Err(ProgramError::Core(CoreError::Validation {
                    field: instr.to_string(),
                    reason: "variable id outside the variable table".to_string(),
                }));
            }
        }
        if let Some(var) = feeds.iter().chain(&fetches).chain(&persistable).find(|v| !in_range(v)) {
            return Err(ProgramError::Core(CoreError::Validation {
                field: "program".to_string(),
                reason: format!("{} is outside the variable table", var),
            }));
        }

        let mut readers = vec![0u32; var_names.len()];
        for instr in &instructions {
            for var in instr.distinct_inputs() {
                readers[var.index()] += 1;
            }
        }

        let variables = var_names
            .into_iter()
            .enumerate()
            .map(|(i, var_name)| {
                let id = VarId::from_index(i);
                VarInfo {
                    id,
                    name: var_name,
                    is_feed: feeds.contains(&id),
                    is_fetch: fetches.contains(&id),
                    persistable: persistable.contains(&id),
                    readers: readers[i],
                }
            })
            .collect();

        Ok(Self {
            name: name.into(),
            instructions,
            variables,
            by_name,
            feeds,
            fetches,
            graph: OnceCell::new(),
        })
    }

    /// Program name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instructions in program order
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Instruction by id
    #[must_use]
    pub fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        self.instructions.get(id.index())
    }

    /// Variable table
    #[must_use]
    pub fn variables(&self) -> &[VarInfo] {
        &self.variables
    }

    /// Variable by id
    #[must_use]
    pub fn variable(&self, id: VarId) -> Option<&VarInfo> {
        self.variables.get(id.index())
    }

    /// Variable id by name
    #[must_use]
    pub fn var_id(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    /// Feed variables, in declaration order
    #[must_use]
    pub fn feeds(&self) -> &[VarId] {
        &self.feeds
    }

    /// Fetch variables, in declaration order
    #[must_use]
    pub fn fetches(&self) -> &[VarId] {
        &self.fetches
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the program has no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Dependency graph, built on first call and cached
    ///
    /// # Errors
    ///
    /// Returns error if the instructions do not form a DAG
    pub fn graph(&self) -> ProgramResult<&DependencyGraph> {
        self.graph.get_or_try_init(|| {
            let graph = DependencyGraph::build(&self.instructions, self.variables.len())?;
            tracing::debug!(
                program = %self.name,
                instructions = graph.len(),
                edges = graph.edge_count(),
                "dependency graph built"
            );
            Ok(graph)
        })
    }

    /// Whether the dependency graph has been built
    #[must_use]
    pub fn graph_built(&self) -> bool {
        self.graph.get().is_some()
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("instructions", &self.instructions.len())
            .field("variables", &self.variables.len())
            .field("feeds", &self.feeds)
            .field("fetches", &self.fetches)
            .finish_non_exhaustive()
    }
}
