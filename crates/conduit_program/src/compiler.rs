//! Compiler from a program description to an executable [`Program`].
//!
//! Kernels are resolved here, once, against the dispatch table the caller
//! passes in. Nothing is looked up again while the program runs.

use crate::desc::ProgramDesc;
use crate::error::{ProgramError, ProgramResult};
use crate::instruction::Instruction;
use crate::program::Program;
use crate::validate::Validator;
use conduit_core::{InstrId, KernelKey, KernelRegistry, VarId};
use indexmap::IndexMap;
use std::fmt;

/// Output from compiling a description
#[derive(Debug)]
pub struct CompilerOutput {
    /// The compiled program
    pub program: Program,
    /// Compilation warnings
    pub warnings: Vec<CompilerWarning>,
}

/// Compilation warning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerWarning {
    /// Variable is neither read nor fetched
    UnusedVariable {
        /// Variable name
        name: String,
    },
    /// Variable is written by more than one op
    Reassigned {
        /// Variable name
        name: String,
        /// Number of writers
        writers: usize,
    },
}

impl fmt::Display for CompilerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnusedVariable { name } => write!(f, "variable `{}` is never used", name),
            Self::Reassigned { name, writers } => {
                write!(f, "variable `{}` is written by {} ops", name, writers)
            }
        }
    }
}

/// Compiler for turning descriptions into programs
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    validator: Validator,
}

impl Compiler {
    /// Create a compiler with the default validator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom validator
    #[must_use]
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Compile a description against a dispatch table
    ///
    /// # Errors
    ///
    /// Returns error if validation fails or a kernel is not registered
    pub fn compile(&self, desc: &ProgramDesc, registry: &KernelRegistry) -> ProgramResult<CompilerOutput> {
        if let Err(mut errors) = self.validator.validate(desc) {
            return Err(if errors.len() == 1 {
                errors.remove(0)
            } else {
                ProgramError::Invalid(errors)
            });
        }

        let mut vars: IndexMap<String, VarId> = IndexMap::new();
        let mut intern = |name: &str| -> VarId {
            let next = VarId::from_index(vars.len());
            *vars.entry(name.to_string()).or_insert(next)
        };

        let feeds: Vec<VarId> = desc.feeds.iter().map(|n| intern(n)).collect();
        let persistable: Vec<VarId> = desc.persistable.iter().map(|n| intern(n)).collect();

        let mut instructions = Vec::with_capacity(desc.ops.len());
        for (index, op) in desc.ops.iter().enumerate() {
            let device = op.place.context();
            let kernel = registry.lookup(&op.op, device.backend(), op.layout, op.dtype)?;
            let inputs = op.inputs.iter().map(|n| intern(n)).collect();
            let outputs = op.outputs.iter().map(|n| intern(n)).collect();

            instructions.push(Instruction {
                id: InstrId::from_index(index),
                op: op.op.clone(),
                kernel_key: KernelKey::new(device.backend(), op.layout, op.dtype),
                kernel,
                inputs,
                outputs,
                device,
                kind: op.kind,
                attrs: op.attrs.clone(),
            });
        }

        let fetches: Vec<VarId> = desc.fetches.iter().map(|n| intern(n)).collect();
        let var_names: Vec<String> = vars.into_keys().collect();

        let program = Program::new(desc.name.clone(), instructions, var_names, feeds, fetches, persistable)?;
        let warnings = Self::collect_warnings(&program);

        tracing::debug!(
            program = %program.name(),
            instructions = program.len(),
            variables = program.variables().len(),
            warnings = warnings.len(),
            "program compiled"
        );

        Ok(CompilerOutput { program, warnings })
    }

    fn collect_warnings(program: &Program) -> Vec<CompilerWarning> {
        let mut warnings = Vec::new();
        for var in program.variables() {
            if var.readers == 0 && !var.is_fetch && !var.persistable {
                warnings.push(CompilerWarning::UnusedVariable { name: var.name.clone() });
            }
            let writers = program.instructions().iter().filter(|i| i.writes(var.id)).count();
            if writers > 1 {
                warnings.push(CompilerWarning::Reassigned {
                    name: var.name.clone(),
                    writers,
                });
            }
        }
        warnings
    }
}
