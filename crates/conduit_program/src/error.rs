//! Program construction errors.

use conduit_core::{CoreError, InstrId};

/// Program result type
pub type ProgramResult<T> = Result<T, ProgramError>;

/// Errors raised while describing, validating or compiling a program
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    /// Kernel lookup or other core failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An input is neither fed, persistable, nor written by an earlier op
    #[error("op #{op_index} ({op}) reads undefined variable `{name}`")]
    UndefinedInput {
        /// Position of the op in the description
        op_index: usize,
        /// Operator name
        op: String,
        /// Variable name
        name: String,
    },

    /// The same variable appears twice in one op's outputs
    #[error("op #{op_index} ({op}) writes `{name}` more than once")]
    DuplicateOutput {
        /// Position of the op in the description
        op_index: usize,
        /// Operator name
        op: String,
        /// Variable name
        name: String,
    },

    /// A feed variable is overwritten by an op
    #[error("feed variable `{name}` is written by op #{op_index}")]
    FeedWritten {
        /// Variable name
        name: String,
        /// Position of the writing op
        op_index: usize,
    },

    /// A fetch name is never produced or fed
    #[error("fetch variable `{name}` is never produced")]
    UnknownFetch {
        /// Variable name
        name: String,
    },

    /// Feed listed twice
    #[error("variable `{name}` listed twice in {list}")]
    DuplicateName {
        /// Variable name
        name: String,
        /// Which list (`feeds`, `fetches`)
        list: &'static str,
    },

    /// Program exceeds a configured limit
    #[error("program has {count} instructions, limit is {limit}")]
    TooManyInstructions {
        /// Instruction count
        count: usize,
        /// Configured limit
        limit: usize,
    },

    /// Dependency edges form a cycle
    #[error("dependency cycle involving {instructions:?}")]
    Cycle {
        /// Instructions left unordered by the topological sort
        instructions: Vec<InstrId>,
    },

    /// Edge refers to an instruction outside the program
    #[error("edge refers to unknown instruction {instruction}")]
    UnknownInstruction {
        /// Offending id
        instruction: InstrId,
    },

    /// Several validation failures at once
    #[error("program is invalid: {}", join_messages(.0))]
    Invalid(Vec<ProgramError>),
}

fn join_messages(errors: &[ProgramError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
