//! CONDUIT Program
//!
//! Turns a flat operator list into an immutable [`Program`]: kernels resolved
//! against a dispatch table, one variable per distinct name, and a lazily
//! built dependency graph shared by every run of the program.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod dag;
pub mod desc;
pub mod error;
pub mod instruction;
pub mod program;
pub mod validate;

pub use compiler::{Compiler, CompilerOutput, CompilerWarning};
pub use dag::{DependencyGraph, EdgeReason};
pub use desc::{OpDesc, PlacementDesc, ProgramDesc};
pub use error::{ProgramError, ProgramResult};
pub use instruction::{InstrKind, Instruction, VarInfo};
pub use program::Program;
pub use validate::Validator;
