//! Program description validator.

use crate::desc::ProgramDesc;
use crate::error::ProgramError;
use indexmap::IndexSet;

/// Structural checks run before compilation
#[derive(Debug, Clone, Default)]
pub struct Validator {
    /// Maximum allowed instructions (0 = no limit)
    pub max_instructions: usize,
}

impl Validator {
    /// Create a validator without limits
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of ops
    #[must_use]
    pub fn with_max_instructions(mut self, max: usize) -> Self {
        self.max_instructions = max;
        self
    }

    /// Validate a description, collecting every violation
    ///
    /// # Errors
    ///
    /// Returns all violations found, in description order
    pub fn validate(&self, desc: &ProgramDesc) -> Result<(), Vec<ProgramError>> {
        let mut errors = Vec::new();

        Self::check_unique(&desc.feeds, "feeds", &mut errors);
        Self::check_unique(&desc.fetches, "fetches", &mut errors);
        Self::check_unique(&desc.persistable, "persistable", &mut errors);

        let feeds: IndexSet<&str> = desc.feeds.iter().map(String::as_str).collect();
        let mut defined: IndexSet<&str> = feeds.clone();
        defined.extend(desc.persistable.iter().map(String::as_str));

        for (op_index, op) in desc.ops.iter().enumerate() {
            for input in &op.inputs {
                if !defined.contains(input.as_str()) {
                    errors.push(ProgramError::UndefinedInput {
                        op_index,
                        op: op.op.clone(),
                        name: input.clone(),
                    });
                }
            }

            let mut written = IndexSet::new();
            for output in &op.outputs {
                if !written.insert(output.as_str()) {
                    errors.push(ProgramError::DuplicateOutput {
                        op_index,
                        op: op.op.clone(),
                        name: output.clone(),
                    });
                }
                if feeds.contains(output.as_str()) {
                    errors.push(ProgramError::FeedWritten {
                        name: output.clone(),
                        op_index,
                    });
                }
            }
            defined.extend(written);
        }

        for fetch in &desc.fetches {
            if !defined.contains(fetch.as_str()) {
                errors.push(ProgramError::UnknownFetch { name: fetch.clone() });
            }
        }

        if self.max_instructions > 0 && desc.ops.len() > self.max_instructions {
            errors.push(ProgramError::TooManyInstructions {
                count: desc.ops.len(),
                limit: self.max_instructions,
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_unique(names: &[String], list: &'static str, errors: &mut Vec<ProgramError>) {
        let mut seen = IndexSet::new();
        for name in names {
            if !seen.insert(name.as_str()) {
                errors.push(ProgramError::DuplicateName {
                    name: name.clone(),
                    list,
                });
            }
        }
    }
}
