//! Single-program executor façade.

use crate::config::InterpreterConfig;
use crate::error::RuntimeResult;
use crate::interpreter::{InterpreterCore, RunOutcome};
use crate::monitor::Metrics;
use crate::stream::StreamPlan;
use conduit_core::{HostStorage, KernelRegistry, Tensor, TensorStorage};
use conduit_program::{Compiler, Program, ProgramDesc};
use indexmap::IndexMap;
use std::sync::Arc;

/// Runs one program through one [`InterpreterCore`]
#[derive(Debug)]
pub struct StandaloneExecutor {
    core: InterpreterCore,
}

impl StandaloneExecutor {
    /// Wrap an already compiled program
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(
        program: Arc<Program>,
        storage: Arc<dyn TensorStorage>,
        config: InterpreterConfig,
    ) -> RuntimeResult<Self> {
        Ok(Self {
            core: InterpreterCore::new(program, storage, config)?,
        })
    }

    /// Compile `desc` against `registry` and run it on host storage
    ///
    /// # Errors
    ///
    /// Returns error if compilation fails or the configuration is invalid
    pub fn from_desc(
        desc: &ProgramDesc,
        registry: &KernelRegistry,
        config: InterpreterConfig,
    ) -> RuntimeResult<Self> {
        let output = Compiler::new().compile(desc, registry)?;
        for warning in &output.warnings {
            tracing::warn!(program = %desc.name, %warning, "compiler warning");
        }
        Self::new(Arc::new(output.program), Arc::new(HostStorage::new()), config)
    }

    /// Run with `feeds`, returning the fetches by name
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the run
    pub fn run(&self, feeds: IndexMap<String, Tensor>) -> RuntimeResult<IndexMap<String, Tensor>> {
        self.core.run(feeds)
    }

    /// Run with `feeds`, returning fetches and statistics
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the run
    pub fn run_with_stats(&self, feeds: IndexMap<String, Tensor>) -> RuntimeResult<RunOutcome> {
        self.core.run_with_stats(feeds)
    }

    /// The compiled program
    #[must_use]
    pub fn program(&self) -> &Arc<Program> {
        self.core.program()
    }

    /// Stream plan of the program
    ///
    /// # Errors
    ///
    /// Returns error if the dependency graph cannot be built
    pub fn stream_plan(&self) -> RuntimeResult<&StreamPlan> {
        self.core.stream_plan()
    }

    /// Cumulative metrics
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.core.metrics()
    }

    /// The underlying interpreter
    #[must_use]
    pub fn core(&self) -> &InterpreterCore {
        &self.core
    }
}
