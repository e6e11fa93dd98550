//! The dependency-driven interpreter.
//!
//! A run binds the feeds, seeds the ready set with instructions that have
//! no dependencies and dispatches from there. Host instructions unblock
//! their dependents when they finish. Stream instructions unblock theirs as
//! soon as they are launched: later work on the same stream is ordered by
//! the stream itself, and work elsewhere waits on the producer's event.
//! Dispatch is a worklist, never recursion, so a long chain of launches
//! does not grow the stack.
//!
//! The dependency graph, stream plan, events, lanes and variable slots are
//! built on the first run and reused; each run only resets counters.

use crate::config::InterpreterConfig;
use crate::error::{ExecutionError, RuntimeResult};
use crate::event::EventManager;
use crate::gc::{GarbageCollector, GcMode};
use crate::monitor::{Metrics, RunMonitor, RunStats};
use crate::scope::VariableScope;
use crate::stream::{StreamAnalyzer, StreamPlan};
use crate::work_queue::{LaneId, WorkQueue};
use conduit_core::{CoreError, InstrId, KernelError, Place, RunId, StorageStats, Tensor, TensorStorage, VarId};
use conduit_program::Program;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Name of the collector lane
const GC_LANE: &str = "gc";

/// Fetches and statistics of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Fetch variables by name, in declaration order
    pub fetches: IndexMap<String, Tensor>,
    /// Run counters
    pub stats: RunStats,
}

/// Runs one compiled program.
///
/// Runs on the same core are serialized. Overlapping runs of the same
/// program use separate cores sharing one `Arc<Program>` and, through
/// [`InterpreterCore::with_stream_plan`], one `Arc<StreamPlan>`.
pub struct InterpreterCore {
    program: Arc<Program>,
    storage: Arc<dyn TensorStorage>,
    config: InterpreterConfig,
    plan: OnceCell<Arc<StreamPlan>>,
    engine: OnceCell<Arc<Engine>>,
    run_lock: Mutex<()>,
    monitor: Mutex<RunMonitor>,
}

impl InterpreterCore {
    /// Create an interpreter; nothing is analyzed until the first run
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(
        program: Arc<Program>,
        storage: Arc<dyn TensorStorage>,
        config: InterpreterConfig,
    ) -> RuntimeResult<Self> {
        Self::with_plan_cell(program, OnceCell::new(), storage, config)
    }

    fn with_plan_cell(
        program: Arc<Program>,
        plan: OnceCell<Arc<StreamPlan>>,
        storage: Arc<dyn TensorStorage>,
        config: InterpreterConfig,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(Self {
            program,
            storage,
            config,
            plan,
            engine: OnceCell::new(),
            run_lock: Mutex::new(()),
            monitor: Mutex::new(RunMonitor::default()),
        })
    }

    /// Create an interpreter that reuses a stream plan already analyzed for
    /// `program`, typically taken from another core via [`Self::shared_stream_plan`]
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the plan covers a
    /// different number of instructions than the program
    pub fn with_stream_plan(
        program: Arc<Program>,
        plan: Arc<StreamPlan>,
        storage: Arc<dyn TensorStorage>,
        config: InterpreterConfig,
    ) -> RuntimeResult<Self> {
        if plan.instruction_count() != program.len() {
            return Err(ExecutionError::InvalidConfig {
                reason: format!(
                    "stream plan covers {} instructions, program {} has {}",
                    plan.instruction_count(),
                    program.name(),
                    program.len()
                ),
            });
        }
        Self::with_plan_cell(program, OnceCell::with_value(plan), storage, config)
    }

    /// The program
    #[must_use]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// The configuration
    #[must_use]
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Stream plan, analyzed on first use
    ///
    /// # Errors
    ///
    /// Returns error if the program's dependency graph cannot be built
    pub fn stream_plan(&self) -> RuntimeResult<&StreamPlan> {
        self.shared_plan().map(AsRef::as_ref)
    }

    /// Stream plan as a shareable handle, analyzed on first use
    ///
    /// # Errors
    ///
    /// Returns error if the program's dependency graph cannot be built
    pub fn shared_stream_plan(&self) -> RuntimeResult<Arc<StreamPlan>> {
        self.shared_plan().map(Arc::clone)
    }

    fn shared_plan(&self) -> RuntimeResult<&Arc<StreamPlan>> {
        self.plan
            .get_or_try_init(|| StreamAnalyzer::analyze(&self.program).map(Arc::new))
    }

    /// Whether the first run has built the execution state
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.engine.get().is_some()
    }

    /// Cumulative metrics
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.monitor.lock().metrics().clone()
    }

    /// Statistics of the last successful run
    #[must_use]
    pub fn last_stats(&self) -> Option<RunStats> {
        self.monitor.lock().last().cloned()
    }

    /// Storage accounting snapshot
    #[must_use]
    pub fn storage_stats(&self) -> StorageStats {
        self.storage.stats()
    }

    /// Run the program and return the fetches
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the run
    pub fn run(&self, feeds: IndexMap<String, Tensor>) -> RuntimeResult<IndexMap<String, Tensor>> {
        self.run_with_stats(feeds).map(|outcome| outcome.fetches)
    }

    /// Run the program and return fetches plus run statistics
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the run
    pub fn run_with_stats(&self, feeds: IndexMap<String, Tensor>) -> RuntimeResult<RunOutcome> {
        let _serial = self.run_lock.lock();
        let run_id = RunId::new();
        let span = tracing::info_span!(
            "run",
            run_id = %run_id,
            program = %self.program.name(),
            interpreter = %self.config.name
        );
        let _enter = span.enter();

        self.monitor.lock().start();
        let started = Instant::now();
        tracing::info!(instructions = self.program.len(), feeds = feeds.len(), "run started");

        let result = self.engine().and_then(|engine| {
            let fetches = engine.run(feeds)?;
            Ok((fetches, engine.stats(run_id, started)))
        });

        match result {
            Ok((fetches, stats)) => {
                tracing::info!(
                    executed = stats.instructions_executed,
                    events_recorded = stats.events_recorded,
                    released = stats.variables_released,
                    elapsed_us = u64::try_from(stats.elapsed.as_micros()).unwrap_or(u64::MAX),
                    "run finished"
                );
                self.monitor.lock().succeed(stats.clone());
                Ok(RunOutcome { fetches, stats })
            }
            Err(err) => {
                tracing::warn!(error = %err, "run failed");
                self.monitor.lock().fail();
                Err(err)
            }
        }
    }

    fn engine(&self) -> RuntimeResult<&Arc<Engine>> {
        self.engine.get_or_try_init(|| {
            let plan = Arc::clone(self.shared_plan()?);
            Engine::build(&self.program, plan, Arc::clone(&self.storage), &self.config).map(Arc::new)
        })
    }
}

impl Drop for InterpreterCore {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.get() {
            for (var, handle) in engine.scope.drain(|_| true) {
                if let Err(err) = engine.gc.release_stale(handle) {
                    tracing::warn!(%var, error = %err, "cannot release variable on shutdown");
                }
            }
        }
    }
}

impl fmt::Debug for InterpreterCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterCore")
            .field("program", &self.program.name())
            .field("config", &self.config)
            .field("prepared", &self.is_prepared())
            .finish_non_exhaustive()
    }
}

/// Execution state shared with worker tasks
struct Engine {
    program: Arc<Program>,
    plan: Arc<StreamPlan>,
    events: Arc<EventManager>,
    gc: GarbageCollector,
    scope: VariableScope,
    storage: Arc<dyn TensorStorage>,
    queue: WorkQueue,
    /// Lane per stream id
    lanes: Vec<LaneId>,
    gc_lane: Option<LaneId>,
    dependents: Vec<Vec<InstrId>>,
    dependency_counts: Vec<usize>,
    roots: Vec<InstrId>,
    /// Unmet dependencies per instruction in the current run
    pending: Vec<AtomicUsize>,
    executed: AtomicUsize,
    use_events: bool,
}

impl Engine {
    fn build(
        program: &Arc<Program>,
        plan: Arc<StreamPlan>,
        storage: Arc<dyn TensorStorage>,
        config: &InterpreterConfig,
    ) -> RuntimeResult<Self> {
        if !config.use_events && !plan.cross_edges().is_empty() {
            return Err(ExecutionError::InvalidConfig {
                reason: format!(
                    "events are disabled but the program has {} cross-stream edges",
                    plan.cross_edges().len()
                ),
            });
        }

        let graph = program.graph()?;
        let events = Arc::new(
            EventManager::new(plan.events(), program.len()).with_timeout(config.sync_timeout()),
        );

        let lane_names: Vec<String> = plan.streams().iter().map(ToString::to_string).collect();
        let mut builder = WorkQueue::builder();
        for (name, kind) in lane_names.iter().zip(plan.streams()) {
            let threads = if kind.is_host() { config.num_threads } else { 1 };
            builder = builder.lane(name.clone(), threads);
        }
        if config.gc_mode == GcMode::Deferred {
            builder = builder.cleanup_lane(GC_LANE, 1);
        }
        let poison = Arc::clone(&events);
        let queue = builder.on_abort(Arc::new(move || poison.poison_all())).build()?;

        let lanes = lane_names
            .iter()
            .map(|name| {
                queue.lane(name).ok_or_else(|| ExecutionError::InvalidConfig {
                    reason: format!("lane `{}` missing", name),
                })
            })
            .collect::<RuntimeResult<Vec<_>>>()?;
        let gc_lane = queue.lane(GC_LANE);

        let ids = (0..program.len()).map(InstrId::from_index);
        let dependents = ids.clone().map(|id| graph.dependents(id).to_vec()).collect();
        let dependency_counts: Vec<usize> = ids.map(|id| graph.dependency_count(id)).collect();

        tracing::debug!(
            lanes = queue.lane_count(),
            events = events.len(),
            host_threads = config.num_threads,
            gc_mode = ?config.gc_mode,
            "execution state prepared"
        );

        Ok(Self {
            program: Arc::clone(program),
            gc: GarbageCollector::new(program, Arc::clone(&storage), config.gc_mode),
            scope: VariableScope::new(program.variables().len()),
            pending: dependency_counts.iter().map(|&n| AtomicUsize::new(n)).collect(),
            roots: graph.roots(),
            dependency_counts,
            dependents,
            plan,
            events,
            storage,
            queue,
            lanes,
            gc_lane,
            executed: AtomicUsize::new(0),
            use_events: config.use_events,
        })
    }

    fn run(self: &Arc<Self>, feeds: IndexMap<String, Tensor>) -> RuntimeResult<IndexMap<String, Tensor>> {
        self.reset();
        if let Err(err) = self.teardown().and_then(|()| self.bind_feeds(feeds)) {
            // releases queued while binding still have to land
            if let Err(queued) = self.queue.wait_all() {
                tracing::debug!(error = %queued, "queued release failed after bind error");
            }
            return Err(err);
        }

        tracing::debug!(roots = self.roots.len(), "dispatching");
        self.dispatch(self.roots.clone());
        self.queue.wait_all()?;

        let executed = self.executed.load(Ordering::SeqCst);
        if executed != self.program.len() {
            return Err(ExecutionError::Incomplete {
                executed,
                total: self.program.len(),
            });
        }
        self.collect_fetches()
    }

    fn reset(&self) {
        self.events.reset();
        self.gc.reset();
        for (pending, count) in self.pending.iter().zip(&self.dependency_counts) {
            pending.store(*count, Ordering::SeqCst);
        }
        self.executed.store(0, Ordering::SeqCst);
    }

    /// Release whatever the previous run left behind, except persistables
    fn teardown(&self) -> RuntimeResult<()> {
        let stale = self.scope.drain(|var| {
            self.program.variable(var).is_none_or(|info| !info.persistable)
        });
        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), "releasing variables from previous run");
        }
        for (_, handle) in stale {
            self.gc.release_stale(handle)?;
        }
        Ok(())
    }

    fn bind_feeds(self: &Arc<Self>, feeds: IndexMap<String, Tensor>) -> RuntimeResult<()> {
        for name in feeds.keys() {
            let bindable = self
                .program
                .var_id(name)
                .and_then(|var| self.program.variable(var))
                .is_some_and(|info| info.is_feed || info.persistable);
            if !bindable {
                return Err(ExecutionError::UnknownFeed { name: name.clone() });
            }
        }
        for &var in self.program.feeds() {
            let name = self.var_name(var);
            if !feeds.contains_key(&name) {
                return Err(ExecutionError::MissingFeed { name });
            }
        }

        for (name, tensor) in feeds {
            let Some(var) = self.program.var_id(&name) else {
                return Err(ExecutionError::UnknownFeed { name });
            };
            self.store(var, tensor, Place::Cpu)?;
            if self.gc.is_dead_on_write(var) {
                self.collect(var)?;
            }
        }
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, ready: Vec<InstrId>) {
        let mut worklist: VecDeque<InstrId> = ready.into();
        while let Some(id) = worklist.pop_front() {
            if self.queue.is_aborted() {
                return;
            }
            let lane = self.lanes[self.plan.stream_of(id).index()];
            let engine = Arc::clone(self);
            if self.plan.is_host(id) {
                self.queue.submit(lane, Box::new(move || engine.run_host(id)));
            } else {
                self.queue.submit(lane, Box::new(move || engine.execute(id)));
                tracing::trace!(instruction = %id, stream = %self.plan.stream_of(id), "launched");
                worklist.extend(self.release_dependents(id));
            }
        }
    }

    fn run_host(self: &Arc<Self>, id: InstrId) -> RuntimeResult<()> {
        self.execute(id)?;
        let ready = self.release_dependents(id);
        self.dispatch(ready);
        Ok(())
    }

    /// Decrement the unmet counters of `id`'s dependents; returns those now ready
    fn release_dependents(&self, id: InstrId) -> Vec<InstrId> {
        self.dependents[id.index()]
            .iter()
            .copied()
            .filter(|dep| self.pending[dep.index()].fetch_sub(1, Ordering::AcqRel) == 1)
            .collect()
    }

    fn execute(self: &Arc<Self>, id: InstrId) -> RuntimeResult<()> {
        if self.queue.is_aborted() {
            return Err(ExecutionError::Cancelled);
        }
        let instr = &self.program.instructions()[id.index()];

        if self.use_events {
            for &event in self.plan.waits_for(id) {
                self.events.wait_before(id, event)?;
            }
        }

        let inputs = instr
            .inputs
            .iter()
            .map(|&var| {
                self.scope.read(var).ok_or_else(|| ExecutionError::DependencyViolation {
                    instruction: id,
                    variable: self.var_name(var),
                })
            })
            .collect::<RuntimeResult<Vec<_>>>()?;
        let args: Vec<&Tensor> = inputs.iter().map(AsRef::as_ref).collect();

        let outputs = instr.kernel.launch(&args, &instr.attrs).map_err(|source| {
            tracing::error!(instruction = %instr, error = %source, "kernel failed");
            ExecutionError::KernelExecution {
                instruction: id,
                op: instr.op.clone(),
                source,
            }
        })?;
        if outputs.len() != instr.outputs.len() {
            return Err(ExecutionError::KernelExecution {
                instruction: id,
                op: instr.op.clone(),
                source: KernelError::Arity {
                    expected: instr.outputs.len(),
                    got: outputs.len(),
                },
            });
        }

        let place = instr.device.place();
        for (&var, tensor) in instr.outputs.iter().zip(outputs) {
            self.store(var, tensor, place)?;
        }
        for &var in &instr.outputs {
            if self.gc.is_dead_on_write(var) {
                self.collect(var)?;
            }
        }
        for var in self.gc.on_instruction_finished(instr) {
            self.collect(var)?;
        }

        if self.use_events {
            self.events.record_after(id);
        }
        self.executed.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(instruction = %instr, "finished");
        Ok(())
    }

    /// Allocate storage for `tensor` and place it in `var`'s slot
    fn store(&self, var: VarId, tensor: Tensor, place: Place) -> RuntimeResult<()> {
        let handle = self
            .storage
            .allocate(tensor.byte_size(), place)
            .map_err(|err| match err {
                CoreError::CapacityExceeded { requested, available } => ExecutionError::ResourceExhaustion {
                    variable: self.var_name(var),
                    requested,
                    available,
                },
                other => ExecutionError::Core(other),
            })?;
        if let Some(previous) = self.scope.write(var, tensor, handle) {
            self.gc.release_stale(previous)?;
        }
        Ok(())
    }

    /// Take a dead variable out of its slot and release its storage
    fn collect(self: &Arc<Self>, var: VarId) -> RuntimeResult<()> {
        let Some(handle) = self.scope.take(var) else {
            return Ok(());
        };
        match self.gc_lane {
            Some(lane) => {
                let engine = Arc::clone(self);
                self.queue.submit(lane, Box::new(move || engine.gc.release(var, handle)));
                Ok(())
            }
            None => self.gc.release(var, handle),
        }
    }

    fn collect_fetches(&self) -> RuntimeResult<IndexMap<String, Tensor>> {
        self.program
            .fetches()
            .iter()
            .map(|&var| {
                let name = self.var_name(var);
                match self.scope.read(var) {
                    Some(tensor) => Ok((name, tensor.as_ref().clone())),
                    None => Err(ExecutionError::MissingFetch { name }),
                }
            })
            .collect()
    }

    fn stats(&self, run_id: RunId, started: Instant) -> RunStats {
        RunStats {
            run_id,
            instructions_executed: self.executed.load(Ordering::SeqCst),
            events_recorded: self.events.recorded(),
            events_waited: self.events.waited(),
            variables_released: self.gc.collected(),
            stale_released: self.gc.stale_released(),
            elapsed: started.elapsed(),
        }
    }

    fn var_name(&self, var: VarId) -> String {
        self.program
            .variable(var)
            .map_or_else(|| var.to_string(), |info| info.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::elementwise::reference_registry;
    use conduit_core::HostStorage;
    use conduit_program::{Compiler, OpDesc, ProgramDesc};

    fn compile(desc: &ProgramDesc) -> Arc<Program> {
        let registry = reference_registry().unwrap();
        Arc::new(Compiler::new().compile(desc, &registry).unwrap().program)
    }

    fn make_core(desc: &ProgramDesc, config: InterpreterConfig) -> (InterpreterCore, Arc<HostStorage>) {
        let storage = Arc::new(HostStorage::new());
        let core = InterpreterCore::new(compile(desc), storage.clone(), config).unwrap();
        (core, storage)
    }

    fn feeds(values: &[(&str, f32)]) -> IndexMap<String, Tensor> {
        values
            .iter()
            .map(|(name, value)| ((*name).to_string(), Tensor::scalar(*value)))
            .collect()
    }

    fn chain() -> ProgramDesc {
        ProgramDesc::new("chain")
            .feed("x")
            .fetch("z")
            .op(OpDesc::new("scale", &["x"], &["y"]).with_attr("factor", conduit_core::AttrValue::Float(3.0)))
            .op(OpDesc::new("add", &["y", "x"], &["z"]))
    }

    #[test]
    fn test_host_chain() {
        let (core, _) = make_core(&chain(), InterpreterConfig::new().with_threads(2));
        assert!(!core.is_prepared());
        let fetches = core.run(feeds(&[("x", 2.0)])).unwrap();
        assert!(core.is_prepared());
        assert_eq!(fetches["z"].as_slice::<f32>(), Some(&[8.0][..]));
    }

    #[test]
    fn test_missing_and_unknown_feeds() {
        let (core, _) = make_core(&chain(), InterpreterConfig::new().with_threads(1));
        assert_eq!(
            core.run(IndexMap::new()).unwrap_err(),
            ExecutionError::MissingFeed { name: "x".to_string() }
        );
        assert_eq!(
            core.run(feeds(&[("x", 1.0), ("y", 1.0)])).unwrap_err(),
            ExecutionError::UnknownFeed { name: "y".to_string() }
        );
        assert_eq!(core.metrics().runs_failed, 2);
        // still usable
        assert!(core.run(feeds(&[("x", 1.0)])).is_ok());
    }

    #[test]
    fn test_inline_gc_releases_without_lane() {
        let (core, storage) = make_core(
            &chain(),
            InterpreterConfig::new().with_threads(1).with_gc_mode(GcMode::Inline),
        );
        let outcome = core.run_with_stats(feeds(&[("x", 2.0)])).unwrap();
        // x and y are dead, z is fetched
        assert_eq!(outcome.stats.variables_released, 2);
        assert_eq!(storage.stats().live_handles, 1);
    }

    #[test]
    fn test_disabled_gc_keeps_until_next_run() {
        let (core, storage) = make_core(
            &chain(),
            InterpreterConfig::new().with_threads(1).with_gc_mode(GcMode::Disabled),
        );
        let first = core.run_with_stats(feeds(&[("x", 2.0)])).unwrap();
        assert_eq!(first.stats.variables_released, 0);
        assert_eq!(storage.stats().live_handles, 3);

        let second = core.run_with_stats(feeds(&[("x", 2.0)])).unwrap();
        assert_eq!(second.stats.stale_released, 3);
        assert_eq!(storage.stats().live_handles, 3);
    }

    #[test]
    fn test_events_disabled_rejects_cross_stream_program() {
        let desc = ProgramDesc::new("two_stream")
            .feed("a")
            .fetch("c")
            .op(OpDesc::new("assign", &["a"], &["b"]).on_stream(0, 0))
            .op(OpDesc::new("assign", &["b"], &["c"]).on_stream(0, 1));
        let (core, _) = make_core(&desc, InterpreterConfig::new().with_events(false));
        let err = core.run(feeds(&[("a", 1.0)])).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidConfig { .. }));
    }

    #[test]
    fn test_drop_releases_everything() {
        let storage = Arc::new(HostStorage::new());
        {
            let core = InterpreterCore::new(compile(&chain()), storage.clone(), InterpreterConfig::new()).unwrap();
            core.run(feeds(&[("x", 2.0)])).unwrap();
            assert!(storage.stats().live_handles > 0);
        }
        assert_eq!(storage.stats().live_handles, 0);
    }

    #[test]
    fn test_stream_plan_shared_between_cores() {
        let program = compile(&chain());
        let first = InterpreterCore::new(
            Arc::clone(&program),
            Arc::new(HostStorage::new()),
            InterpreterConfig::new(),
        )
        .unwrap();
        let plan = first.shared_stream_plan().unwrap();
        let second = InterpreterCore::with_stream_plan(
            Arc::clone(&program),
            Arc::clone(&plan),
            Arc::new(HostStorage::new()),
            InterpreterConfig::new(),
        )
        .unwrap();
        assert!(Arc::ptr_eq(&plan, &second.shared_stream_plan().unwrap()));
        assert!(Arc::ptr_eq(&plan, &first.shared_stream_plan().unwrap()));
    }

    #[test]
    fn test_stream_plan_for_other_program_rejected() {
        let donor = InterpreterCore::new(
            compile(&chain()),
            Arc::new(HostStorage::new()),
            InterpreterConfig::new(),
        )
        .unwrap();
        let plan = donor.shared_stream_plan().unwrap();
        let single = ProgramDesc::new("single")
            .feed("a")
            .fetch("b")
            .op(OpDesc::new("assign", &["a"], &["b"]));
        let err = InterpreterCore::with_stream_plan(
            compile(&single),
            plan,
            Arc::new(HostStorage::new()),
            InterpreterConfig::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidConfig { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = InterpreterCore::new(
            compile(&chain()),
            Arc::new(HostStorage::new()),
            InterpreterConfig::new().with_threads(0),
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidConfig { .. }));
    }
}
