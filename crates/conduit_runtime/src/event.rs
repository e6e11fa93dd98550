//! Cross-stream synchronization events.
//!
//! Each event is a one-shot flag per run: the producer records it once its
//! outputs are written, consumers block until it is set. Events are reset
//! at the start of every run. Aborting a run poisons every event so that
//! waiters wake up and give up instead of blocking forever.

use crate::error::{ExecutionError, RuntimeResult};
use crate::stream::EventSpec;
use conduit_core::{EventId, InstrId};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Event state within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Not recorded yet
    Unset,
    /// Recorded; waiters may proceed
    Set,
    /// Run aborted; waiters give up
    Poisoned,
}

struct Event {
    state: Mutex<EventState>,
    cond: Condvar,
}

impl Event {
    fn new() -> Self {
        Self {
            state: Mutex::new(EventState::Unset),
            cond: Condvar::new(),
        }
    }

    fn transition(&self, to: EventState) {
        let mut state = self.state.lock();
        *state = to;
        self.cond.notify_all();
    }
}

/// Owns the events of one stream plan
pub struct EventManager {
    events: Vec<Event>,
    by_producer: Vec<Vec<EventId>>,
    timeout: Option<Duration>,
    recorded: AtomicU64,
    waited: AtomicU64,
}

impl EventManager {
    /// Create the events described by `specs` for a program of
    /// `instruction_count` instructions
    #[must_use]
    pub fn new(specs: &[EventSpec], instruction_count: usize) -> Self {
        let mut by_producer = vec![Vec::new(); instruction_count];
        for spec in specs {
            if let Some(list) = by_producer.get_mut(spec.producer.index()) {
                list.push(spec.id);
            }
        }
        Self {
            events: specs.iter().map(|_| Event::new()).collect(),
            by_producer,
            timeout: None,
            recorded: AtomicU64::new(0),
            waited: AtomicU64::new(0),
        }
    }

    /// Bound every wait by `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set every event `instruction` produces; returns them
    pub fn record_after(&self, instruction: InstrId) -> &[EventId] {
        let ids = self
            .by_producer
            .get(instruction.index())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for id in ids {
            self.events[id.index()].transition(EventState::Set);
            tracing::trace!(%instruction, event = %id, "event recorded");
        }
        self.recorded.fetch_add(ids.len() as u64, Ordering::Relaxed);
        ids
    }

    /// Block `instruction` until `event` is set
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the event is poisoned while waiting and
    /// `SynchronizationTimeout` if the configured budget runs out
    pub fn wait_before(&self, instruction: InstrId, event: EventId) -> RuntimeResult<()> {
        let Some(slot) = self.events.get(event.index()) else {
            return Err(ExecutionError::InvalidConfig {
                reason: format!("{} is not part of the stream plan", event),
            });
        };
        self.waited.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let mut state = slot.state.lock();
        loop {
            match *state {
                EventState::Set => return Ok(()),
                EventState::Poisoned => return Err(ExecutionError::Cancelled),
                EventState::Unset => {}
            }
            match deadline {
                Some(deadline) => {
                    if slot.cond.wait_until(&mut state, deadline).timed_out() && *state == EventState::Unset {
                        let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                        return Err(ExecutionError::SynchronizationTimeout {
                            instruction,
                            event,
                            waited_ms,
                        });
                    }
                }
                None => slot.cond.wait(&mut state),
            }
        }
    }

    /// Return every event to `Unset` and zero the counters
    pub fn reset(&self) {
        for event in &self.events {
            *event.state.lock() = EventState::Unset;
        }
        self.recorded.store(0, Ordering::Relaxed);
        self.waited.store(0, Ordering::Relaxed);
    }

    /// Poison every event that is not set, waking all waiters
    pub fn poison_all(&self) {
        for event in &self.events {
            let mut state = event.state.lock();
            if *state == EventState::Unset {
                *state = EventState::Poisoned;
                event.cond.notify_all();
            }
        }
    }

    /// Current state of an event
    #[must_use]
    pub fn state(&self, event: EventId) -> Option<EventState> {
        self.events.get(event.index()).map(|e| *e.state.lock())
    }

    /// Events recorded since the last reset
    #[must_use]
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Waits issued since the last reset
    #[must_use]
    pub fn waited(&self) -> u64 {
        self.waited.load(Ordering::Relaxed)
    }

    /// Number of events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether there are no events
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("events", &self.events.len())
            .field("timeout", &self.timeout)
            .field("recorded", &self.recorded())
            .field("waited", &self.waited())
            .finish()
    }
}
