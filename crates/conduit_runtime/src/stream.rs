//! Stream assignment and cross-stream event planning.
//!
//! Every instruction runs on exactly one stream: the host stream for host
//! contexts, a compute stream per `(device, stream)` pair, or the device's
//! communication stream for communication instructions. A dependency edge
//! whose endpoints sit on different streams needs an event; the producer
//! records it once per consumer stream, however many consumers that stream
//! holds.

use crate::error::RuntimeResult;
use conduit_core::{EventId, InstrId, Place, StreamId};
use conduit_program::{InstrKind, Instruction, Program};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// What a stream executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Host worker pool
    Host,
    /// Compute stream on a device
    Compute {
        /// Device ordinal
        device: u32,
        /// Stream ordinal
        stream: u32,
    },
    /// Communication stream of a device
    Communication {
        /// Device ordinal
        device: u32,
    },
}

impl StreamKind {
    /// Stream an instruction belongs to
    #[must_use]
    pub fn of(instr: &Instruction) -> Self {
        let Some(stream) = instr.device.stream() else {
            return Self::Host;
        };
        let device = match instr.device.place() {
            Place::Device(device) => device,
            Place::Cpu => 0,
        };
        if instr.kind == InstrKind::Communication {
            Self::Communication { device }
        } else {
            Self::Compute { device, stream }
        }
    }

    /// Whether this is the host stream
    #[must_use]
    pub const fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Compute { device, stream } => write!(f, "device:{}/stream:{}", device, stream),
            Self::Communication { device } => write!(f, "device:{}/comm", device),
        }
    }
}

/// A pre-allocated event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventSpec {
    /// Event id
    pub id: EventId,
    /// Instruction that records the event
    pub producer: InstrId,
    /// Stream whose instructions wait on it
    pub consumer_stream: StreamId,
}

/// A dependency edge between different streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrossEdge {
    /// Producer
    pub from: InstrId,
    /// Consumer
    pub to: InstrId,
    /// Event the consumer waits on
    pub event: EventId,
}

/// Result of stream analysis; immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamPlan {
    /// Stream table; `StreamId` indexes it and the host stream is always first
    streams: Vec<StreamKind>,
    /// Stream per instruction
    assignment: Vec<StreamId>,
    /// Event table; `EventId` indexes it
    events: Vec<EventSpec>,
    /// Events to wait on before each instruction
    waits: Vec<Vec<EventId>>,
    /// Events each instruction records
    records: Vec<Vec<EventId>>,
    /// Cross-stream edges in (from, to) order
    cross_edges: Vec<CrossEdge>,
}

impl StreamPlan {
    /// Host stream id
    pub const HOST: StreamId = StreamId::from_raw(0);

    /// Stream of an instruction
    ///
    /// # Panics
    ///
    /// Panics if `instr` is not part of the analyzed program
    #[must_use]
    pub fn stream_of(&self, instr: InstrId) -> StreamId {
        self.assignment[instr.index()]
    }

    /// Kind of a stream
    #[must_use]
    pub fn stream_kind(&self, stream: StreamId) -> Option<StreamKind> {
        self.streams.get(stream.index()).copied()
    }

    /// All streams, host first
    #[must_use]
    pub fn streams(&self) -> &[StreamKind] {
        &self.streams
    }

    /// Whether the instruction runs on the host stream
    #[must_use]
    pub fn is_host(&self, instr: InstrId) -> bool {
        self.stream_of(instr) == Self::HOST
    }

    /// Whether the edge `from -> to` crosses streams
    #[must_use]
    pub fn is_cross_stream(&self, from: InstrId, to: InstrId) -> bool {
        self.stream_of(from) != self.stream_of(to)
    }

    /// Events `instr` waits on
    #[must_use]
    pub fn waits_for(&self, instr: InstrId) -> &[EventId] {
        self.waits.get(instr.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Events `instr` records
    #[must_use]
    pub fn records_after(&self, instr: InstrId) -> &[EventId] {
        self.records.get(instr.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Event table
    #[must_use]
    pub fn events(&self) -> &[EventSpec] {
        &self.events
    }

    /// Cross-stream edges
    #[must_use]
    pub fn cross_edges(&self) -> &[CrossEdge] {
        &self.cross_edges
    }

    /// Number of streams
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Number of events
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Number of analyzed instructions
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.assignment.len()
    }
}

/// Builds a [`StreamPlan`] from a program's dependency graph
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamAnalyzer;

impl StreamAnalyzer {
    /// Analyze `program`; deterministic for a given program
    ///
    /// # Errors
    ///
    /// Returns error if the program's dependency graph cannot be built
    pub fn analyze(program: &Program) -> RuntimeResult<StreamPlan> {
        let graph = program.graph()?;
        let kinds: Vec<StreamKind> = program.instructions().iter().map(StreamKind::of).collect();

        let mut table: BTreeSet<StreamKind> = kinds.iter().copied().collect();
        table.insert(StreamKind::Host);
        let streams: Vec<StreamKind> = table.into_iter().collect();
        let index: BTreeMap<StreamKind, StreamId> = streams
            .iter()
            .enumerate()
            .map(|(i, kind)| (*kind, StreamId::from_index(i)))
            .collect();
        let assignment: Vec<StreamId> = kinds.iter().map(|kind| index[kind]).collect();

        let mut events = Vec::new();
        let mut by_pair: BTreeMap<(InstrId, StreamId), EventId> = BTreeMap::new();
        let mut waits = vec![Vec::new(); assignment.len()];
        let mut records = vec![Vec::new(); assignment.len()];
        let mut cross_edges = Vec::new();

        for (from, to) in graph.edges() {
            let consumer_stream = assignment[to.index()];
            if assignment[from.index()] == consumer_stream {
                continue;
            }
            let event = *by_pair.entry((from, consumer_stream)).or_insert_with(|| {
                let id = EventId::from_index(events.len());
                events.push(EventSpec {
                    id,
                    producer: from,
                    consumer_stream,
                });
                records[from.index()].push(id);
                id
            });
            if !waits[to.index()].contains(&event) {
                waits[to.index()].push(event);
            }
            cross_edges.push(CrossEdge { from, to, event });
        }

        tracing::debug!(
            program = %program.name(),
            streams = streams.len(),
            events = events.len(),
            cross_edges = cross_edges.len(),
            "stream plan built"
        );

        Ok(StreamPlan {
            streams,
            assignment,
            events,
            waits,
            records,
            cross_edges,
        })
    }
}
