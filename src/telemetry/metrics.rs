//! Pipeline phase timing
//!
//! Records how long each phase of a rank's run took, so slow ranks and slow
//! transfers show up in the logs and in the coordinator's summary.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Phases of a rank's run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Partition,
    Exchange,
    Render,
    Transport,
    Composite,
    Output,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Partition => "partition",
            Phase::Exchange => "exchange",
            Phase::Render => "render",
            Phase::Transport => "transport",
            Phase::Composite => "composite",
            Phase::Output => "output",
        }
    }

    pub fn all() -> &'static [Phase] {
        &[
            Phase::Partition,
            Phase::Exchange,
            Phase::Render,
            Phase::Transport,
            Phase::Composite,
            Phase::Output,
        ]
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-phase durations in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseTimings {
    pub partition_ms: f64,
    pub exchange_ms: f64,
    pub render_ms: f64,
    pub transport_ms: f64,
    pub composite_ms: f64,
    pub output_ms: f64,
}

impl PhaseTimings {
    fn slot(&mut self, phase: Phase) -> &mut f64 {
        match phase {
            Phase::Partition => &mut self.partition_ms,
            Phase::Exchange => &mut self.exchange_ms,
            Phase::Render => &mut self.render_ms,
            Phase::Transport => &mut self.transport_ms,
            Phase::Composite => &mut self.composite_ms,
            Phase::Output => &mut self.output_ms,
        }
    }

    pub fn get(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Partition => self.partition_ms,
            Phase::Exchange => self.exchange_ms,
            Phase::Render => self.render_ms,
            Phase::Transport => self.transport_ms,
            Phase::Composite => self.composite_ms,
            Phase::Output => self.output_ms,
        }
    }

    pub fn total_ms(&self) -> f64 {
        Phase::all().iter().map(|&p| self.get(p)).sum()
    }
}

/// Wall-clock profiler for the phases of one rank
pub struct PhaseProfiler {
    rank: usize,
    timings: PhaseTimings,
    current: Option<(Phase, Instant)>,
}

impl PhaseProfiler {
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            timings: PhaseTimings::default(),
            current: None,
        }
    }

    /// Start timing `phase`, closing whichever phase was running
    pub fn begin(&mut self, phase: Phase) {
        self.finish();
        tracing::debug!(rank = self.rank, phase = phase.name(), "Phase started");
        self.current = Some((phase, Instant::now()));
    }

    /// Close the running phase, if any; repeated phases accumulate
    pub fn finish(&mut self) {
        if let Some((phase, start)) = self.current.take() {
            let elapsed = start.elapsed();
            *self.timings.slot(phase) += millis(elapsed);
            tracing::info!(
                rank = self.rank,
                phase = phase.name(),
                elapsed_ms = millis(elapsed),
                "Phase complete"
            );
        }
    }

    /// Timings so far, including the running phase up to now
    pub fn timings(&self) -> PhaseTimings {
        let mut timings = self.timings.clone();
        if let Some((phase, start)) = self.current {
            *timings.slot(phase) += millis(start.elapsed());
        }
        timings
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
