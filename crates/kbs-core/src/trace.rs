use serde::{Deserialize, Serialize};

/// A single step of a run, recorded as plain data so tooling can render it
/// after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub cycle: u64,
    #[serde(flatten)]
    pub kind: TraceKind,
}

impl TraceEvent {
    pub fn new(cycle: u64, kind: TraceKind) -> Self {
        Self { cycle, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceKind {
    Ready { source: String },
    Fired { source: String, rule: String },
    Modified { entry: String, attribute: String, value: String },
    Asked { question: String, options: Vec<String> },
    Answered { label: String, value: String },
    Wrote { message: String },
    Deactivated { source: String },
    Halted { reason: String },
}

pub trait TraceSink {
    fn emit(&mut self, event: TraceEvent);
}

#[derive(Debug, Default)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn emit(&mut self, _event: TraceEvent) {}
}

#[derive(Debug, Default)]
pub struct VecTraceSink {
    pub events: Vec<TraceEvent>,
}

impl TraceSink for VecTraceSink {
    fn emit(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}

impl<S: TraceSink + ?Sized> TraceSink for Box<S> {
    fn emit(&mut self, event: TraceEvent) {
        (**self).emit(event);
    }
}
