//! The scheduler.
//!
//! Each cycle scans the active sources in agenda order (priority descending,
//! then declaration order), and fires the first applicable rule of the first
//! ready source that has one. A source whose trigger holds but whose rules are
//! all inapplicable is passed over in favour of the next ready source. The loop
//! halts when a `Quit` stops the controller, when a full scan fires nothing,
//! or on the first error.

use std::cmp::Reverse;
use std::time::Duration;

use serde::Serialize;

use crate::action::{ActionContext, ActionEffect};
use crate::blackboard::{Blackboard, BlackboardSnapshot};
use crate::cancel::CancelToken;
use crate::client::Client;
use crate::config::EngineConfig;
use crate::error::{KbsError, Result};
use crate::source::{KnowledgeSource, SourceId};
use crate::symbol::SymbolTable;
use crate::trace::{TraceEvent, TraceKind, TraceSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Scanning,
    Firing,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HaltReason {
    /// A `Quit` action stopped the controller.
    Quit,
    /// A full scan found no rule to fire.
    Exhausted,
}

impl HaltReason {
    pub fn name(self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Firing {
    pub cycle: u64,
    pub source: String,
    pub rule: String,
}

/// Outcome of a run that halted normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub cycles: u64,
    pub firings: Vec<Firing>,
    pub halt: HaltReason,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "Cycles: {}, Firings: {}, Halt: {}",
            self.cycles,
            self.firings.len(),
            self.halt.name()
        )
    }

    /// `source/rule` of every firing, in order.
    pub fn fired_rules(&self) -> Vec<String> {
        self.firings
            .iter()
            .map(|firing| format!("{}/{}", firing.source, firing.rule))
            .collect()
    }
}

/// Borrowed collaborators for one run.
pub struct RunContext<'a> {
    pub symbols: &'a SymbolTable,
    pub client: &'a mut dyn Client,
    pub trace: &'a mut dyn TraceSink,
    pub cancel: &'a CancelToken,
}

pub struct Controller {
    blackboard: Blackboard,
    sources: Vec<KnowledgeSource>,
    agenda: Vec<SourceId>,
    active: Vec<bool>,
    state: ControllerState,
    max_cycles: u64,
    query_deadline: Option<Duration>,
}

impl Controller {
    pub fn new(blackboard: Blackboard, sources: Vec<KnowledgeSource>) -> Self {
        let mut agenda: Vec<SourceId> = (0..sources.len()).map(SourceId).collect();
        agenda.sort_by_key(|id| (Reverse(sources[id.0].priority), id.0));
        let defaults = EngineConfig::default();
        Self {
            blackboard,
            active: vec![true; sources.len()],
            sources,
            agenda,
            state: ControllerState::Idle,
            max_cycles: defaults.max_cycles,
            query_deadline: defaults.query_timeout(),
        }
    }

    pub fn configure(&mut self, config: &EngineConfig) {
        self.max_cycles = config.max_cycles;
        self.query_deadline = config.query_timeout();
    }

    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    pub fn snapshot(&self) -> BlackboardSnapshot {
        self.blackboard.snapshot()
    }

    pub fn sources(&self) -> &[KnowledgeSource] {
        &self.sources
    }

    pub fn source(&self, id: SourceId) -> Option<&KnowledgeSource> {
        self.sources.get(id.0)
    }

    /// Sources in the order a scan visits them.
    pub fn agenda(&self) -> &[SourceId] {
        &self.agenda
    }

    pub fn is_active(&self, id: SourceId) -> bool {
        self.active.get(id.0).copied().unwrap_or(false)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Active sources whose trigger currently holds, in agenda order.
    pub fn ready_sources(&self) -> Result<Vec<SourceId>> {
        let mut ready = Vec::new();
        for &id in &self.agenda {
            if self.active[id.0] && self.sources[id.0].is_ready(&self.blackboard)?.is_some() {
                ready.push(id);
            }
        }
        Ok(ready)
    }

    /// Restore declared defaults and reactivate every source.
    pub fn reset(&mut self) {
        self.blackboard.reset();
        self.active.iter_mut().for_each(|active| *active = true);
        self.state = ControllerState::Idle;
    }

    /// Run until halted. Errors abort the firing in progress without undoing
    /// what its earlier actions already did.
    pub fn execute(&mut self, ctx: RunContext<'_>) -> Result<RunReport> {
        let RunContext {
            symbols,
            client,
            trace,
            cancel,
        } = ctx;

        tracing::info!(sources = self.sources.len(), "controller started");
        let mut cycles = 0;
        let mut firings = Vec::new();
        let outcome = self.run(symbols, client, trace, cancel, &mut cycles, &mut firings);
        self.state = ControllerState::Halted;

        match outcome {
            Ok(halt) => {
                trace.emit(TraceEvent::new(
                    cycles,
                    TraceKind::Halted {
                        reason: halt.name().to_string(),
                    },
                ));
                let report = RunReport {
                    cycles,
                    firings,
                    halt,
                };
                tracing::info!(summary = %report.summary(), "controller halted");
                Ok(report)
            }
            Err(err) => {
                trace.emit(TraceEvent::new(
                    cycles,
                    TraceKind::Halted {
                        reason: err.to_string(),
                    },
                ));
                tracing::warn!(cycle = cycles, error = %err, "firing aborted, controller halted");
                Err(err)
            }
        }
    }

    fn run(
        &mut self,
        symbols: &SymbolTable,
        client: &mut dyn Client,
        trace: &mut dyn TraceSink,
        cancel: &CancelToken,
        cycles: &mut u64,
        firings: &mut Vec<Firing>,
    ) -> Result<HaltReason> {
        loop {
            if cancel.is_cancelled() {
                return Err(KbsError::Cancelled);
            }
            if self.max_cycles > 0 && *cycles >= self.max_cycles {
                return Err(KbsError::CycleLimit(self.max_cycles));
            }
            *cycles += 1;
            let cycle = *cycles;

            self.state = ControllerState::Scanning;
            let Some((owner, rule, effects)) = self.fire_next(cycle, symbols, client, trace)? else {
                return Ok(HaltReason::Exhausted);
            };
            firings.push(Firing {
                cycle,
                source: self.sources[owner.0].name.clone(),
                rule,
            });

            let mut halt = false;
            for effect in effects {
                match effect {
                    ActionEffect::Continue => {}
                    ActionEffect::Deactivate(id) => self.deactivate(id, cycle, trace),
                    ActionEffect::Halt => halt = true,
                }
            }
            if halt {
                return Ok(HaltReason::Quit);
            }
        }
    }

    /// One scan. Returns the firing source, the fired rule's name and the
    /// effects its actions requested, or `None` when nothing fired.
    fn fire_next(
        &mut self,
        cycle: u64,
        symbols: &SymbolTable,
        client: &mut dyn Client,
        trace: &mut dyn TraceSink,
    ) -> Result<Option<(SourceId, String, Vec<ActionEffect>)>> {
        for index in 0..self.agenda.len() {
            let id = self.agenda[index];
            if !self.active[id.0] {
                continue;
            }
            let source = &self.sources[id.0];
            let Some(trigger) = source.is_ready(&self.blackboard)? else {
                continue;
            };
            tracing::debug!(cycle, source = %source.name, "source ready");
            trace.emit(TraceEvent::new(
                cycle,
                TraceKind::Ready {
                    source: source.name.clone(),
                },
            ));

            self.state = ControllerState::Firing;
            for rule in source.rules() {
                let mut ctx = ActionContext {
                    blackboard: &mut self.blackboard,
                    symbols,
                    client: &mut *client,
                    trace: &mut *trace,
                    cycle,
                    owner: id,
                    owner_name: &source.name,
                    default_deadline: self.query_deadline,
                };
                if let Some(effects) = rule.try_fire(&trigger.bindings, &mut ctx)? {
                    return Ok(Some((id, rule.name.clone(), effects)));
                }
            }
            tracing::debug!(cycle, source = %source.name, "no applicable rule, falling through");
            self.state = ControllerState::Scanning;
        }
        Ok(None)
    }

    fn deactivate(&mut self, id: SourceId, cycle: u64, trace: &mut dyn TraceSink) {
        let Some(active) = self.active.get_mut(id.0) else {
            return;
        };
        *active = false;
        let name = self.sources[id.0].name.clone();
        tracing::debug!(cycle, source = %name, "source deactivated");
        trace.emit(TraceEvent::new(cycle, TraceKind::Deactivated { source: name }));
    }
}
