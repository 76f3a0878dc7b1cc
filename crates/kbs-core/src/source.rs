//! Knowledge sources and their rules.
//!
//! Matching happens at two levels: a source's trigger decides whether the
//! source is ready at all, then each rule refines the trigger's bindings with
//! its own conditions. Many rules can share one trigger evaluation this way.

use std::fmt;

use crate::action::{Action, ActionContext, ActionEffect};
use crate::blackboard::Blackboard;
use crate::error::Result;
use crate::pattern::{Bindings, Disjunction, Match};
use crate::trace::{TraceEvent, TraceKind};

/// Position of a source in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub usize);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ks{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub conditions: Disjunction,
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(name: impl Into<String>, conditions: Disjunction, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            conditions,
            actions,
        }
    }

    /// Evaluate this rule's own conditions on top of the trigger's bindings.
    pub fn matches(&self, blackboard: &Blackboard, parent: &Bindings) -> Result<Option<Match>> {
        self.conditions.matches(blackboard, parent)
    }

    /// Fire if applicable. Actions run strictly in order and all of them run
    /// even when one asks to quit; the effects are returned for the controller
    /// to apply once the firing is complete. `Ok(None)` means the conditions
    /// did not hold.
    pub(crate) fn try_fire(
        &self,
        parent: &Bindings,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Option<Vec<ActionEffect>>> {
        let Some(matched) = self.matches(ctx.blackboard, parent)? else {
            return Ok(None);
        };
        tracing::debug!(
            cycle = ctx.cycle,
            source = %ctx.owner_name,
            rule = %self.name,
            "rule fired"
        );
        ctx.trace.emit(TraceEvent::new(
            ctx.cycle,
            TraceKind::Fired {
                source: ctx.owner_name.to_string(),
                rule: self.name.clone(),
            },
        ));

        let mut bindings = matched.bindings;
        let mut effects = Vec::new();
        for action in &self.actions {
            match action.execute(ctx, &mut bindings)? {
                ActionEffect::Continue => {}
                effect => effects.push(effect),
            }
        }
        Ok(Some(effects))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeSource {
    pub name: String,
    /// Higher runs first. Only orders ready sources; never preempts a firing.
    pub priority: i32,
    pub trigger: Disjunction,
    rules: Vec<Rule>,
}

impl KnowledgeSource {
    pub fn new(name: impl Into<String>, trigger: Disjunction) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            trigger,
            rules: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.add_rule(rule);
        self
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run the trigger against the blackboard.
    pub fn is_ready(&self, blackboard: &Blackboard) -> Result<Option<Match>> {
        self.trigger.matches(blackboard, &Bindings::new())
    }
}
