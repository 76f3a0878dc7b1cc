//! Pattern matching over the blackboard.
//!
//! Triggers and rule conditions are a [`Disjunction`] of [`Conjunction`]s of
//! [`Condition`]s. Matching walks the conjunctions in declaration order and
//! stops at the first one whose every condition holds; there is no search for
//! a better or more specific match.

use std::collections::BTreeMap;

use crate::blackboard::{Blackboard, Fact};
use crate::error::{KbsError, Result};
use crate::symbol::Symbol;

/// A pattern variable. Variables are interned like any other name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(pub Symbol);

/// Variable bindings produced by a match, scoped to a single firing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: BTreeMap<Var, Symbol>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: Var) -> Option<Symbol> {
        self.values.get(&var).copied()
    }

    pub fn resolve(&self, var: Var) -> Result<Symbol> {
        self.get(var).ok_or(KbsError::UnboundVariable(var.0))
    }

    /// Bind `var`, replacing any earlier value.
    pub fn bind(&mut self, var: Var, value: Symbol) {
        self.values.insert(var, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Var, Symbol)> + '_ {
        self.values.iter().map(|(var, value)| (*var, *value))
    }
}

/// Which blackboard level a condition or a modification addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPattern {
    /// A concrete entry, optionally bound to a variable for later reuse. If the
    /// variable is already bound, its value wins over `entry`.
    Named { entry: Symbol, bind: Option<Var> },
    /// An entry previously bound by another condition.
    Bound(Var),
}

impl EntryPattern {
    pub fn named(entry: Symbol) -> Self {
        Self::Named { entry, bind: None }
    }

    pub fn bound(var: Var) -> Self {
        Self::Bound(var)
    }

    /// Resolve without binding anything.
    pub fn resolve(&self, bindings: &Bindings) -> Result<Symbol> {
        match *self {
            Self::Named { entry, bind } => {
                Ok(bind.and_then(|var| bindings.get(var)).unwrap_or(entry))
            }
            Self::Bound(var) => bindings.resolve(var),
        }
    }

    fn resolve_binding(&self, bindings: &mut Bindings) -> Result<Symbol> {
        let entry = self.resolve(bindings)?;
        if let Self::Named {
            bind: Some(var), ..
        } = *self
        {
            if bindings.get(var).is_none() {
                bindings.bind(var, entry);
            }
        }
        Ok(entry)
    }
}

/// Capture the current value of `attribute` into `var`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub attribute: Symbol,
    pub var: Var,
}

/// One `(entry, attribute pattern)` test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub entry: EntryPattern,
    /// Attributes that must hold exactly these values.
    pub constants: Vec<Fact>,
    pub captures: Vec<Capture>,
}

impl Condition {
    pub fn on(entry: Symbol) -> Self {
        Self::with_entry(EntryPattern::named(entry))
    }

    pub fn on_bound(var: Var) -> Self {
        Self::with_entry(EntryPattern::bound(var))
    }

    pub fn with_entry(entry: EntryPattern) -> Self {
        Self {
            entry,
            constants: Vec::new(),
            captures: Vec::new(),
        }
    }

    /// Bind the matched entry to `var`. Ignored for [`EntryPattern::Bound`].
    pub fn bind(mut self, var: Var) -> Self {
        if let EntryPattern::Named { bind, .. } = &mut self.entry {
            *bind = Some(var);
        }
        self
    }

    pub fn is(mut self, attribute: Symbol, value: Symbol) -> Self {
        self.constants.push(Fact::new(attribute, value));
        self
    }

    pub fn capture(mut self, attribute: Symbol, var: Var) -> Self {
        self.captures.push(Capture { attribute, var });
        self
    }

    fn evaluate(&self, blackboard: &Blackboard, bindings: &mut Bindings) -> Result<bool> {
        let entry = self.entry.resolve_binding(bindings)?;
        let level = blackboard.level(entry)?;

        if self
            .constants
            .iter()
            .any(|fact| level.get(fact.attribute) != fact.value)
        {
            return Ok(false);
        }

        for capture in &self.captures {
            bindings.bind(capture.var, level.get(capture.attribute));
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conjunction {
    pub conditions: Vec<Condition>,
}

impl Conjunction {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    fn evaluate(&self, blackboard: &Blackboard, bindings: &mut Bindings) -> Result<bool> {
        for condition in &self.conditions {
            if !condition.evaluate(blackboard, bindings)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl FromIterator<Condition> for Conjunction {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A successful match: the index of the satisfying conjunction and the
/// accumulated bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub conjunction: usize,
    pub bindings: Bindings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disjunction {
    pub conjunctions: Vec<Conjunction>,
}

impl Disjunction {
    pub fn new(conjunctions: Vec<Conjunction>) -> Self {
        Self { conjunctions }
    }

    /// A single conjunction of conditions.
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::new(vec![Conjunction::new(conditions)])
    }

    /// Matches unconditionally (one empty conjunction).
    pub fn always() -> Self {
        Self::new(vec![Conjunction::default()])
    }

    /// Evaluate against `blackboard`, seeding every conjunction with a copy of
    /// `parent`. Returns the first satisfying conjunction, if any.
    pub fn matches(&self, blackboard: &Blackboard, parent: &Bindings) -> Result<Option<Match>> {
        for (index, conjunction) in self.conjunctions.iter().enumerate() {
            let mut bindings = parent.clone();
            if conjunction.evaluate(blackboard, &mut bindings)? {
                return Ok(Some(Match {
                    conjunction: index,
                    bindings,
                }));
            }
        }
        Ok(None)
    }
}
