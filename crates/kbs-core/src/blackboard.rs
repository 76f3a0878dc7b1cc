//! The shared fact store.
//!
//! A [`Blackboard`] is a fixed set of named levels declared at setup time. Each
//! [`BlackboardLevel`] maps attribute symbols to value symbols. Only the
//! controller holds a mutable blackboard while a run is in progress; everyone
//! else reads through `&Blackboard` or a [`BlackboardSnapshot`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{KbsError, Result};
use crate::symbol::{Symbol, SymbolTable};

/// An `attribute = value` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub attribute: Symbol,
    pub value: Symbol,
}

impl Fact {
    pub const fn new(attribute: Symbol, value: Symbol) -> Self {
        Self { attribute, value }
    }
}

/// One named partition of the blackboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlackboardLevel {
    defaults: BTreeMap<Symbol, Symbol>,
    values: BTreeMap<Symbol, Symbol>,
}

impl BlackboardLevel {
    /// Seed a level from its declared `(attribute, default)` pairs.
    pub fn new(defaults: impl IntoIterator<Item = Fact>) -> Self {
        let defaults: BTreeMap<Symbol, Symbol> = defaults
            .into_iter()
            .map(|fact| (fact.attribute, fact.value))
            .collect();
        Self {
            values: defaults.clone(),
            defaults,
        }
    }

    /// Current value of `attribute`; [`Symbol::UNKNOWN`] when it was never set
    /// nor declared.
    pub fn get(&self, attribute: Symbol) -> Symbol {
        self.values
            .get(&attribute)
            .copied()
            .unwrap_or(Symbol::UNKNOWN)
    }

    pub fn contains(&self, attribute: Symbol) -> bool {
        self.values.contains_key(&attribute)
    }

    /// Overwrite unconditionally.
    pub fn set(&mut self, attribute: Symbol, value: Symbol) {
        self.values.insert(attribute, value);
    }

    /// Restore the declared defaults, forgetting undeclared attributes.
    pub fn reset(&mut self) {
        self.values = self.defaults.clone();
    }

    pub fn facts(&self) -> impl Iterator<Item = Fact> + '_ {
        self.values
            .iter()
            .map(|(attribute, value)| Fact::new(*attribute, *value))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blackboard {
    levels: BTreeMap<Symbol, BlackboardLevel>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a level. Intended for setup; redeclaring replaces the level.
    pub fn declare(&mut self, entry: Symbol, level: BlackboardLevel) {
        self.levels.insert(entry, level);
    }

    pub fn with_level(mut self, entry: Symbol, level: BlackboardLevel) -> Self {
        self.declare(entry, level);
        self
    }

    pub fn contains(&self, entry: Symbol) -> bool {
        self.levels.contains_key(&entry)
    }

    pub fn level(&self, entry: Symbol) -> Result<&BlackboardLevel> {
        self.levels.get(&entry).ok_or(KbsError::NoSuchLevel(entry))
    }

    pub(crate) fn level_mut(&mut self, entry: Symbol) -> Result<&mut BlackboardLevel> {
        self.levels
            .get_mut(&entry)
            .ok_or(KbsError::NoSuchLevel(entry))
    }

    pub fn entries(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.levels.keys().copied()
    }

    pub fn reset(&mut self) {
        for level in self.levels.values_mut() {
            level.reset();
        }
    }

    pub fn snapshot(&self) -> BlackboardSnapshot {
        BlackboardSnapshot {
            levels: self
                .levels
                .iter()
                .map(|(entry, level)| (*entry, level.values.clone()))
                .collect(),
        }
    }
}

/// Detached, read-only copy of the blackboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackboardSnapshot {
    pub levels: BTreeMap<Symbol, BTreeMap<Symbol, Symbol>>,
}

impl BlackboardSnapshot {
    pub fn get(&self, entry: Symbol, attribute: Symbol) -> Option<Symbol> {
        self.levels.get(&entry)?.get(&attribute).copied()
    }

    /// Resolve every symbol to its name.
    pub fn render(&self, symbols: &SymbolTable) -> BTreeMap<String, BTreeMap<String, String>> {
        self.levels
            .iter()
            .map(|(entry, facts)| {
                let facts = facts
                    .iter()
                    .map(|(attribute, value)| {
                        (symbols.display(*attribute), symbols.display(*value))
                    })
                    .collect();
                (symbols.display(*entry), facts)
            })
            .collect()
    }
}
