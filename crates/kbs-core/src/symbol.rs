//! String interning.
//!
//! Entries, attributes, values and variables are all referred to by [`Symbol`],
//! so equality checks during matching are integer comparisons.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KbsError, Result};

/// Opaque handle for an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(u32);

impl Symbol {
    /// The "unknown" value every table interns first.
    pub const UNKNOWN: Symbol = Symbol(0);

    pub const fn id(self) -> u32 {
        self.0
    }

    /// Symbol for the table slot `index`. Tables hold fewer than `u32::MAX`
    /// names: debug builds panic at the limit, release builds hand out the
    /// last id again.
    fn at(index: usize) -> Self {
        debug_assert!(index < u32::MAX as usize, "symbol table is full");
        Symbol(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Append-only, two-way mapping between strings and symbols.
///
/// Not synchronized: only the thread that owns the controller touches it.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    names: Vec<String>,
    ids: HashMap<String, Symbol>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub const UNKNOWN_NAME: &'static str = "unknown";

    pub fn new() -> Self {
        let mut table = Self {
            names: Vec::new(),
            ids: HashMap::new(),
        };
        let unknown = table.put(Self::UNKNOWN_NAME);
        debug_assert_eq!(unknown, Symbol::UNKNOWN);
        table
    }

    /// Intern `name`, returning the existing symbol when it was seen before.
    pub fn put(&mut self, name: &str) -> Symbol {
        if let Some(symbol) = self.ids.get(name) {
            return *symbol;
        }
        let symbol = Symbol::at(self.names.len());
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), symbol);
        symbol
    }

    pub fn get(&self, symbol: Symbol) -> Result<&str> {
        self.names
            .get(symbol.0 as usize)
            .map(String::as_str)
            .ok_or(KbsError::UnknownSymbol(symbol.0))
    }

    /// Look up a string without interning it.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.ids.get(name).copied()
    }

    /// Name of `symbol`, or its numeric form when it was never allocated.
    pub fn display(&self, symbol: Symbol) -> String {
        match self.get(symbol) {
            Ok(name) => name.to_string(),
            Err(_) => symbol.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
