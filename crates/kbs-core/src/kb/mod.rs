//! Declarative knowledge bases.
//!
//! A [`KnowledgeBaseDef`] is the data form of a [`KnowledgeBase`]: it can be
//! loaded from YAML, checked for authoring mistakes and compiled into the
//! blackboard and knowledge sources a [`crate::BlackboardSystem`] runs.

mod compile;
mod def;

use std::path::Path;

use anyhow::{Context, Result};

use crate::blackboard::Blackboard;
use crate::source::KnowledgeSource;
use crate::symbol::SymbolTable;
use crate::system::KnowledgeBase;

pub use compile::Issue;
pub use def::{
    variable, ActionDef, ConditionDef, ConjunctionDef, KnowledgeBaseDef, LevelDef, OptionDef,
    RuleDef, SegmentDef, SourceDef,
};

impl KnowledgeBaseDef {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge base from {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse knowledge base from {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Authoring problems, in declaration order. An empty list does not
    /// promise the knowledge base terminates, only that it is well formed.
    pub fn check(&self) -> Vec<Issue> {
        compile::Checker::run(self)
    }
}

impl KnowledgeBase for KnowledgeBaseDef {
    fn init_blackboard(&self, symbols: &mut SymbolTable) -> crate::Result<Blackboard> {
        Ok(compile::Compiler::new(symbols, self).blackboard())
    }

    fn init_knowledge_sources(
        &self,
        symbols: &mut SymbolTable,
    ) -> crate::Result<Vec<KnowledgeSource>> {
        compile::Compiler::new(symbols, self).sources()
    }
}
