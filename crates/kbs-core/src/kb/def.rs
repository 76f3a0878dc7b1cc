//! Serializable knowledge base definitions.
//!
//! Names are plain strings. A string starting with `?` is a variable: as a
//! condition entry it refers to an entry bound earlier, as a `set` value it
//! writes the variable's current value.
//!
//! ```yaml
//! name: pets
//! levels:
//!   - entry: goal
//!     attributes: [kind]
//! sources:
//!   - name: classify
//!     trigger:
//!       - - entry: goal
//!           bind: "?g"
//!           is: { kind: unknown }
//!     rules:
//!       - name: ask-kind
//!         then:
//!           - action: query
//!             result: "?kind"
//!             prompt: ["Is it a cat or a dog?"]
//!             options:
//!               - { label: cat, value: cat }
//!               - { label: dog, value: dog }
//!           - action: modify
//!             entry: "?g"
//!             set: { kind: "?kind" }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub levels: Vec<LevelDef>,
    pub sources: Vec<SourceDef>,
}

/// A blackboard level. Listed attributes start out `unknown`; `defaults`
/// declares attributes with any other initial value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDef {
    pub entry: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, String>,
}

impl LevelDef {
    pub fn new<I, S>(entry: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entry: entry.into(),
            attributes: attributes.into_iter().map(Into::into).collect(),
            defaults: BTreeMap::new(),
        }
    }

    /// Every attribute this level declares, listed ones first.
    pub fn declared(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .map(String::as_str)
            .chain(self.defaults.keys().map(String::as_str))
    }
}

/// One conjunction: every condition must hold.
pub type ConjunctionDef = Vec<ConditionDef>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub priority: i32,
    /// Alternatives, tried in order.
    pub trigger: Vec<ConjunctionDef>,
    pub rules: Vec<RuleDef>,
}

fn is_zero(priority: &i32) -> bool {
    *priority == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionDef {
    /// Level name, or `?var` for an entry bound earlier.
    pub entry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// attribute -> required value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub is: BTreeMap<String, String>,
    /// attribute -> variable receiving its value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capture: BTreeMap<String, String>,
}

impl ConditionDef {
    pub fn on(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            bind: None,
            is: BTreeMap::new(),
            capture: BTreeMap::new(),
        }
    }

    pub fn bind(mut self, var: impl Into<String>) -> Self {
        self.bind = Some(var.into());
        self
    }

    pub fn is(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.is.insert(attribute.into(), value.into());
        self
    }

    pub fn capture(mut self, attribute: impl Into<String>, var: impl Into<String>) -> Self {
        self.capture.insert(attribute.into(), var.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDef {
    pub name: String,
    /// Refinement of the trigger's bindings. Omitted means always applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Vec<ConjunctionDef>>,
    pub then: Vec<ActionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionDef {
    Modify {
        entry: String,
        set: BTreeMap<String, String>,
    },
    Query {
        result: String,
        prompt: Vec<SegmentDef>,
        options: Vec<OptionDef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Write {
        prompt: Vec<SegmentDef>,
    },
    /// Retires the owning source unless `source` names another one or
    /// `controller` stops the run.
    Quit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        controller: bool,
    },
}

/// Prompt piece: a bare string is literal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentDef {
    Text(String),
    Var { var: String },
    Picture { picture: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDef {
    pub label: String,
    pub value: String,
}

impl OptionDef {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// `?name` -> `Some("name")`.
pub fn variable(name: &str) -> Option<&str> {
    name.strip_prefix('?')
}
