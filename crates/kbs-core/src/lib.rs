//! Blackboard knowledge based system engine.
//!
//! Knowledge sources watch a shared blackboard of symbolic facts. A controller
//! repeatedly picks the first ready source by priority and fires its first
//! applicable rule, whose actions modify the blackboard, talk to a client or
//! stop the run.

#![forbid(unsafe_code)]

pub mod action;
pub mod blackboard;
pub mod cancel;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod kb;
pub mod observability;
pub mod pattern;
pub mod source;
pub mod symbol;
pub mod system;
pub mod trace;

pub use action::{Action, AnswerOption, Assignment, PromptSegment, QuitTarget, ValueRef};
pub use blackboard::{Blackboard, BlackboardLevel, BlackboardSnapshot, Fact};
pub use cancel::CancelToken;
pub use client::{Client, ClientError, Prompt, PromptPart, Question, ScriptedClient};
pub use config::EngineConfig;
pub use controller::{Controller, ControllerState, Firing, HaltReason, RunContext, RunReport};
pub use error::{KbsError, Result};
pub use kb::KnowledgeBaseDef;
pub use observability::{EventLog, RunEvent};
pub use pattern::{Bindings, Condition, Conjunction, Disjunction, EntryPattern, Match, Var};
pub use source::{KnowledgeSource, Rule, SourceId};
pub use symbol::{Symbol, SymbolTable};
pub use system::{BlackboardSystem, KnowledgeBase, RunHandle};
pub use trace::{NullTraceSink, TraceEvent, TraceKind, TraceSink, VecTraceSink};
