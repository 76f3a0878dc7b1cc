//! Rule actions: `Modify`, `Query`, `Write` and `Quit`.
//!
//! Actions are inert data until a firing rule executes them with its bindings.
//! Only `Modify` touches the blackboard; `Query` and `Write` go through the
//! [`Client`]; `Quit` asks the controller to retire a source or stop.

use std::time::Duration;

use crate::blackboard::Blackboard;
use crate::client::{Client, ClientError, Prompt, PromptPart, Question};
use crate::error::{KbsError, Result};
use crate::pattern::{Bindings, EntryPattern, Var};
use crate::source::SourceId;
use crate::symbol::{Symbol, SymbolTable};
use crate::trace::{TraceEvent, TraceKind, TraceSink};

/// A value written by `Modify`: a literal symbol or a bound variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRef {
    Const(Symbol),
    Var(Var),
}

impl ValueRef {
    pub fn resolve(&self, bindings: &Bindings) -> Result<Symbol> {
        match *self {
            Self::Const(symbol) => Ok(symbol),
            Self::Var(var) => bindings.resolve(var),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub attribute: Symbol,
    pub value: ValueRef,
}

impl Assignment {
    pub fn constant(attribute: Symbol, value: Symbol) -> Self {
        Self {
            attribute,
            value: ValueRef::Const(value),
        }
    }

    pub fn variable(attribute: Symbol, var: Var) -> Self {
        Self {
            attribute,
            value: ValueRef::Var(var),
        }
    }
}

/// Prompt template piece, rendered against the firing's bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSegment {
    Text(String),
    /// Interpolate the name of the symbol bound to the variable.
    Var(Var),
    /// Offer the client a picture named after the bound symbol.
    Picture(Var),
}

impl PromptSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// A selectable answer: what the client sees and the symbol it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    pub label: String,
    pub value: Symbol,
}

impl AnswerOption {
    pub fn new(label: impl Into<String>, value: Symbol) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitTarget {
    /// The source owning the firing rule.
    Owner,
    Source(SourceId),
    /// Stop the scheduling loop altogether.
    Controller,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Modify {
        entry: EntryPattern,
        assignments: Vec<Assignment>,
    },
    Query {
        result: Var,
        prompt: Vec<PromptSegment>,
        options: Vec<AnswerOption>,
        /// Overrides the engine-wide query deadline.
        deadline: Option<Duration>,
    },
    Write {
        prompt: Vec<PromptSegment>,
    },
    Quit(QuitTarget),
}

impl Action {
    pub fn modify(entry: EntryPattern, assignments: Vec<Assignment>) -> Self {
        Self::Modify { entry, assignments }
    }

    pub fn query(result: Var, prompt: Vec<PromptSegment>, options: Vec<AnswerOption>) -> Self {
        Self::Query {
            result,
            prompt,
            options,
            deadline: None,
        }
    }

    /// Bound a `Query` by `limit`; other actions are returned unchanged.
    pub fn within(mut self, limit: Duration) -> Self {
        if let Self::Query { deadline, .. } = &mut self {
            *deadline = Some(limit);
        }
        self
    }

    pub fn write(prompt: Vec<PromptSegment>) -> Self {
        Self::Write { prompt }
    }

    pub fn quit(target: QuitTarget) -> Self {
        Self::Quit(target)
    }

    pub(crate) fn execute(
        &self,
        ctx: &mut ActionContext<'_>,
        bindings: &mut Bindings,
    ) -> Result<ActionEffect> {
        match self {
            Self::Modify { entry, assignments } => {
                ctx.modify(*entry, assignments, bindings)?;
                Ok(ActionEffect::Continue)
            }
            Self::Query {
                result,
                prompt,
                options,
                deadline,
            } => {
                let deadline = deadline.or(ctx.default_deadline);
                let value = ctx.query(prompt, options, deadline, bindings)?;
                bindings.bind(*result, value);
                Ok(ActionEffect::Continue)
            }
            Self::Write { prompt } => {
                ctx.write(prompt, bindings)?;
                Ok(ActionEffect::Continue)
            }
            Self::Quit(QuitTarget::Owner) => Ok(ActionEffect::Deactivate(ctx.owner)),
            Self::Quit(QuitTarget::Source(source)) => Ok(ActionEffect::Deactivate(*source)),
            Self::Quit(QuitTarget::Controller) => Ok(ActionEffect::Halt),
        }
    }
}

/// What the controller must do after an action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionEffect {
    Continue,
    Deactivate(SourceId),
    Halt,
}

/// Everything an action may touch while it runs.
pub(crate) struct ActionContext<'a> {
    pub blackboard: &'a mut Blackboard,
    pub symbols: &'a SymbolTable,
    pub client: &'a mut dyn Client,
    pub trace: &'a mut dyn TraceSink,
    pub cycle: u64,
    pub owner: SourceId,
    pub owner_name: &'a str,
    pub default_deadline: Option<Duration>,
}

impl ActionContext<'_> {
    fn modify(
        &mut self,
        entry: EntryPattern,
        assignments: &[Assignment],
        bindings: &Bindings,
    ) -> Result<()> {
        let entry = entry.resolve(bindings)?;
        let resolved = assignments
            .iter()
            .map(|assignment| Ok((assignment.attribute, assignment.value.resolve(bindings)?)))
            .collect::<Result<Vec<_>>>()?;

        let level = self.blackboard.level_mut(entry)?;
        for (attribute, value) in resolved {
            level.set(attribute, value);
            tracing::debug!(
                entry = %self.symbols.display(entry),
                attribute = %self.symbols.display(attribute),
                value = %self.symbols.display(value),
                "blackboard modified"
            );
            self.trace.emit(TraceEvent::new(
                self.cycle,
                TraceKind::Modified {
                    entry: self.symbols.display(entry),
                    attribute: self.symbols.display(attribute),
                    value: self.symbols.display(value),
                },
            ));
        }
        Ok(())
    }

    fn query(
        &mut self,
        segments: &[PromptSegment],
        options: &[AnswerOption],
        deadline: Option<Duration>,
        bindings: &Bindings,
    ) -> Result<Symbol> {
        let question = Question {
            prompt: self.render(segments, bindings)?,
            options: options.iter().map(|option| option.label.clone()).collect(),
            deadline,
        };
        self.trace.emit(TraceEvent::new(
            self.cycle,
            TraceKind::Asked {
                question: question.prompt.to_string(),
                options: question.options.clone(),
            },
        ));

        let answer = self
            .client
            .query(&question)
            .map_err(|err| client_error(err, deadline))?;

        let Some(option) = options.iter().find(|option| option.label == answer) else {
            return Err(KbsError::InvalidResponse {
                answer,
                options: question.options,
            });
        };

        tracing::debug!(question = %question.prompt, answer = %answer, "query answered");
        self.trace.emit(TraceEvent::new(
            self.cycle,
            TraceKind::Answered {
                label: answer,
                value: self.symbols.display(option.value),
            },
        ));
        Ok(option.value)
    }

    fn write(&mut self, segments: &[PromptSegment], bindings: &Bindings) -> Result<()> {
        let message = self.render(segments, bindings)?;
        self.trace.emit(TraceEvent::new(
            self.cycle,
            TraceKind::Wrote {
                message: message.to_string(),
            },
        ));
        self.client
            .write(&message)
            .map_err(|err| client_error(err, None))
    }

    fn render(&self, segments: &[PromptSegment], bindings: &Bindings) -> Result<Prompt> {
        let mut prompt = Prompt::default();
        for segment in segments {
            let part = match segment {
                PromptSegment::Text(text) => PromptPart::Text(text.clone()),
                PromptSegment::Var(var) => {
                    PromptPart::Text(self.symbols.get(bindings.resolve(*var)?)?.to_string())
                }
                PromptSegment::Picture(var) => {
                    PromptPart::Picture(self.symbols.get(bindings.resolve(*var)?)?.to_string())
                }
            };
            prompt.push(part);
        }
        Ok(prompt)
    }
}

fn client_error(err: ClientError, deadline: Option<Duration>) -> KbsError {
    match err {
        ClientError::TimedOut => KbsError::QueryTimeout {
            after: deadline.unwrap_or_default(),
        },
        ClientError::Cancelled => KbsError::Cancelled,
        other => KbsError::ClientFailure(other.to_string()),
    }
}
