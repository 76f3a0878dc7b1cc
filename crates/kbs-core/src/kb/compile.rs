//! Lowering definitions into runtime structures, and authoring checks.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use super::def::{
    variable, ActionDef, ConditionDef, ConjunctionDef, KnowledgeBaseDef, RuleDef, SegmentDef,
    SourceDef,
};
use crate::action::{Action, AnswerOption, Assignment, PromptSegment, QuitTarget};
use crate::blackboard::{Blackboard, BlackboardLevel, Fact};
use crate::error::{KbsError, Result};
use crate::pattern::{Condition, Conjunction, Disjunction, EntryPattern, Var};
use crate::source::{KnowledgeSource, Rule, SourceId};
use crate::symbol::{Symbol, SymbolTable};

pub(super) struct Compiler<'a> {
    symbols: &'a mut SymbolTable,
    def: &'a KnowledgeBaseDef,
}

impl<'a> Compiler<'a> {
    pub(super) fn new(symbols: &'a mut SymbolTable, def: &'a KnowledgeBaseDef) -> Self {
        Self { symbols, def }
    }

    pub(super) fn blackboard(&mut self) -> Blackboard {
        let mut blackboard = Blackboard::new();
        for level in &self.def.levels {
            let mut facts: Vec<Fact> = level
                .attributes
                .iter()
                .map(|attribute| Fact::new(self.symbols.put(attribute), Symbol::UNKNOWN))
                .collect();
            for (attribute, value) in &level.defaults {
                facts.push(Fact::new(self.symbols.put(attribute), self.symbols.put(value)));
            }
            let entry = self.symbols.put(&level.entry);
            blackboard.declare(entry, BlackboardLevel::new(facts));
        }
        blackboard
    }

    pub(super) fn sources(&mut self) -> Result<Vec<KnowledgeSource>> {
        let def = self.def;
        def.sources
            .iter()
            .map(|source| self.source(source))
            .collect()
    }

    fn source(&mut self, def: &SourceDef) -> Result<KnowledgeSource> {
        let trigger = self.disjunction(&def.trigger);
        let mut source = KnowledgeSource::new(&def.name, trigger).with_priority(def.priority);
        for rule in &def.rules {
            source.add_rule(self.rule(rule)?);
        }
        Ok(source)
    }

    fn rule(&mut self, def: &RuleDef) -> Result<Rule> {
        let conditions = match &def.when {
            Some(when) => self.disjunction(when),
            None => Disjunction::always(),
        };
        let actions = def
            .then
            .iter()
            .map(|action| self.action(action))
            .collect::<Result<Vec<_>>>()?;
        Ok(Rule::new(&def.name, conditions, actions))
    }

    fn disjunction(&mut self, conjunctions: &[ConjunctionDef]) -> Disjunction {
        Disjunction::new(
            conjunctions
                .iter()
                .map(|conjunction| {
                    conjunction
                        .iter()
                        .map(|condition| self.condition(condition))
                        .collect::<Conjunction>()
                })
                .collect(),
        )
    }

    fn condition(&mut self, def: &ConditionDef) -> Condition {
        let mut condition = Condition::with_entry(self.entry(&def.entry));
        if let Some(bind) = &def.bind {
            condition = condition.bind(self.var(bind));
        }
        for (attribute, value) in &def.is {
            condition = condition.is(self.symbols.put(attribute), self.symbols.put(value));
        }
        for (attribute, var) in &def.capture {
            condition = condition.capture(self.symbols.put(attribute), self.var(var));
        }
        condition
    }

    fn action(&mut self, def: &ActionDef) -> Result<Action> {
        let action = match def {
            ActionDef::Modify { entry, set } => {
                let entry = self.entry(entry);
                let assignments = set
                    .iter()
                    .map(|(attribute, value)| {
                        let attribute = self.symbols.put(attribute);
                        match variable(value) {
                            Some(_) => Assignment::variable(attribute, self.var(value)),
                            None => Assignment::constant(attribute, self.symbols.put(value)),
                        }
                    })
                    .collect();
                Action::modify(entry, assignments)
            }
            ActionDef::Query {
                result,
                prompt,
                options,
                timeout_ms,
            } => {
                let options = options
                    .iter()
                    .map(|option| AnswerOption::new(&option.label, self.symbols.put(&option.value)))
                    .collect();
                let query = Action::query(self.var(result), self.prompt(prompt), options);
                match timeout_ms {
                    Some(ms) => query.within(Duration::from_millis(*ms)),
                    None => query,
                }
            }
            ActionDef::Write { prompt } => Action::write(self.prompt(prompt)),
            ActionDef::Quit {
                source,
                controller,
            } => {
                let target = if *controller {
                    QuitTarget::Controller
                } else if let Some(name) = source {
                    QuitTarget::Source(self.source_id(name)?)
                } else {
                    QuitTarget::Owner
                };
                Action::quit(target)
            }
        };
        Ok(action)
    }

    fn prompt(&mut self, segments: &[SegmentDef]) -> Vec<PromptSegment> {
        segments
            .iter()
            .map(|segment| match segment {
                SegmentDef::Text(text) => PromptSegment::text(text),
                SegmentDef::Var { var } => PromptSegment::Var(self.var(var)),
                SegmentDef::Picture { picture } => PromptSegment::Picture(self.var(picture)),
            })
            .collect()
    }

    fn entry(&mut self, name: &str) -> EntryPattern {
        match variable(name) {
            Some(_) => EntryPattern::bound(self.var(name)),
            None => EntryPattern::named(self.symbols.put(name)),
        }
    }

    /// Variables are interned with their `?` so they never collide with a
    /// value of the same name.
    fn var(&mut self, name: &str) -> Var {
        let bare = variable(name).unwrap_or(name);
        Var(self.symbols.put(&format!("?{bare}")))
    }

    fn source_id(&self, name: &str) -> Result<SourceId> {
        self.def
            .sources
            .iter()
            .position(|source| source.name == name)
            .map(SourceId)
            .ok_or_else(|| KbsError::NoSuchSource(name.to_string()))
    }
}

/// An authoring problem found by [`KnowledgeBaseDef::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// `source/rule` path, or the level name.
    pub location: String,
    pub problem: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.problem)
    }
}

pub(super) struct Checker<'a> {
    levels: BTreeMap<&'a str, BTreeSet<&'a str>>,
    sources: BTreeSet<&'a str>,
    issues: Vec<Issue>,
}

impl<'a> Checker<'a> {
    pub(super) fn run(def: &'a KnowledgeBaseDef) -> Vec<Issue> {
        let mut checker = Self {
            levels: BTreeMap::new(),
            sources: BTreeSet::new(),
            issues: Vec::new(),
        };

        for level in &def.levels {
            if checker.levels.contains_key(level.entry.as_str()) {
                checker.report(&level.entry, "level declared twice");
            }
            checker
                .levels
                .insert(&level.entry, level.declared().collect());
        }
        for source in &def.sources {
            if !checker.sources.insert(&source.name) {
                checker.report(&source.name, "source declared twice");
            }
        }
        for source in &def.sources {
            checker.source(source);
        }
        checker.issues
    }

    fn report(&mut self, location: &str, problem: impl Into<String>) {
        self.issues.push(Issue {
            location: location.to_string(),
            problem: problem.into(),
        });
    }

    fn source(&mut self, source: &'a SourceDef) {
        if source.trigger.is_empty() {
            self.report(&source.name, "trigger has no alternatives and can never hold");
        }
        if source.rules.is_empty() {
            self.report(&source.name, "source has no rules");
        }
        let after_trigger = self.disjunction(&source.name, &source.trigger, &BTreeSet::new());

        for rule in &source.rules {
            let location = format!("{}/{}", source.name, rule.name);
            let mut bound = match &rule.when {
                Some(when) => self.disjunction(&location, when, &after_trigger),
                None => after_trigger.clone(),
            };
            for action in &rule.then {
                self.action(&location, action, &mut bound);
            }
        }
    }

    /// Variables bound by every alternative, given what `parent` binds.
    fn disjunction(
        &mut self,
        location: &str,
        conjunctions: &'a [ConjunctionDef],
        parent: &BTreeSet<&'a str>,
    ) -> BTreeSet<&'a str> {
        let mut common: Option<BTreeSet<&'a str>> = None;
        for conjunction in conjunctions {
            let mut bound = parent.clone();
            for condition in conjunction {
                self.condition(location, condition, &mut bound);
            }
            common = Some(match common {
                Some(common) => common.intersection(&bound).copied().collect(),
                None => bound,
            });
        }
        common.unwrap_or_else(|| parent.clone())
    }

    fn condition(
        &mut self,
        location: &str,
        condition: &'a ConditionDef,
        bound: &mut BTreeSet<&'a str>,
    ) {
        match variable(&condition.entry) {
            Some(var) => {
                if !bound.contains(var) {
                    self.report(location, format!("entry variable `?{var}` is not bound"));
                }
            }
            None => {
                let declared = self.levels.get(condition.entry.as_str()).cloned();
                match declared {
                    None => self.report(
                        location,
                        format!("condition on undeclared level `{}`", condition.entry),
                    ),
                    Some(attributes) => {
                        for attribute in condition.is.keys().chain(condition.capture.keys()) {
                            if !attributes.contains(attribute.as_str()) {
                                self.report(
                                    location,
                                    format!(
                                        "level `{}` declares no attribute `{attribute}`",
                                        condition.entry
                                    ),
                                );
                            }
                        }
                    }
                }
            }
        }
        match (&condition.bind, variable(&condition.entry)) {
            (Some(bind), None) => {
                bound.insert(bare(bind));
            }
            (Some(bind), Some(var)) => self.report(
                location,
                format!("bind `?{}` is ignored on variable entry `?{var}`", bare(bind)),
            ),
            (None, _) => {}
        }
        for var in condition.capture.values() {
            bound.insert(bare(var));
        }
    }

    fn action(&mut self, location: &str, action: &'a ActionDef, bound: &mut BTreeSet<&'a str>) {
        match action {
            ActionDef::Modify { entry, set } => {
                match variable(entry) {
                    Some(var) if !bound.contains(var) => {
                        self.report(location, format!("modify target `?{var}` is not bound"));
                    }
                    Some(_) => {}
                    None if !self.levels.contains_key(entry.as_str()) => {
                        self.report(location, format!("modify of undeclared level `{entry}`"));
                    }
                    None => {}
                }
                for value in set.values() {
                    if let Some(var) = variable(value) {
                        if !bound.contains(var) {
                            self.report(location, format!("value `?{var}` is not bound"));
                        }
                    }
                }
            }
            ActionDef::Query {
                result,
                prompt,
                options,
                ..
            } => {
                self.prompt(location, prompt, bound);
                if options.is_empty() {
                    self.report(location, "query offers no options");
                }
                let mut labels = BTreeSet::new();
                for option in options {
                    if !labels.insert(option.label.as_str()) {
                        self.report(location, format!("option `{}` offered twice", option.label));
                    }
                }
                bound.insert(bare(result));
            }
            ActionDef::Write { prompt } => self.prompt(location, prompt, bound),
            ActionDef::Quit {
                source: Some(name), ..
            } => {
                if !self.sources.contains(name.as_str()) {
                    self.report(location, format!("quit of undeclared source `{name}`"));
                }
            }
            ActionDef::Quit { .. } => {}
        }
    }

    fn prompt(&mut self, location: &str, segments: &[SegmentDef], bound: &BTreeSet<&'a str>) {
        for segment in segments {
            let var = match segment {
                SegmentDef::Text(_) => continue,
                SegmentDef::Var { var } => var,
                SegmentDef::Picture { picture } => picture,
            };
            if !bound.contains(bare(var)) {
                self.report(location, format!("prompt variable `?{}` is not bound", bare(var)));
            }
        }
    }
}

fn bare(name: &str) -> &str {
    variable(name).unwrap_or(name)
}
