use std::sync::{Arc, Mutex};

use kbs_core::{
    Action, AnswerOption, Assignment, Blackboard, BlackboardLevel, CancelToken, Condition,
    Conjunction, Controller, ControllerState, Disjunction, EngineConfig, EntryPattern, Fact,
    HaltReason, KbsError, KnowledgeSource, NullTraceSink, PromptSegment, QuitTarget, Result, Rule,
    RunContext, RunReport, ScriptedClient, SourceId, Symbol, SymbolTable, TraceEvent, TraceKind,
    TraceSink, Var,
};

struct Names {
    symbols: SymbolTable,
    task: Symbol,
    other: Symbol,
    step: Symbol,
    done: Symbol,
    asked: Symbol,
    answer: Var,
}

fn names() -> Names {
    let mut symbols = SymbolTable::new();
    Names {
        task: symbols.put("task"),
        other: symbols.put("other"),
        step: symbols.put("step"),
        done: symbols.put("done"),
        asked: symbols.put("asked"),
        answer: Var(symbols.put("?answer")),
        symbols,
    }
}

impl Names {
    fn blackboard(&self) -> Blackboard {
        Blackboard::new()
            .with_level(self.task, BlackboardLevel::new([Fact::new(self.step, Symbol::UNKNOWN)]))
            .with_level(self.other, BlackboardLevel::new([Fact::new(self.step, Symbol::UNKNOWN)]))
    }

    fn step_is(&self, value: Symbol) -> Disjunction {
        Disjunction::all(vec![Condition::on(self.task).is(self.step, value)])
    }

    fn set_step(&self, value: Symbol) -> Action {
        Action::modify(
            EntryPattern::named(self.task),
            vec![Assignment::constant(self.step, value)],
        )
    }
}

fn say(text: &str) -> Action {
    Action::write(vec![PromptSegment::text(text)])
}

fn rule(name: &str, actions: Vec<Action>) -> Rule {
    Rule::new(name, Disjunction::always(), actions)
}

fn run(
    controller: &mut Controller,
    symbols: &SymbolTable,
    client: &mut ScriptedClient,
) -> Result<RunReport> {
    let mut trace = NullTraceSink;
    let cancel = CancelToken::new();
    controller.execute(RunContext {
        symbols,
        client,
        trace: &mut trace,
        cancel: &cancel,
    })
}

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<TraceEvent>>>);

impl TraceSink for SharedSink {
    fn emit(&mut self, event: TraceEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[test]
fn higher_priority_source_fires_first() {
    let n = names();
    let sources = vec![
        KnowledgeSource::new("report", Disjunction::always())
            .with_priority(-10)
            .with_rule(rule("finish", vec![say("report"), Action::quit(QuitTarget::Controller)])),
        KnowledgeSource::new("ask", Disjunction::always())
            .with_priority(5)
            .with_rule(rule("once", vec![say("ask"), Action::quit(QuitTarget::Owner)])),
    ];
    let mut controller = Controller::new(n.blackboard(), sources);
    assert_eq!(controller.agenda(), &[SourceId(1), SourceId(0)]);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let transcript = client.transcript();
    let report = run(&mut controller, &n.symbols, &mut client).unwrap();

    assert_eq!(transcript.writes(), vec!["ask", "report"]);
    assert_eq!(report.fired_rules(), vec!["ask/once", "report/finish"]);
    assert_eq!(report.halt, HaltReason::Quit);
}

#[test]
fn equal_priorities_keep_declaration_order() {
    let n = names();
    let sources = ["first", "second", "third"]
        .into_iter()
        .map(|name| {
            KnowledgeSource::new(name, Disjunction::always())
                .with_rule(rule("speak", vec![say(name), Action::quit(QuitTarget::Owner)]))
        })
        .collect();
    let mut controller = Controller::new(n.blackboard(), sources);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let transcript = client.transcript();
    let report = run(&mut controller, &n.symbols, &mut client).unwrap();

    assert_eq!(transcript.writes(), vec!["first", "second", "third"]);
    assert_eq!(report.halt, HaltReason::Exhausted);
    assert_eq!(report.cycles, 4);
    assert!(!controller.is_active(SourceId(2)));
}

#[test]
fn quit_controller_halts_while_sources_remain_ready() {
    let n = names();
    let sources = vec![
        KnowledgeSource::new("stop", Disjunction::always())
            .with_priority(1)
            .with_rule(rule("now", vec![Action::quit(QuitTarget::Controller), say("after quit")])),
        KnowledgeSource::new("idle", Disjunction::always())
            .with_rule(rule("noop", vec![say("idle")])),
    ];
    let mut controller = Controller::new(n.blackboard(), sources);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let transcript = client.transcript();
    let report = run(&mut controller, &n.symbols, &mut client).unwrap();

    // The whole action list runs before the quit takes effect.
    assert_eq!(transcript.writes(), vec!["after quit"]);
    assert_eq!(report.halt, HaltReason::Quit);
    assert_eq!(report.cycles, 1);
    assert_eq!(controller.state(), ControllerState::Halted);
    assert_eq!(controller.ready_sources().unwrap(), vec![SourceId(0), SourceId(1)]);
}

#[test]
fn ready_source_without_applicable_rule_falls_through() {
    let n = names();
    let sources = vec![
        KnowledgeSource::new("picky", Disjunction::always())
            .with_priority(5)
            .with_rule(Rule::new("never", n.step_is(n.done), vec![say("picky")])),
        KnowledgeSource::new("worker", Disjunction::always())
            .with_rule(rule("work", vec![say("work"), Action::quit(QuitTarget::Controller)])),
    ];
    let mut controller = Controller::new(n.blackboard(), sources);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let report = run(&mut controller, &n.symbols, &mut client).unwrap();

    assert_eq!(report.fired_rules(), vec!["worker/work"]);
    assert_eq!(report.cycles, 1);
}

#[test]
fn rules_are_tried_in_declared_order() {
    let n = names();
    let source = KnowledgeSource::new("steps", Disjunction::always())
        .with_rule(Rule::new(
            "finish",
            n.step_is(n.done),
            vec![say("finish"), Action::quit(QuitTarget::Controller)],
        ))
        .with_rule(Rule::new(
            "start",
            n.step_is(Symbol::UNKNOWN),
            vec![say("start"), n.set_step(n.done)],
        ));
    let mut controller = Controller::new(n.blackboard(), vec![source]);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let transcript = client.transcript();
    let report = run(&mut controller, &n.symbols, &mut client).unwrap();

    assert_eq!(transcript.writes(), vec!["start", "finish"]);
    assert_eq!(report.fired_rules(), vec!["steps/start", "steps/finish"]);
}

#[test]
fn scan_without_ready_source_exhausts() {
    let n = names();
    let source = KnowledgeSource::new("waiting", n.step_is(n.done))
        .with_rule(rule("never", vec![say("unreachable")]));
    let mut controller = Controller::new(n.blackboard(), vec![source]);
    assert_eq!(controller.state(), ControllerState::Idle);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let report = run(&mut controller, &n.symbols, &mut client).unwrap();

    assert_eq!(report.halt, HaltReason::Exhausted);
    assert!(report.firings.is_empty());
    assert_eq!(report.summary(), "Cycles: 1, Firings: 0, Halt: exhausted");
    assert_eq!(controller.state(), ControllerState::Halted);
}

#[test]
fn first_matching_trigger_alternative_supplies_bindings() {
    let mut n = names();
    let label = Var(n.symbols.put("?label"));
    let first = n.symbols.put("first");
    let second = n.symbols.put("second");

    let trigger = Disjunction::new(vec![
        Conjunction::new(vec![Condition::on(n.task).capture(n.step, label)]),
        Conjunction::new(vec![Condition::on(n.other).capture(n.step, label)]),
    ]);
    let source = KnowledgeSource::new("echo", trigger).with_rule(rule(
        "say",
        vec![
            Action::write(vec![PromptSegment::Var(label)]),
            Action::quit(QuitTarget::Controller),
        ],
    ));

    let blackboard = Blackboard::new()
        .with_level(n.task, BlackboardLevel::new([Fact::new(n.step, first)]))
        .with_level(n.other, BlackboardLevel::new([Fact::new(n.step, second)]));
    let mut controller = Controller::new(blackboard, vec![source]);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let transcript = client.transcript();
    run(&mut controller, &n.symbols, &mut client).unwrap();

    assert_eq!(transcript.writes(), vec!["first"]);
}

#[test]
fn query_result_is_written_through_bindings() {
    let n = names();
    let source = KnowledgeSource::new("ask", n.step_is(Symbol::UNKNOWN)).with_rule(rule(
        "question",
        vec![
            Action::query(
                n.answer,
                vec![PromptSegment::text("Done yet?")],
                vec![
                    AnswerOption::new("yes", n.done),
                    AnswerOption::new("no", n.asked),
                ],
            ),
            Action::modify(
                EntryPattern::named(n.task),
                vec![Assignment::variable(n.step, n.answer)],
            ),
        ],
    ));
    let mut controller = Controller::new(n.blackboard(), vec![source]);

    let mut client = ScriptedClient::sequence(["yes"]);
    let report = run(&mut controller, &n.symbols, &mut client).unwrap();

    assert_eq!(report.halt, HaltReason::Exhausted);
    assert_eq!(controller.blackboard().level(n.task).unwrap().get(n.step), n.done);
}

#[test]
fn invalid_response_aborts_without_rollback() {
    let n = names();
    let source = KnowledgeSource::new("ask", n.step_is(Symbol::UNKNOWN)).with_rule(rule(
        "question",
        vec![
            n.set_step(n.asked),
            Action::query(
                n.answer,
                vec![PromptSegment::text("Done yet?")],
                vec![AnswerOption::new("yes", n.done)],
            ),
            n.set_step(n.done),
        ],
    ));
    let mut controller = Controller::new(n.blackboard(), vec![source]);

    let mut client = ScriptedClient::sequence(["maybe"]);
    let err = run(&mut controller, &n.symbols, &mut client).unwrap_err();

    assert_eq!(
        err,
        KbsError::InvalidResponse {
            answer: "maybe".into(),
            options: vec!["yes".into()],
        }
    );
    assert_eq!(controller.state(), ControllerState::Halted);
    assert_eq!(controller.blackboard().level(n.task).unwrap().get(n.step), n.asked);
    assert_eq!(
        controller.blackboard().level(n.other).unwrap().get(n.step),
        Symbol::UNKNOWN
    );
}

#[test]
fn client_failure_halts_the_run() {
    let n = names();
    let source = KnowledgeSource::new("ask", Disjunction::always()).with_rule(rule(
        "question",
        vec![Action::query(
            n.answer,
            vec![PromptSegment::text("Anyone there?")],
            vec![AnswerOption::new("yes", n.done)],
        )],
    ));
    let mut controller = Controller::new(n.blackboard(), vec![source]);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let err = run(&mut controller, &n.symbols, &mut client).unwrap_err();

    assert!(matches!(err, KbsError::ClientFailure(_)));
}

#[test]
fn undeclared_level_is_reported() {
    let mut n = names();
    let missing = n.symbols.put("missing");
    let source = KnowledgeSource::new("lost", Disjunction::all(vec![Condition::on(missing)]))
        .with_rule(rule("noop", vec![say("noop")]));
    let mut controller = Controller::new(n.blackboard(), vec![source]);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let err = run(&mut controller, &n.symbols, &mut client).unwrap_err();

    assert_eq!(err, KbsError::NoSuchLevel(missing));
}

#[test]
fn cycle_limit_stops_a_runaway_source() {
    let n = names();
    let source = KnowledgeSource::new("loop", Disjunction::always())
        .with_rule(rule("again", vec![say("tick")]));
    let mut controller = Controller::new(n.blackboard(), vec![source]);
    controller.configure(&EngineConfig {
        max_cycles: 5,
        ..EngineConfig::default()
    });

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let transcript = client.transcript();
    let err = run(&mut controller, &n.symbols, &mut client).unwrap_err();

    assert_eq!(err, KbsError::CycleLimit(5));
    assert_eq!(transcript.writes().len(), 5);
}

#[test]
fn cancelled_run_fires_nothing() {
    let n = names();
    let source = KnowledgeSource::new("speak", Disjunction::always())
        .with_rule(rule("hello", vec![say("hello")]));
    let mut controller = Controller::new(n.blackboard(), vec![source]);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let transcript = client.transcript();
    let mut trace = NullTraceSink;
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = controller
        .execute(RunContext {
            symbols: &n.symbols,
            client: &mut client,
            trace: &mut trace,
            cancel: &cancel,
        })
        .unwrap_err();

    assert_eq!(err, KbsError::Cancelled);
    assert!(transcript.writes().is_empty());
}

#[test]
fn reset_restores_defaults_and_sources() {
    let n = names();
    let source = KnowledgeSource::new("once", n.step_is(Symbol::UNKNOWN)).with_rule(rule(
        "mark",
        vec![n.set_step(n.done), Action::quit(QuitTarget::Owner)],
    ));
    let mut controller = Controller::new(n.blackboard(), vec![source]);

    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    run(&mut controller, &n.symbols, &mut client).unwrap();
    assert!(!controller.is_active(SourceId(0)));
    assert_eq!(controller.blackboard().level(n.task).unwrap().get(n.step), n.done);

    controller.reset();
    assert!(controller.is_active(SourceId(0)));
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(
        controller.blackboard().level(n.task).unwrap().get(n.step),
        Symbol::UNKNOWN
    );

    let report = run(&mut controller, &n.symbols, &mut client).unwrap();
    assert_eq!(report.fired_rules(), vec!["once/mark"]);
}

#[test]
fn trace_records_each_step_of_a_firing() {
    let n = names();
    let source = KnowledgeSource::new("once", n.step_is(Symbol::UNKNOWN)).with_rule(rule(
        "mark",
        vec![n.set_step(n.done), Action::quit(QuitTarget::Owner)],
    ));
    let mut controller = Controller::new(n.blackboard(), vec![source]);

    let sink = SharedSink::default();
    let mut trace = sink.clone();
    let mut client = ScriptedClient::sequence(Vec::<String>::new());
    let cancel = CancelToken::new();
    controller
        .execute(RunContext {
            symbols: &n.symbols,
            client: &mut client,
            trace: &mut trace,
            cancel: &cancel,
        })
        .unwrap();

    let kinds: Vec<TraceKind> = sink.0.lock().unwrap().iter().map(|e| e.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            TraceKind::Ready {
                source: "once".into()
            },
            TraceKind::Fired {
                source: "once".into(),
                rule: "mark".into()
            },
            TraceKind::Modified {
                entry: "task".into(),
                attribute: "step".into(),
                value: "done".into()
            },
            TraceKind::Deactivated {
                source: "once".into()
            },
            TraceKind::Halted {
                reason: "exhausted".into()
            },
        ]
    );
}
