use std::sync::{Arc, Mutex};

use kbs_animals::knowledge_base;
use kbs_core::client::{Exchange, Transcript};
use kbs_core::{
    BlackboardSystem, EngineConfig, HaltReason, KbsError, KnowledgeBaseDef, Result, RunReport,
    ScriptedClient, Symbol, TraceEvent, TraceKind, TraceSink,
};

const ZEBRA: &[(&str, &str)] = &[
    ("body covering", "hair"),
    ("eat meat", "no"),
    ("pointed teeth", "yes"),
    ("extremities", "hooves"),
    ("chew cud", "yes"),
    ("markings", "black stripes"),
];

struct Consultation {
    system: BlackboardSystem,
    transcript: Transcript,
    outcome: Result<RunReport>,
}

impl Consultation {
    fn run(client: ScriptedClient) -> Self {
        let transcript = client.transcript();
        let mut system =
            BlackboardSystem::new(&knowledge_base(), client, EngineConfig::default()).unwrap();
        let outcome = system.execute();
        Self {
            system,
            transcript,
            outcome,
        }
    }

    fn keyed(answers: &[(&str, &str)]) -> Self {
        Self::run(ScriptedClient::keyed(answers.iter().copied()))
    }

    fn value(&self, entry: &str, attribute: &str) -> String {
        let symbols = self.system.symbols();
        let value = self
            .system
            .snapshot()
            .get(symbols.lookup(entry).unwrap(), symbols.lookup(attribute).unwrap())
            .unwrap_or(Symbol::UNKNOWN);
        symbols.get(value).unwrap().to_string()
    }

    fn last_write(&self) -> String {
        self.transcript.writes().last().cloned().unwrap_or_default()
    }
}

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<TraceEvent>>>);

impl TraceSink for SharedSink {
    fn emit(&mut self, event: TraceEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[test]
fn identifies_a_zebra() {
    let consultation = Consultation::keyed(ZEBRA);
    let report = consultation.outcome.as_ref().unwrap();

    assert_eq!(report.halt, HaltReason::Exhausted);
    assert_eq!(consultation.value("goal", "type"), "known");
    assert_eq!(consultation.value("animal", "type"), "mammal");
    assert_eq!(consultation.value("animal", "subtype"), "ungulate");
    assert_eq!(consultation.value("animal", "identity"), "zebra");
    assert!(consultation.last_write().contains("zebra"));

    let Some(Exchange::Wrote(message)) = consultation.transcript.exchanges().pop() else {
        panic!("the consultation should end with a write");
    };
    assert_eq!(message.pictures().collect::<Vec<_>>(), vec!["zebra"]);
}

#[test]
fn zebra_conclusions_are_reached_in_order() {
    let sink = SharedSink::default();
    let client = ScriptedClient::keyed(ZEBRA.iter().copied());
    let mut system = BlackboardSystem::new(&knowledge_base(), client, EngineConfig::default())
        .unwrap()
        .with_trace(sink.clone());
    system.execute().unwrap();

    let modified: Vec<(String, String, String)> = sink
        .0
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match &event.kind {
            TraceKind::Modified {
                entry,
                attribute,
                value,
            } => Some((entry.clone(), attribute.clone(), value.clone())),
            _ => None,
        })
        .collect();
    let position = |entry: &str, attribute: &str, value: &str| {
        modified
            .iter()
            .position(|(e, a, v)| e == entry && a == attribute && v == value)
            .unwrap()
    };

    let mammal = position("animal", "type", "mammal");
    assert_eq!(position("animal", "coat", "hairy") + 1, mammal - 1);
    assert!(position("goal", "type", "known") < mammal);
    assert!(mammal < position("animal", "subtype", "ungulate"));
    assert!(position("animal", "subtype", "ungulate") < position("animal", "identity", "zebra"));
}

#[test]
fn asks_only_what_the_hypothesis_needs() {
    let consultation = Consultation::run(ScriptedClient::sequence([
        "hair",
        "no",
        "yes",
        "hooves",
        "black stripes",
    ]));

    assert_eq!(
        consultation.outcome.unwrap().fired_rules(),
        vec![
            "type/ask-coat",
            "type/mammal",
            "subtype/ask-eats-meat",
            "subtype/ask-has-pointed-teeth",
            "subtype/ask-extremities",
            "subtype/ungulate",
            "identity/ask-marking",
            "identity/zebra",
            "report/identified",
        ]
    );
    assert_eq!(consultation.transcript.writes(), vec!["Animal: zebra"]);
}

#[test]
fn positional_answers_follow_the_asked_order() {
    // Answers in the classic order, including one for chewing cud.
    let consultation = Consultation::run(ScriptedClient::sequence([
        "hair",
        "no",
        "yes",
        "hooves",
        "yes",
        "black stripes",
    ]));

    // Chewing cud is never asked, so its answer reaches the markings question.
    assert!(matches!(
        &consultation.outcome,
        Err(KbsError::InvalidResponse { answer, .. }) if answer == "yes"
    ));
    let (question, _) = consultation.transcript.questions().pop().unwrap();
    assert!(question.contains("markings"), "{question}");
}

#[test]
fn consultations_are_deterministic() {
    let first = Consultation::keyed(ZEBRA);
    let second = Consultation::keyed(ZEBRA);

    assert_eq!(first.transcript.exchanges(), second.transcript.exchanges());
    assert_eq!(first.system.snapshot(), second.system.snapshot());
    assert_eq!(first.outcome.unwrap(), second.outcome.unwrap());
}

#[test]
fn invalid_answer_halts_and_keeps_earlier_facts() {
    let consultation = Consultation::keyed(&[("body covering", "hair"), ("eat meat", "sometimes")]);

    assert_eq!(
        consultation.outcome.as_ref().unwrap_err(),
        &KbsError::InvalidResponse {
            answer: "sometimes".into(),
            options: vec!["yes".into(), "no".into()],
        }
    );
    assert_eq!(consultation.value("animal", "coat"), "hairy");
    assert_eq!(consultation.value("animal", "type"), "mammal");
    assert_eq!(consultation.value("animal", "eats-meat"), "unknown");
    assert!(consultation.transcript.writes().is_empty());
}

#[test]
fn gives_up_on_an_unclassifiable_animal() {
    let consultation = Consultation::keyed(&[
        ("body covering", "other"),
        ("milk", "no"),
        ("fly", "no"),
    ]);

    assert_eq!(consultation.outcome.as_ref().unwrap().halt, HaltReason::Exhausted);
    assert_eq!(consultation.last_write(), "Unable to identify animal");
}

#[test]
fn identifies_a_penguin() {
    let consultation = Consultation::keyed(&[
        ("body covering", "feathers"),
        ("becalmed ships", "no"),
        ("fly", "no"),
        ("swim", "yes"),
        ("colour", "black and white"),
    ]);

    assert_eq!(consultation.value("animal", "type"), "bird");
    assert_eq!(consultation.last_write(), "Animal: penguin");
}

#[test]
fn identifies_an_ostrich() {
    let consultation = Consultation::keyed(&[
        ("body covering", "feathers"),
        ("becalmed ships", "no"),
        ("fly", "no"),
        ("swim", "no"),
        ("colour", "black and white"),
        ("long neck", "yes"),
        ("long legs", "yes"),
    ]);

    assert_eq!(consultation.last_write(), "Animal: ostrich");
}

#[test]
fn identifies_an_albatross() {
    let consultation = Consultation::keyed(&[
        ("body covering", "feathers"),
        ("becalmed ships", "yes"),
    ]);

    assert_eq!(consultation.last_write(), "Animal: albatross");
    assert_eq!(consultation.transcript.questions().len(), 2);
}

#[test]
fn identifies_a_tiger() {
    let consultation = Consultation::keyed(&[
        ("body covering", "hair"),
        ("eat meat", "yes"),
        ("colour", "tawny"),
        ("markings", "black stripes"),
    ]);

    assert_eq!(consultation.value("animal", "subtype"), "carnivore");
    assert_eq!(consultation.last_write(), "Animal: tiger");
}

#[test]
fn identifies_a_giraffe() {
    let consultation = Consultation::keyed(&[
        ("body covering", "hair"),
        ("eat meat", "no"),
        ("pointed teeth", "no"),
        ("extremities", "hooves"),
        ("markings", "dark spots"),
        ("long neck", "yes"),
        ("long legs", "yes"),
    ]);

    assert_eq!(consultation.last_write(), "Animal: giraffe");
}

#[test]
fn dumped_knowledge_base_reloads_unchanged() {
    let kb = knowledge_base();
    let yaml = kb.to_yaml().unwrap();
    assert_eq!(KnowledgeBaseDef::from_yaml(&yaml).unwrap(), kb);
}
