//! Animal identification knowledge base.
//!
//! Four knowledge sources work down from the broad type of an animal (mammal,
//! bird) to its subtype (carnivore, ungulate) and finally its identity, asking
//! only the questions the current hypothesis needs. A low priority `report`
//! source announces the result once nothing else applies.
//!
//! Within each source, conclusions come before questions, so a question is
//! only asked when no conclusion can be drawn yet.

use std::collections::BTreeMap;

use kbs_core::kb::{
    ActionDef, ConditionDef, ConjunctionDef, KnowledgeBaseDef, LevelDef, OptionDef, RuleDef,
    SegmentDef, SourceDef,
};

pub const NAME: &str = "animals";

const GOAL: &str = "?goal";
const ANIMAL: &str = "?animal";
const ANSWER: &str = "?answer";
const NAME_VAR: &str = "?name";

const YES_NO: &[(&str, &str)] = &[("yes", "true"), ("no", "false")];
const LONG: &[(&str, &str)] = &[("yes", "long"), ("no", "other")];

/// Every attribute of the `animal` level.
pub const ANIMAL_ATTRIBUTES: &[&str] = &[
    "type",
    "subtype",
    "identity",
    "can-fly",
    "can-swim",
    "chews-cud",
    "coat",
    "colour",
    "eats-meat",
    "eye-position",
    "extremities",
    "feeds-offspring-milk",
    "has-pointed-teeth",
    "inhabits-becalmed-ships",
    "lays-eggs",
    "leg-length",
    "marking",
    "neck-length",
];

/// Animals the knowledge base can identify.
pub const ANIMALS: &[&str] = &[
    "albatross", "penguin", "ostrich", "zebra", "giraffe", "tiger", "cheetah",
];

/// The animal knowledge base.
///
/// Questions are asked in a different order than in the classic version of
/// this consultation, and some (such as whether a hoofed animal chews cud) are
/// skipped once a conclusion is possible. Scripted runs should key answers by
/// question text with [`kbs_core::ScriptedClient::keyed`]; a positional answer
/// list written for the classic question order will not line up.
pub fn knowledge_base() -> KnowledgeBaseDef {
    KnowledgeBaseDef {
        name: NAME.to_string(),
        description: Some("Identifies an animal by asking about its features".to_string()),
        levels: vec![
            LevelDef::new("goal", ["type", "subtype", "identity"]),
            LevelDef::new("animal", ANIMAL_ATTRIBUTES.iter().copied()),
        ],
        sources: vec![type_source(), subtype_source(), identity_source(), report_source()],
    }
}

fn type_source() -> SourceDef {
    SourceDef {
        name: "type".to_string(),
        priority: 0,
        trigger: vec![vec![goal(&[("type", "unknown")]), ConditionDef::on("animal").bind(ANIMAL)]],
        rules: vec![
            conclude(
                "mammal",
                "type",
                "mammal",
                vec![
                    vec![animal(&[("coat", "hairy")])],
                    vec![animal(&[("feeds-offspring-milk", "true")])],
                ],
            ),
            conclude(
                "bird",
                "type",
                "bird",
                vec![
                    vec![animal(&[("coat", "feathery")])],
                    vec![animal(&[("can-fly", "true"), ("lays-eggs", "true")])],
                ],
            ),
            ask(
                "coat",
                vec![vec![animal(&[("coat", "unknown")])]],
                "Describe the body covering of the unidentified animal",
                &[("hair", "hairy"), ("feathers", "feathery"), ("other", "other")],
            ),
            ask(
                "feeds-offspring-milk",
                vec![vec![animal(&[("feeds-offspring-milk", "unknown")])]],
                "Does the unidentified animal feed it's offspring milk?",
                YES_NO,
            ),
            ask(
                "can-fly",
                vec![vec![animal(&[("can-fly", "unknown")])]],
                "Can the unidentified animal fly?",
                YES_NO,
            ),
            ask(
                "lays-eggs",
                vec![vec![animal(&[("can-fly", "true"), ("lays-eggs", "unknown")])]],
                "Does the unidentified animal lay eggs?",
                YES_NO,
            ),
        ],
    }
}

fn subtype_source() -> SourceDef {
    SourceDef {
        name: "subtype".to_string(),
        priority: 0,
        trigger: vec![vec![
            goal(&[("type", "known"), ("subtype", "unknown")]),
            ConditionDef::on("animal").bind(ANIMAL).is("type", "mammal"),
        ]],
        rules: vec![
            conclude(
                "carnivore",
                "subtype",
                "carnivore",
                vec![
                    vec![animal(&[("eats-meat", "true")])],
                    vec![animal(&[
                        ("has-pointed-teeth", "true"),
                        ("extremities", "claws"),
                        ("eye-position", "forward"),
                    ])],
                ],
            ),
            conclude(
                "ungulate",
                "subtype",
                "ungulate",
                vec![
                    vec![animal(&[("extremities", "hooves")])],
                    vec![animal(&[("chews-cud", "true")])],
                ],
            ),
            ask(
                "eats-meat",
                vec![vec![animal(&[("eats-meat", "unknown")])]],
                "Does the unidentified animal eat meat?",
                YES_NO,
            ),
            ask(
                "has-pointed-teeth",
                vec![vec![animal(&[("has-pointed-teeth", "unknown")])]],
                "Does the unidentified animal have pointed teeth?",
                YES_NO,
            ),
            ask(
                "extremities",
                vec![vec![animal(&[("extremities", "unknown")])]],
                "Describe the unidentified animal's extremities",
                &[("claws", "claws"), ("hooves", "hooves"), ("other", "other")],
            ),
            ask(
                "eye-position",
                vec![vec![animal(&[("eye-position", "unknown")])]],
                "Do the unidentified animal's eyes face forward?",
                &[("yes", "forward"), ("no", "other")],
            ),
            ask(
                "chews-cud",
                vec![vec![animal(&[("chews-cud", "unknown")])]],
                "Does the unidentified animal chew cud?",
                YES_NO,
            ),
        ],
    }
}

fn identity_source() -> SourceDef {
    let flightless_bird = [("type", "bird"), ("can-fly", "false")];
    let spotted_ungulate = [("subtype", "ungulate"), ("marking", "dark-spots")];

    SourceDef {
        name: "identity".to_string(),
        priority: 0,
        trigger: vec![
            vec![
                goal(&[("type", "known"), ("identity", "unknown")]),
                ConditionDef::on("animal").bind(ANIMAL).is("type", "bird"),
            ],
            vec![
                goal(&[("subtype", "known"), ("identity", "unknown")]),
                ConditionDef::on("animal").bind(ANIMAL),
            ],
        ],
        rules: vec![
            identify("albatross", &[("type", "bird"), ("inhabits-becalmed-ships", "true")]),
            identify(
                "penguin",
                &[
                    ("type", "bird"),
                    ("can-fly", "false"),
                    ("can-swim", "true"),
                    ("colour", "black-and-white"),
                ],
            ),
            identify(
                "ostrich",
                &[
                    ("type", "bird"),
                    ("can-fly", "false"),
                    ("neck-length", "long"),
                    ("leg-length", "long"),
                    ("colour", "black-and-white"),
                ],
            ),
            identify("zebra", &[("subtype", "ungulate"), ("marking", "black-stripes")]),
            identify(
                "giraffe",
                &[
                    ("subtype", "ungulate"),
                    ("neck-length", "long"),
                    ("leg-length", "long"),
                    ("marking", "dark-spots"),
                ],
            ),
            identify(
                "tiger",
                &[
                    ("type", "mammal"),
                    ("subtype", "carnivore"),
                    ("colour", "tawny"),
                    ("marking", "black-stripes"),
                ],
            ),
            identify(
                "cheetah",
                &[
                    ("type", "mammal"),
                    ("subtype", "carnivore"),
                    ("colour", "tawny"),
                    ("marking", "dark-spots"),
                ],
            ),
            ask(
                "inhabits-becalmed-ships",
                vec![vec![animal(&[("type", "bird"), ("inhabits-becalmed-ships", "unknown")])]],
                "Does the unidentified animal inhabit becalmed ships?",
                YES_NO,
            ),
            ask(
                "can-fly",
                vec![vec![animal(&[("type", "bird"), ("can-fly", "unknown")])]],
                "Can the unidentified animal fly?",
                YES_NO,
            ),
            ask(
                "can-swim",
                vec![vec![animal(&with(&flightless_bird, ("can-swim", "unknown")))]],
                "Can the unidentified animal swim?",
                YES_NO,
            ),
            ask(
                "colour",
                vec![
                    vec![animal(&with(&flightless_bird, ("colour", "unknown")))],
                    vec![animal(&[("subtype", "carnivore"), ("colour", "unknown")])],
                ],
                "Describe the unidentified animal's colour",
                &[
                    ("black and white", "black-and-white"),
                    ("tawny", "tawny"),
                    ("other", "other"),
                ],
            ),
            ask(
                "marking",
                vec![vec![animal(&[("type", "mammal"), ("marking", "unknown")])]],
                "Describe any markings which may distinguish the unidentified animal",
                &[
                    ("black stripes", "black-stripes"),
                    ("dark spots", "dark-spots"),
                    ("other", "other"),
                ],
            ),
            ask(
                "neck-length",
                vec![
                    vec![animal(&with(&flightless_bird, ("neck-length", "unknown")))],
                    vec![animal(&with(&spotted_ungulate, ("neck-length", "unknown")))],
                ],
                "Does the unidentified animal have a long neck?",
                LONG,
            ),
            ask(
                "leg-length",
                vec![
                    vec![animal(&with(&flightless_bird, ("leg-length", "unknown")))],
                    vec![animal(&with(&spotted_ungulate, ("leg-length", "unknown")))],
                ],
                "Does the unidentified animal have long legs?",
                LONG,
            ),
        ],
    }
}

fn report_source() -> SourceDef {
    SourceDef {
        name: "report".to_string(),
        priority: -10,
        trigger: vec![vec![ConditionDef::on("goal").bind(GOAL)]],
        rules: vec![
            RuleDef {
                name: "identified".to_string(),
                when: Some(vec![vec![
                    ConditionDef::on(GOAL).is("identity", "known"),
                    ConditionDef::on("animal").capture("identity", NAME_VAR),
                ]]),
                then: vec![
                    ActionDef::Write {
                        prompt: vec![
                            SegmentDef::Text("Animal: ".to_string()),
                            SegmentDef::Var {
                                var: NAME_VAR.to_string(),
                            },
                            SegmentDef::Picture {
                                picture: NAME_VAR.to_string(),
                            },
                        ],
                    },
                    quit(),
                ],
            },
            RuleDef {
                name: "unidentified".to_string(),
                when: Some(vec![vec![ConditionDef::on(GOAL).is("identity", "unknown")]]),
                then: vec![
                    ActionDef::Write {
                        prompt: vec![SegmentDef::Text("Unable to identify animal".to_string())],
                    },
                    quit(),
                ],
            },
        ],
    }
}

fn goal(is: &[(&str, &str)]) -> ConditionDef {
    constrain(ConditionDef::on("goal").bind(GOAL), is)
}

/// The animal bound by the trigger.
fn animal(is: &[(&str, &str)]) -> ConditionDef {
    constrain(ConditionDef::on(ANIMAL), is)
}

fn constrain(condition: ConditionDef, is: &[(&str, &str)]) -> ConditionDef {
    is.iter()
        .fold(condition, |condition, (attribute, value)| condition.is(*attribute, *value))
}

fn with<'a>(base: &[(&'a str, &'a str)], extra: (&'a str, &'a str)) -> Vec<(&'a str, &'a str)> {
    let mut pairs = base.to_vec();
    pairs.push(extra);
    pairs
}

/// Settle `slot` of the goal and record `value` on the animal.
fn conclude(name: &str, slot: &str, value: &str, when: Vec<ConjunctionDef>) -> RuleDef {
    RuleDef {
        name: name.to_string(),
        when: Some(when),
        then: vec![
            ActionDef::Modify {
                entry: GOAL.to_string(),
                set: BTreeMap::from([(slot.to_string(), "known".to_string())]),
            },
            ActionDef::Modify {
                entry: ANIMAL.to_string(),
                set: BTreeMap::from([(slot.to_string(), value.to_string())]),
            },
        ],
    }
}

fn identify(name: &str, features: &[(&str, &str)]) -> RuleDef {
    conclude(name, "identity", name, vec![vec![animal(features)]])
}

/// Ask about `attribute` and record the answer on the animal.
fn ask(
    attribute: &str,
    when: Vec<ConjunctionDef>,
    question: &str,
    options: &[(&str, &str)],
) -> RuleDef {
    RuleDef {
        name: format!("ask-{attribute}"),
        when: Some(when),
        then: vec![
            ActionDef::Query {
                result: ANSWER.to_string(),
                prompt: vec![SegmentDef::Text(question.to_string())],
                options: options
                    .iter()
                    .map(|(label, value)| OptionDef::new(*label, *value))
                    .collect(),
                timeout_ms: None,
            },
            ActionDef::Modify {
                entry: ANIMAL.to_string(),
                set: BTreeMap::from([(attribute.to_string(), ANSWER.to_string())]),
            },
        ],
    }
}

fn quit() -> ActionDef {
    ActionDef::Quit {
        source: None,
        controller: false,
    }
}
