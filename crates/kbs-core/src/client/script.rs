//! Scripted answers, for tests and unattended runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;

use super::{Client, ClientError, Prompt, Question};

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    Wrote(Prompt),
    Asked {
        prompt: Prompt,
        options: Vec<String>,
        answer: String,
    },
}

/// Shared record of everything a [`ScriptedClient`] saw. Clones observe the
/// same record, so a test can keep one after handing the client to a system.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    exchanges: Arc<Mutex<Vec<Exchange>>>,
}

impl Transcript {
    fn lock(&self) -> MutexGuard<'_, Vec<Exchange>> {
        // A panicking test thread must not hide what was recorded.
        self.exchanges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, exchange: Exchange) {
        self.lock().push(exchange);
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.lock().clone()
    }

    /// Plain text of every `write`, in order.
    pub fn writes(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|exchange| match exchange {
                Exchange::Wrote(message) => Some(message.to_string()),
                Exchange::Asked { .. } => None,
            })
            .collect()
    }

    /// `(question text, answer label)` for every `query`, in order.
    pub fn questions(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .filter_map(|exchange| match exchange {
                Exchange::Asked { prompt, answer, .. } => {
                    Some((prompt.to_string(), answer.clone()))
                }
                Exchange::Wrote(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Script {
    /// Answers consumed in order, whatever the question.
    Sequence(VecDeque<String>),
    /// `(fragment, label)`: the first fragment contained in the question text
    /// selects the label.
    Keyed(Vec<(String, String)>),
}

/// Answers queries from a fixed script and records every exchange.
#[derive(Debug, Clone)]
pub struct ScriptedClient {
    script: Script,
    transcript: Transcript,
}

impl ScriptedClient {
    pub fn sequence<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script::Sequence(answers.into_iter().map(Into::into).collect()),
            transcript: Transcript::default(),
        }
    }

    pub fn keyed<I, K, V>(answers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            script: Script::Keyed(
                answers
                    .into_iter()
                    .map(|(fragment, label)| (fragment.into(), label.into()))
                    .collect(),
            ),
            transcript: Transcript::default(),
        }
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    fn next_answer(&mut self, question: &Question) -> Result<String, ClientError> {
        let text = question.prompt.to_string();
        match &mut self.script {
            Script::Sequence(answers) => answers
                .pop_front()
                .ok_or_else(|| ClientError::Failed(format!("script exhausted at `{text}`"))),
            Script::Keyed(answers) => answers
                .iter()
                .find(|(fragment, _)| text.contains(fragment.as_str()))
                .map(|(_, label)| label.clone())
                .ok_or_else(|| ClientError::Failed(format!("no scripted answer for `{text}`"))),
        }
    }
}

impl Client for ScriptedClient {
    fn write(&mut self, message: &Prompt) -> Result<(), ClientError> {
        self.transcript.push(Exchange::Wrote(message.clone()));
        Ok(())
    }

    fn query(&mut self, question: &Question) -> Result<String, ClientError> {
        let answer = self.next_answer(question)?;
        self.transcript.push(Exchange::Asked {
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            answer: answer.clone(),
        });
        Ok(answer)
    }
}

/// On-disk answer script.
///
/// ```yaml
/// answers: [hair, "no", "yes", hooves]
/// keyed:
///   - ["body covering", hair]
///   - ["markings", "black stripes"]
/// ```
///
/// `keyed` wins when both are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptFile {
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub keyed: Vec<(String, String)>,
}

impl From<ScriptFile> for ScriptedClient {
    fn from(file: ScriptFile) -> Self {
        if file.keyed.is_empty() {
            Self::sequence(file.answers)
        } else {
            Self::keyed(file.keyed)
        }
    }
}
