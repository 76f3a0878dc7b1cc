//! The interactive I/O boundary.
//!
//! The engine never renders anything itself. `Write` and `Query` actions hand
//! a fully rendered [`Prompt`] to a [`Client`] and, for queries, block until the
//! client returns the label of one of the offered options.

pub mod channel;
pub mod script;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use channel::{channel, Answer, ChannelClient, ClientEndpoint, ClientRequest};
pub use script::{Exchange, ScriptFile, ScriptedClient, Transcript};

/// One rendered piece of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PromptPart {
    Text(String),
    /// Name of an image the client may show alongside the text.
    Picture(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub parts: Vec<PromptPart>,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![PromptPart::Text(text.into())],
        }
    }

    pub fn push(&mut self, part: PromptPart) {
        self.parts.push(part);
    }

    pub fn pictures(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            PromptPart::Picture(name) => Some(name.as_str()),
            PromptPart::Text(_) => None,
        })
    }
}

/// Plain text rendering; pictures are left out.
impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            if let PromptPart::Text(text) = part {
                f.write_str(text)?;
            }
        }
        Ok(())
    }
}

/// A question with a closed set of answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: Prompt,
    /// Option labels, in the order the knowledge base declared them.
    pub options: Vec<String>,
    /// How long the engine is prepared to wait, if bounded.
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("client failed: {0}")]
    Failed(String),
    #[error("no answer before the deadline")]
    TimedOut,
    #[error("cancelled while waiting for the client")]
    Cancelled,
    #[error("client disconnected")]
    Disconnected,
}

/// Host-side presentation layer consumed by `Write` and `Query` actions.
///
/// Both calls may block for as long as the host likes; `query` returns the
/// label of the chosen option.
pub trait Client {
    fn write(&mut self, message: &Prompt) -> Result<(), ClientError>;

    fn query(&mut self, question: &Question) -> Result<String, ClientError>;
}

impl<C: Client + ?Sized> Client for Box<C> {
    fn write(&mut self, message: &Prompt) -> Result<(), ClientError> {
        (**self).write(message)
    }

    fn query(&mut self, question: &Question) -> Result<String, ClientError> {
        (**self).query(question)
    }
}
