//! Engine error taxonomy.

use std::time::Duration;

use crate::symbol::Symbol;

/// Errors raised while building or running a knowledge based system.
///
/// Every variant aborts the rule firing in progress and halts the controller.
/// Matching the first satisfying conjunction is policy, so there is no
/// ambiguity error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KbsError {
    #[error("unknown symbol id {0}")]
    UnknownSymbol(u32),

    #[error("no blackboard level declared for entry {0}")]
    NoSuchLevel(Symbol),

    #[error("variable {0} is not bound")]
    UnboundVariable(Symbol),

    #[error("answer `{answer}` is not one of the offered options {options:?}")]
    InvalidResponse {
        answer: String,
        options: Vec<String>,
    },

    #[error("query was not answered within {after:?}")]
    QueryTimeout { after: Duration },

    #[error("client failure: {0}")]
    ClientFailure(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("cycle limit of {0} reached")]
    CycleLimit(u64),

    #[error("no knowledge source named `{0}`")]
    NoSuchSource(String),
}

pub type Result<T, E = KbsError> = std::result::Result<T, E>;
