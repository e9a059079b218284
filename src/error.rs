//! Error types for conforma
//!
//! Data failures (a value not matching a spec) never surface here — those
//! are `None` conform results and `Problem` vectors. `Error` covers usage
//! failures: unresolvable names, missing generators, non-invertible
//! conformers, and instrumented calls with bad arguments.

use crate::explain::ExplainData;
use crate::value::{Keyword, Value};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Conforma errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to resolve spec: {0}")]
    UnresolvableSpec(Keyword),

    #[error("Registry names must be namespace-qualified: {0}")]
    NotNamespaced(Keyword),

    #[error("Unable to construct gen at: {path:?} for: {form}")]
    NoGenerator { path: Vec<Value>, form: Value },

    #[error("Couldn't satisfy such-that predicate after {tries} tries")]
    SuchThatExhausted { tries: usize },

    #[error("No unform function registered for conformer: {0}")]
    NonInvertible(Value),

    #[error("No args spec registered for: {0}")]
    NoArgsSpec(Keyword),

    #[error("No fn spec registered for: {0}")]
    NoFnSpec(Keyword),

    #[error("Call to {name} did not conform to spec")]
    InstrumentCheck {
        name: Keyword,
        explain: Box<ExplainData>,
        args: Vec<Value>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
