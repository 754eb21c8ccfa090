//! Error types for script evaluation and parameter definitions

use thiserror::Error;

/// A single script body failed to produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script body is empty")]
    Empty,

    #[error("syntax error: {message}")]
    Syntax { message: String },

    #[error("script failed: {message}")]
    Runtime { message: String },

    /// The sandbox policy refused to run the script text.
    #[error("script rejected: {reason}")]
    Rejected { reason: String },

    /// The runner's execution budget ran out before the script finished.
    #[error("script exceeded its execution budget")]
    BudgetExhausted,
}

/// Both the primary body and the fallback (if any) failed.
///
/// Displays as the primary failure; the fallback failure is kept for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{primary}")]
pub struct EvaluationFailure {
    /// Why the primary body failed
    pub primary: ScriptError,
    /// Why the fallback failed, when one was attempted
    pub fallback: Option<ScriptError>,
}

/// Invalid parameter definition
#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("parameter name must not be empty")]
    EmptyName,

    #[error("unknown choice type `{tag}`")]
    UnknownChoiceType { tag: String },

    #[error("unknown parameter kind `{tag}` (expected choice, cascade or dynamic_reference)")]
    UnknownKind { tag: String },

    #[error("parameter `{name}` is a plain choice parameter and cannot reference other parameters")]
    UnexpectedReferences { name: String },

    #[error("could not generate a render identity: {0}")]
    Entropy(#[from] getrandom::Error),
}
