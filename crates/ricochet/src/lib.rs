//! Cascading, script-driven build parameters.
//!
//! A parameter's choices come from a script. When the user changes one
//! parameter on a build form, every parameter that references it receives an
//! update with the current values, re-runs its script and re-renders.
//!
//! ```text
//! update payload ─► ParameterState ─► Script::evaluate ─► canonicalize ─► Choices
//!                                      (primary, then fallback once)
//! ```
//!
//! Script text never runs inside the engine: a [`ScriptRunner`] is injected.
//! [`ExpressionRunner`] is the bundled one.

pub mod canonical;
pub mod error;
pub mod escape;
pub mod filter;
pub mod parameter;
pub mod render;
pub mod runner;
pub mod script;
pub mod state;
pub mod update;
pub mod value;
pub mod visibility;

#[cfg(test)]
mod test_support;

pub use canonical::{Choices, Markers, canonicalize, strip_markers};
pub use error::{EvaluationFailure, ParameterError, ScriptError};
pub use parameter::{CascadingParameter, ChoiceType, ParameterBuilder, ParameterKind};
pub use render::{ChoicesForUi, DEFAULT_RENDER_TTL, Engine, ParameterRender, RenderRegistry};
pub use runner::ExpressionRunner;
pub use script::{
    Bindings, Evaluation, HostEnvironment, JobRef, Script, ScriptBody, ScriptRunner, with_fallback,
};
pub use state::ParameterState;
pub use update::{SEPARATOR, UpdatePayload};
pub use value::Value;
