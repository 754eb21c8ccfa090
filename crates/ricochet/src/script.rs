//! Script execution contract
//!
//! A [`Script`] pairs a primary body with an optional fallback. Bodies are
//! handed to an injected [`ScriptRunner`]; the engine never executes script
//! text itself. Evaluation goes:
//!
//! 1. bind host environment variables,
//! 2. bind the script's static parameters (with `${VAR}` expansion against the
//!    caller environment),
//! 3. bind the caller environment (highest precedence),
//! 4. run the primary body; on failure run the fallback once.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::error::{EvaluationFailure, ScriptError};
use crate::value::Value;

/// Binding name under which the current job is exposed to scripts
pub const JOB_BINDING: &str = "job";

/// Identity of the job whose build form is being rendered.
///
/// Passed through to scripts opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRef {
    /// Short job name
    pub name: String,
    /// Full hierarchical name (e.g. `folder/sub/job`)
    pub full_name: String,
}

impl JobRef {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
        }
    }
}

/// Everything a script body can see while it runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    /// Variables, in binding order
    pub vars: IndexMap<String, String>,
    /// The current job, if known
    pub job: Option<JobRef>,
}

/// The sandboxed-execution capability.
///
/// Implementations own script approval and any timeout; both surface as a
/// [`ScriptError`].
pub trait ScriptRunner: Send + Sync {
    fn run(&self, body: &ScriptBody, bindings: &Bindings) -> Result<Value, ScriptError>;
}

impl<F> ScriptRunner for F
where
    F: Fn(&ScriptBody, &Bindings) -> Result<Value, ScriptError> + Send + Sync,
{
    fn run(&self, body: &ScriptBody, bindings: &Bindings) -> Result<Value, ScriptError> {
        self(body, bindings)
    }
}

/// Environment variables of the host process, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    vars: IndexMap<String, String>,
}

impl HostEnvironment {
    /// Capture the current process environment, sorted by name
    pub fn capture() -> Self {
        let mut vars: IndexMap<String, String> = std::env::vars().collect();
        vars.sort_keys();
        Self { vars }
    }

    /// An empty environment
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vars(&self) -> &IndexMap<String, String> {
        &self.vars
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HostEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One body of script text plus its execution mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptBody {
    source: String,
    sandboxed: bool,
}

impl ScriptBody {
    /// A body that runs inside the sandbox
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            sandboxed: true,
        }
    }

    /// A body that asks to run outside the sandbox. Whether that is allowed
    /// is the runner's decision.
    pub fn unsandboxed(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            sandboxed: false,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_sandboxed(&self) -> bool {
        self.sandboxed
    }

    pub fn is_blank(&self) -> bool {
        self.source.trim().is_empty()
    }
}

/// Outcome of evaluating a [`Script`]
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Ok(Value),
    Failed(EvaluationFailure),
}

impl Evaluation {
    pub fn is_ok(&self) -> bool {
        matches!(self, Evaluation::Ok(_))
    }

    pub fn into_result(self) -> Result<Value, EvaluationFailure> {
        match self {
            Evaluation::Ok(v) => Ok(v),
            Evaluation::Failed(e) => Err(e),
        }
    }
}

/// Run `primary`; if it fails and a fallback is given, run the fallback once.
///
/// When both fail the primary failure is reported, with the fallback failure
/// attached.
pub fn with_fallback<P, F>(primary: P, fallback: Option<F>) -> Evaluation
where
    P: FnOnce() -> Result<Value, ScriptError>,
    F: FnOnce() -> Result<Value, ScriptError>,
{
    let primary_err = match primary() {
        Ok(value) => return Evaluation::Ok(value),
        Err(e) => e,
    };

    let Some(fallback) = fallback else {
        return Evaluation::Failed(EvaluationFailure {
            primary: primary_err,
            fallback: None,
        });
    };

    tracing::warn!(error = %primary_err, "primary script failed, running fallback");
    match fallback() {
        Ok(value) => Evaluation::Ok(value),
        Err(fallback_err) => {
            tracing::warn!(error = %fallback_err, "fallback script failed too");
            Evaluation::Failed(EvaluationFailure {
                primary: primary_err,
                fallback: Some(fallback_err),
            })
        }
    }
}

/// A primary script body, an optional fallback and static parameters.
///
/// Immutable once built; evaluating never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    primary: ScriptBody,
    fallback: Option<ScriptBody>,
    static_parameters: IndexMap<String, String>,
}

impl Script {
    /// A sandboxed script with no fallback
    pub fn new(primary: impl Into<String>) -> Self {
        Self::from_bodies(ScriptBody::new(primary), None)
    }

    pub fn from_bodies(primary: ScriptBody, fallback: Option<ScriptBody>) -> Self {
        Self {
            primary,
            fallback,
            static_parameters: IndexMap::new(),
        }
    }

    /// Set a sandboxed fallback body
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(ScriptBody::new(fallback));
        self
    }

    /// Add a static parameter. Its value may use `${VAR}` macros.
    pub fn with_static_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_parameters.insert(name.into(), value.into());
        self
    }

    pub fn primary(&self) -> &ScriptBody {
        &self.primary
    }

    /// The fallback body, when present and non-blank
    pub fn fallback(&self) -> Option<&ScriptBody> {
        self.fallback.as_ref().filter(|body| !body.is_blank())
    }

    pub fn static_parameters(&self) -> &IndexMap<String, String> {
        &self.static_parameters
    }

    /// True when neither body has any text
    pub fn is_blank(&self) -> bool {
        self.primary.is_blank() && self.fallback().is_none()
    }

    /// Merge host environment, static parameters and the caller environment,
    /// in increasing precedence.
    pub fn bindings(
        &self,
        host: &HostEnvironment,
        job: Option<&JobRef>,
        environment: &IndexMap<String, String>,
    ) -> Bindings {
        let mut vars = host.vars().clone();
        for (name, value) in &self.static_parameters {
            let value = if environment.is_empty() {
                value.clone()
            } else {
                expand_macros(value, environment)
            };
            vars.insert(name.clone(), value);
        }
        for (name, value) in environment {
            vars.insert(name.clone(), value.clone());
        }
        Bindings {
            vars,
            job: job.cloned(),
        }
    }

    /// Evaluate against `environment`, falling back once on failure.
    pub fn evaluate(
        &self,
        runner: &dyn ScriptRunner,
        host: &HostEnvironment,
        job: Option<&JobRef>,
        environment: &IndexMap<String, String>,
    ) -> Evaluation {
        let bindings = self.bindings(host, job, environment);
        let bindings = &bindings;
        tracing::debug!(vars = environment.len(), "evaluating script");
        with_fallback(
            || run_body(runner, &self.primary, bindings),
            self.fallback()
                .map(|fallback| move || run_body(runner, fallback, bindings)),
        )
    }
}

fn run_body(
    runner: &dyn ScriptRunner,
    body: &ScriptBody,
    bindings: &Bindings,
) -> Result<Value, ScriptError> {
    if body.is_blank() {
        return Err(ScriptError::Empty);
    }
    runner.run(body, bindings)
}

static MACRO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(\$|\{([A-Za-z0-9_.]+)\}|([A-Za-z0-9_]+))").expect("macro pattern is valid")
});

/// Expand `$VAR` and `${VAR}` against `vars`.
///
/// Unknown variables are left verbatim; `$$` becomes a literal `$`.
pub fn expand_macros(text: &str, vars: &IndexMap<String, String>) -> String {
    MACRO
        .replace_all(text, |caps: &Captures<'_>| {
            if &caps[1] == "$" {
                return "$".to_string();
            }
            let name = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match vars.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
