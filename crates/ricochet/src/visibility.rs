//! Visibility evaluation
//!
//! A parameter without a visibility script, or whose visibility script has
//! neither primary nor fallback text, is visible. Otherwise the script decides: an empty string or
//! the literal `false` hides the parameter, anything else shows it. A script
//! that fails (after its fallback) hides the parameter.

use indexmap::IndexMap;

use crate::script::{Evaluation, HostEnvironment, JobRef, Script, ScriptRunner};
use crate::value::Value;

/// Coerce a visibility script result to a boolean
pub fn coerce_visibility(value: &Value) -> bool {
    let rendered = value.render_to_string();
    !(rendered.is_empty() || rendered == "false")
}

/// Decide visibility for the given environment
pub fn is_visible(
    script: Option<&Script>,
    runner: &dyn ScriptRunner,
    host: &HostEnvironment,
    job: Option<&JobRef>,
    environment: &IndexMap<String, String>,
) -> bool {
    let Some(script) = script else {
        return true;
    };
    if script.is_blank() {
        return true;
    }

    match script.evaluate(runner, host, job, environment) {
        Evaluation::Ok(value) => coerce_visibility(&value),
        Evaluation::Failed(failure) => {
            tracing::warn!(error = %failure, "visibility script failed, hiding parameter");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptError;
    use crate::test_support::ScriptedRunner;

    fn visible(script: Option<&Script>, runner: &ScriptedRunner, env: &[(&str, &str)]) -> bool {
        let env: IndexMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        is_visible(script, runner, &HostEnvironment::empty(), None, &env)
    }

    #[test]
    fn test_coercion() {
        assert!(!coerce_visibility(&Value::from("")));
        assert!(!coerce_visibility(&Value::from("false")));
        assert!(!coerce_visibility(&Value::Bool(false)));
        assert!(!coerce_visibility(&Value::Null));
        assert!(coerce_visibility(&Value::Bool(true)));
        assert!(coerce_visibility(&Value::from("no")));
        assert!(coerce_visibility(&Value::Int(0)));
    }

    #[test]
    fn test_no_script_is_visible() {
        assert!(visible(None, &ScriptedRunner::new(), &[]));
    }

    #[test]
    fn test_blank_script_is_visible() {
        let runner = ScriptedRunner::new();
        assert!(visible(Some(&Script::new("")), &runner, &[]));
        assert!(visible(Some(&Script::new(" ").with_fallback("")), &runner, &[]));
    }

    #[test]
    fn test_blank_primary_defers_to_fallback() {
        let runner = ScriptedRunner::new().ok("hide", Value::Bool(false));
        let script = Script::new("").with_fallback("hide");
        assert!(!visible(Some(&script), &runner, &[]));
        assert_eq!(runner.calls("hide"), 1);

        let runner = ScriptedRunner::new().ok("show", Value::Bool(true));
        let script = Script::new("").with_fallback("show");
        assert!(visible(Some(&script), &runner, &[]));
        assert_eq!(runner.calls("show"), 1);
    }

    #[test]
    fn test_false_result_hides() {
        let runner = ScriptedRunner::new().ok("hide", Value::Bool(false));
        let script = Script::new("hide").with_fallback("hide");
        assert!(!visible(Some(&script), &runner, &[]));
    }

    #[test_log::test]
    fn test_failure_fails_closed() {
        let runner = ScriptedRunner::new().fail("boom", "kaboom");
        let script = Script::new("boom");
        assert!(!visible(Some(&script), &runner, &[]));
    }

    #[test]
    fn test_fallback_result_is_used() {
        let runner = ScriptedRunner::new()
            .fail("boom", "kaboom")
            .ok("show", Value::Bool(true));
        let script = Script::new("boom").with_fallback("show");
        assert!(visible(Some(&script), &runner, &[]));
    }

    #[test]
    fn test_cascaded_visibility() {
        let runner = ScriptedRunner::new().with("both", |bindings| {
            let a = bindings.vars.get("param001").map(String::as_str);
            let b = bindings.vars.get("param002").map(String::as_str);
            match (a, b) {
                (Some(a), Some(b)) => Ok(Value::Bool(a == "A" && b == "B")),
                _ => Err(ScriptError::Runtime {
                    message: "unbound".into(),
                }),
            }
        });
        let script = Script::new("both").with_fallback("");

        assert!(visible(Some(&script), &runner, &[("param001", "A"), ("param002", "B")]));
        assert!(!visible(Some(&script), &runner, &[("param001", "A"), ("param002", "A")]));
        assert!(!visible(Some(&script), &runner, &[("param001", "B"), ("param002", "B")]));
        assert!(!visible(Some(&script), &runner, &[]));
    }
}
