//! Bundled script runner
//!
//! Runs script bodies as minijinja expressions. Every binding becomes a
//! top-level variable and the current job is exposed as `job`; referring to
//! a name that is not bound fails the body. An optional fuel budget bounds how
//! much work one body may do.

use std::collections::BTreeMap;

use minijinja::value::ValueKind;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};

use crate::error::ScriptError;
use crate::script::{Bindings, JOB_BINDING, ScriptBody, ScriptRunner};
use crate::value::Value;

/// Leading keyword tolerated in front of an expression
const RETURN_PREFIX: &str = "return ";

/// Globals the expression environment provides on its own
const BUILTIN_GLOBALS: &[&str] = &["range", "dict", "debug", "namespace"];

/// Expression-language [`ScriptRunner`]
#[derive(Debug, Clone, Default)]
pub struct ExpressionRunner {
    fuel: Option<u64>,
    allow_unsandboxed: bool,
}

impl ExpressionRunner {
    /// A runner with no fuel limit that refuses unsandboxed bodies
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each body to `fuel` instructions
    pub fn with_fuel(mut self, fuel: Option<u64>) -> Self {
        self.fuel = fuel;
        self
    }

    /// Run bodies that ask to bypass the sandbox instead of rejecting them
    pub fn allow_unsandboxed(mut self, allow: bool) -> Self {
        self.allow_unsandboxed = allow;
        self
    }

    pub fn fuel(&self) -> Option<u64> {
        self.fuel
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_fuel(self.fuel);
        env
    }
}

impl ScriptRunner for ExpressionRunner {
    fn run(&self, body: &ScriptBody, bindings: &Bindings) -> Result<Value, ScriptError> {
        if !body.is_sandboxed() && !self.allow_unsandboxed {
            return Err(ScriptError::Rejected {
                reason: "script is not approved to run outside the sandbox".to_string(),
            });
        }

        let source = body.source().trim();
        let source = source.strip_prefix(RETURN_PREFIX).unwrap_or(source).trim();

        let env = self.environment();
        let expr = env.compile_expression(source).map_err(script_error)?;

        let mut context: BTreeMap<String, minijinja::Value> = bindings
            .vars
            .iter()
            .map(|(name, value)| (name.clone(), minijinja::Value::from(value.as_str())))
            .collect();
        if let Some(job) = &bindings.job {
            context.insert(JOB_BINDING.to_string(), minijinja::Value::from_serialize(job));
        }

        // An unbound name fails the body instead of evaluating as undefined
        let mut unbound: Vec<String> = expr
            .undeclared_variables(false)
            .into_iter()
            .filter(|name| !context.contains_key(name) && !BUILTIN_GLOBALS.contains(&name.as_str()))
            .collect();
        unbound.sort();
        if let Some(name) = unbound.first() {
            return Err(ScriptError::Runtime {
                message: format!("unbound variable `{name}`"),
            });
        }

        let result = expr.eval(context).map_err(script_error)?;
        Ok(from_template_value(&result))
    }
}

fn script_error(err: minijinja::Error) -> ScriptError {
    match err.kind() {
        ErrorKind::OutOfFuel => ScriptError::BudgetExhausted,
        ErrorKind::SyntaxError => ScriptError::Syntax {
            message: err.to_string(),
        },
        _ => ScriptError::Runtime {
            message: err.to_string(),
        },
    }
}

/// Convert an expression result into an engine [`Value`]
fn from_template_value(value: &minijinja::Value) -> Value {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Value::Null,
        ValueKind::Bool => Value::Bool(value.is_true()),
        ValueKind::Number => match i64::try_from(value.clone()) {
            Ok(n) => Value::Int(n),
            Err(_) => f64::try_from(value.clone())
                .map(Value::Float)
                .unwrap_or_else(|_| Value::String(value.to_string())),
        },
        ValueKind::String => Value::String(value.as_str().unwrap_or_default().to_string()),
        ValueKind::Seq | ValueKind::Iterable => match value.try_iter() {
            Ok(items) => Value::List(items.map(|item| from_template_value(&item)).collect()),
            Err(_) => Value::String(value.to_string()),
        },
        ValueKind::Map => match value.try_iter() {
            Ok(keys) => Value::Map(
                keys.map(|key| {
                    let item = value.get_item(&key).unwrap_or_default();
                    let key = match key.as_str() {
                        Some(s) => s.to_string(),
                        None => key.to_string(),
                    };
                    (key, from_template_value(&item))
                })
                .collect(),
            ),
            Err(_) => Value::String(value.to_string()),
        },
        _ => Value::String(value.to_string()),
    }
}
