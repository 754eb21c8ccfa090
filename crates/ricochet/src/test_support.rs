//! In-memory script runner for unit tests.
//!
//! Scripts are looked up by their exact body text; every lookup is counted.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ScriptError;
use crate::script::{Bindings, ScriptBody, ScriptRunner};
use crate::value::Value;

type Handler = Box<dyn Fn(&Bindings) -> Result<Value, ScriptError> + Send + Sync>;

#[derive(Default)]
pub(crate) struct ScriptedRunner {
    scripts: HashMap<String, Handler>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ok(self, body: &str, value: Value) -> Self {
        self.with(body, move |_| Ok(value.clone()))
    }

    pub(crate) fn fail(self, body: &str, message: &str) -> Self {
        let message = message.to_string();
        self.with(body, move |_| {
            Err(ScriptError::Runtime {
                message: message.clone(),
            })
        })
    }

    pub(crate) fn with(
        mut self,
        body: &str,
        handler: impl Fn(&Bindings) -> Result<Value, ScriptError> + Send + Sync + 'static,
    ) -> Self {
        self.scripts.insert(body.to_string(), Box::new(handler));
        self
    }

    pub(crate) fn calls(&self, body: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(body)
            .copied()
            .unwrap_or_default()
    }
}

impl ScriptRunner for ScriptedRunner {
    fn run(&self, body: &ScriptBody, bindings: &Bindings) -> Result<Value, ScriptError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(body.source().to_string())
            .or_default() += 1;
        match self.scripts.get(body.source()) {
            Some(handler) => handler(bindings),
            None => Err(ScriptError::Runtime {
                message: format!("no such script: {}", body.source()),
            }),
        }
    }
}
