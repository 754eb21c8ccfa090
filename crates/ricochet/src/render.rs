//! Render sessions
//!
//! A [`ParameterRender`] is one page instance of a parameter: the shared,
//! immutable definition plus the state accumulated from that page's updates.
//! Renders are keyed by a freshly generated render identity, so two users
//! opening the same build form never see each other's pending values.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use serde::Serialize;

use crate::canonical::{Choices, canonicalize, strip_markers};
use crate::error::ParameterError;
use crate::escape::{escape_for_html, escape_value};
use crate::filter::filter_choices;
use crate::parameter::{CascadingParameter, defaults_to_rendered_value, random_parameter_name};
use crate::script::{Evaluation, HostEnvironment, JobRef, ScriptRunner};
use crate::state::ParameterState;
use crate::value::Value;
use crate::visibility;

/// Shared execution capabilities: the script runner and the host environment.
#[derive(Clone)]
pub struct Engine {
    runner: Arc<dyn ScriptRunner>,
    host: HostEnvironment,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("host_vars", &self.host.vars().len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// An engine with an empty host environment
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self {
            runner,
            host: HostEnvironment::empty(),
        }
    }

    pub fn with_host_environment(mut self, host: HostEnvironment) -> Self {
        self.host = host;
        self
    }

    pub fn runner(&self) -> &dyn ScriptRunner {
        self.runner.as_ref()
    }

    pub fn host_environment(&self) -> &HostEnvironment {
        &self.host
    }

    /// Start a new render of `parameter` with empty state and a fresh identity
    pub fn render(
        &self,
        parameter: Arc<CascadingParameter>,
        job: Option<JobRef>,
    ) -> Result<ParameterRender, ParameterError> {
        let render_id = random_parameter_name("choice-parameter", parameter.name())?;
        tracing::debug!(parameter = parameter.name(), %render_id, "new render");
        Ok(ParameterRender {
            engine: self.clone(),
            parameter,
            job,
            render_id,
            state: ParameterState::new(),
        })
    }
}

/// One page instance of a parameter
#[derive(Debug, Clone)]
pub struct ParameterRender {
    engine: Engine,
    parameter: Arc<CascadingParameter>,
    job: Option<JobRef>,
    render_id: String,
    state: ParameterState,
}

impl ParameterRender {
    pub fn render_id(&self) -> &str {
        &self.render_id
    }

    pub fn parameter(&self) -> &CascadingParameter {
        &self.parameter
    }

    pub fn job(&self) -> Option<&JobRef> {
        self.job.as_ref()
    }

    pub fn state(&self) -> &ParameterState {
        &self.state
    }

    /// Replace this render's state with the decoded update payload
    pub fn apply_update(&mut self, payload: &str) {
        tracing::debug!(
            parameter = self.parameter.name(),
            render_id = %self.render_id,
            "applying update"
        );
        self.state.apply_update(payload);
    }

    /// Evaluate the choices script against the current state
    pub fn evaluate(&self) -> Evaluation {
        self.parameter.script().evaluate(
            self.engine.runner(),
            self.engine.host_environment(),
            self.job.as_ref(),
            self.state.values(),
        )
    }

    /// Current canonical choices. A script failure becomes the only choice.
    pub fn choices(&self) -> Choices {
        resolve_choices(self.parameter.name(), self.evaluate())
    }

    /// Current choices narrowed by the filter text, for filterable parameters
    pub fn filtered_choices(&self, text: &str) -> Choices {
        let choices = self.choices();
        if !self.parameter.filterable() {
            return choices;
        }
        filter_choices(&choices, text, self.parameter.filter_length())
    }

    /// The raw result rendered as a single string, escaped for HTML-bearing
    /// choice types
    pub fn choices_as_string(&self) -> String {
        let rendered = match self.evaluate() {
            Evaluation::Ok(value) => value.render_to_string(),
            Evaluation::Failed(failure) => {
                tracing::warn!(parameter = self.parameter.name(), error = %failure, "could not resolve value");
                failure.to_string()
            }
        };
        if self.parameter.choice_type().is_html_bearing() {
            escape_for_html(&rendered)
        } else {
            rendered
        }
    }

    /// The `[values, labels]` payload the browser consumes
    pub fn choices_for_ui(&self) -> ChoicesForUi {
        ChoicesForUi::build(&self.choices(), self.parameter.choice_type().is_html_bearing())
    }

    /// [`choices_for_ui`](Self::choices_for_ui) narrowed by the filter text
    pub fn filtered_choices_for_ui(&self, text: &str) -> ChoicesForUi {
        ChoicesForUi::build(
            &self.filtered_choices(text),
            self.parameter.choice_type().is_html_bearing(),
        )
    }

    /// Default value for this render's current state
    pub fn default_value(&self) -> String {
        if defaults_to_rendered_value(self.parameter.kind()) {
            return match self.evaluate() {
                Evaluation::Ok(value) => value.render_to_string(),
                Evaluation::Failed(_) => String::new(),
            };
        }
        default_from_choices(&self.choices(), self.parameter.choice_type().is_multi_valued())
    }

    pub fn is_visible(&self) -> bool {
        visibility::is_visible(
            self.parameter.visibility_script(),
            self.engine.runner(),
            self.engine.host_environment(),
            self.job.as_ref(),
            self.state.values(),
        )
    }
}

/// Turn an evaluation into choices, surfacing a failure as the sole choice
pub fn resolve_choices(parameter: &str, evaluation: Evaluation) -> Choices {
    match evaluation {
        Evaluation::Ok(raw) => canonicalize(raw),
        Evaluation::Failed(failure) => {
            tracing::warn!(parameter, error = %failure, "could not resolve choices");
            Choices::failure(failure.to_string())
        }
    }
}

/// Default value from canonical choices.
///
/// Entries marked `:selected` win (all of them, comma-joined, for
/// multi-valued types); otherwise the first label; otherwise empty.
pub fn default_from_choices(choices: &Choices, multi_valued: bool) -> String {
    let mut selected = choices.labels().filter_map(|label| {
        let (clean, markers) = strip_markers(label);
        markers.selected.then_some(clean)
    });

    if multi_valued {
        let all: Vec<&str> = selected.collect();
        if !all.is_empty() {
            return all.join(",");
        }
    } else if let Some(first) = selected.next() {
        return first.to_string();
    }

    choices
        .first()
        .map(|(label, _)| strip_markers(label).0.to_string())
        .unwrap_or_default()
}

/// Two parallel arrays: values first, labels second.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoicesForUi {
    pub values: Vec<Value>,
    pub labels: Vec<String>,
}

impl ChoicesForUi {
    fn build(choices: &Choices, escape: bool) -> Self {
        let (values, labels) = choices
            .iter()
            .map(|(label, value)| {
                if escape {
                    (escape_value(value), escape_for_html(label))
                } else {
                    (value.clone(), label.clone())
                }
            })
            .unzip();
        Self { values, labels }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[[],[]]".to_string())
    }
}

impl Serialize for ChoicesForUi {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.values, &self.labels).serialize(serializer)
    }
}

/// How long a render may go untouched before the registry drops it
pub const DEFAULT_RENDER_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug)]
struct RegisteredRender {
    render: ParameterRender,
    touched: Instant,
}

/// Live renders keyed by render identity.
///
/// Updates to one render are last-writer-wins; different renders never share
/// state. A render that has not been read or updated for longer than the idle
/// TTL is treated as closed and dropped.
#[derive(Debug)]
pub struct RenderRegistry {
    renders: DashMap<String, RegisteredRender>,
    ttl: Duration,
}

impl Default for RenderRegistry {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_RENDER_TTL)
    }
}

impl RenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(ttl: Duration) -> Self {
        Self {
            renders: DashMap::new(),
            ttl,
        }
    }

    pub fn idle_ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a render, returning its identity
    pub fn insert(&self, render: ParameterRender) -> String {
        self.evict_idle();
        let id = render.render_id().to_string();
        self.renders.insert(
            id.clone(),
            RegisteredRender {
                render,
                touched: Instant::now(),
            },
        );
        id
    }

    /// Run `f` against a render
    pub fn with_render<R>(&self, render_id: &str, f: impl FnOnce(&ParameterRender) -> R) -> Option<R> {
        self.live(render_id).map(|entry| f(&entry.render))
    }

    /// Run `f` against a render, mutably
    pub fn with_render_mut<R>(
        &self,
        render_id: &str,
        f: impl FnOnce(&mut ParameterRender) -> R,
    ) -> Option<R> {
        self.live(render_id).map(|mut entry| f(&mut entry.render))
    }

    pub fn remove(&self, render_id: &str) -> Option<ParameterRender> {
        self.renders.remove(render_id).map(|(_, entry)| entry.render)
    }

    /// Drop every render idle for longer than the TTL, returning how many went
    pub fn evict_idle(&self) -> usize {
        let before = self.renders.len();
        self.renders.retain(|_, entry| entry.touched.elapsed() <= self.ttl);
        let evicted = before.saturating_sub(self.renders.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.renders.len(), "evicted idle renders");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.renders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renders.is_empty()
    }

    /// Look up a render and mark it as used; an expired render is removed
    fn live(&self, render_id: &str) -> Option<RefMut<'_, String, RegisteredRender>> {
        let mut entry = self.renders.get_mut(render_id)?;
        if entry.touched.elapsed() > self.ttl {
            // the shard lock must be released before removing
            drop(entry);
            self.renders
                .remove_if(render_id, |_, entry| entry.touched.elapsed() > self.ttl);
            tracing::debug!(render_id, "render expired");
            return None;
        }
        entry.touched = Instant::now();
        Some(entry)
    }
}
