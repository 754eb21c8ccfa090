//! Per-render parameter state

use indexmap::IndexMap;

use crate::update::UpdatePayload;

/// Currently known values of the referenced parameters, in arrival order.
///
/// Every update replaces the whole state; nothing is merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterState {
    values: IndexMap<String, String>,
}

impl ParameterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `payload` and replace the state with it. An empty payload
    /// clears the state.
    pub fn apply_update(&mut self, payload: &str) {
        self.replace(UpdatePayload::parse(payload));
    }

    /// Replace the state with an already decoded payload
    pub fn replace(&mut self, payload: UpdatePayload) {
        self.values = payload.into_entries();
        tracing::debug!(values = self.values.len(), "parameter state replaced");
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn values(&self) -> &IndexMap<String, String> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
