//! Canonical choice mappings
//!
//! Every script result is normalized into an ordered label → value mapping
//! before anything downstream looks at it:
//!
//! - a mapping is kept as-is, in declared order,
//! - a sequence becomes `(string_of(item), item)` pairs in sequence order,
//! - anything else becomes the single pair `(string_of(raw), raw)`.
//!
//! Canonicalizing is total and idempotent.

use indexmap::IndexMap;
use serde::Serialize;

use crate::value::Value;

const SELECTED: &str = ":selected";
const DISABLED: &str = ":disabled";

/// Ordered label → value mapping
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Choices(IndexMap<String, Value>);

impl Choices {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mapping used to surface a resolution failure: its message is the
    /// only choice.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut map = IndexMap::with_capacity(1);
        map.insert(message.clone(), Value::String(message));
        Self(map)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&Value> {
        self.0.get(label)
    }

    pub fn first(&self) -> Option<(&String, &Value)> {
        self.0.first()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }

    pub fn as_map(&self) -> &IndexMap<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> IndexMap<String, Value> {
        self.0
    }
}

impl From<IndexMap<String, Value>> for Choices {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Choices> for Value {
    fn from(choices: Choices) -> Self {
        Value::Map(choices.0)
    }
}

impl<'a> IntoIterator for &'a Choices {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Choices {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Normalize a raw script result into its canonical choice mapping.
pub fn canonicalize(raw: Value) -> Choices {
    match raw {
        Value::Map(map) => Choices(map),
        Value::List(items) => Choices(
            items
                .into_iter()
                .map(|item| (item.render_to_string(), item))
                .collect(),
        ),
        scalar => {
            let mut map = IndexMap::with_capacity(1);
            map.insert(scalar.render_to_string(), scalar);
            Choices(map)
        }
    }
}

/// Selection markers carried as suffixes on a label or value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Markers {
    pub selected: bool,
    pub disabled: bool,
}

/// Strip trailing `:selected` / `:disabled` markers, in either order.
pub fn strip_markers(text: &str) -> (&str, Markers) {
    let mut rest = text;
    let mut markers = Markers::default();
    loop {
        if !markers.selected
            && let Some(stripped) = rest.strip_suffix(SELECTED)
        {
            markers.selected = true;
            rest = stripped;
        } else if !markers.disabled
            && let Some(stripped) = rest.strip_suffix(DISABLED)
        {
            markers.disabled = true;
            rest = stripped;
        } else {
            return (rest, markers);
        }
    }
}
