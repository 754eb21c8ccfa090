//! Update wire protocol
//!
//! The browser sends the current values of a parameter's referenced
//! parameters as one string:
//!
//! ```text
//! param001=A__LESEP__param002=B__LESEP__param003=
//! ```
//!
//! Pairs are split on [`SEPARATOR`] first, then each pair on its first `=`
//! only, so values may contain `=`. A segment without `=` (or with an empty
//! name) is skipped; the rest of the payload still applies.

use indexmap::IndexMap;

/// Token joining `name=value` pairs
pub const SEPARATOR: &str = "__LESEP__";

/// A decoded update payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePayload {
    entries: IndexMap<String, String>,
    skipped: Vec<String>,
}

impl UpdatePayload {
    /// Decode a wire payload. Never fails; malformed segments are recorded in
    /// [`skipped`](Self::skipped).
    pub fn parse(payload: &str) -> Self {
        let mut parsed = Self::default();
        if payload.is_empty() {
            return parsed;
        }

        for segment in payload.split(SEPARATOR) {
            match segment.split_once('=') {
                Some((name, value)) if !name.trim().is_empty() => {
                    parsed
                        .entries
                        .insert(name.trim().to_string(), value.to_string());
                }
                _ => {
                    tracing::warn!(segment, "skipping malformed update segment");
                    parsed.skipped.push(segment.to_string());
                }
            }
        }
        parsed
    }

    /// Encode `name=value` pairs into a wire payload
    pub fn encode<I, K, V>(pairs: I) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }

    /// Parsed pairs in arrival order
    pub fn entries(&self) -> &IndexMap<String, String> {
        &self.entries
    }

    /// Segments that were not `name=value` shaped
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn into_entries(self) -> IndexMap<String, String> {
        self.entries
    }
}
