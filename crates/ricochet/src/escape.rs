//! HTML output encoding
//!
//! Script output is attacker-influenced and lands in HTML, so every label and
//! scalar string bound for an HTML-bearing rendering goes through here.

use crate::value::Value;

/// Escape `& < > " '` with entity references
pub fn escape_for_html(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

/// Escape a value destined for an HTML-bearing rendering.
///
/// Strings are escaped; other scalars are converted to their string form and
/// escaped. Lists and maps are returned untouched; the client serializes them
/// as text.
pub fn escape_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_for_html(s)),
        Value::List(_) | Value::Map(_) => value.clone(),
        scalar => Value::String(escape_for_html(&scalar.render_to_string())),
    }
}
