//! Parameter definitions
//!
//! One record covers every parameter flavor. The [`ParameterKind`] tag decides
//! which optional fields matter and how results are interpreted; the
//! kind-specific rules are the free functions at the bottom of this module.

use std::fmt;
use std::str::FromStr;

use crate::error::ParameterError;
use crate::script::Script;

/// How the UI renders the choices. Opaque to the engine apart from deciding
/// which outputs are HTML-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChoiceType {
    SingleSelect,
    MultiSelect,
    Checkbox,
    Radio,
    FormattedHtml,
    FormattedHiddenHtml,
    TextBox,
    OrderedList,
    UnorderedList,
}

impl ChoiceType {
    pub const ALL: [ChoiceType; 9] = [
        ChoiceType::SingleSelect,
        ChoiceType::MultiSelect,
        ChoiceType::Checkbox,
        ChoiceType::Radio,
        ChoiceType::FormattedHtml,
        ChoiceType::FormattedHiddenHtml,
        ChoiceType::TextBox,
        ChoiceType::OrderedList,
        ChoiceType::UnorderedList,
    ];

    /// Wire tag, e.g. `PT_SINGLE_SELECT`
    pub const fn tag(self) -> &'static str {
        match self {
            ChoiceType::SingleSelect => "PT_SINGLE_SELECT",
            ChoiceType::MultiSelect => "PT_MULTI_SELECT",
            ChoiceType::Checkbox => "PT_CHECKBOX",
            ChoiceType::Radio => "PT_RADIO",
            ChoiceType::FormattedHtml => "ET_FORMATTED_HTML",
            ChoiceType::FormattedHiddenHtml => "ET_FORMATTED_HIDDEN_HTML",
            ChoiceType::TextBox => "ET_TEXT_BOX",
            ChoiceType::OrderedList => "ET_ORDERED_LIST",
            ChoiceType::UnorderedList => "ET_UNORDERED_LIST",
        }
    }

    /// Output for this type is interpolated into raw HTML by the UI
    pub const fn is_html_bearing(self) -> bool {
        matches!(
            self,
            ChoiceType::FormattedHtml
                | ChoiceType::FormattedHiddenHtml
                | ChoiceType::OrderedList
                | ChoiceType::UnorderedList
        )
    }

    /// More than one entry can be selected at once
    pub const fn is_multi_valued(self) -> bool {
        matches!(self, ChoiceType::MultiSelect | ChoiceType::Checkbox)
    }
}

impl fmt::Display for ChoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ChoiceType {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChoiceType::ALL
            .into_iter()
            .find(|ty| ty.tag() == s)
            .ok_or_else(|| ParameterError::UnknownChoiceType { tag: s.to_string() })
    }
}

/// Parameter flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// Choices from a script, no referenced parameters
    Choice,
    /// Choices recomputed whenever a referenced parameter changes
    Cascade,
    /// A computed value (text, HTML) recomputed from referenced parameters
    DynamicReference,
}

impl ParameterKind {
    pub const fn tag(self) -> &'static str {
        match self {
            ParameterKind::Choice => "choice",
            ParameterKind::Cascade => "cascade",
            ParameterKind::DynamicReference => "dynamic_reference",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ParameterKind {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "choice" => Ok(ParameterKind::Choice),
            "cascade" => Ok(ParameterKind::Cascade),
            "dynamic_reference" => Ok(ParameterKind::DynamicReference),
            other => Err(ParameterError::UnknownKind {
                tag: other.to_string(),
            }),
        }
    }
}

/// A scripted parameter definition.
///
/// Immutable and shareable between renders; per-render state lives in
/// [`ParameterRender`](crate::render::ParameterRender).
#[derive(Debug, Clone, PartialEq)]
pub struct CascadingParameter {
    name: String,
    description: String,
    kind: ParameterKind,
    choice_type: ChoiceType,
    referenced_parameters: String,
    referenced_names: Vec<String>,
    filterable: bool,
    filter_length: u32,
    omit_value_field: bool,
    script: Script,
    visibility_script: Option<Script>,
}

impl CascadingParameter {
    pub fn builder(name: impl Into<String>, kind: ParameterKind, script: Script) -> ParameterBuilder {
        ParameterBuilder {
            name: name.into(),
            description: String::new(),
            kind,
            choice_type: ChoiceType::SingleSelect,
            referenced_parameters: String::new(),
            filterable: false,
            filter_length: 0,
            omit_value_field: false,
            script,
            visibility_script: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn choice_type(&self) -> ChoiceType {
        self.choice_type
    }

    /// The declaration as written, e.g. `"param001, param002"`
    pub fn referenced_parameters(&self) -> &str {
        &self.referenced_parameters
    }

    /// Parsed referenced parameter names, in declared order
    pub fn referenced_names(&self) -> &[String] {
        &self.referenced_names
    }

    /// Whether `name` is one of the referenced parameters
    pub fn references(&self, name: &str) -> bool {
        self.referenced_names.iter().any(|n| n == name)
    }

    pub fn filterable(&self) -> bool {
        filter_applies(self)
    }

    /// Minimum filter input length before filtering kicks in
    pub fn filter_length(&self) -> u32 {
        self.filter_length
    }

    pub fn omit_value_field(&self) -> bool {
        self.omit_value_field
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn visibility_script(&self) -> Option<&Script> {
        self.visibility_script.as_ref()
    }
}

/// Builder for [`CascadingParameter`]
#[derive(Debug, Clone)]
pub struct ParameterBuilder {
    name: String,
    description: String,
    kind: ParameterKind,
    choice_type: ChoiceType,
    referenced_parameters: String,
    filterable: bool,
    filter_length: u32,
    omit_value_field: bool,
    script: Script,
    visibility_script: Option<Script>,
}

impl ParameterBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn choice_type(mut self, choice_type: ChoiceType) -> Self {
        self.choice_type = choice_type;
        self
    }

    /// Comma-separated names of the parameters this one reads
    pub fn referenced_parameters(mut self, declaration: impl Into<String>) -> Self {
        self.referenced_parameters = declaration.into();
        self
    }

    pub fn filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }

    pub fn filter_length(mut self, filter_length: u32) -> Self {
        self.filter_length = filter_length;
        self
    }

    pub fn omit_value_field(mut self, omit: bool) -> Self {
        self.omit_value_field = omit;
        self
    }

    pub fn visibility_script(mut self, script: Script) -> Self {
        self.visibility_script = Some(script);
        self
    }

    pub fn build(self) -> Result<CascadingParameter, ParameterError> {
        if self.name.trim().is_empty() {
            return Err(ParameterError::EmptyName);
        }
        let referenced_names = parse_referenced_parameters(&self.referenced_parameters);
        if !accepts_references(self.kind) && !referenced_names.is_empty() {
            return Err(ParameterError::UnexpectedReferences { name: self.name });
        }

        Ok(CascadingParameter {
            name: self.name,
            description: self.description,
            kind: self.kind,
            choice_type: self.choice_type,
            referenced_parameters: self.referenced_parameters,
            referenced_names,
            filterable: self.filterable,
            filter_length: self.filter_length,
            omit_value_field: self.omit_value_field,
            script: self.script,
            visibility_script: self.visibility_script,
        })
    }
}

/// Split a comma-separated declaration into trimmed names.
///
/// Order and duplicates are kept as declared; empty segments are dropped.
pub fn parse_referenced_parameters(declaration: &str) -> Vec<String> {
    declaration
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// A fresh render identity: `{prefix}-{suffix}-{random}`
pub fn random_parameter_name(prefix: &str, suffix: &str) -> Result<String, ParameterError> {
    let n = getrandom::u64()?;
    Ok(format!("{prefix}-{suffix}-{n:016x}"))
}

/// Kinds that read values from other parameters
pub fn accepts_references(kind: ParameterKind) -> bool {
    matches!(kind, ParameterKind::Cascade | ParameterKind::DynamicReference)
}

/// Client-side filtering only applies to list-like kinds
pub fn filter_applies(parameter: &CascadingParameter) -> bool {
    match parameter.kind {
        ParameterKind::Choice | ParameterKind::Cascade => parameter.filterable,
        ParameterKind::DynamicReference => false,
    }
}

/// Whether the default value is the rendered script result rather than a
/// canonical entry
pub fn defaults_to_rendered_value(kind: ParameterKind) -> bool {
    matches!(kind, ParameterKind::DynamicReference)
}
