//! Parameter definition files for ricochet.
//!
//! Jobs and their parameters are declared in `.config/ricochet.yaml`:
//!
//! ```yaml
//! runner:
//!   fuel: 50000
//! jobs:
//!   - name: deploy
//!     full_name: team/deploy
//!     parameters:
//!       - name: REGION
//!         kind: choice
//!         script: { primary: "['us', 'eu']", fallback: "['EMPTY!']" }
//!       - name: ZONE
//!         kind: cascade
//!         choice_type: PT_RADIO
//!         referenced_parameters: REGION
//!         script: { primary: "[REGION ~ '-1', REGION ~ '-2']" }
//! ```


use facet::Facet;

mod resolve;

pub use resolve::{ConfigError, ResolvedConfig, ResolvedJob, RunnerSettings};

/// Top-level contents of `.config/ricochet.yaml`
#[derive(Debug, Clone, Default, Facet)]
#[facet(rename_all = "snake_case")]
pub struct RicochetConfig {
    /// Bundled script runner settings
    #[facet(default)]
    pub runner: Option<RunnerConfig>,

    /// Jobs whose build forms carry scripted parameters
    #[facet(default)]
    pub jobs: Vec<JobConfig>,
}

/// Script runner settings
#[derive(Debug, Clone, Default, Facet)]
#[facet(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Execution budget for a single script body. Unlimited when absent.
    #[facet(default)]
    pub fuel: Option<u64>,

    /// Run bodies marked `sandboxed: false` instead of rejecting them
    #[facet(default)]
    pub allow_unsandboxed: Option<bool>,
}

/// A job and its parameters
#[derive(Debug, Clone, Facet)]
#[facet(rename_all = "snake_case")]
pub struct JobConfig {
    pub name: String,

    /// Full hierarchical name; defaults to `name`
    #[facet(default)]
    pub full_name: Option<String>,

    #[facet(default)]
    pub parameters: Vec<ParameterConfig>,
}

/// One scripted parameter
#[derive(Debug, Clone, Facet)]
#[facet(rename_all = "snake_case")]
pub struct ParameterConfig {
    pub name: String,

    /// `choice`, `cascade` or `dynamic_reference`
    pub kind: String,

    /// UI choice type tag, e.g. `PT_SINGLE_SELECT` (the default)
    #[facet(default)]
    pub choice_type: Option<String>,

    pub script: ScriptConfig,

    /// Comma-separated names of referenced parameters
    #[facet(default)]
    pub referenced_parameters: Option<String>,

    #[facet(default)]
    pub filterable: Option<bool>,

    #[facet(default)]
    pub filter_length: Option<u32>,

    #[facet(default)]
    pub visibility_script: Option<ScriptConfig>,

    #[facet(default)]
    pub description: Option<String>,

    #[facet(default)]
    pub omit_value_field: Option<bool>,
}

/// A primary script body with an optional fallback
#[derive(Debug, Clone, Default, Facet)]
#[facet(rename_all = "snake_case")]
pub struct ScriptConfig {
    #[facet(default)]
    pub primary: String,

    #[facet(default)]
    pub fallback: Option<String>,

    /// Defaults to true
    #[facet(default)]
    pub sandboxed: Option<bool>,

    /// Values bound before the caller environment, in declared order; may
    /// use `${VAR}`
    #[facet(default)]
    pub static_parameters: Option<Vec<StaticParameterConfig>>,
}

/// One `name: value` binding of a script's static parameters
#[derive(Debug, Clone, Default, Facet)]
#[facet(rename_all = "snake_case")]
pub struct StaticParameterConfig {
    pub name: String,

    #[facet(default)]
    pub value: String,
}
