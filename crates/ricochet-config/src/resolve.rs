//! Configuration file discovery and conversion into engine types
//!
//! Searches for `.config/ricochet.yaml` walking up from the current
//! directory. The project root is the parent of `.config/`.

use std::env;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use ricochet::{
    CascadingParameter, ChoiceType, ExpressionRunner, JobRef, ParameterError, ParameterKind,
    Script, ScriptBody,
};

use crate::{JobConfig, ParameterConfig, RicochetConfig, ScriptConfig, StaticParameterConfig};

const CONFIG_DIR: &str = ".config";
const CONFIG_FILE: &str = "ricochet.yaml";

/// Errors loading or validating a configuration file
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("current directory is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    #[error("failed to parse {path}: {message}")]
    Parse { path: Utf8PathBuf, message: String },

    #[error("job `{job}` is declared more than once")]
    DuplicateJob { job: String },

    #[error("job `{job}` declares parameter `{parameter}` more than once")]
    DuplicateParameter { job: String, parameter: String },

    #[error("job `{job}`, parameter `{parameter}`: {source}")]
    Parameter {
        job: String,
        parameter: String,
        #[source]
        source: ParameterError,
    },
}

/// Runner settings with defaults applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerSettings {
    pub fuel: Option<u64>,
    pub allow_unsandboxed: bool,
}

impl RunnerSettings {
    /// Build the bundled runner with these settings
    pub fn build_runner(&self) -> ExpressionRunner {
        ExpressionRunner::new()
            .with_fuel(self.fuel)
            .allow_unsandboxed(self.allow_unsandboxed)
    }
}

/// A job with its validated parameters, in declared order
#[derive(Debug, Clone)]
pub struct ResolvedJob {
    pub job: JobRef,
    pub parameters: Vec<Arc<CascadingParameter>>,
}

impl ResolvedJob {
    pub fn parameter(&self, name: &str) -> Option<&Arc<CascadingParameter>> {
        self.parameters.iter().find(|p| p.name() == name)
    }
}

/// Discovered configuration, validated and converted
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Project root (parent of `.config/`), when loaded from disk
    pub root: Option<Utf8PathBuf>,
    pub runner: RunnerSettings,
    /// Jobs keyed by name
    pub jobs: IndexMap<String, ResolvedJob>,
}

impl ResolvedConfig {
    /// Discover and load configuration from the current directory
    pub fn discover() -> Result<Option<Self>, ConfigError> {
        match find_config_file()? {
            Some(path) => Ok(Some(Self::load(&path)?)),
            None => Ok(None),
        }
    }

    /// Load `.config/ricochet.yaml` under a specific project path
    pub fn discover_from(project_path: &Utf8Path) -> Result<Option<Self>, ConfigError> {
        let yaml_file = project_path.join(CONFIG_DIR).join(CONFIG_FILE);
        if yaml_file.exists() {
            Ok(Some(Self::load(&yaml_file)?))
        } else {
            Ok(None)
        }
    }

    /// Load and resolve a config file
    pub fn load(config_path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
            path: config_path.to_owned(),
            source,
        })?;
        let mut resolved = Self::from_yaml(&content, config_path)?;

        // Project root is the parent of .config/
        resolved.root = config_path
            .parent()
            .and_then(Utf8Path::parent)
            .map(Utf8Path::to_owned);
        tracing::info!(
            path = %config_path,
            jobs = resolved.jobs.len(),
            "loaded parameter definitions"
        );
        Ok(resolved)
    }

    /// Parse and resolve YAML text; `origin` names it in errors
    pub fn from_yaml(yaml: &str, origin: &Utf8Path) -> Result<Self, ConfigError> {
        let config: RicochetConfig =
            facet_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
                path: origin.to_owned(),
                message: e.to_string(),
            })?;
        Self::resolve(config)
    }

    /// Validate raw config and convert it into engine types
    pub fn resolve(config: RicochetConfig) -> Result<Self, ConfigError> {
        let runner = config
            .runner
            .map(|r| RunnerSettings {
                fuel: r.fuel,
                allow_unsandboxed: r.allow_unsandboxed.unwrap_or(false),
            })
            .unwrap_or_default();

        let mut jobs = IndexMap::with_capacity(config.jobs.len());
        for job in config.jobs {
            if jobs.contains_key(&job.name) {
                return Err(ConfigError::DuplicateJob { job: job.name });
            }
            let resolved = resolve_job(job)?;
            jobs.insert(resolved.job.name.clone(), resolved);
        }

        Ok(Self {
            root: None,
            runner,
            jobs,
        })
    }

    pub fn job(&self, name: &str) -> Option<&ResolvedJob> {
        self.jobs.get(name)
    }
}

fn resolve_job(config: JobConfig) -> Result<ResolvedJob, ConfigError> {
    let full_name = config.full_name.unwrap_or_else(|| config.name.clone());
    let job = JobRef::new(config.name, full_name);

    let mut parameters: Vec<Arc<CascadingParameter>> = Vec::with_capacity(config.parameters.len());
    for parameter in config.parameters {
        if parameters.iter().any(|p| p.name() == parameter.name) {
            return Err(ConfigError::DuplicateParameter {
                job: job.name.clone(),
                parameter: parameter.name,
            });
        }
        let name = parameter.name.clone();
        let built = resolve_parameter(parameter).map_err(|source| ConfigError::Parameter {
            job: job.name.clone(),
            parameter: name,
            source,
        })?;
        parameters.push(Arc::new(built));
    }

    Ok(ResolvedJob { job, parameters })
}

fn resolve_parameter(config: ParameterConfig) -> Result<CascadingParameter, ParameterError> {
    let kind: ParameterKind = config.kind.parse()?;
    let choice_type = match config.choice_type.as_deref() {
        Some(tag) => tag.parse()?,
        None => ChoiceType::SingleSelect,
    };

    let mut builder = CascadingParameter::builder(config.name, kind, resolve_script(config.script))
        .choice_type(choice_type)
        .referenced_parameters(config.referenced_parameters.unwrap_or_default())
        .filterable(config.filterable.unwrap_or(false))
        .filter_length(config.filter_length.unwrap_or(0))
        .omit_value_field(config.omit_value_field.unwrap_or(false))
        .description(config.description.unwrap_or_default());
    if let Some(visibility) = config.visibility_script {
        builder = builder.visibility_script(resolve_script(visibility));
    }
    builder.build()
}

fn resolve_script(config: ScriptConfig) -> Script {
    let body = |source: String| {
        if config.sandboxed.unwrap_or(true) {
            ScriptBody::new(source)
        } else {
            ScriptBody::unsandboxed(source)
        }
    };
    let mut script = Script::from_bodies(body(config.primary), config.fallback.map(body));

    for StaticParameterConfig { name, value } in config.static_parameters.unwrap_or_default() {
        script = script.with_static_parameter(name, value);
    }
    script
}

/// Search for `.config/ricochet.yaml` walking up from the current directory
fn find_config_file() -> Result<Option<Utf8PathBuf>, ConfigError> {
    let cwd = env::current_dir().map_err(|source| ConfigError::Io {
        path: Utf8PathBuf::from("."),
        source,
    })?;
    let cwd = Utf8PathBuf::try_from(cwd)
        .map_err(|e| ConfigError::NonUtf8Path(e.as_path().display().to_string()))?;

    let mut current = cwd.as_path();
    loop {
        let yaml_file = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if yaml_file.exists() {
            return Ok(Some(yaml_file));
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return Ok(None),
        }
    }
}
