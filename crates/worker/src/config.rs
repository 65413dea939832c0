use std::path::PathBuf;
use std::time::Duration;

use etlrun_cloud::{ConnectionDescriptor, TransferError};
use etlrun_core::error::CoreError;
use etlrun_core::runtime::{
    RuntimeLayout, DEFAULT_INTERPRETER_EXE, DEFAULT_RUNTIME_CONTAINER, DEFAULT_RUNTIME_FOLDER,
    DEFAULT_RUNTIME_PACKAGE,
};
use etlrun_core::scripting::executor::{ExecutionPolicy, DEFAULT_SCRIPT_TIMEOUT};
use etlrun_pipeline::config::{discover_working_dir, RuntimeSource};
use etlrun_pipeline::{ActivityConfig, ActivityProperties};
use indexmap::IndexMap;

/// Prefix of environment variables that carry activation properties when no
/// properties file is configured.
pub const PROPERTY_ENV_PREFIX: &str = "ETL_PROP_";

/// Problems found while assembling the worker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var}='{value}' is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Cannot open artifact store: {0}")]
    Connection(#[from] TransferError),

    #[error("Invalid runtime layout: {0}")]
    Layout(#[from] CoreError),

    #[error("Cannot read properties file {}: {source}", path.display())]
    PropertiesFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Properties file {} is not a JSON object: {source}", path.display())]
    PropertiesJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot determine working directory: {0}")]
    WorkingDir(#[from] std::io::Error),
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub connection: ConnectionDescriptor,
    /// JSON object of activation properties. When `None`, properties come
    /// from `ETL_PROP_*` variables.
    pub properties_file: Option<PathBuf>,
    /// Working directory override; the executable's directory otherwise.
    pub working_dir: Option<PathBuf>,
    pub runtime_source: RuntimeSource,
    pub layout: RuntimeLayout,
    pub timeout: Duration,
    pub policy: ExecutionPolicy,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                 | Default                          |
    /// |-------------------------|----------------------------------|
    /// | `ETL_CONNECTION_STRING` | required                         |
    /// | `ETL_PROPERTIES_FILE`   | none (use `ETL_PROP_*`)          |
    /// | `ETL_WORKING_DIR`       | directory of the executable      |
    /// | `ETL_RUNTIME_CONTAINER` | `rbinaries`                      |
    /// | `ETL_RUNTIME_PACKAGE`   | `R-3.3.3.zip`                    |
    /// | `ETL_RUNTIME_FOLDER`    | `R-3.3.3`                        |
    /// | `ETL_RUNTIME_DIR`       | none (download the package)      |
    /// | `ETL_INTERPRETER`       | `Rscript.exe` / `Rscript`        |
    /// | `ETL_TIMEOUT_SECS`      | `3600`                           |
    /// | `ETL_FAIL_ON_STDERR`    | `true`                           |
    /// | `ETL_FAIL_ON_EXIT_CODE` | `true`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let connection_string =
            var("ETL_CONNECTION_STRING").ok_or(ConfigError::Missing("ETL_CONNECTION_STRING"))?;
        let connection = ConnectionDescriptor::parse(&connection_string)?;

        let runtime_source = match var("ETL_RUNTIME_DIR") {
            Some(dir) => RuntimeSource::Directory(PathBuf::from(dir)),
            None => RuntimeSource::Package {
                container: var("ETL_RUNTIME_CONTAINER")
                    .unwrap_or_else(|| DEFAULT_RUNTIME_CONTAINER.into()),
                package: var("ETL_RUNTIME_PACKAGE")
                    .unwrap_or_else(|| DEFAULT_RUNTIME_PACKAGE.into()),
            },
        };

        let layout = RuntimeLayout::new(
            var("ETL_RUNTIME_FOLDER").unwrap_or_else(|| DEFAULT_RUNTIME_FOLDER.into()),
            var("ETL_INTERPRETER").unwrap_or_else(|| DEFAULT_INTERPRETER_EXE.into()),
        )?;

        let timeout = match var("ETL_TIMEOUT_SECS") {
            Some(value) => parse_timeout("ETL_TIMEOUT_SECS", &value)?,
            None => DEFAULT_SCRIPT_TIMEOUT,
        };

        let defaults = ExecutionPolicy::default();
        let policy = ExecutionPolicy {
            fail_on_stderr: match var("ETL_FAIL_ON_STDERR") {
                Some(value) => parse_bool("ETL_FAIL_ON_STDERR", &value)?,
                None => defaults.fail_on_stderr,
            },
            fail_on_exit_code: match var("ETL_FAIL_ON_EXIT_CODE") {
                Some(value) => parse_bool("ETL_FAIL_ON_EXIT_CODE", &value)?,
                None => defaults.fail_on_exit_code,
            },
        };

        Ok(Self {
            connection,
            properties_file: var("ETL_PROPERTIES_FILE").map(PathBuf::from),
            working_dir: var("ETL_WORKING_DIR").map(PathBuf::from),
            runtime_source,
            layout,
            timeout,
            policy,
        })
    }

    /// Activation properties from the properties file, or from `vars` when
    /// no file is configured.
    pub fn load_properties(
        &self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<ActivityProperties, ConfigError> {
        match &self.properties_file {
            Some(path) => read_properties_file(path),
            None => Ok(properties_from_vars(vars)),
        }
    }

    /// The pipeline configuration for one run with `properties`.
    pub fn activity_config(
        &self,
        properties: &ActivityProperties,
    ) -> Result<ActivityConfig, ConfigError> {
        let working_dir = discover_working_dir(self.working_dir.clone())?;
        let mut config = ActivityConfig::from_properties(working_dir, properties);
        config.runtime_source = self.runtime_source.clone();
        config.layout = self.layout.clone();
        config.policy = self.policy;
        config.timeout = self.timeout;
        Ok(config)
    }
}

/// Properties from a JSON object file, in file order. Non-string values are
/// kept in their JSON text form.
pub fn read_properties_file(path: &std::path::Path) -> Result<ActivityProperties, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::PropertiesFile {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: IndexMap<String, serde_json::Value> =
        serde_json::from_str(&text).map_err(|source| ConfigError::PropertiesJson {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

/// Properties from `ETL_PROP_<key>` variables, sorted by key so the order
/// does not depend on the environment.
pub fn properties_from_vars(vars: impl IntoIterator<Item = (String, String)>) -> ActivityProperties {
    let mut entries: Vec<(String, String)> = vars
        .into_iter()
        .filter_map(|(name, value)| {
            let key = name.strip_prefix(PROPERTY_ENV_PREFIX)?;
            (!key.is_empty()).then(|| (key.to_string(), value))
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().collect()
}

fn parse_timeout(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value.trim().parse().map_err(|e| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: format!("{e}"),
    })?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be at least one second".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
