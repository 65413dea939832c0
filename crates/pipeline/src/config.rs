//! Activity configuration.
//!
//! The host hands the activity an ordered map of string properties. They are
//! read leniently: an absent key is an empty string and nothing is validated
//! up front, so a missing property shows up later as a failed fetch or a
//! missing output. [`ActivityConfig`] is the named internal form; it is only
//! flattened into positional script arguments at the process boundary by
//! [`ScriptArguments::to_positional`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use etlrun_cloud::ContainerPath;
use etlrun_core::runtime::{
    RuntimeLayout, DEFAULT_RUNTIME_CONTAINER, DEFAULT_RUNTIME_PACKAGE,
};
use etlrun_core::scripting::executor::{ExecutionPolicy, DEFAULT_SCRIPT_TIMEOUT};
use indexmap::IndexMap;

// ---------------------------------------------------------------------------
// Property keys
// ---------------------------------------------------------------------------

/// Container holding the script and its input data.
pub const PROP_INPUT_CONTAINER: &str = "inputContainer";

/// Blob name of the script. Always staged first.
pub const PROP_SCRIPT_NAME: &str = "scriptName";

/// Comma-separated blob names of additional inputs.
pub const PROP_INPUT_FILES: &str = "inputFiles";

/// `"<container>/<path>"` that outputs are published under.
pub const PROP_OUTPUT_CONTAINER_PATH: &str = "outputContainerPath";

/// File name of the daily output.
pub const PROP_DAILY_OUTPUT_FILE: &str = "dailyOutputFile";

/// File name of the monthly output.
pub const PROP_MONTHLY_OUTPUT_FILE: &str = "monthlyOutputFile";

// ---------------------------------------------------------------------------
// Activation properties
// ---------------------------------------------------------------------------

/// Ordered named properties supplied by the host pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityProperties {
    entries: IndexMap<String, String>,
}

impl ActivityProperties {
    pub fn new(entries: IndexMap<String, String>) -> Self {
        Self { entries }
    }

    /// Value of `key`, or `""` when absent.
    pub fn get(&self, key: &str) -> &str {
        self.entries.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// All entries in the order the host supplied them.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Script blob followed by every additional input, in order.
    pub fn input_names(&self) -> Vec<String> {
        let mut names = vec![self.get(PROP_SCRIPT_NAME).trim().to_string()];
        names.extend(
            self.get(PROP_INPUT_FILES)
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        );
        names
    }

    /// Expected outputs: daily, then monthly.
    pub fn outputs(&self) -> Vec<OutputSpec> {
        vec![
            OutputSpec::new("daily", self.get(PROP_DAILY_OUTPUT_FILE).trim()),
            OutputSpec::new("monthly", self.get(PROP_MONTHLY_OUTPUT_FILE).trim()),
        ]
    }
}

impl FromIterator<(String, String)> for ActivityProperties {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Named configuration
// ---------------------------------------------------------------------------

/// One output the script is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    /// Short name used in logs (`daily`, `monthly`).
    pub label: String,
    /// File name inside the working directory, also used as the blob name.
    pub file_name: String,
}

impl OutputSpec {
    pub fn new(label: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            file_name: file_name.into(),
        }
    }

    pub fn local_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.file_name)
    }
}

/// Where the interpreter runtime comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeSource {
    /// A zip package blob, downloaded and unpacked into the working directory.
    Package { container: String, package: String },
    /// A pre-installed runtime directory copied into the working directory.
    Directory(PathBuf),
}

impl Default for RuntimeSource {
    fn default() -> Self {
        Self::Package {
            container: DEFAULT_RUNTIME_CONTAINER.to_string(),
            package: DEFAULT_RUNTIME_PACKAGE.to_string(),
        }
    }
}

/// Everything one activity run needs, with names instead of positions.
#[derive(Debug, Clone)]
pub struct ActivityConfig {
    pub working_dir: PathBuf,
    pub runtime_source: RuntimeSource,
    pub layout: RuntimeLayout,
    pub input_container: String,
    /// Blob names to stage. Position 0 is the script.
    pub inputs: Vec<String>,
    pub result_path: ContainerPath,
    pub outputs: Vec<OutputSpec>,
    pub policy: ExecutionPolicy,
    pub timeout: Duration,
}

impl ActivityConfig {
    /// Configuration from host properties, with default runtime, policy
    /// and timeout.
    pub fn from_properties(working_dir: PathBuf, properties: &ActivityProperties) -> Self {
        Self {
            working_dir,
            runtime_source: RuntimeSource::default(),
            layout: RuntimeLayout::default(),
            input_container: properties.get(PROP_INPUT_CONTAINER).trim().to_string(),
            inputs: properties.input_names(),
            result_path: ContainerPath::parse(properties.get(PROP_OUTPUT_CONTAINER_PATH)),
            outputs: properties.outputs(),
            policy: ExecutionPolicy::default(),
            timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }

    /// Named script arguments for this configuration.
    pub fn script_arguments(&self) -> ScriptArguments {
        ScriptArguments {
            working_dir: self.working_dir.clone(),
            output_paths: self
                .outputs
                .iter()
                .map(|o| o.local_path(&self.working_dir))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Script arguments
// ---------------------------------------------------------------------------

/// Arguments the script receives after its own path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptArguments {
    pub working_dir: PathBuf,
    /// Absolute output paths, in the order of the configured outputs.
    pub output_paths: Vec<PathBuf>,
}

impl ScriptArguments {
    /// Positional form: `<working_dir> <output_1> <output_2> ...`. Paths
    /// are passed through byte for byte, not as display strings.
    pub fn to_positional(&self) -> Vec<OsString> {
        std::iter::once(&self.working_dir)
            .chain(self.output_paths.iter())
            .map(|p| p.as_os_str().to_os_string())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Environment discovery
// ---------------------------------------------------------------------------

/// The working directory: `override_dir` if given, else the directory that
/// contains the running executable. Nothing is created.
pub fn discover_working_dir(override_dir: Option<PathBuf>) -> std::io::Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir);
    }
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("executable path {} has no parent", exe.display()),
        )
    })
}

/// Host machine name: `COMPUTERNAME` if set, else the OS hostname.
pub fn machine_name() -> Option<String> {
    std::env::var("COMPUTERNAME")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| {
            gethostname::gethostname()
                .into_string()
                .ok()
                .filter(|v| !v.is_empty())
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn properties() -> ActivityProperties {
        [
            (PROP_INPUT_CONTAINER, "us-sales-kpi"),
            (PROP_SCRIPT_NAME, "etl.R"),
            (PROP_INPUT_FILES, "orders.csv, customers.csv"),
            (PROP_OUTPUT_CONTAINER_PATH, "us-sales-kpi/output"),
            (PROP_DAILY_OUTPUT_FILE, "daily.txt"),
            (PROP_MONTHLY_OUTPUT_FILE, "monthly.txt"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn script_is_always_first_input() {
        assert_eq!(
            properties().input_names(),
            vec!["etl.R", "orders.csv", "customers.csv"]
        );
    }

    #[test]
    fn absent_keys_resolve_to_empty() {
        let props = ActivityProperties::default();
        assert_eq!(props.get(PROP_SCRIPT_NAME), "");
        assert_eq!(props.input_names(), vec![""]);
        assert_eq!(props.outputs()[0].file_name, "");
    }

    #[test]
    fn properties_keep_host_order() {
        let props = properties();
        let keys: Vec<&str> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys[0], PROP_INPUT_CONTAINER);
        assert_eq!(keys[5], PROP_MONTHLY_OUTPUT_FILE);
    }

    #[test]
    fn config_from_properties() {
        let config = ActivityConfig::from_properties(PathBuf::from("/work"), &properties());
        assert_eq!(config.input_container, "us-sales-kpi");
        assert_eq!(config.result_path.container(), "us-sales-kpi");
        assert_eq!(config.result_path.prefix(), Some("output"));
        assert_eq!(config.outputs.len(), 2);
        assert_eq!(config.outputs[0].label, "daily");
        assert_eq!(config.runtime_source, RuntimeSource::default());
        assert_eq!(config.policy, ExecutionPolicy::default());
    }

    #[test]
    fn positional_arguments_follow_working_dir_then_outputs() {
        let config = ActivityConfig::from_properties(PathBuf::from("/work"), &properties());
        assert_eq!(
            config.script_arguments().to_positional(),
            vec![
                OsString::from("/work"),
                OsString::from("/work/daily.txt"),
                OsString::from("/work/monthly.txt"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_working_dir_reaches_arguments_unchanged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let work = PathBuf::from(OsStr::from_bytes(b"/srv/r\xe9sultats"));
        let config = ActivityConfig::from_properties(work.clone(), &properties());
        let args = config.script_arguments().to_positional();

        assert_eq!(args[0].as_bytes(), b"/srv/r\xe9sultats");
        assert_eq!(args[1].as_bytes(), b"/srv/r\xe9sultats/daily.txt");
        assert_eq!(PathBuf::from(&args[2]), work.join("monthly.txt"));
    }

    #[test]
    fn machine_name_is_always_resolved() {
        let name = machine_name().unwrap();
        assert!(!name.is_empty());
    }

    #[test]
    fn override_working_dir_wins() {
        let dir = discover_working_dir(Some(PathBuf::from("/srv/activity"))).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/activity"));
    }

    #[test]
    fn discovered_working_dir_contains_executable() {
        let dir = discover_working_dir(None).unwrap();
        let exe = std::env::current_exe().unwrap();
        assert!(exe.starts_with(&dir));
    }
}
