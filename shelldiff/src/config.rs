//! Configuration file support for shelldiff.
//!
//! Settings are layered: built-in defaults < configuration file < command-line arguments
//! (including their environment variables). Unknown keys in the file are ignored.

use etcetera::BaseStrategy;
use shelldiff_harness::{EnvPolicy, OutputFormat, RunnerConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::args::RunArgs;
use crate::events::TraceEvent;

/// Case table used when none is given.
pub const DEFAULT_CASES_PATH: &str = "tests/cases/test_cases.csv";

/// Shell under test used when none is given.
pub const DEFAULT_UNDER_TEST_PATH: &str = "./minishell";

/// Reference shell used when none is given.
pub const DEFAULT_REFERENCE_PATH: &str = "bash";

/// Root configuration structure.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which shells to compare.
    pub shells: ShellsConfig,

    /// How runs behave.
    pub run: RunConfig,

    /// Diagnostic logging.
    pub logging: LoggingConfig,
}

/// Shell selection.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ShellsConfig {
    /// Reference shell.
    pub reference: Option<PathBuf>,

    /// Shell under test.
    #[serde(rename = "under-test")]
    pub under_test: Option<PathBuf>,

    /// Directories searched first when running in a clean environment.
    #[serde(rename = "clean-path")]
    pub clean_path: Option<String>,
}

/// Run behavior.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Case table.
    pub cases: Option<PathBuf>,

    /// Per-execution timeout, in seconds.
    pub timeout: Option<f64>,

    /// Directory seeding each case's working directory.
    pub fixtures: Option<PathBuf>,

    /// Divergence log path.
    pub log: Option<PathBuf>,

    /// Canonicalize environment dumps in the divergence log.
    #[serde(rename = "canonicalize-env")]
    pub canonicalize_env: Option<bool>,

    /// Mapping table path.
    pub map: Option<PathBuf>,

    /// Output format.
    pub format: Option<OutputFormat>,

    /// Run both shells in a minimal, fixed environment.
    #[serde(rename = "clean-env")]
    pub clean_env: Option<bool>,

    /// Show details for matching cases too.
    pub verbose: Option<bool>,
}

/// Diagnostic logging.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Events to enable DEBUG output for, in addition to any given with `--debug`.
    pub debug: Vec<TraceEvent>,
}

/// Fully resolved settings for one `run` invocation.
pub struct RunSettings {
    /// Case table to load.
    pub cases: PathBuf,
    /// Configuration handed to the runner.
    pub runner: RunnerConfig,
    /// Divergence log path.
    pub log: Option<PathBuf>,
    /// Canonicalize environment dumps in the divergence log.
    pub canonicalize_env: bool,
    /// Mapping table path.
    pub map: Option<PathBuf>,
    /// Only list the selected cases.
    pub list: bool,
}

impl Config {
    /// Merges the configuration with CLI arguments into the settings for a run.
    ///
    /// Settings are applied with the following priority (highest to lowest):
    /// 1. CLI arguments (if explicitly set)
    /// 2. Config file values
    /// 3. Default values
    #[must_use]
    pub fn to_run_settings(&self, args: &RunArgs) -> RunSettings {
        let reference = pick(
            args.reference.as_deref(),
            self.shells.reference.as_deref(),
            DEFAULT_REFERENCE_PATH,
        );
        let under_test = pick(
            args.under_test.as_deref(),
            self.shells.under_test.as_deref(),
            DEFAULT_UNDER_TEST_PATH,
        );

        let timeout = args
            .timeout
            .or_else(|| self.run.timeout.and_then(|s| Duration::try_from_secs_f64(s).ok()))
            .unwrap_or(shelldiff_harness::DEFAULT_TIMEOUT);

        let env_policy = if merge_bool_setting(args.clean_env, false, self.run.clean_env) {
            EnvPolicy::Clean
        } else {
            EnvPolicy::Inherit
        };

        let mut runner = RunnerConfig::new(reference, under_test)
            .with_timeout(timeout)
            .with_limit(args.max)
            .with_kind_filter(args.kind.clone())
            .with_fixtures_dir(args.fixtures.clone().or_else(|| self.run.fixtures.clone()))
            .with_env_policy(env_policy)
            .with_format(args.format.or(self.run.format).unwrap_or_default())
            .with_verbose(merge_bool_setting(args.verbose, false, self.run.verbose));

        runner.reference.default_path_var.clone_from(&self.shells.clean_path);
        runner.under_test.default_path_var.clone_from(&self.shells.clean_path);

        RunSettings {
            cases: pick(
                args.cases.as_deref(),
                self.run.cases.as_deref(),
                DEFAULT_CASES_PATH,
            ),
            runner,
            log: args.log.clone().or_else(|| self.run.log.clone()),
            canonicalize_env: merge_bool_setting(
                args.canonicalize_env,
                false,
                self.run.canonicalize_env,
            ),
            map: args.map.clone().or_else(|| self.run.map.clone()),
            list: args.list,
        }
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        if let Some(timeout) = self.run.timeout {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(ConfigLoadError::Invalid {
                    key: "run.timeout",
                    message: std::format!("must be a positive number of seconds, not {timeout}"),
                });
            }
        }

        Ok(())
    }
}

fn pick(cli: Option<&Path>, config: Option<&Path>, default: &str) -> PathBuf {
    cli.or(config)
        .map_or_else(|| PathBuf::from(default), Path::to_path_buf)
}

/// Merges a boolean setting from CLI args, config file, and defaults.
///
/// Since boolean CLI flags can't distinguish between "explicitly set to false" and
/// "not provided" (both result in `false`), a CLI value differing from the default is
/// taken as explicit; otherwise the config value is used if present.
const fn merge_bool_setting(
    cli_value: bool,
    cli_default: bool,
    config_value: Option<bool>,
) -> bool {
    if cli_value != cli_default {
        cli_value
    } else if let Some(config) = config_value {
        config
    } else {
        cli_default
    }
}

/// Result of attempting to load a configuration file.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration, or default if loading failed.
    pub config: Config,

    /// The path that was used (or attempted) for loading.
    pub path: Option<PathBuf>,

    /// Any error that occurred during loading.
    pub error: Option<ConfigLoadError>,

    /// Whether the path was explicitly provided by the user (via `--config`).
    /// If true and there's an error, the run must not proceed.
    pub explicit_path: bool,
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the TOML content.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid value for {key}: {message}")]
    Invalid {
        /// Dotted key of the offending setting.
        key: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Returns the default configuration file path for the current platform.
///
/// Returns `None` if the platform's config directory cannot be determined.
pub fn default_config_path() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("shelldiff").join("config.toml"))
}

/// Loads configuration from the specified path.
pub fn load_from_path(path: &Path) -> ConfigLoadResult {
    let parsed = std::fs::read_to_string(path)
        .map_err(ConfigLoadError::from)
        .and_then(|content| toml::from_str::<Config>(&content).map_err(ConfigLoadError::from))
        .and_then(|config| config.validate().map(|()| config));

    let (config, error) = match parsed {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    ConfigLoadResult {
        config,
        path: Some(path.to_path_buf()),
        error,
        explicit_path: false,
    }
}

/// Loads configuration based on the provided options.
///
/// If `explicit_path` is provided and loading fails, the result has `explicit_path: true`
/// to indicate that the error should be treated as fatal. A missing file at the default
/// location is not an error.
pub fn load_config(disabled: bool, explicit_path: Option<&Path>) -> ConfigLoadResult {
    let defaults = |path| ConfigLoadResult {
        config: Config::default(),
        path,
        error: None,
        explicit_path: false,
    };

    if disabled {
        return defaults(None);
    }

    let is_explicit = explicit_path.is_some();

    let path = match explicit_path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => return defaults(None),
    };

    if !is_explicit && !path.exists() {
        return defaults(Some(path));
    }

    let mut result = load_from_path(&path);
    result.explicit_path = is_explicit;
    result
}
