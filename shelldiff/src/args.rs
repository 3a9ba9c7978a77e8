//! Command-line arguments for `shelldiff`.

use clap::{Parser, Subcommand, builder::styling};
use shelldiff_harness::OutputFormat;
use std::path::PathBuf;
use std::time::Duration;

use crate::{events, productinfo};

const SHORT_DESCRIPTION: &str = "Differential tester for bash-compatible shells";

const LONG_DESCRIPTION: &str = r"
shelldiff runs a table of shell commands under a reference shell (bash) and under a shell
being validated, and reports every command for which the two disagree on exit code or stdout.
Differences on stderr are shown but never count as a divergence.
";

const AFTER_HELP: &str = color_print::cstr!(
    r"<bold><underline>Exit status:</underline></bold>
  <green>0</green>  every case matched
  <green>1</green>  at least one case diverged
  <green>2</green>  setup error, or no cases to run"
);

const VERSION: &str = const_format::concatcp!(
    productinfo::PRODUCT_VERSION,
    " (",
    productinfo::PRODUCT_GIT_VERSION,
    ")"
);

/// Parsed command-line arguments for shelldiff.
#[derive(Parser)]
#[clap(name = productinfo::PRODUCT_NAME,
       version = VERSION,
       about = SHORT_DESCRIPTION,
       long_about = LONG_DESCRIPTION,
       after_help = AFTER_HELP,
       author,
       styles = shelldiff_help_styles())]
#[allow(clippy::module_name_repetitions)]
pub struct CommandLineArgs {
    /// Path to a configuration file to load instead of the default.
    #[clap(long = "config", value_name = "PATH", global = true)]
    pub config_file: Option<PathBuf>,

    /// Do not load any configuration file.
    #[clap(long = "no-config", global = true, conflicts_with = "config_file")]
    pub no_config: bool,

    /// Enable debug logging for classes of tracing events.
    #[clap(long = "debug", value_name = "EVENT", global = true)]
    pub enabled_debug_events: Vec<events::TraceEvent>,

    /// Action to perform.
    #[clap(subcommand)]
    pub command: Command,
}

/// Top-level actions.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run cases under both shells and compare the results.
    Run(RunArgs),
    /// Write a table of randomly generated cases.
    Generate(GenerateArgs),
    /// Group the divergences recorded in a log by subsystem and by what differed.
    Summarize(SummarizeArgs),
}

/// Arguments for `shelldiff run`.
///
/// Settings left unspecified here fall back to the configuration file, then to built-in
/// defaults.
#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Case table to load.
    #[clap(long = "cases", value_name = "PATH", env = "SHELLDIFF_CASES")]
    pub cases: Option<PathBuf>,

    /// Shell under test; receives each command on stdin.
    #[clap(long = "under-test", value_name = "PATH", env = "SHELLDIFF_UNDER_TEST")]
    pub under_test: Option<PathBuf>,

    /// Reference shell; receives each command via `-c`.
    #[clap(long = "reference", value_name = "PATH", env = "SHELLDIFF_REFERENCE")]
    pub reference: Option<PathBuf>,

    /// Per-execution timeout, in seconds.
    #[clap(long = "timeout", value_name = "SECS", env = "SHELLDIFF_TIMEOUT", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Run only the first N cases.
    #[clap(long = "max", value_name = "N")]
    pub max: Option<usize>,

    /// Run only cases of the given kind.
    #[clap(long = "kind", value_name = "KIND")]
    pub kind: Option<String>,

    /// Directory whose files seed each case's working directory.
    #[clap(long = "fixtures", value_name = "DIR")]
    pub fixtures: Option<PathBuf>,

    /// Write details of every divergence to this file.
    #[clap(long = "log", value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Sort environment dumps and drop host-specific variables in the divergence log.
    #[clap(long = "canonicalize-env")]
    pub canonicalize_env: bool,

    /// Write one row per executed case to this CSV file.
    #[clap(long = "map", value_name = "PATH")]
    pub map: Option<PathBuf>,

    /// Output format.
    #[clap(long = "format", value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Run both shells in a minimal, fixed environment.
    #[clap(long = "clean-env")]
    pub clean_env: bool,

    /// List the selected cases without running them.
    #[clap(long = "list")]
    pub list: bool,

    /// Show details for matching cases too.
    #[clap(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Arguments for `shelldiff generate`.
#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// Path of the table to write.
    #[clap(long = "out", value_name = "PATH")]
    pub out: PathBuf,

    /// Number of cases to generate.
    #[clap(long = "count", value_name = "N", default_value_t = 500)]
    pub count: usize,

    /// Seed for reproducible output.
    #[clap(long = "seed", value_name = "S")]
    pub seed: Option<u64>,
}

/// Arguments for `shelldiff summarize`.
#[derive(clap::Args, Debug)]
pub struct SummarizeArgs {
    /// Divergence log to read; defaults to the `run.log` setting.
    #[clap(long = "log", value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// List at most N divergences after the totals.
    #[clap(long = "max", value_name = "N", default_value_t = shelldiff_harness::logsummary::DEFAULT_MAX_ENTRIES)]
    pub max: usize,
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| std::format!("invalid number of seconds: {value}"))?;

    if secs <= 0.0 {
        return Err("timeout must be positive".into());
    }

    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

/// Returns clap styling to be used for command-line help.
#[doc(hidden)]
fn shelldiff_help_styles() -> clap::builder::Styles {
    styling::Styles::styled()
        .header(
            styling::AnsiColor::Yellow.on_default()
                | styling::Effects::BOLD
                | styling::Effects::UNDERLINE,
        )
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Magenta.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default())
}
