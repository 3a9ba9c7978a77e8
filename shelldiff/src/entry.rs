//! Implements the command-line interface for `shelldiff`.

use anyhow::Context;
use clap::Parser;
use shelldiff_harness::{
    CaseLoader, DifferentialRunner, DivergenceLog, LogSummary, MappingWriter, ReferenceShell,
    UnderTestShell, generator, util,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::args::{Command, CommandLineArgs, GenerateArgs, RunArgs, SummarizeArgs};
use crate::config::{self, Config};
use crate::events;
use crate::productinfo;

/// Exit status when every case matched.
pub const EXIT_SUCCESS: u8 = 0;

/// Exit status when at least one case diverged.
pub const EXIT_DIVERGED: u8 = 1;

/// Exit status for setup errors, including an empty case sequence.
pub const EXIT_SETUP_ERROR: u8 = 2;

/// Main entry point for `shelldiff`.
pub fn run() {
    //
    // Install panic handlers to clean up on panic.
    //
    install_panic_handlers();

    //
    // Parse args.
    //
    let parsed_args = match CommandLineArgs::try_parse() {
        Ok(parsed_args) => parsed_args,
        Err(e) => {
            let _ = e.print();

            // clap returns errors for `--help`, `--version`, etc.
            let exit_code = match e.kind() {
                clap::error::ErrorKind::DisplayVersion | clap::error::ErrorKind::DisplayHelp => 0,
                _ => i32::from(EXIT_SETUP_ERROR),
            };

            std::process::exit(exit_code);
        }
    };

    //
    // Run.
    //
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
        .and_then(|runtime| runtime.block_on(run_async(parsed_args)));

    let exit_code = match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{}: {err:#}", failure_label(&err));
            EXIT_SETUP_ERROR
        }
    };

    std::process::exit(i32::from(exit_code));
}

/// Names the class of a fatal error. Both classes exit with [`EXIT_SETUP_ERROR`].
fn failure_label(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<shelldiff_harness::Error>() {
        Some(e) if !e.is_setup_error() => "internal error",
        Some(_) => "setup error",
        None => "error",
    }
}

/// Installs a panic handler that reports a human-readable message on release builds.
fn install_panic_handlers() {
    //
    // On release builds, panic details are captured to a temporary .toml file and a
    // human-readable message is reported to the screen.
    //
    human_panic::setup_panic!(
        human_panic::Metadata::new(productinfo::PRODUCT_NAME, productinfo::PRODUCT_VERSION)
            .support("please report the issue along with the case table that triggered it")
    );
}

/// Runs the requested action. Returns the exit code.
async fn run_async(args: CommandLineArgs) -> anyhow::Result<u8> {
    // Initializing tracing.
    let mut event_config = events::TraceEventConfig::init(&args.enabled_debug_events);

    // Load configuration.
    let config = load_config(&args)?;

    for event in &config.logging.debug {
        if let Err(e) = event_config.enable(*event) {
            tracing::warn!("failed to enable debug events for {event}: {e}");
        }
    }

    tracing::debug!(
        target: "runner",
        "debug events enabled: {:?}",
        event_config.get_enabled_events()
    );

    match args.command {
        Command::Run(run_args) => run_cases(&config, &run_args).await,
        Command::Generate(generate_args) => generate_cases(&generate_args),
        Command::Summarize(summarize_args) => summarize_log(&config, &summarize_args),
    }
}

fn load_config(args: &CommandLineArgs) -> anyhow::Result<Config> {
    let result = config::load_config(args.no_config, args.config_file.as_deref());

    if let Some(error) = result.error {
        let path = result
            .path
            .as_deref()
            .map_or_else(String::new, |p| p.display().to_string());

        if result.explicit_path {
            return Err(anyhow::Error::new(error).context(path));
        }

        tracing::warn!("ignoring configuration in {path}: {error}");
    }

    Ok(result.config)
}

async fn run_cases(config: &Config, args: &RunArgs) -> anyhow::Result<u8> {
    let settings = config.to_run_settings(args);

    //
    // Load and select cases.
    //
    let cases = CaseLoader::new(&settings.cases).load()?;
    let cases = settings.runner.select_cases(cases);

    if cases.is_empty() {
        tracing::error!(
            "error: no cases to run from {} (missing, empty, or nothing selected)",
            settings.cases.display()
        );
        return Ok(EXIT_SETUP_ERROR);
    }

    if settings.list {
        for case in &cases {
            println!("{case}  {}", case.display_text(100));
        }
        return Ok(EXIT_SUCCESS);
    }

    //
    // Prepare both shells.
    //
    let runner_config = settings.runner;

    let reference = ReferenceShell::new(
        runner_config.reference.clone(),
        runner_config.timeout,
        runner_config.env_policy,
    )?;

    if let Some(version) = util::get_bash_version_str(reference.program()) {
        tracing::debug!(target: "runner", "reference shell is bash {version}");
    }

    let scratch_dir = tempfile::Builder::new()
        .prefix("shelldiff-")
        .tempdir()
        .context("failed to create scratch directory")?;

    let mut under_test = UnderTestShell::new(
        runner_config.under_test.clone(),
        runner_config.timeout,
        runner_config.env_policy,
    );
    under_test.prepare_binary(scratch_dir.path())?;

    //
    // Open persisted outputs up front so a bad path fails before any case runs.
    //
    let log = settings
        .log
        .map(DivergenceLog::create)
        .transpose()?
        .map(|log| log.with_env_canonicalization(settings.canonicalize_env));
    let mapping = settings.map.map(MappingWriter::create).transpose()?;

    watch_for_interrupt(Arc::clone(&runner_config.interrupt));

    let mut runner =
        DifferentialRunner::new(Arc::new(reference), Arc::new(under_test), runner_config);
    if let Some(log) = log {
        runner = runner.with_log(log);
    }
    if let Some(mapping) = mapping {
        runner = runner.with_mapping(mapping);
    }

    let summary = runner.run(cases).await?;

    scratch_dir
        .close()
        .context("failed to remove scratch directory")?;

    Ok(if summary.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_DIVERGED
    })
}

/// Raises `interrupt` on the first Ctrl-C. The case in flight finishes; no new case starts.
fn watch_for_interrupt(interrupt: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; finishing the current case");
            interrupt.store(true, Ordering::SeqCst);
        }
    });
}

fn generate_cases(args: &GenerateArgs) -> anyhow::Result<u8> {
    let fixtures_dir = generator::generate_table(&args.out, args.count, args.seed)
        .with_context(|| std::format!("failed to generate {}", args.out.display()))?;

    tracing::info!(
        "wrote {} case(s) to {}; run with --fixtures {}",
        args.count,
        args.out.display(),
        fixtures_dir.display()
    );

    Ok(EXIT_SUCCESS)
}

fn summarize_log(config: &Config, args: &SummarizeArgs) -> anyhow::Result<u8> {
    let path = args
        .log
        .clone()
        .or_else(|| config.run.log.clone())
        .context("no divergence log given; pass --log or set run.log")?;

    let summary = LogSummary::read(&path)?;

    summary
        .write_to(&mut std::io::stdout().lock(), args.max)
        .context("failed to write summary")?;

    Ok(EXIT_SUCCESS)
}
