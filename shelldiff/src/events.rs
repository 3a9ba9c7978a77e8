//! Tracing setup for the `shelldiff` binary.

use std::collections::HashSet;
use std::fmt::Display;
use tracing_subscriber::{
    Layer, Registry, filter::Targets, layer::SubscriberExt, reload::Handle,
    util::SubscriberInitExt,
};

/// Type of event to trace.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceEvent {
    /// Traces loading of case tables.
    #[clap(name = "load")]
    Load,
    /// Traces spawning of shell processes and timeouts.
    #[clap(name = "exec")]
    Exec,
    /// Traces preparation of the shell-under-test binary.
    #[clap(name = "prepare")]
    Prepare,
    /// Traces per-case progress through the runner.
    #[clap(name = "runner")]
    Runner,
}

impl TraceEvent {
    const fn target(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Exec => "exec",
            Self::Prepare => "prepare",
            Self::Runner => "runner",
        }
    }
}

impl Display for TraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.target())
    }
}

/// Tracing configuration, kept around so the filter can be changed after init.
#[derive(Default)]
pub(crate) struct TraceEventConfig {
    enabled_trace_events: HashSet<TraceEvent>,
    handle: Option<Handle<Targets, Registry>>,
}

impl TraceEventConfig {
    /// Installs the global subscriber with DEBUG enabled for the given events.
    pub fn init(enabled_debug_events: &[TraceEvent]) -> Self {
        let mut config = Self {
            enabled_trace_events: enabled_debug_events.iter().copied().collect(),
            ..Default::default()
        };

        let filter = config.compose_filter();

        let (reload_filter, handle) = tracing_subscriber::reload::Layer::new(filter);

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(false)
            .with_filter(reload_filter);

        if tracing_subscriber::registry()
            .with(layer)
            .try_init()
            .is_ok()
        {
            config.handle = Some(handle);
        } else {
            // Something went wrong; proceed on anyway but complain audibly.
            eprintln!("warning: failed to initialize tracing.");
        }

        config
    }

    fn compose_filter(&self) -> Targets {
        let filter = Targets::new().with_default(tracing_subscriber::filter::LevelFilter::INFO);

        filter.with_targets(
            self.enabled_trace_events
                .iter()
                .map(|event| (event.target(), tracing::Level::DEBUG)),
        )
    }

    /// Enables DEBUG output for one more event, reloading the filter if needed.
    pub fn enable(&mut self, event: TraceEvent) -> Result<(), tracing_subscriber::reload::Error> {
        // Don't bother to reload config if nothing has changed.
        if !self.enabled_trace_events.insert(event) {
            return Ok(());
        }

        match &self.handle {
            Some(handle) => handle.reload(self.compose_filter()),
            None => Ok(()),
        }
    }

    pub fn get_enabled_events(&self) -> &HashSet<TraceEvent> {
        &self.enabled_trace_events
    }
}
