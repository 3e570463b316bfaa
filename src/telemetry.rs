//! Structured logging setup.
//!
//! Mirrors the fluent `configure()....try_init()` builder shape used
//! throughout the rest of the service (see [`crate::config`]), but wraps
//! `tracing-subscriber` directly instead of pulling in a dedicated telemetry
//! crate: this service has no OpenTelemetry exporter to configure, just a
//! verbosity directive and an output format toggle.

use tracing_subscriber::{
    fmt,
    layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
    EnvFilter,
};

/// Builder for the process-wide `tracing` subscriber.
#[derive(Debug, Default)]
pub struct Configure {
    filter_directives: String,
    force_stdout: bool,
    pretty_print: bool,
}

/// Starts building a telemetry configuration with default settings.
#[must_use]
pub fn configure() -> Configure {
    Configure::default()
}

impl Configure {
    #[must_use]
    pub fn set_filter_directives(mut self, directives: &str) -> Self {
        self.filter_directives = directives.to_string();
        self
    }

    #[must_use]
    pub fn set_force_stdout(mut self, force_stdout: bool) -> Self {
        self.force_stdout = force_stdout;
        self
    }

    #[must_use]
    pub fn set_pretty_print(mut self, pretty_print: bool) -> Self {
        self.pretty_print = pretty_print;
        self
    }

    /// Installs the configured subscriber as the global default.
    ///
    /// # Errors
    /// Returns an error if a global subscriber has already been installed, or
    /// if `filter_directives` cannot be parsed as an [`EnvFilter`].
    pub fn try_init(self) -> eyre::Result<()> {
        use eyre::WrapErr as _;

        let env_filter = EnvFilter::try_new(&self.filter_directives)
            .wrap_err("failed to parse log filter directives")?;

        let is_terminal = self.force_stdout || atty_stdout();

        let registry = tracing_subscriber::registry().with(env_filter);

        if self.pretty_print {
            registry
                .with(fmt::layer().pretty().with_ansi(is_terminal))
                .try_init()
        } else if is_terminal {
            registry.with(fmt::layer().with_ansi(true)).try_init()
        } else {
            registry.with(fmt::layer().json()).try_init()
        }
        .wrap_err("failed to install global tracing subscriber")
    }
}

fn atty_stdout() -> bool {
    use std::io::IsTerminal as _;
    std::io::stdout().is_terminal()
}
