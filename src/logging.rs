//! Tracing subscriber set-up for the binary.
//!
//! Filter priority, highest first: `PGI_LOG`, `RUST_LOG`, the `-v` / `-q`
//! flags, then `warn`. Logs always go to stderr so stdout stays clean for
//! tables and TSV.

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Project-specific filter variable
pub const ENV_LOG_VAR: &str = "PGI_LOG";

const CRATE_TARGET: &str = "public_good_index";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// `-q`: errors only
    Quiet,
    Normal,
    /// `-v`: debug output from this crate
    Verbose,
}

impl Verbosity {
    /// Verbose wins when both flags are given.
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Install the global subscriber. Call once, before config loading.
pub fn init(verbosity: Verbosity) {
    let filter = build_env_filter(verbosity);
    let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_ansi)
        .with_target(verbosity == Verbosity::Verbose);

    // try_init: a second call (tests, embedding) leaves the first subscriber in place
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer.without_time().compact())
        .try_init();
}

fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    if let Some(filter) = std::env::var(ENV_LOG_VAR)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
    {
        return filter;
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::new(default_directive(verbosity))
}

/// Directive used when no env var is set. Verbose keeps dependencies
/// (reqwest, polars) at warn and raises only this crate.
fn default_directive(verbosity: Verbosity) -> String {
    let level = verbosity.default_level();
    match verbosity {
        Verbosity::Verbose => format!("{},{}={}", Level::WARN, CRATE_TARGET, level),
        _ => level.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Verbose);
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(Verbosity::Normal), "WARN");
        assert_eq!(default_directive(Verbosity::Quiet), "ERROR");
        assert_eq!(
            default_directive(Verbosity::Verbose),
            "WARN,public_good_index=DEBUG"
        );
    }
}
