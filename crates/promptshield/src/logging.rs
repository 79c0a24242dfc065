//! Logging setup for promptshield.
//!
//! Everything goes to stderr, leaving stdout to the filtered content printed
//! by the CLI. Removed spans are logged by offset and length, never by their
//! text.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How chatty the logs should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Info and above.
    #[default]
    Normal,
    /// Debug and above: one line per removed span.
    Verbose,
    /// Everything, including rejected candidates.
    Trace,
}

impl Verbosity {
    /// Map `-q` and the number of `-v` flags to a verbosity.
    ///
    /// `quiet` wins over any number of `-v`.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// The tracing level for this verbosity.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// The filter directive used when `RUST_LOG` is unset.
#[must_use]
pub fn default_directive(verbosity: Verbosity) -> String {
    format!("promptshield={}", verbosity.level())
}

fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)))
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `verbosity` when set. Calling this more than once is
/// harmless; only the first call takes effect.
///
/// # Examples
///
/// ```no_run
/// use promptshield::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(false, 1));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity >= Verbosity::Verbose)
        .without_time();

    let _ = tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(layer)
        .try_init();
}

/// Route logs to the test harness, warnings and above.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        assert_eq!(Verbosity::from_flags(false, 0), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(false, 1), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, 2), Verbosity::Trace);
        assert_eq!(Verbosity::from_flags(false, 9), Verbosity::Trace);
        assert_eq!(Verbosity::from_flags(true, 2), Verbosity::Quiet);
    }

    #[test]
    fn test_levels() {
        assert_eq!(Verbosity::Quiet.level(), Level::ERROR);
        assert_eq!(Verbosity::default().level(), Level::INFO);
        assert_eq!(Verbosity::Verbose.level(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.level(), Level::TRACE);
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(Verbosity::Normal), "promptshield=INFO");
        assert_eq!(default_directive(Verbosity::Trace), "promptshield=TRACE");
    }

    #[test]
    fn test_init_is_repeatable() {
        init_test_logging();
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Trace);
    }
}
