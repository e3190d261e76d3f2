//! Tracing subscriber setup.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Map CLI verbosity to a log level.
///
/// `quiet` wins over `verbosity`: warnings only. Otherwise 0 is info,
/// 1 is debug and 2 or more is trace.
pub fn level_for(quiet: bool, verbosity: u8) -> Level {
    if quiet {
        return Level::WARN;
    }
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence when set.
///
/// Calling it twice is harmless; the second call is ignored.
pub fn init(quiet: bool, verbosity: u8) {
    let level = level_for(quiet, verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ctctrain={level}")));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_overrides_verbosity() {
        assert_eq!(level_for(true, 2), Level::WARN);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for(false, 0), Level::INFO);
        assert_eq!(level_for(false, 1), Level::DEBUG);
        assert_eq!(level_for(false, 2), Level::TRACE);
        assert_eq!(level_for(false, 9), Level::TRACE);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(true, 0);
        init(false, 1);
    }
}
