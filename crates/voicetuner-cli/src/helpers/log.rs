// crates/voicetuner-cli/src/helpers/log.rs
//
// Logging setup for the binary.
//
// Two outputs share one filter:
//   stderr                 human-readable, ANSI colour when attached to a tty
//   $TMP/voicetuner.log    append-only plain text, so a run launched from a
//                          script still leaves something to read afterwards
//
// The filter comes from `RUST_LOG` when set, otherwise from `--verbose`.
// Library crates only ever emit through `tracing`; nothing here is visible
// to them.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub fn log_file_path() -> PathBuf {
    std::env::temp_dir().join("voicetuner.log")
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. A log file that cannot be opened is not
/// fatal: the run continues with stderr only.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path())
        .ok()
        .map(|f| fmt::layer().with_ansi(false).with_writer(Mutex::new(f)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(default_directive(0), "info");
        assert_eq!(default_directive(1), "debug");
        assert_eq!(default_directive(7), "trace");
    }

    #[test]
    fn log_file_lives_in_temp() {
        assert!(log_file_path().starts_with(std::env::temp_dir()));
    }
}
