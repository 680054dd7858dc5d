//! `h5bigfile_log` v1:
//! Subscriber setup shared by the command-line tools.
//!
//! Library crates log through the `log` facade; `setup_logger` installs a
//! `tracing` fmt subscriber on stderr that also captures `log` records.

use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Call once, early in `main`.
pub fn setup_logger(filter: EnvFilter) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_level(true)
        .with_line_number(true)
        .with_env_filter(filter)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

/// Level used when `RUST_LOG` is unset or invalid.
pub fn default_level(is_verbose: bool) -> LevelFilter {
    if is_verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// `RUST_LOG` when set and valid, otherwise [`default_level`].
pub fn default_env_filter(is_verbose: bool) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_e) => EnvFilter::builder()
            .with_default_directive(default_level(is_verbose).into())
            .from_env_lossy(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tracing::level_filters::LevelFilter;

    use super::default_level;

    #[rstest]
    #[case(false, LevelFilter::INFO)]
    #[case(true, LevelFilter::TRACE)]
    fn verbose_flag_selects_default_level(#[case] is_verbose: bool, #[case] expected: LevelFilter) {
        assert_eq!(default_level(is_verbose), expected);
    }
}
