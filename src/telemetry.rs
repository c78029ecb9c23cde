//! Logging setup.
//!
//! Log events go to stderr; stdout carries only command summaries so scripts
//! can parse it. `RUST_LOG` overrides the default filter.

use tracing_subscriber::EnvFilter;

/// Default directives when `RUST_LOG` is unset. `verbose` raises this
/// crate to `debug`.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "info,congress_sync=debug,csync=debug,sqlx=warn"
    } else {
        "info,sqlx=warn,hyper=warn,reqwest=warn"
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(verbose: bool) {
    let ansi = atty::is(atty::Stream::Stderr) && std::env::var_os("NO_COLOR").is_none();
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose))),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_parse() {
        for verbose in [false, true] {
            assert!(EnvFilter::try_new(default_directives(verbose)).is_ok());
        }
    }

    #[test]
    fn init_twice_is_harmless() {
        init(false);
        init(true);
    }
}
