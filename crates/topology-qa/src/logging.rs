//! Logging setup
//!
//! `RUST_LOG` wins when set. Otherwise the default level is `info`, or
//! `debug` for this tool and its library with `--verbose`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,topology_qa=debug,topology_qa_lib=debug"
    } else {
        "info"
    }
}

/// Install the global `tracing` subscriber (logs go to stderr)
pub fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry().with(fmt_layer).init();

    tracing::debug!("Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        for verbose in [false, true] {
            assert!(EnvFilter::try_new(default_filter(verbose)).is_ok());
        }
    }
}
