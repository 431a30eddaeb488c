//! Diagnostic tracing for kite.
//!
//! Logs go to stderr so stdout carries only the model's answer. Reads
//! `RUST_LOG`, defaulting to `warn`; each `-v` raises kite's own targets.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn kite_directive(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("kite=debug"),
        _ => Some("kite=trace"),
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `-v`.
pub fn init(verbose: u8) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let mut filter = EnvFilter::new("warn");
            if let Some(directive) = kite_directive(verbose).and_then(|d| d.parse().ok()) {
                filter = filter.add_directive(directive);
            }
            filter
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
