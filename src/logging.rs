use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "night_scrape=info";

/// Installs the global subscriber. `RUST_LOG` wins over the default filter;
/// `NIGHT_SCRAPE_LOG_FORMAT=json` switches stderr output to JSON lines.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let json = std::env::var("NIGHT_SCRAPE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // stdout carries command output, so logs go to stderr
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(err) = result {
        eprintln!("logging already initialised: {err}");
    }
}
