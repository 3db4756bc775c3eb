//! Tracing subscriber setup for the `livegen` binary

use tracing_subscriber::EnvFilter;

/// Default filter for a verbosity level (`-v` count)
#[must_use]
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "livegen=info",
        1 => "livegen=debug",
        _ => "livegen=trace",
    }
}

/// Install the global fmt subscriber, logging to stderr
///
/// `RUST_LOG` takes precedence over `verbosity`. Generated code's console
/// output arrives under the `livegen::guest` target.
///
/// # Errors
/// If a global subscriber is already installed
pub fn init_tracing(json: bool, verbosity: u8) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_filter(0), "livegen=info");
        assert_eq!(default_filter(1), "livegen=debug");
        assert_eq!(default_filter(7), "livegen=trace");
    }
}
