use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence; otherwise `quiet` selects warn and each
/// `verbose` step raises info to debug, then trace.
pub fn init(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A subscriber may already be installed (tests, embedding hosts)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
