/// Install the global `tracing` subscriber, writing to stderr.
///
/// `RUST_LOG` selects the level (default `info`), e.g.
/// `RUST_LOG=livelog::log=debug livelog app.log`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
