//! livelog entry point: parses CLI and starts the async application runtime.
//! The main function is intentionally thin and delegates to the runtime in `app`.

use anyhow::Result;

use livelog::{app, cli, logging};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let config = cli::parse();
    app::run(config).await
}
