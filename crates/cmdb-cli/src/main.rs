//! cmdb-auth - CMDB authentication administration tool.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cmdb_cli::commands::log_failure;
use cmdb_cli::{run, Args, Workspace, DEFAULT_LOG_FILTER};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = args.config();

    tracing::debug!(
        data_path = %config.data_path.display(),
        cloud_mode = config.cloud_mode,
        directory_fixture = ?config.directory_fixture,
        "configuration loaded"
    );

    let mut workspace = Workspace::open(config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if let Err(e) = run(&mut workspace, args.command, &mut out) {
        log_failure(&e);
        return Err(e.into());
    }

    Ok(())
}
