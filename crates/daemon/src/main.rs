// draftsyncd: standalone mode entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use draftsync_daemon::config::DaemonConfig;
use tracing::info;

/// Working copy daemon for remotely edited files.
#[derive(Debug, Parser)]
#[command(name = "draftsyncd", version)]
struct Args {
    /// Workspace root; every top-level folder is a project.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to ~/.draftsync/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => DaemonConfig::load_from(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?,
        None => DaemonConfig::load(),
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    info!(root = %args.root.display(), "starting standalone draftsync daemon");
    let result = runtime
        .block_on(draftsync_daemon::runtime::run_standalone(&args.root, &config))
        .context("standalone daemon terminated unexpectedly");
    // The stdin reader thread can still be parked in a blocking read.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}
