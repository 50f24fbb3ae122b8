//! The `basalt` node daemon.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use basalt_config::Config;
use basalt_node::{logging, Core, KeyVault, Node};
use basalt_storage::MemoryStore;
use basalt_vm::NoVm;
use tracing::{error, info};

const EXIT_OK: u8 = 0;
const EXIT_FAIL: u8 = 1;
const EXIT_ASSERT_FAILED: u8 = 2;

fn main() -> ExitCode {
    logging::init();

    // An internal invariant violation is fatal in debug builds.
    if cfg!(debug_assertions) {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_hook(info);
            std::process::exit(EXIT_ASSERT_FAILED as i32);
        }));
    }

    match run() {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(error) => {
            error!("{error:#}");
            ExitCode::from(EXIT_FAIL)
        }
    }
}

#[tokio::main]
async fn run() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("basalt.toml"));
    let config = if config_path.exists() {
        Config::load(&config_path).context("loading configuration")?
    } else {
        info!(path = %config_path.display(), "no configuration file; using defaults");
        Config::default()
    };

    let vault = KeyVault::open(&config.keys.directory).context("opening key vault")?;

    // The persistence engine and the contract interpreter are plug-ins; the
    // defaults keep state in memory and fail contract executions.
    let engine = Arc::new(MemoryStore::new());
    let core = Arc::new(
        Core::open(*vault.address(), engine, Arc::new(NoVm)).context("opening the core")?,
    );

    let node = Node::start(&config, Arc::clone(&core))
        .await
        .context("starting the node")?;
    info!(
        peers = node.host().peer_count(),
        top = %core.top_hash(),
        "up; waiting for shutdown signal"
    );

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("shutting down");
    Ok(())
}
