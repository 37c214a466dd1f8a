//! nodes_db
//!
//! Provisioning entry point: loads the run configuration, reads the exported
//! node documents and writes one resource file per environment.
//!
//! Usage: `nodes_db [CONFIG]` (defaults to `$NODES_DB_CONFIG` or `nodes_db.yml`)

use anyhow::{Context, Result};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nodes_db::provision::DEFAULT_CONFIG_FILE;
use nodes_db::{DirectorySource, ProvisionConfig, Provisioner, DEFAULT_LOG_FILTER};

// ──────────────────────────────────────────────────────────────────────────────
// MAIN ENTRY POINT
// ──────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with_target(true)
        .init();

    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("NODES_DB_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    let config = ProvisionConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from '{}'", config_path))?;
    info!(
        "Provisioning {} environment(s) as '{}' into {:?}",
        config.environments.len(),
        config.file_type,
        config.dir
    );

    let source = DirectorySource::new(&config.node_path);
    let provisioner = Provisioner::new(config)?;
    let written = provisioner.run(&source)?;

    for path in &written {
        println!("{}", path.display());
    }

    Ok(())
}
