//! # Crypt Controller
//!
//! A Kubernetes controller that materializes secrets from a key/value secret store
//! into every namespace selected by a `Crypt` resource.
//!
//! ## Overview
//!
//! 1. **Watching** - Crypts, Namespaces and Secrets are mirrored locally
//! 2. **Queueing** - changes collapse into one pending pass per Crypt
//! 3. **Converging** - each pass writes every (secret, matched namespace) target
//! 4. **Self-healing** - deleting a target re-runs its Crypt, recreating it
//!
//! ## Usage
//!
//! ```bash
//! crypt-controller --store-type consul --store-config /etc/crypt/store.yaml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use crypt_controller::config::ControllerConfig;
use crypt_controller::runtime::initialization::{self, StartupOptions};
use crypt_controller::runtime::{shutdown, workers};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "crypt-controller", version, about)]
struct Args {
    /// Path to a kubeconfig file (in-cluster config when unset)
    #[arg(long, env = "KUBECONFIGPATH")]
    kubeconfig: Option<PathBuf>,

    /// Kubernetes API server URL, overriding the kubeconfig
    #[arg(long)]
    master: Option<String>,

    /// Secret store backend: empty, fake, memory, consul or vault
    #[arg(long, env = "STORE_TYPE")]
    store_type: String,

    /// Store configuration file (YAML or JSON)
    #[arg(long, env = "STORE_CONFIG")]
    store_config: Option<PathBuf>,

    /// Number of parallel reconcile workers
    #[arg(long, env = "WORKERS")]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    initialization::install_crypto_provider();

    let args = Args::parse();
    let mut config = ControllerConfig::from_env();
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }

    initialization::init_logging(&config);

    let options = StartupOptions {
        kubeconfig: args.kubeconfig,
        master: args.master,
        store_type: args.store_type,
        store_config: args.store_config,
    };

    let init = initialization::initialize(&options, &config).await?;

    workers::run(
        init.queue,
        init.reconciler,
        config.workers,
        config.cache_sync_timeout(),
        config.resync_period(),
        Some(init.server_state),
        shutdown::shutdown_signal(),
    )
    .await
    .context("Controller failed to start")?;

    for feed in init.feeds {
        feed.abort();
    }
    info!("Crypt Controller stopped");
    Ok(())
}
