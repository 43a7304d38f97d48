//! # Initialization
//!
//! Controller bootstrap: rustls setup, logging, metrics, HTTP server, Kubernetes
//! client, secret store, mirrors, work queue, reconciler and handlers.

use crate::config::{ControllerConfig, StoreConfig};
use crate::constants::CONTROLLER_NAME;
use crate::controller::events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
use crate::controller::handlers::{CryptEventHandler, NamespaceEventHandler, SecretEventHandler};
use crate::controller::reconciler::Reconciler;
use crate::controller::secrets::KubeSecretWriter;
use crate::controller::server::{start_server, ServerState};
use crate::crd::Crypt;
use crate::observability;
use crate::runtime::mirror::{mirror, MirrorFeed, MirroredResource};
use crate::runtime::queue::WorkQueue;
use crate::store::StoreFactory;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use kube_runtime::watcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info};

const SERVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SERVER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Settings taken from the command line
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    /// Path to a kubeconfig file; in-cluster or default config when unset
    pub kubeconfig: Option<PathBuf>,
    /// API server URL overriding the kubeconfig's
    pub master: Option<String>,
    pub store_type: String,
    pub store_config: Option<PathBuf>,
}

/// Everything the worker pool needs once bootstrap is done
pub struct InitializationResult {
    pub client: Client,
    pub queue: Arc<WorkQueue<String>>,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
    /// Background watch tasks feeding the mirrors
    pub feeds: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .field("feeds", &self.feeds.len())
            .finish_non_exhaustive()
    }
}

/// Configure the rustls crypto provider; must run before any TLS client is built
pub fn install_crypto_provider() {
    // Err only means a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins; otherwise `crypt_controller=<LOG_LEVEL>`.
pub fn init_logging(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("crypt_controller={}", config.log_level.to_lowercase()).into()
    });

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Build the Kubernetes client from a kubeconfig file or the inferred config
pub async fn build_client(options: &StartupOptions) -> Result<Client> {
    let mut config = match &options.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Failed to load kubeconfig")?
        }
        None => Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?,
    };

    if let Some(master) = options.master.as_deref().filter(|m| !m.is_empty()) {
        config.cluster_url = master
            .parse()
            .with_context(|| format!("Invalid master URL {master}"))?;
    }

    info!(cluster_url = %config.cluster_url, "Connecting to Kubernetes API");
    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Initialize the controller runtime
///
/// Handles:
/// - metrics registration and the HTTP server
/// - Kubernetes client creation
/// - secret store construction
/// - mirrors, work queue, reconciler and handlers
/// - spawning the watch feeds
pub async fn initialize(
    options: &StartupOptions,
    config: &ControllerConfig,
) -> Result<InitializationResult> {
    info!("Starting Crypt Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    if config.enable_metrics {
        let state = Arc::clone(&server_state);
        let port = config.metrics_port;
        let server_handle = tokio::spawn(async move {
            if let Err(e) = start_server(port, state).await {
                error!("HTTP server error: {}", e);
            }
        });
        wait_for_server_ready(&server_state, &server_handle).await?;
    }

    let client = build_client(options).await?;

    let store_config = StoreConfig::load(options.store_config.as_deref())?;
    let store = StoreFactory::new(store_config)
        .make(&options.store_type)
        .context("Failed to create secret store")?;

    let (crypts, mut crypt_feed) = mirror::<Crypt>("Crypt");
    let (namespaces, mut namespace_feed) = mirror::<Namespace>("Namespace");
    let (secrets, mut secret_feed) = mirror::<Secret>("Secret");

    let events: Arc<dyn EventPublisher> = if config.enable_events {
        Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME))
    } else {
        Arc::new(NoopEventPublisher)
    };

    let reconciler = Arc::new(
        Reconciler::new(
            crypts.clone(),
            namespaces,
            secrets,
            store,
            Arc::new(KubeSecretWriter::new(client.clone())),
            events,
        )
        .with_cleanup_grace_period(config.cleanup_grace_period_secs),
    );

    let queue = Arc::new(WorkQueue::new(
        CONTROLLER_NAME,
        config.backoff_base_duration(),
        config.backoff_max_duration(),
    ));

    crypt_feed.add_handler(Arc::new(CryptEventHandler::new(
        Arc::clone(&queue),
        Arc::clone(&reconciler),
        config.cleanup_mode,
    )));
    namespace_feed.add_handler(Arc::new(NamespaceEventHandler::new(
        Arc::clone(&queue),
        crypts.clone(),
    )));
    secret_feed.add_handler(Arc::new(SecretEventHandler::new(
        Arc::clone(&queue),
        crypts,
    )));

    let restart_delay = config.watch_restart_delay_duration();
    let feeds = vec![
        spawn_feed(crypt_feed, Api::all(client.clone()), restart_delay),
        spawn_feed(namespace_feed, Api::all(client.clone()), restart_delay),
        spawn_feed(secret_feed, Api::all(client.clone()), restart_delay),
    ];

    info!(
        cleanup_mode = %config.cleanup_mode,
        workers = config.workers,
        "Controller initialized"
    );

    Ok(InitializationResult {
        client,
        queue,
        reconciler,
        server_state,
        feeds,
    })
}

fn spawn_feed<K: MirroredResource>(
    feed: MirrorFeed<K>,
    api: Api<K>,
    restart_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(feed.run(api, watcher::Config::default(), restart_delay))
}

/// Wait for the HTTP server to bind
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &JoinHandle<()>,
) -> Result<()> {
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_serving
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > SERVER_STARTUP_TIMEOUT {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                SERVER_STARTUP_TIMEOUT.as_secs()
            ));
        }

        tokio::time::sleep(SERVER_POLL_INTERVAL).await;
    }
}
