pub mod utils;

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::cluster::{
    BootstrapDecision, BootstrapPhase, Cluster, ClusterError, DriverRegistry, StorageBootstrap,
};
use crate::ServiceConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Summary of one bootstrap run, for operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub phase: BootstrapPhase,
    pub decision: Option<BootstrapDecision>,
    pub driver: Option<String>,
    pub joining: bool,
    pub save_bootstrap: bool,
    /// `false` when shutdown arrived before the datastore answered
    pub ready: bool,
}

impl BootstrapReport {
    fn from_cluster(cluster: &Cluster, ready: bool) -> Self {
        Self {
            phase: cluster.phase(),
            decision: cluster.decision(),
            driver: cluster.managed_driver().map(|d| d.name().to_string()),
            joining: cluster.is_joining(),
            save_bootstrap: cluster.save_bootstrap(),
            ready,
        }
    }
}

impl fmt::Display for BootstrapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "phase: {:?}", self.phase)?;
        match self.decision {
            Some(decision) => writeln!(f, "decision: {:?}", decision)?,
            None => writeln!(f, "decision: none")?,
        }
        writeln!(
            f,
            "managed driver: {}",
            self.driver.as_deref().unwrap_or("none (external datastore)")
        )?;
        writeln!(f, "joined existing cluster: {}", self.joining)?;
        writeln!(f, "must save bootstrap data: {}", self.save_bootstrap)?;
        write!(f, "datastore ready: {}", self.ready)
    }
}

/// Initialize logging, panic handler, and build info reporting.
/// Returns guards that must be kept alive for the duration of the program.
pub fn init_logging(
    service_config: &ServiceConfig,
) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(service_config.log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    // a second init (tests, embedding) keeps the first subscriber
    if tracing_subscriber::registry()
        .with(stdout_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }

    utils::register_panic_logger();
    utils::report_build_info();

    vec![stdout_guard]
}

/// Bootstrap the cluster layer, start the datastore, and wait for it to
///  answer. Returns whether it became ready before shutdown.
pub async fn run_cluster(
    cluster: &mut Cluster,
    shutdown_rx: watch::Receiver<()>,
) -> Result<bool, ClusterError> {
    cluster.bootstrap().await?;
    cluster.start().await?;

    let ready = cluster.test_cluster_db(shutdown_rx).await.is_ok();
    if !ready {
        tracing::info!("shutdown requested before the datastore became ready");
    }
    Ok(ready)
}

/// Run the cluster layer for the CLI binary: logging, signal handling,
///  bootstrap and the readiness wait.
pub async fn spawn_bootstrap(
    service_config: &ServiceConfig,
    registry: Arc<DriverRegistry>,
    storage: Option<Arc<dyn StorageBootstrap>>,
) -> Result<BootstrapReport, ProcessError> {
    let _guards = init_logging(service_config);
    let (graceful_waiter, _shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker()?;

    let mut cluster = Cluster::new(service_config.clone(), registry);
    if let Some(storage) = storage {
        cluster = cluster.with_storage_bootstrap(storage);
    }

    let result = run_cluster(&mut cluster, shutdown_rx).await;
    graceful_waiter.abort();

    let ready = result?;
    Ok(BootstrapReport::from_cluster(&cluster, ready))
}
