//! Cluster join and bootstrap orchestration
//!
//! [`Cluster::bootstrap`] runs once per process and walks a small state
//! machine:
//!
//! ```text
//! Init -> DriverAssigned -> DecisionMade{Skip|HttpFetch|StorageLoad} -> Complete
//! ```
//!
//! with `Failed` reachable from every state. Servers running a managed
//! datastore pull bootstrap material from the peer they join over HTTP;
//! servers on an external datastore load it from storage. Either way a
//! stamp keyed off the raw join token records completion, so later restarts
//! with the same token skip the fetch entirely.

mod error;
pub mod managed;
pub mod readiness;
pub mod stamp;
pub mod storage;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};

use common::access::AccessInfo;
use common::bootstrap::{BootstrapMaterial, ControlRuntimeBootstrap};
use common::version::PROGRAM;

use crate::client_access::ClientAccess;
use crate::service_config::Config;

pub use error::ClusterError;
pub use managed::{
    select_driver, DriverError, DriverRegistry, DriverSelection, ManagedDriver,
    ManagedDriverDescriptor, RegistryError, SelectionReason,
};
pub use readiness::{spawn_readiness_poller, READINESS_INTERVAL};
pub use stamp::BootstrapStamp;
pub use storage::StorageBootstrap;

/// Identity presented to the peer when joining as a server
pub const SERVER_USERNAME: &str = "server";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Init,
    DriverAssigned,
    DecisionMade(BootstrapDecision),
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapDecision {
    Skip(SkipReason),
    HttpFetch,
    StorageLoad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Managed datastore with no join URL: this server founds the cluster
    Founder,
    /// The peer is unavailable but local datastore state already exists
    QuorumBypass,
    /// The stamp for this token is already on disk
    AlreadyBootstrapped,
}

/// Working state of a bootstrap attempt
#[derive(Debug, Default)]
struct ClusterSelectionState {
    managed_driver: Option<Arc<dyn ManagedDriver>>,
    http_bootstrap: bool,
    joining: bool,
    access_info: Option<AccessInfo>,
}

#[derive(Debug)]
pub struct Cluster {
    config: Config,
    registry: Arc<DriverRegistry>,
    client_access: ClientAccess,
    storage: Option<Arc<dyn StorageBootstrap>>,
    runtime: ControlRuntimeBootstrap,

    state: ClusterSelectionState,
    phase: BootstrapPhase,
    decision: Option<BootstrapDecision>,
    save_bootstrap: bool,
    material: Option<BootstrapMaterial>,
}

impl Cluster {
    pub fn new(config: Config, registry: Arc<DriverRegistry>) -> Self {
        let runtime = ControlRuntimeBootstrap::under(&config.data_dir);
        Self {
            config,
            registry,
            client_access: ClientAccess::default(),
            storage: None,
            runtime,
            state: ClusterSelectionState::default(),
            phase: BootstrapPhase::Init,
            decision: None,
            save_bootstrap: false,
            material: None,
        }
    }

    pub fn with_client_access(mut self, client_access: ClientAccess) -> Self {
        self.client_access = client_access;
        self
    }

    pub fn with_storage_bootstrap(mut self, storage: Arc<dyn StorageBootstrap>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_runtime(mut self, runtime: ControlRuntimeBootstrap) -> Self {
        self.runtime = runtime;
        self
    }

    /// Assign a managed driver, decide whether bootstrap data is needed,
    ///  and fetch it if so. May only run once.
    pub async fn bootstrap(&mut self) -> Result<(), ClusterError> {
        if self.phase != BootstrapPhase::Init {
            return Err(ClusterError::AlreadyBootstrapped(self.phase));
        }

        match self.run_bootstrap().await {
            Ok(()) => {
                self.phase = BootstrapPhase::Complete;
                Ok(())
            }
            Err(e) => {
                tracing::error!(phase = ?self.phase, "cluster bootstrap failed: {}", e);
                self.phase = BootstrapPhase::Failed;
                Err(e)
            }
        }
    }

    async fn run_bootstrap(&mut self) -> Result<(), ClusterError> {
        self.assign_managed_driver().await?;
        self.phase = BootstrapPhase::DriverAssigned;

        let decision = self.decide().await?;
        tracing::debug!(?decision, "bootstrap decision made");
        self.decision = Some(decision);
        self.phase = BootstrapPhase::DecisionMade(decision);

        match decision {
            BootstrapDecision::Skip(_) => return Ok(()),
            BootstrapDecision::HttpFetch => self.http_bootstrap().await?,
            BootstrapDecision::StorageLoad => self.storage_bootstrap().await?,
        }

        self.state.joining = true;
        self.mark_bootstrapped()
    }

    async fn assign_managed_driver(&mut self) -> Result<(), ClusterError> {
        match select_driver(&self.registry, &self.config).await? {
            Some(DriverSelection { driver, reason }) => {
                tracing::info!(?reason, "using managed datastore driver {}", driver.name());
                self.state.managed_driver = Some(driver);
            }
            None => tracing::info!("no managed datastore driver selected"),
        }
        Ok(())
    }

    async fn decide(&mut self) -> Result<BootstrapDecision, ClusterError> {
        if let Some(driver) = self.state.managed_driver.clone() {
            self.state.http_bootstrap = true;

            let Some(join_url) = self.config.join_url() else {
                tracing::info!("no join URL configured, starting a new cluster");
                return Ok(BootstrapDecision::Skip(SkipReason::Founder));
            };
            let Some(token) = self.config.token() else {
                return Err(ClusterError::MissingToken);
            };

            match self
                .client_access
                .parse_and_validate_token_for_user(join_url, token, SERVER_USERNAME)
                .await
            {
                Ok(info) => self.state.access_info = Some(info),
                Err(e) if e.is_service_unavailable() => {
                    // A peer that lost quorum cannot serve its CA until our
                    //  datastore is back, and ours cannot come back until we
                    //  start. Local state is the only way out of that loop.
                    match driver.is_initialized(&self.config).await {
                        Ok(true) => {
                            tracing::warn!(
                                "Ignoring bootstrap token validation error on initialized member due to cluster quorum loss: {}",
                                e
                            );
                            return Ok(BootstrapDecision::Skip(SkipReason::QuorumBypass));
                        }
                        Ok(false) => {}
                        Err(check) => tracing::warn!(
                            "Failed to check managed database initialization: {}",
                            check
                        ),
                    }
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        // The stamp only gates the fetch. Joining members still validate
        //  the peer first, since start and readiness need its access info.
        let stamp = self.bootstrap_stamp();
        let exists = stamp.exists().map_err(|source| ClusterError::Stamp {
            path: stamp.path().to_path_buf(),
            source,
        })?;
        if exists {
            tracing::info!("Cluster bootstrap already complete");
            return Ok(BootstrapDecision::Skip(SkipReason::AlreadyBootstrapped));
        }

        Ok(if self.state.http_bootstrap {
            BootstrapDecision::HttpFetch
        } else {
            BootstrapDecision::StorageLoad
        })
    }

    /// Pull bootstrap material from the peer. The peer generates it on
    ///  demand, so nothing needs decrypting here.
    async fn http_bootstrap(&mut self) -> Result<(), ClusterError> {
        let info = self
            .state
            .access_info
            .as_ref()
            .ok_or(ClusterError::MissingAccessInfo)?;

        let path = format!("/v1-{}/server-bootstrap", PROGRAM);
        tracing::info!("fetching bootstrap data from {}{}", info.base_url, path);
        let content = self.client_access.get(&path, info).await?;

        let material = BootstrapMaterial::from_slice(&content)?;
        let written = material.apply(&self.runtime)?;
        tracing::info!(files = written, "bootstrap data written");

        self.material = Some(material);
        Ok(())
    }

    async fn storage_bootstrap(&mut self) -> Result<(), ClusterError> {
        let Some(storage) = self.storage.clone() else {
            tracing::debug!("no storage bootstrap configured, nothing to load");
            self.save_bootstrap = true;
            return Ok(());
        };

        match storage
            .load(&self.config)
            .await
            .map_err(ClusterError::StorageBootstrap)?
        {
            Some(material) => {
                let written = material.apply(&self.runtime)?;
                tracing::info!(files = written, "bootstrap data loaded from datastore");
                self.material = Some(material);
            }
            None => {
                tracing::info!("datastore holds no bootstrap data, this server will save its own");
                self.save_bootstrap = true;
            }
        }
        Ok(())
    }

    /// Record that bootstrap has completed for the configured token.
    ///  Safe to call repeatedly.
    pub fn mark_bootstrapped(&self) -> Result<(), ClusterError> {
        let stamp = self.bootstrap_stamp();
        stamp.create().map_err(|source| ClusterError::Stamp {
            path: stamp.path().to_path_buf(),
            source,
        })
    }

    /// Stamp for the token exactly as configured, before any normalization
    pub fn bootstrap_stamp(&self) -> BootstrapStamp {
        BootstrapStamp::new(
            &self.config.data_dir,
            self.config.token.as_deref().unwrap_or_default(),
        )
    }

    /// Start the managed datastore, or reset it when requested.
    ///  A no-op without a managed driver.
    pub async fn start(&self) -> Result<(), ClusterError> {
        let Some(driver) = &self.state.managed_driver else {
            return Ok(());
        };
        let info = self.state.access_info.as_ref();

        if self.config.cluster_reset {
            tracing::warn!("resetting managed datastore {}", driver.name());
            driver.reset(info).await?;
        } else {
            driver.start(info).await?;
        }
        Ok(())
    }

    /// Let the managed driver wrap the serving stack. Without a driver the
    ///  listener and router pass through untouched.
    pub async fn register(
        &mut self,
        listener: TcpListener,
        router: Router,
    ) -> Result<(TcpListener, Router), ClusterError> {
        let Some(driver) = self.state.managed_driver.clone() else {
            return Ok((listener, router));
        };

        let prefix = format!("{}://", driver.name());
        if !self.config.datastore_endpoint.starts_with(&prefix) {
            self.config.datastore_endpoint = driver.name().to_string();
        }

        Ok(driver.register(&self.config, listener, router).await?)
    }

    /// Start probing the managed datastore; see [`spawn_readiness_poller`].
    pub fn test_cluster_db(&self, shutdown_rx: watch::Receiver<()>) -> oneshot::Receiver<()> {
        spawn_readiness_poller(
            self.state.managed_driver.clone(),
            self.state.access_info.clone(),
            shutdown_rx,
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runtime(&self) -> &ControlRuntimeBootstrap {
        &self.runtime
    }

    pub fn access_info(&self) -> Option<&AccessInfo> {
        self.state.access_info.as_ref()
    }

    pub fn managed_driver(&self) -> Option<&Arc<dyn ManagedDriver>> {
        self.state.managed_driver.as_ref()
    }

    pub fn is_http_bootstrap(&self) -> bool {
        self.state.http_bootstrap
    }

    /// Whether this process pulled bootstrap data from an existing cluster
    pub fn is_joining(&self) -> bool {
        self.state.joining
    }

    /// Whether bootstrap data had to be loaded on this run
    pub fn should_bootstrap(&self) -> bool {
        matches!(
            self.decision,
            Some(BootstrapDecision::HttpFetch | BootstrapDecision::StorageLoad)
        )
    }

    /// Whether the datastore had no bootstrap data, so this server must save its own
    pub fn save_bootstrap(&self) -> bool {
        self.save_bootstrap
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    pub fn decision(&self) -> Option<BootstrapDecision> {
        self.decision
    }

    pub fn bootstrap_material(&self) -> Option<&BootstrapMaterial> {
        self.material.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use common::access::hash_ca;

    use crate::client_access::{ClientAccessError, TrustPolicy};
    use crate::testkit::{MockDriver, MockResponse, MockTransport, StaticStorageBootstrap};

    const JOIN_URL: &str = "https://10.0.0.1:6443";
    const TOKEN: &str = "K10::server:pw";
    const BUNDLE: &[u8] = b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
    const MATERIAL: &str =
        r#"{"ServerCA":{"timestamp":"2024-01-02T03:04:05Z","content":"c2VydmVyLWNhLXBlbQ=="}}"#;

    struct Harness {
        cluster: Cluster,
        transport: Arc<MockTransport>,
        driver: Arc<MockDriver>,
        _dir: tempfile::TempDir,
    }

    fn harness(driver: MockDriver, configure: impl FnOnce(&mut Config)) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(dir.path());
        configure(&mut config);

        let driver = Arc::new(driver);
        let mut registry = DriverRegistry::new();
        registry.register(driver.clone(), true).unwrap();

        let transport = Arc::new(MockTransport::new());
        let cluster = Cluster::new(config, Arc::new(registry))
            .with_client_access(ClientAccess::new(transport.clone()));

        Harness {
            cluster,
            transport,
            driver,
            _dir: dir,
        }
    }

    fn joining(config: &mut Config) {
        config.token = Some(TOKEN.to_string());
        config.join_url = Some(JOIN_URL.to_string());
    }

    fn script_trusted_join(transport: &MockTransport) {
        transport.push(MockResponse::Untrusted);
        transport.push(MockResponse::body(BUNDLE));
        transport.push(MockResponse::body(BUNDLE));
    }

    #[tokio::test]
    async fn test_founder_skips_bootstrap() {
        let mut h = harness(MockDriver::new("etcd"), |c| c.cluster_init = true);

        h.cluster.bootstrap().await.unwrap();

        assert_eq!(h.cluster.phase(), BootstrapPhase::Complete);
        assert_eq!(
            h.cluster.decision(),
            Some(BootstrapDecision::Skip(SkipReason::Founder))
        );
        assert!(h.cluster.is_http_bootstrap());
        assert!(!h.cluster.is_joining());
        assert!(!h.cluster.should_bootstrap());
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_http_join_fetches_and_stamps() {
        let mut h = harness(MockDriver::new("etcd"), joining);
        script_trusted_join(&h.transport);
        h.transport.push(MockResponse::body(MATERIAL));

        h.cluster.bootstrap().await.unwrap();

        assert_eq!(h.cluster.decision(), Some(BootstrapDecision::HttpFetch));
        assert!(h.cluster.is_joining());
        assert!(h.cluster.should_bootstrap());
        assert!(h.cluster.bootstrap_stamp().exists().unwrap());

        let info = h.cluster.access_info().unwrap();
        assert_eq!(info.username, SERVER_USERNAME);
        assert_eq!(info.ca_certs, BUNDLE);

        let fetch = h.transport.requests().pop().unwrap();
        assert_eq!(fetch.url, "https://10.0.0.1:6443/v1-keel/server-bootstrap");
        assert_eq!(fetch.auth.unwrap().password, "pw");

        let server_ca = std::fs::read(&h.cluster.runtime().server_ca).unwrap();
        assert_eq!(server_ca, b"server-ca-pem");
    }

    #[tokio::test]
    async fn test_existing_stamp_skips_fetch() {
        let mut h = harness(MockDriver::new("etcd"), joining);
        h.cluster.mark_bootstrapped().unwrap();
        script_trusted_join(&h.transport);

        h.cluster.bootstrap().await.unwrap();

        assert_eq!(
            h.cluster.decision(),
            Some(BootstrapDecision::Skip(SkipReason::AlreadyBootstrapped))
        );
        assert!(!h.cluster.is_joining());
        // only the three CA requests, no bootstrap fetch
        assert_eq!(h.transport.requests().len(), 3);
        assert!(h.cluster.access_info().is_some());
    }

    #[tokio::test]
    async fn test_existing_stamp_still_requires_reachable_peer() {
        let mut h = harness(MockDriver::new("etcd"), joining);
        h.cluster.mark_bootstrapped().unwrap();
        h.cluster.mark_bootstrapped().unwrap();

        // nothing scripted: every request fails to connect
        let err = h.cluster.bootstrap().await.unwrap_err();

        assert!(matches!(
            err,
            ClusterError::ClientAccess(ClientAccessError::CaCertsFetch(_))
        ));
        assert_eq!(h.cluster.phase(), BootstrapPhase::Failed);
        assert_eq!(h.cluster.decision(), None);
        assert_eq!(
            h.transport.policies(),
            vec![TrustPolicy::System, TrustPolicy::Insecure]
        );
        assert!(h.cluster.bootstrap_stamp().exists().unwrap());
    }

    #[tokio::test]
    async fn test_existing_stamp_skips_network_without_driver() {
        let mut h = harness(MockDriver::new("etcd"), |c| {
            c.datastore_endpoint = "postgres://db:5432/keel".into();
            c.token = Some("opaque-secret".into());
            c.join_url = Some(JOIN_URL.into());
        });
        h.cluster.mark_bootstrapped().unwrap();

        h.cluster.bootstrap().await.unwrap();

        assert_eq!(
            h.cluster.decision(),
            Some(BootstrapDecision::Skip(SkipReason::AlreadyBootstrapped))
        );
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_quorum_loss_bypass() {
        let mut h = harness(MockDriver::new("etcd").initialized(true), joining);
        h.transport.push(MockResponse::Unavailable);
        h.transport.push(MockResponse::Unavailable);

        h.cluster.bootstrap().await.unwrap();

        assert_eq!(h.cluster.phase(), BootstrapPhase::Complete);
        assert_eq!(
            h.cluster.decision(),
            Some(BootstrapDecision::Skip(SkipReason::QuorumBypass))
        );
        assert!(h.cluster.access_info().is_none());
        assert!(h.cluster.bootstrap_material().is_none());
        assert!(!h.cluster.bootstrap_stamp().exists().unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_peer_is_fatal_for_fresh_member() {
        let mut h = harness(MockDriver::new("etcd"), joining);
        h.transport.push(MockResponse::Unavailable);
        h.transport.push(MockResponse::Unavailable);

        let err = h.cluster.bootstrap().await.unwrap_err();

        assert!(matches!(
            err,
            ClusterError::ClientAccess(ref e) if e.is_service_unavailable()
        ));
        assert_eq!(h.cluster.phase(), BootstrapPhase::Failed);
    }

    #[tokio::test]
    async fn test_initialization_check_error_keeps_original_failure() {
        // initialized on the first check (selection), then the bypass check fails
        let mut h = harness(
            MockDriver::new("etcd").initialized(true).init_error_after(1, "io error"),
            joining,
        );
        h.transport.push(MockResponse::Unavailable);
        h.transport.push(MockResponse::Unavailable);

        let err = h.cluster.bootstrap().await.unwrap_err();
        assert!(matches!(
            err,
            ClusterError::ClientAccess(ref e) if e.is_service_unavailable()
        ));
        assert_eq!(h.driver.init_checks(), 2);
    }

    #[tokio::test]
    async fn test_hash_mismatch_is_fatal() {
        let mut h = harness(MockDriver::new("etcd"), |c| {
            c.token = Some("K10abc123::server:pw".to_string());
            c.join_url = Some(JOIN_URL.to_string());
        });
        script_trusted_join(&h.transport);

        let err = h.cluster.bootstrap().await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("abc123"), "{message}");
        assert!(message.contains(&hash_ca(BUNDLE)), "{message}");
        assert_eq!(h.cluster.phase(), BootstrapPhase::Failed);
    }

    #[tokio::test]
    async fn test_join_without_token_fails_before_network() {
        let mut h = harness(MockDriver::new("etcd"), |c| {
            c.cluster_init = true;
            c.join_url = Some(JOIN_URL.to_string());
        });

        let err = h.cluster.bootstrap().await.unwrap_err();

        assert!(matches!(err, ClusterError::MissingToken));
        assert_eq!(err.to_string(), "KEEL_TOKEN is required to join a cluster");
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_runs_once() {
        let mut h = harness(MockDriver::new("etcd"), |c| c.cluster_init = true);
        h.cluster.bootstrap().await.unwrap();

        assert!(matches!(
            h.cluster.bootstrap().await,
            Err(ClusterError::AlreadyBootstrapped(BootstrapPhase::Complete))
        ));
    }

    #[tokio::test]
    async fn test_external_datastore_loads_from_storage() {
        let mut h = harness(MockDriver::new("etcd"), |c| {
            c.datastore_endpoint = "postgres://db:5432/keel".into();
            c.token = Some("opaque-secret".into());
        });
        let material = BootstrapMaterial::from_slice(MATERIAL.as_bytes()).unwrap();
        h.cluster = h
            .cluster
            .with_storage_bootstrap(Arc::new(StaticStorageBootstrap::new(Some(material))));

        h.cluster.bootstrap().await.unwrap();

        assert!(h.cluster.managed_driver().is_none());
        assert_eq!(h.cluster.decision(), Some(BootstrapDecision::StorageLoad));
        assert!(h.cluster.is_joining());
        assert!(!h.cluster.save_bootstrap());
        assert!(h.cluster.bootstrap_material().is_some());
        assert!(h.cluster.bootstrap_stamp().exists().unwrap());
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_storage_requests_save() {
        let mut h = harness(MockDriver::new("etcd"), |c| {
            c.datastore_endpoint = "postgres://db:5432/keel".into();
        });
        h.cluster = h
            .cluster
            .with_storage_bootstrap(Arc::new(StaticStorageBootstrap::new(None)));

        h.cluster.bootstrap().await.unwrap();

        assert!(h.cluster.save_bootstrap());
        assert!(h.cluster.bootstrap_material().is_none());
    }

    #[tokio::test]
    async fn test_start_or_reset() {
        let mut h = harness(MockDriver::new("etcd"), |c| c.cluster_init = true);
        h.cluster.bootstrap().await.unwrap();
        h.cluster.start().await.unwrap();
        assert_eq!(h.driver.lifecycle_calls(), vec!["start"]);

        let mut h = harness(MockDriver::new("etcd"), |c| {
            c.cluster_init = true;
            c.cluster_reset = true;
        });
        h.cluster.bootstrap().await.unwrap();
        h.cluster.start().await.unwrap();
        assert_eq!(h.driver.lifecycle_calls(), vec!["reset"]);
    }

    #[tokio::test]
    async fn test_register_rewrites_foreign_endpoint() {
        let mut h = harness(MockDriver::new("etcd").initialized(true), |c| {
            c.datastore_endpoint = "sqlite:///var/lib/keel/state.db".into();
        });
        h.cluster.bootstrap().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        h.cluster.register(listener, Router::new()).await.unwrap();

        assert_eq!(h.cluster.config().datastore_endpoint, "etcd");
        assert_eq!(h.driver.lifecycle_calls(), vec!["register"]);
    }

    #[tokio::test]
    async fn test_register_passes_through_without_driver() {
        let mut h = harness(MockDriver::new("etcd"), |_| {});
        h.cluster.bootstrap().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (listener, _router) = h.cluster.register(listener, Router::new()).await.unwrap();

        assert_eq!(listener.local_addr().unwrap(), addr);
        assert!(h.driver.lifecycle_calls().is_empty());
    }
}
