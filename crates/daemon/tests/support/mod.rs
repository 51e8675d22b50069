#![allow(dead_code)]

pub mod tls;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use keel_daemon::client_access::ClientAccess;
use keel_daemon::cluster::{Cluster, DriverRegistry};
use keel_daemon::testkit::{MockDriver, MockTransport};
use keel_daemon::ServiceConfig;

pub const BUNDLE: &[u8] = b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
pub const JOIN_URL: &str = "https://10.0.0.1:6443";

/// "server:pw"
pub const SERVER_AUTH: &str = "Basic c2VydmVyOnB3";

pub const MATERIAL: &str = r#"{
    "ServerCA": {"timestamp": "2024-01-02T03:04:05Z", "content": "c2VydmVyLWNhLXBlbQ=="},
    "ETCDPeerCAKey": {"timestamp": "2024-01-02T03:04:05Z", "content": "cGVlci1rZXk="}
}"#;

/// A plain-HTTP stand-in for a peer server
pub async fn spawn_peer() -> SocketAddr {
    let router = Router::new()
        .route("/cacerts", get(|| async { BUNDLE }))
        .route(
            "/unavailable",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        )
        .route("/v1-keel/server-bootstrap", get(server_bootstrap));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn server_bootstrap(headers: HeaderMap) -> (StatusCode, &'static str) {
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value == SERVER_AUTH => (StatusCode::OK, MATERIAL),
        _ => (StatusCode::UNAUTHORIZED, ""),
    }
}

pub struct TestCluster {
    pub cluster: Cluster,
    pub transport: Arc<MockTransport>,
    pub driver: Arc<MockDriver>,
}

/// Build a cluster over `data_dir` with one default driver and a scripted transport
pub fn cluster(
    data_dir: &std::path::Path,
    driver: MockDriver,
    configure: impl FnOnce(&mut ServiceConfig),
) -> TestCluster {
    let mut config = ServiceConfig::new(data_dir);
    configure(&mut config);

    let driver = Arc::new(driver);
    let mut registry = DriverRegistry::new();
    registry.register(driver.clone(), true).unwrap();

    let transport = Arc::new(MockTransport::new());
    let cluster = Cluster::new(config, Arc::new(registry))
        .with_client_access(ClientAccess::new(transport.clone()));

    TestCluster {
        cluster,
        transport,
        driver,
    }
}
