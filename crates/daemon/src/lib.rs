// Cluster join and bootstrap
pub mod client_access;
pub mod cluster;
pub mod process;
pub mod service_config;

// App state (configuration, paths)
pub mod state;

// Scriptable collaborators for tests and embedders
pub mod testkit;

pub use cluster::{Cluster, ClusterError, DriverRegistry, ManagedDriver};
pub use process::{run_cluster, spawn_bootstrap, BootstrapReport};
pub use service_config::Config as ServiceConfig;
pub use state::{AppConfig, AppState, StateError};
