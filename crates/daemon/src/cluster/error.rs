use std::io;
use std::path::PathBuf;

use common::bootstrap::BootstrapError;
use common::version::PROGRAM_UPPER;

use super::managed::DriverError;
use super::BootstrapPhase;
use crate::client_access::ClientAccessError;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("bootstrap has already run (phase: {0:?})")]
    AlreadyBootstrapped(BootstrapPhase),
    #[error("managed datastore: {0}")]
    Driver(#[from] DriverError),
    #[error(transparent)]
    ClientAccess(#[from] ClientAccessError),
    #[error("{}_TOKEN is required to join a cluster", PROGRAM_UPPER)]
    MissingToken,
    #[error("bootstrap stamp {path}: {source}")]
    Stamp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("HTTP bootstrap selected without resolved access info")]
    MissingAccessInfo,
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error("storage bootstrap failed: {0}")]
    StorageBootstrap(#[source] anyhow::Error),
}
