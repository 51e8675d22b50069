use std::fmt::Debug;

use async_trait::async_trait;

use common::bootstrap::BootstrapMaterial;

use crate::service_config::Config;

/// Loads bootstrap material directly from the datastore, for servers that
///  do not join through a peer's HTTP endpoint.
///
/// Decrypting the stored payload is the implementation's concern.
#[async_trait]
pub trait StorageBootstrap: Debug + Send + Sync {
    /// `Ok(None)` means the datastore holds no bootstrap data yet, so this
    ///  server is expected to publish its own.
    async fn load(&self, config: &Config) -> anyhow::Result<Option<BootstrapMaterial>>;
}
