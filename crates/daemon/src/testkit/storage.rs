use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use common::bootstrap::BootstrapMaterial;

use crate::cluster::StorageBootstrap;
use crate::service_config::Config;

/// Storage that always holds the same material, or nothing
#[derive(Debug)]
pub struct StaticStorageBootstrap {
    material: Option<BootstrapMaterial>,
    loads: AtomicUsize,
}

impl StaticStorageBootstrap {
    pub fn new(material: Option<BootstrapMaterial>) -> Self {
        Self {
            material,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBootstrap for StaticStorageBootstrap {
    async fn load(&self, _config: &Config) -> anyhow::Result<Option<BootstrapMaterial>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.material.clone())
    }
}
