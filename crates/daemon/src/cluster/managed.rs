//! Managed datastore drivers
//!
//! A managed driver is a clustered datastore whose lifecycle this process
//! controls (initialize, join, reset), as opposed to an external datastore
//! it only connects to. Drivers are registered explicitly at startup into a
//! [`DriverRegistry`] and at most one is selected per process.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

use common::access::AccessInfo;

use crate::service_config::Config;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("driver error: {0}")]
    Default(#[from] anyhow::Error),
}

#[async_trait]
pub trait ManagedDriver: Debug + Send + Sync {
    /// Stable identifier, used both as the datastore endpoint scheme
    ///  and as a label in logs
    fn name(&self) -> &str;

    /// Whether this driver already has durable state on disk
    async fn is_initialized(&self, config: &Config) -> Result<bool, DriverError>;

    /// Cheap liveness probe
    async fn test(&self, info: Option<&AccessInfo>) -> Result<(), DriverError>;

    async fn start(&self, info: Option<&AccessInfo>) -> Result<(), DriverError>;

    /// Rebuild the datastore from local state. Destructive.
    async fn reset(&self, info: Option<&AccessInfo>) -> Result<(), DriverError>;

    /// Hook into the serving stack, returning the listener and router
    ///  the server should actually use.
    async fn register(
        &self,
        config: &Config,
        listener: TcpListener,
        router: Router,
    ) -> Result<(TcpListener, Router), DriverError>;
}

/// Read-only view of a registered driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDriverDescriptor {
    pub name: String,
    pub is_default: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a managed driver named {0} is already registered")]
    Duplicate(String),
    #[error("cannot make {new} the default driver, {existing} already is")]
    MultipleDefaults { existing: String, new: String },
}

/// Ordered set of drivers available to this process.
///  Order matters: selection checks drivers in registration order.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: Vec<Arc<dyn ManagedDriver>>,
    default: Option<String>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        driver: Arc<dyn ManagedDriver>,
        is_default: bool,
    ) -> Result<(), RegistryError> {
        let name = driver.name().to_string();
        if self.get(&name).is_some() {
            return Err(RegistryError::Duplicate(name));
        }
        if is_default {
            if let Some(existing) = &self.default {
                return Err(RegistryError::MultipleDefaults {
                    existing: existing.clone(),
                    new: name,
                });
            }
            self.default = Some(name);
        }
        self.drivers.push(driver);
        Ok(())
    }

    pub fn drivers(&self) -> impl Iterator<Item = &Arc<dyn ManagedDriver>> {
        self.drivers.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ManagedDriver>> {
        self.drivers.iter().find(|d| d.name() == name)
    }

    pub fn default_driver(&self) -> Option<&Arc<dyn ManagedDriver>> {
        self.default.as_deref().and_then(|name| self.get(name))
    }

    pub fn descriptors(&self) -> Vec<ManagedDriverDescriptor> {
        self.drivers
            .iter()
            .map(|d| ManagedDriverDescriptor {
                name: d.name().to_string(),
                is_default: self.default.as_deref() == Some(d.name()),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

/// Why a driver was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// It already has state on disk
    Initialized,
    /// Its name matches the configured datastore endpoint scheme
    Endpoint,
    /// Nothing configured and this node is creating or joining a cluster
    Default,
}

#[derive(Debug, Clone)]
pub struct DriverSelection {
    pub driver: Arc<dyn ManagedDriver>,
    pub reason: SelectionReason,
}

/// Pick the managed driver this process should run, if any.
///
/// First match wins:
/// 1. a driver that reports it is already initialized
/// 2. a driver whose name is the datastore endpoint's scheme
/// 3. the default driver, when no endpoint is configured and either
///    `cluster_init` is set or both a token and a join URL are
///
/// `None` means the externally configured datastore is used.
pub async fn select_driver(
    registry: &DriverRegistry,
    config: &Config,
) -> Result<Option<DriverSelection>, DriverError> {
    for driver in registry.drivers() {
        if driver.is_initialized(config).await? {
            return Ok(Some(DriverSelection {
                driver: driver.clone(),
                reason: SelectionReason::Initialized,
            }));
        }
    }

    let scheme = config.endpoint_scheme();
    if let Some(driver) = registry.drivers().find(|d| d.name() == scheme) {
        return Ok(Some(DriverSelection {
            driver: driver.clone(),
            reason: SelectionReason::Endpoint,
        }));
    }

    let joining = config.token().is_some() && config.join_url().is_some();
    if config.datastore_endpoint.is_empty() && (config.cluster_init || joining) {
        if let Some(driver) = registry.default_driver() {
            return Ok(Some(DriverSelection {
                driver: driver.clone(),
                reason: SelectionReason::Default,
            }));
        }
    }

    Ok(None)
}
