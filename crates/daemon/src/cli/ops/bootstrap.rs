use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use keel_daemon::cluster::DriverRegistry;
use keel_daemon::process::{spawn_bootstrap, ProcessError};
use keel_daemon::state::StateError;
use keel_daemon::ServiceConfig;

#[derive(Args, Debug, Clone)]
pub struct Bootstrap {
    /// Join token (default from config)
    #[arg(long, env = "KEEL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// URL of the server to join (default from config)
    #[arg(long = "server", env = "KEEL_URL")]
    pub join_url: Option<String>,

    /// Override the cluster state directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Override the datastore endpoint
    #[arg(long)]
    pub datastore_endpoint: Option<String>,

    /// Initialize a new cluster with the default managed datastore
    #[arg(long)]
    pub cluster_init: bool,

    /// Rebuild the managed datastore from local state instead of starting it
    #[arg(long)]
    pub cluster_reset: bool,

    /// Override the log level
    #[arg(long)]
    pub log_level: Option<tracing::Level>,
}

impl Bootstrap {
    /// Flags and environment win over config.toml. Boolean flags can
    ///  only switch a setting on.
    fn apply_overrides(&self, config: &mut ServiceConfig) {
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(join_url) = &self.join_url {
            config.join_url = Some(join_url.clone());
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(endpoint) = &self.datastore_endpoint {
            config.datastore_endpoint = endpoint.clone();
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.cluster_init |= self.cluster_init;
        config.cluster_reset |= self.cluster_reset;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    #[error("bootstrap failed: {0}")]
    Failed(#[from] ProcessError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Bootstrap {
    type Error = BootstrapError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let mut config = state.service_config()?;

        self.apply_overrides(&mut config);

        // No managed datastore engines ship with the operator binary;
        //  embedders register theirs through `DriverRegistry`.
        let registry = Arc::new(DriverRegistry::new());
        let report = spawn_bootstrap(&config, registry, None).await?;
        Ok(report.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_flags() -> Bootstrap {
        Bootstrap {
            token: None,
            join_url: None,
            data_dir: None,
            datastore_endpoint: None,
            cluster_init: false,
            cluster_reset: false,
            log_level: None,
        }
    }

    #[test]
    fn test_config_flags_survive_without_cli_flags() {
        let mut config = ServiceConfig::new("/var/lib/keel");
        config.cluster_init = true;
        config.cluster_reset = true;
        config.token = Some("K10::server:pw".into());

        no_flags().apply_overrides(&mut config);

        assert!(config.cluster_init);
        assert!(config.cluster_reset);
        assert_eq!(config.token(), Some("K10::server:pw"));
    }

    #[test]
    fn test_cli_flags_win() {
        let mut config = ServiceConfig::new("/var/lib/keel");
        config.datastore_endpoint = "etcd://".into();

        let flags = Bootstrap {
            join_url: Some("https://10.0.0.1:6443".into()),
            datastore_endpoint: Some("postgres://db".into()),
            cluster_reset: true,
            log_level: Some(tracing::Level::DEBUG),
            ..no_flags()
        };
        flags.apply_overrides(&mut config);

        assert_eq!(config.join_url(), Some("https://10.0.0.1:6443"));
        assert_eq!(config.datastore_endpoint, "postgres://db");
        assert!(config.cluster_reset);
        assert!(!config.cluster_init);
        assert_eq!(config.log_level, tracing::Level::DEBUG);
    }
}
