use std::path::PathBuf;

use clap::Args;

use keel_daemon::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Directory for cluster state (default: <config dir>/data)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// URL of an existing server to join
    #[arg(long)]
    pub join_url: Option<String>,

    /// Datastore endpoint, e.g. etcd:// or postgres://host/db
    #[arg(long, default_value = "")]
    pub datastore_endpoint: String,

    /// Initialize a new cluster with the default managed datastore
    #[arg(long)]
    pub cluster_init: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] keel_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            data_dir: self.data_dir.clone(),
            join_url: self.join_url.clone(),
            datastore_endpoint: self.datastore_endpoint.clone(),
            cluster_init: self.cluster_init,
            ..AppConfig::default()
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized keel directory at: {}\n\
             - Config: {}\n\
             - Data: {}\n\
             - Join URL: {}\n\
             - Datastore endpoint: {}",
            state.keel_dir.display(),
            state.config_path.display(),
            state.data_dir().display(),
            state.config.join_url.as_deref().unwrap_or("none (new cluster)"),
            if state.config.datastore_endpoint.is_empty() {
                "default"
            } else {
                state.config.datastore_endpoint.as_str()
            },
        );

        Ok(output)
    }
}
