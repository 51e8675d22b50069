use std::path::PathBuf;

use clap::Args;

use common::access::hash_ca;
use keel_daemon::client_access::{parse_server, ClientAccess, ClientAccessError};

#[derive(Args, Debug, Clone)]
pub struct Cacerts {
    /// https URL of the server whose CA bundle to retrieve
    pub url: String,

    /// Join token to check the bundle against
    #[arg(long, env = "KEEL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Write the retrieved bundle to this file
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CacertsError {
    #[error(transparent)]
    ClientAccess(#[from] ClientAccessError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cacerts {
    type Error = CacertsError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let access = ClientAccess::default();

        let (ca_certs, pinned) = match &self.token {
            Some(token) => {
                let info = access.parse_and_validate_token(&self.url, token).await?;
                let pinned = !info.ca_hash.is_empty();
                (info.ca_certs, pinned)
            }
            None => {
                let url = parse_server(&self.url)?;
                (access.get_ca_certs(&url).await?, false)
            }
        };

        let mut lines = vec![format!("server: {}", self.url)];
        if ca_certs.is_empty() {
            lines.push("bundle: none needed (trusted by platform roots)".to_string());
        } else {
            lines.push(format!("bundle: {} bytes", ca_certs.len()));
            lines.push(format!("hash:   {}", hash_ca(&ca_certs)));
        }
        if self.token.is_some() {
            lines.push(format!(
                "token:  {}",
                if pinned { "CA hash verified" } else { "not pinned" }
            ));
        }

        if let Some(path) = &self.out {
            std::fs::write(path, &ca_certs).map_err(|source| CacertsError::Write {
                path: path.clone(),
                source,
            })?;
            lines.push(format!("written to {}", path.display()));
        }

        Ok(lines.join("\n"))
    }
}
