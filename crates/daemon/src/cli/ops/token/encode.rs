use std::path::PathBuf;

use clap::Args;

use common::access::AccessInfo;

#[derive(Args, Debug, Clone)]
pub struct Encode {
    /// CA bundle to pin the token to; omit for an unpinned token
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    #[arg(long, default_value = "server")]
    pub username: String,

    #[arg(long)]
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to read {path}: {source}")]
    ReadCa {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Encode {
    type Error = EncodeError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let ca_certs = match &self.ca_file {
            Some(path) => std::fs::read(path).map_err(|source| EncodeError::ReadCa {
                path: path.clone(),
                source,
            })?,
            None => Vec::new(),
        };

        let info = AccessInfo {
            ca_certs,
            username: self.username.clone(),
            password: self.password.clone(),
            ..AccessInfo::default()
        };
        Ok(info.to_token().encode())
    }
}
