//! Trust-on-first-use access to a peer server
//!
//! A joining node knows a server URL and a join token, but not which CA
//! signed the server's certificate. [`ClientAccess::get_ca_certs`] retrieves
//! the bundle in three steps:
//!
//! 1. with the platform roots; success means the server is already trusted
//!    and no bundle is needed
//! 2. with verification disabled, only to download `/cacerts`
//! 3. again, trusting nothing but the downloaded bundle; a bundle that cannot
//!    authenticate the server it came from is rejected
//!
//! When the token pins a CA hash, the bundle must also match it.

mod error;
mod transport;

use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use common::access::AccessInfo;
use common::token::JoinToken;

pub use error::ClientAccessError;
pub use transport::{BasicAuth, HttpTransport, Transport, TrustPolicy};

const CA_CERTS_PATH: &str = "/cacerts";

#[derive(Debug, Clone)]
pub struct ClientAccess {
    transport: Arc<dyn Transport>,
}

impl Default for ClientAccess {
    fn default() -> Self {
        Self::new(Arc::new(HttpTransport::default()))
    }
}

impl ClientAccess {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Parse a token, download and verify the server's CA bundle, and
    ///  check it against the token's CA hash if one is set.
    pub async fn parse_and_validate_token(
        &self,
        server: &str,
        token: &str,
    ) -> Result<AccessInfo, ClientAccessError> {
        let info = AccessInfo::from_token(JoinToken::decode(token)?);
        self.validate(server, info).await
    }

    /// Like [`Self::parse_and_validate_token`], but presents `username`
    ///  regardless of what the token carries.
    pub async fn parse_and_validate_token_for_user(
        &self,
        server: &str,
        token: &str,
        username: &str,
    ) -> Result<AccessInfo, ClientAccessError> {
        let mut info = AccessInfo::from_token(JoinToken::decode(token)?);
        info.username = username.to_string();
        self.validate(server, info).await
    }

    async fn validate(
        &self,
        server: &str,
        mut info: AccessInfo,
    ) -> Result<AccessInfo, ClientAccessError> {
        let url = parse_server(server)?;
        info.ca_certs = self.get_ca_certs(&url).await?;
        info.base_url = url.as_str().trim_end_matches('/').to_string();

        if !info.ca_hash.is_empty() {
            info.validate_ca_hash()
                .map_err(|server_hash| ClientAccessError::CaHashMismatch {
                    token_hash: info.ca_hash.clone(),
                    server_hash,
                })?;
        }

        Ok(info)
    }

    /// Retrieve the CA bundle for a server. Returns an empty bundle when
    ///  the platform roots already trust it.
    pub async fn get_ca_certs(&self, base: &Url) -> Result<Vec<u8>, ClientAccessError> {
        let mut url = base.clone();
        url.set_path(CA_CERTS_PATH);

        // expected to fail unless the server has a publicly trusted cert
        match self.transport.get(&url, &TrustPolicy::System, None).await {
            Ok(_) => {
                tracing::debug!("{} is trusted by the platform roots", url);
                return Ok(Vec::new());
            }
            Err(e) => tracing::debug!("{} not trusted by the platform roots: {}", url, e),
        }

        let ca_certs = match self.transport.get(&url, &TrustPolicy::Insecure, None).await {
            Ok(body) => body.to_vec(),
            Err(ClientAccessError::ServiceUnavailable) => {
                return Err(ClientAccessError::ServiceUnavailable)
            }
            Err(e) => return Err(ClientAccessError::CaCertsFetch(Box::new(e))),
        };

        // the bundle has to be able to authenticate the server it came from
        match self
            .transport
            .get(&url, &TrustPolicy::for_bundle(&ca_certs), None)
            .await
        {
            Ok(_) => {}
            Err(ClientAccessError::ServiceUnavailable) => {
                return Err(ClientAccessError::ServiceUnavailable)
            }
            Err(e) => return Err(ClientAccessError::CaCertValidation(Box::new(e))),
        }

        tracing::debug!(
            bytes = ca_certs.len(),
            "retrieved and verified CA bundle from {}",
            url
        );
        Ok(ca_certs)
    }

    /// GET a path on the server described by `info`, trusting its CA bundle
    ///  and presenting its credentials.
    pub async fn get(&self, path: &str, info: &AccessInfo) -> Result<Bytes, ClientAccessError> {
        let mut url =
            Url::parse(&info.base_url).map_err(|source| ClientAccessError::InvalidUrl {
                url: info.base_url.clone(),
                source,
            })?;
        url.set_path(path);

        let auth = BasicAuth::from_parts(&info.username, &info.password);
        self.transport
            .get(&url, &TrustPolicy::for_bundle(&info.ca_certs), auth.as_ref())
            .await
    }
}

/// Parse a server URL, insisting on https and dropping trailing slashes
pub fn parse_server(server: &str) -> Result<Url, ClientAccessError> {
    let mut url = Url::parse(server).map_err(|source| ClientAccessError::InvalidUrl {
        url: server.to_string(),
        source,
    })?;

    if url.scheme() != "https" {
        return Err(ClientAccessError::UnsupportedScheme(server.to_string()));
    }

    let trimmed = url.path().trim_end_matches('/').to_string();
    url.set_path(&trimmed);
    Ok(url)
}
