use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Certificate, Client, StatusCode};
use url::Url;

use super::error::ClientAccessError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which certificates a request is willing to trust
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPolicy {
    /// The operating system's certificate store
    System,
    /// No verification at all; only ever used to download a CA bundle
    Insecure,
    /// Only the certificates in this PEM bundle
    Bundle(Vec<u8>),
}

impl TrustPolicy {
    /// Trust a specific bundle, or the platform roots when there is none
    pub fn for_bundle(ca_certs: &[u8]) -> Self {
        if ca_certs.is_empty() {
            TrustPolicy::System
        } else {
            TrustPolicy::Bundle(ca_certs.to_vec())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    /// Credentials to present, if any; an empty username sends none
    pub fn from_parts(username: &str, password: &str) -> Option<Self> {
        (!username.is_empty()).then(|| Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// A single GET against a peer server under a given trust policy.
///
/// Implementations must map a 503 to [`ClientAccessError::ServiceUnavailable`]
///  and any other non-200 to [`ClientAccessError::HttpStatus`].
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn get(
        &self,
        url: &Url,
        trust: &TrustPolicy,
        auth: Option<&BasicAuth>,
    ) -> Result<Bytes, ClientAccessError>;
}

/// Production transport. Builds a fresh client for every request so
///  no TLS configuration is shared between trust policies.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl HttpTransport {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Build a client for the given trust policy.
    ///
    /// A bundle that contains no parseable certificate yields a client
    ///  that trusts nothing, so every TLS request through it fails.
    pub fn client(&self, trust: &TrustPolicy) -> Result<Client, ClientAccessError> {
        let builder = Client::builder().timeout(self.timeout);
        let builder = match trust {
            TrustPolicy::System => builder,
            TrustPolicy::Insecure => builder.danger_accept_invalid_certs(true),
            TrustPolicy::Bundle(pem) => {
                let certs = Certificate::from_pem_bundle(pem).unwrap_or_else(|e| {
                    tracing::debug!("CA bundle contains no usable certificates: {}", e);
                    Vec::new()
                });
                certs.into_iter().fold(
                    builder
                        .tls_built_in_root_certs(false)
                        .pool_max_idle_per_host(0),
                    |builder, cert| builder.add_root_certificate(cert),
                )
            }
        };
        Ok(builder.build()?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &Url,
        trust: &TrustPolicy,
        auth: Option<&BasicAuth>,
    ) -> Result<Bytes, ClientAccessError> {
        let client = self.client(trust)?;
        let mut request = client.get(url.clone());
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientAccessError::Connection(error_chain(&e)))?;
        match response.status() {
            StatusCode::OK => Ok(response.bytes().await?),
            StatusCode::SERVICE_UNAVAILABLE => Err(ClientAccessError::ServiceUnavailable),
            status => Err(ClientAccessError::HttpStatus {
                url: url.to_string(),
                status,
            }),
        }
    }
}

/// Render an error with all of its sources; reqwest hides the TLS
///  failure reason behind its top-level message
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
