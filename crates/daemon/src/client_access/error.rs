use reqwest::StatusCode;

use common::token::TokenError;

#[derive(Debug, thiserror::Error)]
pub enum ClientAccessError {
    #[error("invalid server url, failed to parse: {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("only https:// URLs are supported, invalid scheme: {0}")]
    UnsupportedScheme(String),
    /// The server answered 503; it is up but cannot serve yet
    #[error("service unavailable")]
    ServiceUnavailable,
    /// The request never produced a response (refused, timed out,
    ///  TLS handshake rejected)
    #[error("{0}")]
    Connection(String),
    #[error("{url}: {status}")]
    HttpStatus { url: String, status: StatusCode },
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("failed to get CA certs: {0}")]
    CaCertsFetch(#[source] Box<ClientAccessError>),
    #[error("CA cert validation failed: {0}")]
    CaCertValidation(#[source] Box<ClientAccessError>),
    #[error("token CA hash does not match the server CA hash: {token_hash} != {server_hash}")]
    CaHashMismatch {
        token_hash: String,
        server_hash: String,
    },
}

impl ClientAccessError {
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, ClientAccessError::ServiceUnavailable)
    }
}
