use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use url::Url;

use crate::client_access::{BasicAuth, ClientAccessError, Transport, TrustPolicy};

/// One canned answer from the peer
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// 200 with this body
    Body(Bytes),
    /// TLS verification failed under the requested trust policy
    Untrusted,
    /// 503
    Unavailable,
    /// Any other status code
    Status(u16),
}

impl MockResponse {
    pub fn body(content: impl AsRef<[u8]>) -> Self {
        MockResponse::Body(Bytes::copy_from_slice(content.as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub trust: TrustPolicy,
    pub auth: Option<BasicAuth>,
}

/// Replays responses in the order they were pushed. Once the script runs
///  out every request fails as a connection error.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: MockResponse) {
        self.responses
            .lock()
            .expect("mock transport lock poisoned")
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .expect("mock transport lock poisoned")
            .clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn policies(&self) -> Vec<TrustPolicy> {
        self.requests().into_iter().map(|r| r.trust).collect()
    }

    pub fn auths(&self) -> Vec<Option<BasicAuth>> {
        self.requests().into_iter().map(|r| r.auth).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(
        &self,
        url: &Url,
        trust: &TrustPolicy,
        auth: Option<&BasicAuth>,
    ) -> Result<Bytes, ClientAccessError> {
        self.requests
            .lock()
            .expect("mock transport lock poisoned")
            .push(RecordedRequest {
                url: url.to_string(),
                trust: trust.clone(),
                auth: auth.cloned(),
            });

        let next = self
            .responses
            .lock()
            .expect("mock transport lock poisoned")
            .pop_front();

        match next {
            Some(MockResponse::Body(body)) => Ok(body),
            Some(MockResponse::Untrusted) => Err(ClientAccessError::Connection(
                "invalid peer certificate: UnknownIssuer".into(),
            )),
            Some(MockResponse::Unavailable) => Err(ClientAccessError::ServiceUnavailable),
            Some(MockResponse::Status(code)) => Err(ClientAccessError::HttpStatus {
                url: url.to_string(),
                status: StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            }),
            None => Err(ClientAccessError::Connection("no scripted response".into())),
        }
    }
}
