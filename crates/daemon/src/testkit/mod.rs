/// Scriptable stand-ins for the network and the datastore
///
/// Lets the join flow run end to end in-process: a [`MockTransport`]
/// replays canned peer responses and records what was asked of it, and a
/// [`MockDriver`] plays a managed datastore with configurable state.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use keel_daemon::client_access::ClientAccess;
/// use keel_daemon::testkit::{MockResponse, MockTransport};
///
/// #[tokio::test]
/// async fn test_join() -> anyhow::Result<()> {
///     let transport = Arc::new(MockTransport::new());
///     // not trusted by the platform, then the bundle twice
///     transport.push(MockResponse::Untrusted);
///     transport.push(MockResponse::body(PEM));
///     transport.push(MockResponse::body(PEM));
///
///     let access = ClientAccess::new(transport.clone());
///     let info = access.parse_and_validate_token(SERVER, "K10::server:pw").await?;
///     assert_eq!(transport.requests().len(), 3);
///     Ok(())
/// }
/// ```
mod driver;
mod storage;
mod transport;

pub use driver::MockDriver;
pub use storage::StaticStorageBootstrap;
pub use transport::{MockResponse, MockTransport, RecordedRequest};
