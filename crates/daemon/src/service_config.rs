use std::path::PathBuf;

/// Everything the cluster layer needs to decide how this server joins.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of all persisted state; the bootstrap stamp
    ///  lives under `{data_dir}/db`
    pub data_dir: PathBuf,

    // join configuration
    /// raw join token exactly as the operator supplied it,
    ///  if not set then this server cannot join an existing cluster
    pub token: Option<String>,
    /// https URL of an existing server to join,
    ///  if not set then this server founds its own cluster
    pub join_url: Option<String>,

    // datastore configuration
    /// `{scheme}://...` endpoint of the datastore, empty when
    ///  no datastore has been configured
    pub datastore_endpoint: String,
    /// initialize a new cluster using the default managed driver
    pub cluster_init: bool,
    /// rebuild the managed datastore instead of starting it
    pub cluster_reset: bool,

    // logging
    pub log_level: tracing::Level,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            token: None,
            join_url: None,
            datastore_endpoint: String::new(),
            cluster_init: false,
            cluster_reset: false,
            log_level: tracing::Level::INFO,
        }
    }

    /// The configured token, treating an empty string as unset
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// The configured join URL, treating an empty string as unset
    pub fn join_url(&self) -> Option<&str> {
        self.join_url.as_deref().filter(|u| !u.is_empty())
    }

    /// Text before the first `:` of the datastore endpoint
    pub fn endpoint_scheme(&self) -> &str {
        self.datastore_endpoint
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .unwrap_or(&self.datastore_endpoint)
    }
}
