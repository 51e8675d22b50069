use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use common::version::PROGRAM;

use crate::service_config::Config;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DATA_DIR_NAME: &str = "data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where cluster state lives (defaults to `<keel dir>/data`)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// URL of an existing server to join
    #[serde(default)]
    pub join_url: Option<String>,
    /// Join token; prefer the environment over writing it here
    #[serde(default)]
    pub token: Option<String>,
    /// Datastore endpoint, `{scheme}://...`
    #[serde(default)]
    pub datastore_endpoint: String,
    #[serde(default)]
    pub cluster_init: bool,
    #[serde(default)]
    pub cluster_reset: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            join_url: None,
            token: None,
            datastore_endpoint: String::new(),
            cluster_init: false,
            cluster_reset: false,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the keel directory (~/.keel)
    pub keel_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the keel directory path (custom or default ~/.keel)
    pub fn keel_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", PROGRAM)))
    }

    /// Initialize a new keel directory with a config file
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let keel_dir = Self::keel_dir(custom_path)?;
        let config_path = keel_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&keel_dir)?;

        let config = config.unwrap_or_default();
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            keel_dir,
            config_path,
            config,
        })
    }

    /// Load existing state, falling back to defaults when no config
    ///  file has been written yet
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let keel_dir = Self::keel_dir(custom_path)?;
        let config_path = keel_dir.join(CONFIG_FILE_NAME);

        let config = match fs::read_to_string(&config_path) {
            Ok(config_toml) => toml::from_str(&config_toml)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            keel_dir,
            config_path,
            config,
        })
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config
            .data_dir
            .clone()
            .unwrap_or_else(|| self.keel_dir.join(DATA_DIR_NAME))
    }

    /// Cluster configuration as described by the config file alone
    pub fn service_config(&self) -> Result<Config, StateError> {
        let log_level = self
            .config
            .log_level
            .parse()
            .map_err(|_| StateError::InvalidLogLevel(self.config.log_level.clone()))?;

        let mut config = Config::new(self.data_dir());
        config.token = self.config.token.clone();
        config.join_url = self.config.join_url.clone();
        config.datastore_endpoint = self.config.datastore_endpoint.clone();
        config.cluster_init = self.config.cluster_init;
        config.cluster_reset = self.config.cluster_reset;
        config.log_level = log_level;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("keel directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
