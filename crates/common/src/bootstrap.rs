//! Cluster bootstrap material
//!
//! The set of cluster-wide certificates and keys a new server needs before
//! it can participate. Peers serve it as a JSON object keyed by well-known
//! names; each entry carries its last modification time and base64 content.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to decode bootstrap data: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to read bootstrap data: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapFile {
    pub timestamp: DateTime<Utc>,
    #[serde_as(as = "Base64")]
    pub content: Vec<u8>,
}

/// Decoded bootstrap payload, keyed by file name (e.g. `ServerCA`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BootstrapMaterial {
    pub files: BTreeMap<String, BootstrapFile>,
}

impl BootstrapMaterial {
    /// Decode material from a reader holding the JSON wire form
    pub fn read<R: Read>(mut reader: R) -> Result<Self, BootstrapError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).map_err(BootstrapError::Read)?;
        Ok(serde_json::from_slice(&buf)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, BootstrapError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, BootstrapError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn get(&self, name: &str) -> Option<&BootstrapFile> {
        self.files.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write every entry we have a destination for into place.
    ///
    /// Entries with no matching runtime path are skipped. Returns the
    ///  number of files written.
    pub fn apply(&self, runtime: &ControlRuntimeBootstrap) -> Result<usize, BootstrapError> {
        let mut written = 0;
        for (name, file) in &self.files {
            let Some(path) = runtime.path_for(name) else {
                tracing::debug!(name = %name, "no destination for bootstrap file, skipping");
                continue;
            };
            write_private(path, &file.content)?;
            written += 1;
        }
        Ok(written)
    }
}

/// Local destinations for each piece of bootstrap material
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlRuntimeBootstrap {
    pub server_ca: PathBuf,
    pub server_ca_key: PathBuf,
    pub client_ca: PathBuf,
    pub client_ca_key: PathBuf,
    pub request_header_ca: PathBuf,
    pub request_header_ca_key: PathBuf,
    pub service_key: PathBuf,
    pub passwd_file: PathBuf,
    pub ipsec_key: PathBuf,
    pub etcd_peer_ca: PathBuf,
    pub etcd_peer_ca_key: PathBuf,
    pub etcd_server_ca: PathBuf,
    pub etcd_server_ca_key: PathBuf,
}

impl ControlRuntimeBootstrap {
    /// Standard layout under `{data_dir}/tls` and `{data_dir}/cred`
    pub fn under(data_dir: &Path) -> Self {
        let tls = data_dir.join("tls");
        let cred = data_dir.join("cred");
        Self {
            server_ca: tls.join("server-ca.crt"),
            server_ca_key: tls.join("server-ca.key"),
            client_ca: tls.join("client-ca.crt"),
            client_ca_key: tls.join("client-ca.key"),
            request_header_ca: tls.join("request-header-ca.crt"),
            request_header_ca_key: tls.join("request-header-ca.key"),
            service_key: tls.join("service.key"),
            passwd_file: cred.join("passwd"),
            ipsec_key: cred.join("ipsec.psk"),
            etcd_peer_ca: tls.join("etcd/peer-ca.crt"),
            etcd_peer_ca_key: tls.join("etcd/peer-ca.key"),
            etcd_server_ca: tls.join("etcd/server-ca.crt"),
            etcd_server_ca_key: tls.join("etcd/server-ca.key"),
        }
    }

    pub fn path_for(&self, name: &str) -> Option<&Path> {
        let path = match name {
            "ServerCA" => &self.server_ca,
            "ServerCAKey" => &self.server_ca_key,
            "ClientCA" => &self.client_ca,
            "ClientCAKey" => &self.client_ca_key,
            "RequestHeaderCA" => &self.request_header_ca,
            "RequestHeaderCAKey" => &self.request_header_ca_key,
            "ServiceKey" => &self.service_key,
            "PasswdFile" => &self.passwd_file,
            "IPSECKey" => &self.ipsec_key,
            "ETCDPeerCA" => &self.etcd_peer_ca,
            "ETCDPeerCAKey" => &self.etcd_peer_ca_key,
            "ETCDServerCA" => &self.etcd_server_ca,
            "ETCDServerCAKey" => &self.etcd_server_ca_key,
            _ => return None,
        };
        // an unset destination is treated like an unknown key
        (!path.as_os_str().is_empty()).then_some(path.as_path())
    }
}

fn write_private(path: &Path, content: &[u8]) -> Result<(), BootstrapError> {
    let wrap = |source| BootstrapError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(wrap)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(wrap)?;
    file.write_all(content).map_err(wrap)
}
