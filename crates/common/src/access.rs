use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use sha2::{Digest, Sha256};

use crate::token::JoinToken;

/// Number of hex characters of the token digest kept in stamp file names
const KEY_HASH_LEN: usize = 12;

/// Everything a node needs to talk to a peer server: where it is, the CA
/// bundle that authenticates it, and the credentials to present.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessInfo {
    /// Raw PEM bundle; empty when the server is trusted by the platform roots
    #[serde_as(as = "Base64")]
    #[serde(rename = "cacerts", default, skip_serializing_if = "Vec::is_empty")]
    pub ca_certs: Vec<u8>,
    #[serde(rename = "baseurl", default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// CA fingerprint declared by the join token; local only
    #[serde(skip)]
    pub ca_hash: String,
}

impl AccessInfo {
    /// Start an access record from a decoded token; the server half
    ///  is filled in once the CA bundle has been retrieved
    pub fn from_token(token: JoinToken) -> Self {
        Self {
            ca_certs: Vec::new(),
            base_url: String::new(),
            username: token.username,
            password: token.password,
            ca_hash: token.ca_hash,
        }
    }

    /// Build a join token pinned to this record's CA bundle.
    ///  An empty bundle yields an unpinned token.
    pub fn to_token(&self) -> JoinToken {
        let ca_hash = if self.ca_certs.is_empty() {
            String::new()
        } else {
            hash_ca(&self.ca_certs)
        };
        JoinToken::new(ca_hash, self.username.clone(), self.password.clone())
    }

    /// Check the bundle against the hash declared by the token.
    ///
    /// Returns the server-side hash on mismatch so callers can report both.
    pub fn validate_ca_hash(&self) -> Result<(), String> {
        match validate_ca_certs(&self.ca_certs, &self.ca_hash) {
            (true, _) => Ok(()),
            (false, server_hash) => Err(server_hash),
        }
    }
}

/// Hex-encoded SHA-256 of a CA bundle
pub fn hash_ca(ca_certs: &[u8]) -> String {
    hex::encode(Sha256::digest(ca_certs))
}

/// Whether `ca_certs` matches `hash`, along with the bundle's own hash.
///  An empty bundle matches an empty hash.
pub fn validate_ca_certs(ca_certs: &[u8], hash: &str) -> (bool, String) {
    if ca_certs.is_empty() && hash.is_empty() {
        return (true, String::new());
    }
    let server_hash = hash_ca(ca_certs);
    (hash == server_hash, server_hash)
}

/// Short fingerprint of a raw secret, used to name on-disk markers
///  without leaking the secret itself.
pub fn key_hash(passphrase: &str) -> String {
    let mut digest = hash_ca(passphrase.as_bytes());
    digest.truncate(KEY_HASH_LEN);
    digest
}

#[cfg(test)]
mod test {
    use super::*;

    // sha256("")
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_hash_ca() {
        assert_eq!(hash_ca(b""), EMPTY_SHA256);
        assert_eq!(
            hash_ca(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_key_hash_is_short_prefix() {
        assert_eq!(key_hash(""), &EMPTY_SHA256[..12]);
        assert_ne!(key_hash("K10::server:pw"), key_hash("K10::server:pw "));
    }

    #[test]
    fn test_validate_ca_certs() {
        assert_eq!(validate_ca_certs(b"", ""), (true, String::new()));
        assert!(validate_ca_certs(b"abc", &hash_ca(b"abc")).0);

        let (ok, server_hash) = validate_ca_certs(b"abc", "def456");
        assert!(!ok);
        assert_eq!(server_hash, hash_ca(b"abc"));

        // a declared hash never matches a missing bundle
        let (ok, server_hash) = validate_ca_certs(b"", "abc123");
        assert!(!ok);
        assert_eq!(server_hash, EMPTY_SHA256);
    }

    #[test]
    fn test_to_token_pins_bundle() {
        let info = AccessInfo {
            ca_certs: b"-----BEGIN CERTIFICATE-----".to_vec(),
            username: "server".into(),
            password: "pw".into(),
            ..Default::default()
        };
        let token = info.to_token();
        assert_eq!(token.ca_hash, hash_ca(&info.ca_certs));

        let unpinned = AccessInfo {
            ca_certs: Vec::new(),
            ..info
        };
        assert!(!unpinned.to_token().is_pinned());
    }

    #[test]
    fn test_serialized_form_omits_empty_and_local_fields() {
        let info = AccessInfo {
            base_url: "https://10.0.0.1:6443".into(),
            password: "pw".into(),
            ca_hash: "abc123".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"baseurl": "https://10.0.0.1:6443", "password": "pw"})
        );

        let back: AccessInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back.ca_hash, "");
        assert_eq!(back.base_url, info.base_url);
    }
}
