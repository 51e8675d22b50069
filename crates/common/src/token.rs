//! Join token codec
//!
//! A join token is the secret an operator hands to a new node. Tagged tokens
//! have the form
//!
//! ```text
//! K10<ca-hash>::<username>:<password>
//! ```
//!
//! where `<ca-hash>` is the optional hex SHA-256 of the cluster CA bundle.
//! Anything that does not begin with the tag is an opaque shared secret and
//! decodes to a token holding only a password.

use std::fmt;
use std::str::FromStr;

/// Marker every structured token starts with
pub const TOKEN_PREFIX: &str = "K10";

const HASH_SEPARATOR: &str = "::";
const CREDENTIAL_SEPARATOR: char = ':';

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The tag was present but no `username:password` pair followed it
    #[error("invalid token format")]
    Format,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinToken {
    /// Declared fingerprint of the cluster CA bundle, empty when unpinned
    pub ca_hash: String,
    pub username: String,
    pub password: String,
}

impl JoinToken {
    pub fn new(
        ca_hash: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            ca_hash: ca_hash.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Decode a raw token string.
    ///
    /// Never fails for untagged input. A tagged token fails only when the
    /// remainder (after the optional hash segment) has no `:` at all.
    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let Some(body) = raw.strip_prefix(TOKEN_PREFIX) else {
            return Ok(Self {
                ca_hash: String::new(),
                username: String::new(),
                password: raw.to_string(),
            });
        };

        // first `::` separates the hash, first `:` after it separates the
        //  credentials; the password keeps everything that follows
        let (ca_hash, credentials) = body.split_once(HASH_SEPARATOR).unwrap_or(("", body));
        let (username, password) = credentials
            .split_once(CREDENTIAL_SEPARATOR)
            .ok_or(TokenError::Format)?;

        Ok(Self::new(ca_hash, username, password))
    }

    /// Encode the token into its tagged wire form
    pub fn encode(&self) -> String {
        format!(
            "{}{}{}{}{}{}",
            TOKEN_PREFIX,
            self.ca_hash,
            HASH_SEPARATOR,
            self.username,
            CREDENTIAL_SEPARATOR,
            self.password
        )
    }

    /// Whether the token pins the expected CA bundle
    pub fn is_pinned(&self) -> bool {
        !self.ca_hash.is_empty()
    }
}

impl FromStr for JoinToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Display for JoinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Extract the username and password from a raw token, if it parses.
pub fn credentials(raw: &str) -> Option<(String, String)> {
    JoinToken::decode(raw)
        .ok()
        .map(|token| (token.username, token.password))
}
