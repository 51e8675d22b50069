/**
 * Resolved access records for a peer server,
 *  plus the CA and secret fingerprint helpers.
 */
pub mod access;
/**
 * Cluster bootstrap material: the certs and keys
 *  a joining server pulls from a peer, and where
 *  they land on disk.
 */
pub mod bootstrap;
/**
 * The join token codec.
 */
pub mod token;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::access::{hash_ca, key_hash, AccessInfo};
    pub use crate::bootstrap::{BootstrapMaterial, ControlRuntimeBootstrap};
    pub use crate::token::{JoinToken, TokenError, TOKEN_PREFIX};
    pub use crate::version::{build_info, PROGRAM, PROGRAM_UPPER};
}
