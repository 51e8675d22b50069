use std::fmt;

use serde::Serialize;

/// Lowercase program name, used in endpoint paths such as `/v1-keel/...`
pub const PROGRAM: &str = "keel";
/// Uppercase program name, used as the environment variable prefix
pub const PROGRAM_UPPER: &str = "KEEL";

/// Version information captured by `build.rs` at compile time
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_timestamp: &'static str,
    pub version: &'static str,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} build, {})",
            PROGRAM, self.version, self.build_profile, self.build_timestamp
        )
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        build_profile: env!("BUILD_PROFILE"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        version: env!("REPO_VERSION"),
    }
}
