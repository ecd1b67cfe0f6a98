//! Build-time metadata embedded by the build script.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("PACKGATE_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("PACKGATE_BUILD_TIMESTAMP");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("PACKGATE_BUILD_PROFILE");

/// The target triple the binary was compiled for.
pub const BUILD_TARGET: &str = env!("PACKGATE_BUILD_TARGET");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Serializable snapshot of the build metadata, as reported by health checks.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_sha: &'static str,
    pub profile: &'static str,
    pub target: &'static str,
    /// Build time in RFC 3339, if the embedded timestamp parses.
    pub built_at: Option<String>,
}

impl BuildInfo {
    pub fn current() -> Self {
        let built_at = BUILD_TIMESTAMP
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|dt| dt.to_rfc3339());
        Self {
            version: VERSION,
            build_sha: GIT_HASH,
            profile: BUILD_PROFILE,
            target: BUILD_TARGET,
            built_at,
        }
    }
}

/// Return a formatted version string including git hash and profile.
///
/// Example: `"0.1.0 (abc1234, debug)"`
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_contains_version() {
        let v = version_string();
        assert!(v.starts_with(VERSION));
        assert!(v.contains(GIT_HASH));
    }

    #[test]
    fn test_build_info_snapshot() {
        let info = BuildInfo::current();
        assert_eq!(info.version, VERSION);
        assert!(!info.build_sha.is_empty());
        assert!(info.built_at.is_some());

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("build_sha").is_some());
    }
}
