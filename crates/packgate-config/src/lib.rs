#![deny(unsafe_code)]

//! Configuration loading, validation, and policy engine for Packgate.
//!
//! Loads TOML configuration files and validates them against expected schemas.
//! Provides the [`AppConfig`] type as the central process configuration, and
//! the [`policy`] module for deny patterns, role grants and redaction rules.

/// Deny patterns, role-based grants and redaction rules.
pub mod policy;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use policy::{PolicyEngine, PolicyLoadError, RedactionPolicy, RoleRule};

/// Environment variable overriding the retrieval backend.
pub const ENV_RETRIEVAL_BACKEND: &str = "PACKGATE_RETRIEVAL_BACKEND";
/// Environment variable overriding the document data directory.
pub const ENV_DATA_DIR: &str = "PACKGATE_DATA_DIR";
/// Environment variable overriding the policy file path.
pub const ENV_POLICY_PATH: &str = "PACKGATE_POLICY_PATH";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level process configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the access policy lives.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Document storage.
    #[serde(default)]
    pub data: DataConfig,

    /// Document index and embedding settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Audit trail sink.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Policy file location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_policy_path")]
    pub path: PathBuf,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            path: default_policy_path(),
        }
    }
}

fn default_policy_path() -> PathBuf {
    PathBuf::from("config/policy.toml")
}

/// Document storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root directory laid out as `<data_dir>/<org>/<pack>/...`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size_chars: usize,

    /// Characters shared between consecutive chunks of a section.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap_chars: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            chunk_size_chars: default_chunk_size(),
            chunk_overlap_chars: default_chunk_overlap(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_chunk_size() -> usize {
    4200
}

fn default_chunk_overlap() -> usize {
    700
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Index mode: "hybrid" (vector + lexical) or "vector".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Weight of the vector score in hybrid mode (0.0–1.0).
    #[serde(default = "default_alpha")]
    pub alpha: f32,

    /// Number of hits reported in response metadata.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Embedder: "hash" or "term_hash".
    #[serde(default = "default_embedder")]
    pub embedder: String,

    /// Embedding dimensionality.
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            alpha: default_alpha(),
            top_k: default_top_k(),
            embedder: default_embedder(),
            embedding_dim: default_embedding_dim(),
        }
    }
}

fn default_backend() -> String {
    "hybrid".to_string()
}

fn default_alpha() -> f32 {
    0.75
}

fn default_top_k() -> usize {
    5
}

fn default_embedder() -> String {
    "hash".to_string()
}

fn default_embedding_dim() -> usize {
    256
}

/// Audit sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// "memory" (queryable by trace id) or "file" (append-only JSON lines).
    #[serde(default = "default_audit_sink")]
    pub sink: String,

    /// Output path when `sink = "file"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: default_audit_sink(),
            path: None,
        }
    }
}

fn default_audit_sink() -> String {
    "memory".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PACKGATE_*` environment overrides, then re-validate.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup(ENV_RETRIEVAL_BACKEND) {
            self.retrieval.backend = backend.trim().to_lowercase();
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_POLICY_PATH) {
            self.policy.path = PathBuf::from(path);
        }
        self.validate()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_backends = ["hybrid", "vector"];
        if !valid_backends.contains(&self.retrieval.backend.as_str()) {
            return Err(ConfigError::Validation(format!(
                "retrieval.backend must be one of {:?}, got {:?}",
                valid_backends, self.retrieval.backend
            )));
        }
        if !(0.0..=1.0).contains(&self.retrieval.alpha) {
            return Err(ConfigError::Validation(format!(
                "retrieval.alpha must be in [0.0, 1.0], got {}",
                self.retrieval.alpha
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Validation(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        let valid_embedders = ["hash", "term_hash"];
        if !valid_embedders.contains(&self.retrieval.embedder.as_str()) {
            return Err(ConfigError::Validation(format!(
                "retrieval.embedder must be one of {:?}, got {:?}",
                valid_embedders, self.retrieval.embedder
            )));
        }
        if self.retrieval.embedding_dim == 0 {
            return Err(ConfigError::Validation(
                "retrieval.embedding_dim must be non-zero".to_string(),
            ));
        }

        if self.data.chunk_size_chars == 0 {
            return Err(ConfigError::Validation(
                "data.chunk_size_chars must be non-zero".to_string(),
            ));
        }
        if self.data.chunk_overlap_chars >= self.data.chunk_size_chars {
            return Err(ConfigError::Validation(format!(
                "data.chunk_overlap_chars ({}) must be smaller than data.chunk_size_chars ({})",
                self.data.chunk_overlap_chars, self.data.chunk_size_chars
            )));
        }

        let valid_sinks = ["memory", "file"];
        if !valid_sinks.contains(&self.audit.sink.as_str()) {
            return Err(ConfigError::Validation(format!(
                "audit.sink must be one of {:?}, got {:?}",
                valid_sinks, self.audit.sink
            )));
        }
        if self.audit.sink == "file" && self.audit.path.is_none() {
            return Err(ConfigError::Validation(
                "audit.path is required when audit.sink is \"file\"".to_string(),
            ));
        }

        Ok(())
    }

    /// The alpha actually used by the index: fixed at 1.0 in vector mode.
    pub fn effective_alpha(&self) -> f32 {
        if self.retrieval.backend == "vector" {
            1.0
        } else {
            self.retrieval.alpha
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.policy.path, PathBuf::from("config/policy.toml"));
        assert_eq!(config.data.data_dir, PathBuf::from("data"));
        assert_eq!(config.retrieval.backend, "hybrid");
        assert_eq!(config.retrieval.alpha, 0.75);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.audit.sink, "memory");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.retrieval.embedding_dim, 256);
        assert_eq!(config.data.chunk_size_chars, 4200);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [policy]
            path = "/etc/packgate/policy.toml"

            [data]
            data_dir = "/var/lib/packgate"
            chunk_size_chars = 1000
            chunk_overlap_chars = 100

            [retrieval]
            backend = "vector"
            alpha = 0.5
            top_k = 3
            embedder = "term_hash"
            embedding_dim = 128

            [audit]
            sink = "file"
            path = "/var/log/packgate/audit.jsonl"

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.policy.path, PathBuf::from("/etc/packgate/policy.toml"));
        assert_eq!(config.data.chunk_overlap_chars, 100);
        assert_eq!(config.retrieval.backend, "vector");
        assert_eq!(config.retrieval.embedder, "term_hash");
        assert_eq!(config.effective_alpha(), 1.0);
        assert_eq!(config.audit.path, Some(PathBuf::from("/var/log/packgate/audit.jsonl")));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_bad_backend() {
        let toml = r#"
            [retrieval]
            backend = "bm25"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_alpha_out_of_range() {
        let toml = r#"
            [retrieval]
            alpha = 1.5
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_top_k() {
        let toml = r#"
            [retrieval]
            top_k = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_overlap_not_below_size() {
        let toml = r#"
            [data]
            chunk_size_chars = 100
            chunk_overlap_chars = 100
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_requires_audit_path_for_file_sink() {
        let toml = r#"
            [audit]
            sink = "file"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_RETRIEVAL_BACKEND, " Vector "),
            (ENV_DATA_DIR, "/srv/docs"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.retrieval.backend, "vector");
        assert_eq!(config.data.data_dir, PathBuf::from("/srv/docs"));
        assert_eq!(config.policy.path, PathBuf::from("config/policy.toml"));
    }

    #[test]
    fn test_env_override_revalidates() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_RETRIEVAL_BACKEND).then(|| "graph".to_string())
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("packgate.toml");
        tokio::fs::write(&path, b"[retrieval]\ntop_k = 7\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.retrieval.top_k, 7);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        assert!(AppConfig::load(&path).await.is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
