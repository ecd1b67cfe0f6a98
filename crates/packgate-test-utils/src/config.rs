//! Policy and configuration builders for tests.

use std::path::Path;

use packgate_config::policy::PolicyDocument;
use packgate_config::{AppConfig, PolicyEngine, RoleRule};

/// The demo policy used across integration tests.
///
/// Viewers see the sample pack and its stats tools; admins see everything;
/// nobody may ask for raw identifier exports.
pub const SAMPLE_POLICY: &str = r#"
version = 1
deny_patterns = [
    "export all raw ids",
    "list all user ids",
    "re:dump\\s+(the\\s+)?(user|customer)\\s+table",
]

[roles.Viewer]
allowed_packs = ["sample_service"]
allowed_tools = ["sample.stats.*"]

[roles.Admin]
allowed_packs = ["*"]
allowed_tools = ["*"]

[redaction]
mask_emails = true
mask_long_ids = true
"#;

/// Compile [`SAMPLE_POLICY`].
pub fn sample_policy() -> PolicyEngine {
    PolicyEngine::parse(SAMPLE_POLICY).expect("sample policy must compile")
}

/// Fluent builder for [`PolicyEngine`] values.
///
/// ```ignore
/// let policy = PolicyBuilder::new()
///     .deny("export all")
///     .role("Viewer", ["sample_service"], ["sample.stats.*"])
///     .build();
/// ```
#[derive(Default)]
pub struct PolicyBuilder {
    document: PolicyDocument,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(mut self, pattern: &str) -> Self {
        self.document.deny_patterns.push(pattern.to_string());
        self
    }

    pub fn role<P, T>(mut self, name: &str, packs: P, tools: T) -> Self
    where
        P: IntoIterator<Item = &'static str>,
        T: IntoIterator<Item = &'static str>,
    {
        self.document.roles.insert(
            name.to_string(),
            RoleRule {
                allowed_packs: packs.into_iter().map(str::to_string).collect(),
                allowed_tools: tools.into_iter().map(str::to_string).collect(),
            },
        );
        self
    }

    pub fn mask_emails(mut self, enabled: bool) -> Self {
        self.document.redaction.mask_emails = enabled;
        self
    }

    pub fn mask_long_ids(mut self, enabled: bool) -> Self {
        self.document.redaction.mask_long_ids = enabled;
        self
    }

    pub fn suppress_small_counts(mut self, threshold: u64) -> Self {
        self.document.redaction.suppress_small_counts = Some(threshold);
        self
    }

    pub fn build(self) -> PolicyEngine {
        PolicyEngine::new(self.document).expect("test policy must compile")
    }
}

/// Fluent builder for [`AppConfig`] in tests.
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn data_dir(mut self, dir: &Path) -> Self {
        self.config.data.data_dir = dir.to_path_buf();
        self
    }

    pub fn policy_path(mut self, path: &Path) -> Self {
        self.config.policy.path = path.to_path_buf();
        self
    }

    pub fn backend(mut self, backend: &str) -> Self {
        self.config.retrieval.backend = backend.to_string();
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.config.retrieval.alpha = alpha;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.retrieval.top_k = top_k;
        self
    }

    pub fn file_audit(mut self, path: &Path) -> Self {
        self.config.audit.sink = "file".to_string();
        self.config.audit.path = Some(path.to_path_buf());
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_policy_grants() {
        let policy = sample_policy();
        let viewer = vec!["Viewer".to_string()];
        assert!(policy.allowed_packs(&viewer).contains("sample_service"));
        assert!(policy.is_denied("please EXPORT all raw IDs"));
        assert!(policy.is_denied("dump the customer table"));
        assert!(!policy.is_denied("how do I rotate an API key?"));
    }

    #[test]
    fn test_policy_builder() {
        let policy = PolicyBuilder::new()
            .deny("secret sauce")
            .role("Ops", ["*"], ["sample.*"])
            .suppress_small_counts(5)
            .build();
        assert_eq!(policy.deny_pattern_count(), 1);
        assert_eq!(policy.redaction().suppress_small_counts, Some(5));
        assert!(policy.role_rule("Ops").is_some());
    }

    #[test]
    fn test_config_builder_validates() {
        let config = TestConfigBuilder::new().backend("vector").top_k(3).build();
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_alpha(), 1.0);
    }
}
