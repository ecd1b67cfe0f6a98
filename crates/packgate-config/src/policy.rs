//! Access policy engine: deny patterns, role grants and redaction rules.
//!
//! A policy document is loaded once at startup and compiled into a
//! [`PolicyEngine`]. The engine answers three questions for every request:
//!
//! 1. Is the message blocked outright by a deny pattern? Denial is absolute
//!    and independent of the caller's roles.
//! 2. Which packs and tools may the caller's roles touch? Grants are glob
//!    patterns and a caller's permissions are the union across all of their
//!    roles. Unknown roles contribute nothing.
//! 3. How must outgoing text be redacted?
//!
//! ## TOML Example
//!
//! ```toml
//! version = 1
//! deny_patterns = ["export all", "re:dump\\s+db"]
//!
//! [roles.Viewer]
//! allowed_packs = ["sample_service"]
//! allowed_tools = ["sample.stats.*"]
//!
//! [redaction]
//! mask_emails = true
//! mask_long_ids = true
//! suppress_small_counts = 10
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix marking a deny pattern as a case-insensitive regular expression.
pub const REGEX_PREFIX: &str = "re:";

/// Errors raised while loading a policy document. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum PolicyLoadError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid deny pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("policy validation error: {0}")]
    Validation(String),
}

/// Grants attached to a single role.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRule {
    /// Glob patterns over pack ids.
    #[serde(default)]
    pub allowed_packs: Vec<String>,
    /// Glob patterns over dotted tool names.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

/// Redaction applied to every outgoing answer and audit preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionPolicy {
    /// Mask e-mail addresses to two leading characters plus the domain.
    #[serde(default = "default_true")]
    pub mask_emails: bool,
    /// Mask long hex / token-like identifiers to their first and last 4 chars.
    #[serde(default = "default_true")]
    pub mask_long_ids: bool,
    /// Replace standalone integers below this threshold with `<N`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppress_small_counts: Option<u64>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            mask_emails: true,
            mask_long_ids: true,
            suppress_small_counts: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

/// The raw policy document as expressed in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Phrases or `re:`-prefixed regular expressions that block a request.
    #[serde(default)]
    pub deny_patterns: Vec<String>,

    /// Role name → grants.
    #[serde(default)]
    pub roles: BTreeMap<String, RoleRule>,

    #[serde(default)]
    pub redaction: RedactionPolicy,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            deny_patterns: Vec::new(),
            roles: BTreeMap::new(),
            redaction: RedactionPolicy::default(),
        }
    }
}

impl PolicyDocument {
    /// Validate structural constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), PolicyLoadError> {
        if self.version == 0 {
            return Err(PolicyLoadError::Validation(
                "version must be at least 1".to_string(),
            ));
        }
        for (name, rule) in &self.roles {
            if name.trim().is_empty() {
                return Err(PolicyLoadError::Validation(
                    "role names must not be empty".to_string(),
                ));
            }
            for (i, pattern) in rule.allowed_packs.iter().enumerate() {
                if pattern.trim().is_empty() {
                    return Err(PolicyLoadError::Validation(format!(
                        "roles.{name}.allowed_packs[{i}] must not be empty"
                    )));
                }
            }
            for (i, pattern) in rule.allowed_tools.iter().enumerate() {
                if pattern.trim().is_empty() {
                    return Err(PolicyLoadError::Validation(format!(
                        "roles.{name}.allowed_tools[{i}] must not be empty"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A compiled deny pattern.
#[derive(Debug, Clone)]
pub enum DenyPattern {
    /// Case-insensitive regular expression, searched in the raw message.
    Regex(Regex),
    /// Lower-cased, whitespace-collapsed phrase matched on word boundaries
    /// inside the normalized message.
    Phrase(String),
}

impl DenyPattern {
    /// Compile a raw pattern. Blank patterns compile to `None`.
    pub fn compile(raw: &str) -> Result<Option<Self>, PolicyLoadError> {
        let cleaned = raw.trim();
        if cleaned.is_empty() {
            return Ok(None);
        }
        if let Some(expr) = cleaned.strip_prefix(REGEX_PREFIX) {
            let regex = RegexBuilder::new(expr)
                .case_insensitive(true)
                .build()
                .map_err(|source| PolicyLoadError::InvalidPattern {
                    pattern: cleaned.to_string(),
                    source,
                })?;
            return Ok(Some(Self::Regex(regex)));
        }
        let phrase = normalize_space(cleaned);
        if phrase.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::Phrase(phrase)))
    }

    /// Check the pattern against a message. `normalized` must be the
    /// output of [`normalize_space`] for `raw`.
    pub fn matches(&self, raw: &str, normalized: &str) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(raw),
            Self::Phrase(phrase) => contains_bounded(normalized, phrase),
        }
    }
}

/// Lower-case and collapse every whitespace run into a single space.
pub fn normalize_space(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Substring search that refuses to start or end inside a word.
fn contains_bounded(haystack: &str, needle: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let leading_word = needle.chars().next().is_some_and(is_word);
    let trailing_word = needle.chars().next_back().is_some_and(is_word);

    haystack.match_indices(needle).any(|(start, matched)| {
        let end = start + matched.len();
        let before_ok = !leading_word || !haystack[..start].chars().next_back().is_some_and(is_word);
        let after_ok = !trailing_word || !haystack[end..].chars().next().is_some_and(is_word);
        before_ok && after_ok
    })
}

/// Match a dotted name against a single grant pattern.
///
/// - `"*"` matches every name.
/// - `"prefix.*"` matches `prefix` itself and any name starting with
///   `prefix.`, `prefix_` or `prefix-`.
/// - Anything else is an exact match.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        if name == prefix {
            return true;
        }
        return name
            .strip_prefix(prefix)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|sep| matches!(sep, '.' | '_' | '-'));
    }
    name == pattern
}

/// Whether `name` matches at least one of `patterns`.
pub fn matches_any<'a, I>(name: &str, patterns: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    patterns.into_iter().any(|p| matches_pattern(name, p))
}

/// A compiled, immutable policy.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    document: PolicyDocument,
    deny: Vec<DenyPattern>,
}

impl PolicyEngine {
    /// Compile a policy document.
    pub fn new(document: PolicyDocument) -> Result<Self, PolicyLoadError> {
        document.validate()?;
        let mut deny = Vec::with_capacity(document.deny_patterns.len());
        for raw in &document.deny_patterns {
            if let Some(pattern) = DenyPattern::compile(raw)? {
                deny.push(pattern);
            }
        }
        debug!(
            version = document.version,
            deny_patterns = deny.len(),
            roles = document.roles.len(),
            "policy compiled"
        );
        Ok(Self { document, deny })
    }

    /// Parse and compile a policy from a TOML string.
    pub fn parse(s: &str) -> Result<Self, PolicyLoadError> {
        let document: PolicyDocument = toml::from_str(s)?;
        Self::new(document)
    }

    /// Load and compile a policy from a TOML file using async I/O.
    pub async fn load(path: &Path) -> Result<Self, PolicyLoadError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// The source document.
    pub fn document(&self) -> &PolicyDocument {
        &self.document
    }

    pub fn version(&self) -> u32 {
        self.document.version
    }

    /// Number of compiled deny patterns.
    pub fn deny_pattern_count(&self) -> usize {
        self.deny.len()
    }

    /// Whether the message is blocked by any deny pattern.
    pub fn is_denied(&self, message: &str) -> bool {
        let normalized = normalize_space(message);
        self.deny.iter().any(|p| p.matches(message, &normalized))
    }

    /// Grants for a single role, if the role is known.
    pub fn role_rule(&self, role: &str) -> Option<&RoleRule> {
        self.document.roles.get(role)
    }

    /// All role names defined by the policy.
    pub fn roles(&self) -> Vec<&str> {
        self.document.roles.keys().map(String::as_str).collect()
    }

    /// Union of pack patterns granted to `roles`.
    pub fn allowed_packs(&self, roles: &[String]) -> BTreeSet<String> {
        roles
            .iter()
            .filter_map(|role| self.role_rule(role))
            .flat_map(|rule| rule.allowed_packs.iter().cloned())
            .collect()
    }

    /// Union of tool patterns granted to `roles`.
    pub fn allowed_tools(&self, roles: &[String]) -> BTreeSet<String> {
        roles
            .iter()
            .filter_map(|role| self.role_rule(role))
            .flat_map(|rule| rule.allowed_tools.iter().cloned())
            .collect()
    }

    /// Keep the pack ids `roles` may access, preserving input order.
    pub fn filter_allowed_packs(&self, pack_ids: &[String], roles: &[String]) -> Vec<String> {
        let patterns = self.allowed_packs(roles);
        pack_ids
            .iter()
            .filter(|id| matches_any(id, &patterns))
            .cloned()
            .collect()
    }

    /// Keep the tool names `roles` may call, preserving input order.
    pub fn filter_allowed_tools(&self, tool_names: &[String], roles: &[String]) -> Vec<String> {
        let patterns = self.allowed_tools(roles);
        tool_names
            .iter()
            .filter(|name| matches_any(name, &patterns))
            .cloned()
            .collect()
    }

    pub fn redaction(&self) -> &RedactionPolicy {
        &self.document.redaction
    }
}

impl Default for PolicyEngine {
    /// An empty policy: nothing denied, nothing granted, default redaction.
    fn default() -> Self {
        Self {
            document: PolicyDocument::default(),
            deny: Vec::new(),
        }
    }
}
