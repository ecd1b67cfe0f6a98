//! Keyword-based intent classification.

use serde::{Deserialize, Serialize};

/// What the caller is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    HowTo,
    Stats,
    Security,
    Mixed,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::HowTo => "how_to",
            Intent::Stats => "stats",
            Intent::Security => "security",
            Intent::Mixed => "mixed",
        }
    }

    /// Whether document retrieval runs for this intent.
    pub fn wants_docs(&self) -> bool {
        matches!(self, Intent::HowTo | Intent::Mixed)
    }

    /// Whether a stats tool is selected for this intent.
    pub fn wants_stats(&self) -> bool {
        matches!(self, Intent::Stats | Intent::Mixed)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const HOW_TO_TRIGGERS: &[&str] = &[
    "how do i", "how to", "configure", "set up", "setup", "guide", "steps",
];

const STATS_TRIGGERS: &[&str] = &[
    "how many", "count", "stats", "latency", "volume", "requests", "traffic", "errors", "rate",
];

const SECURITY_TRIGGERS: &[&str] = &[
    "what can i access", "permission", "rbac", "roles", "access", "scope",
];

/// Classify `message` by substring triggers over its lower-cased form.
///
/// Two or more firing categories give [`Intent::Mixed`]; none gives
/// [`Intent::HowTo`].
pub fn classify(message: &str) -> Intent {
    let m = message.to_lowercase();
    let fires = |triggers: &[&str]| triggers.iter().any(|t| m.contains(t));

    let how = fires(HOW_TO_TRIGGERS);
    let stats = fires(STATS_TRIGGERS);
    let security = fires(SECURITY_TRIGGERS);

    match (how, stats, security) {
        (true, false, false) => Intent::HowTo,
        (false, true, false) => Intent::Stats,
        (false, false, true) => Intent::Security,
        (false, false, false) => Intent::HowTo,
        _ => Intent::Mixed,
    }
}
