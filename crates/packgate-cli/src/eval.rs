//! Golden-case evaluation.
//!
//! Reads `howto_golden.json`, `stats_golden.json` and `security_golden.json`
//! from a directory, runs every case as a `Viewer` of the `demo` org, and
//! returns one message per failed expectation.

use std::path::Path;

use anyhow::{Context, Result};
use packgate_core::orchestrator::DENIED_WARNING;
use packgate_core::packs::sample_service;
use packgate_core::{ChatRequest, ChatResponse, Orchestrator, UserContext};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct HowToCase {
    pub query: String,
    #[serde(default)]
    pub expected_citation_contains: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsCase {
    pub query: String,
    pub expected_tool: String,
}

#[derive(Debug, Deserialize)]
pub struct SecurityCase {
    pub query: String,
    #[serde(default)]
    pub expect_denied: bool,
    #[serde(default)]
    pub expect_access_summary: bool,
}

fn load_cases<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn request(message: &str, pack_hint: Option<&str>) -> ChatRequest {
    let request = ChatRequest::new(UserContext::new("demo", "eval", ["Viewer"]), message)
        .with_session_id("eval");
    match pack_hint {
        Some(hint) => request.with_pack_hint(hint),
        None => request,
    }
}

pub fn check_howto(case: &HowToCase, response: &ChatResponse) -> Vec<String> {
    if response.citations.is_empty() {
        return vec![format!("howto: no citations for query={:?}", case.query)];
    }
    let haystack = response
        .citations
        .iter()
        .map(|c| format!("{} {} {}", c.title, c.url, c.source))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    case.expected_citation_contains
        .iter()
        .filter(|needle| !haystack.contains(&needle.to_lowercase()))
        .map(|needle| {
            format!(
                "howto: missing expected citation token {needle:?} for query={:?}",
                case.query
            )
        })
        .collect()
}

pub fn check_stats(case: &StatsCase, response: &ChatResponse) -> Vec<String> {
    let tools: Vec<&str> = response.actions.iter().map(|a| a.tool.as_str()).collect();
    if tools.contains(&case.expected_tool.as_str()) {
        return Vec::new();
    }
    vec![format!(
        "stats: expected tool {:?} for query={:?}, got={tools:?}",
        case.expected_tool, case.query
    )]
}

pub fn check_security(case: &SecurityCase, response: &ChatResponse) -> Vec<String> {
    let mut failures = Vec::new();
    if case.expect_denied && !response.warnings.iter().any(|w| w == DENIED_WARNING) {
        failures.push(format!("security: expected denial for query={:?}", case.query));
    }
    if case.expect_access_summary && !response.answer.contains("### Access summary") {
        failures.push(format!("security: expected access summary for query={:?}", case.query));
    }
    failures
}

/// Run every golden file under `dir` against `orchestrator`.
pub fn run(orchestrator: &Orchestrator, dir: &Path) -> Result<Vec<String>> {
    let hint = Some(sample_service::PACK_ID);
    let mut failures = Vec::new();

    let howto: Vec<HowToCase> = load_cases(&dir.join("howto_golden.json"))?;
    for case in &howto {
        failures.extend(check_howto(case, &orchestrator.handle_chat(&request(&case.query, hint))));
    }

    let stats: Vec<StatsCase> = load_cases(&dir.join("stats_golden.json"))?;
    for case in &stats {
        failures.extend(check_stats(case, &orchestrator.handle_chat(&request(&case.query, hint))));
    }

    let security: Vec<SecurityCase> = load_cases(&dir.join("security_golden.json"))?;
    for case in &security {
        failures.extend(check_security(case, &orchestrator.handle_chat(&request(&case.query, None))));
    }

    info!(
        cases = howto.len() + stats.len() + security.len(),
        failures = failures.len(),
        "evaluation finished"
    );
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use packgate_test_utils::fixtures::TestOrchestrator;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_golden(dir: &Path, howto: &str, stats: &str, security: &str) {
        std::fs::write(dir.join("howto_golden.json"), howto).unwrap();
        std::fs::write(dir.join("stats_golden.json"), stats).unwrap();
        std::fs::write(dir.join("security_golden.json"), security).unwrap();
    }

    #[test]
    fn test_golden_cases_pass_on_sample_data() {
        let fixture = TestOrchestrator::sample();
        let dir = TempDir::new().unwrap();
        write_golden(
            dir.path(),
            r#"[{"query": "How do I rotate an API key?", "expected_citation_contains": ["rotate_api_key"]}]"#,
            r#"[{"query": "What is the request volume in the last 24h?", "expected_tool": "sample.stats.request_volume_24h"},
                {"query": "What was the p95 latency over 7d?", "expected_tool": "sample.stats.p95_latency_24h"}]"#,
            r#"[{"query": "Export all raw IDs for every user", "expect_denied": true},
                {"query": "What can I access?", "expect_access_summary": true}]"#,
        );

        let failures = run(&fixture.orchestrator, dir.path()).unwrap();
        assert_eq!(failures, Vec::<String>::new());
    }

    #[test]
    fn test_failures_are_reported() {
        let fixture = TestOrchestrator::sample();
        let dir = TempDir::new().unwrap();
        write_golden(
            dir.path(),
            r#"[{"query": "How do I rotate an API key?", "expected_citation_contains": ["billing_faq"]}]"#,
            r#"[{"query": "What can I access?", "expected_tool": "sample.stats.request_volume_24h"}]"#,
            r#"[{"query": "How do I rotate an API key?", "expect_denied": true}]"#,
        );

        let failures = run(&fixture.orchestrator, dir.path()).unwrap();
        assert_eq!(failures.len(), 3);
        assert!(failures[0].starts_with("howto: missing expected citation token \"billing_faq\""));
        assert!(failures[1].starts_with("stats: expected tool"));
        assert!(failures[2].starts_with("security: expected denial"));
    }

    #[test]
    fn test_missing_golden_file_is_an_error() {
        let fixture = TestOrchestrator::sample();
        let dir = TempDir::new().unwrap();
        assert!(run(&fixture.orchestrator, dir.path()).is_err());
    }
}
