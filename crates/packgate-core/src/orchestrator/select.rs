//! Stats tool selection by keyword and token overlap.

use std::collections::HashSet;

use crate::tools::ToolDef;

/// Score of `tool` against a message.
///
/// `message_lower` is the lower-cased message and `tokens` its word set.
pub fn tool_score(message_lower: &str, tokens: &HashSet<String>, tool: &ToolDef) -> f32 {
    let name = tool.name.as_str();
    let mut score = 0.0;
    if name.contains("stats") {
        score += 0.2;
    }

    for keyword in &tool.keywords {
        let keyword = keyword.to_lowercase();
        if keyword.is_empty() {
            continue;
        }
        if message_lower.contains(&keyword) {
            score += 3.0;
        } else if tokens.contains(&keyword) {
            score += 1.0;
        }
    }

    score += tokens.iter().filter(|t| name.contains(t.as_str())).count() as f32;

    let asks_count = message_lower.contains("how many") || tokens.contains("count");
    if asks_count && ["count", "volume", "total"].iter().any(|k| name.contains(k)) {
        score += 2.0;
    }
    for (term, bonus) in [("volume", 2.5), ("latency", 2.5), ("request", 1.5)] {
        if tokens.contains(term) && name.contains(term) {
            score += bonus;
        }
    }
    score
}

/// Best-scoring tool among `candidates`; the first wins a tie.
pub fn select_tool<'a>(message: &str, candidates: &[&'a ToolDef]) -> Option<&'a ToolDef> {
    let lower = message.to_lowercase();
    let tokens = words(&lower);

    let mut best: Option<(&ToolDef, f32)> = None;
    for &tool in candidates {
        let score = tool_score(&lower, &tokens, tool);
        tracing::debug!(tool = %tool.name, score, "tool candidate scored");
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((tool, score));
        }
    }
    best.map(|(tool, _)| tool)
}

/// Runs of ASCII letters, digits and `_`.
fn words(lower: &str) -> HashSet<String> {
    lower
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packs::sample_service::{self, P95_LATENCY_TOOL, REQUEST_VOLUME_TOOL};
    use crate::tools::Connector;
    use serde_json::Value;

    fn tool(name: &str) -> ToolDef {
        ToolDef::new(name, Connector::mock(|_| Ok(Value::Null)))
    }

    fn pick(message: &str, tools: &[ToolDef]) -> Option<String> {
        let refs: Vec<&ToolDef> = tools.iter().collect();
        select_tool(message, &refs).map(|t| t.name.clone())
    }

    #[test]
    fn test_sample_tools_pick_by_domain_terms() {
        let tools = sample_service::pack().tools;
        assert_eq!(
            pick("What is the request volume in the last 24h?", &tools).as_deref(),
            Some(REQUEST_VOLUME_TOOL)
        );
        assert_eq!(pick("p95 latency today", &tools).as_deref(), Some(P95_LATENCY_TOOL));
        assert_eq!(pick("How many calls yesterday", &tools).as_deref(), Some(REQUEST_VOLUME_TOOL));
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let tools = vec![tool("a.stats.one"), tool("b.stats.two")];
        assert_eq!(pick("nothing relevant", &tools).as_deref(), Some("a.stats.one"));
    }

    #[test]
    fn test_keyword_substring_beats_token() {
        let strong = tool("x.one").with_keywords(["error rate"]);
        let weak = tool("x.two").with_keywords(["rate"]);
        let tokens = words("error rate today");
        assert_eq!(tool_score("error rate today", &tokens, &strong), 3.0);
        assert_eq!(tool_score("error rate today", &tokens, &weak), 3.0);

        let tokens = words("rates");
        // Substring hit still counts even without a matching token.
        assert_eq!(tool_score("rates", &tokens, &weak), 3.0);
    }

    #[test]
    fn test_token_in_name_scores() {
        let t = tool("svc.stats.errors");
        let tokens = words("errors please");
        assert!((tool_score("errors please", &tokens, &t) - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_empty_candidates() {
        assert!(select_tool("anything", &[]).is_none());
    }
}
