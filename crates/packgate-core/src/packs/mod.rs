//! Product packs and message routing.
//!
//! A pack bundles the keywords that route a message to it, the document
//! globs ingested for it (relative to `data/<org>/<pack>/`), and the tools
//! it exposes.

pub mod sample_service;

use serde::Serialize;

use crate::tools::ToolDef;

#[derive(Debug, Clone)]
pub struct Pack {
    pub pack_id: String,
    pub display_name: String,
    pub keywords: Vec<String>,
    pub doc_globs: Vec<String>,
    pub tools: Vec<ToolDef>,
}

impl Pack {
    pub fn new(pack_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            pack_id: pack_id.into(),
            display_name: display_name.into(),
            keywords: Vec::new(),
            doc_globs: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_doc_globs<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.doc_globs = globs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tool(mut self, tool: ToolDef) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    /// Whether any keyword occurs in the lower-cased `message`.
    fn matches(&self, message_lower: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && message_lower.contains(&k.to_lowercase()))
    }
}

/// Catalog entry describing a registered pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackSummary {
    pub pack_id: String,
    pub display_name: String,
    pub keywords: Vec<String>,
    pub tool_names: Vec<String>,
}

/// Registered packs in registration order.
#[derive(Debug, Clone, Default)]
pub struct PackRegistry {
    packs: Vec<Pack>,
}

impl PackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in packs.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(sample_service::pack());
        registry
    }

    /// Register `pack`, replacing one with the same id in place.
    pub fn register(&mut self, pack: Pack) {
        match self.packs.iter_mut().find(|p| p.pack_id == pack.pack_id) {
            Some(existing) => *existing = pack,
            None => self.packs.push(pack),
        }
    }

    pub fn get(&self, pack_id: &str) -> Option<&Pack> {
        self.packs.iter().find(|p| p.pack_id == pack_id)
    }

    pub fn list(&self) -> &[Pack] {
        &self.packs
    }

    pub fn ids(&self) -> Vec<String> {
        self.packs.iter().map(|p| p.pack_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    pub fn catalog(&self) -> Vec<PackSummary> {
        self.packs
            .iter()
            .map(|p| PackSummary {
                pack_id: p.pack_id.clone(),
                display_name: p.display_name.clone(),
                keywords: p.keywords.clone(),
                tool_names: p.tool_names(),
            })
            .collect()
    }

    /// Candidate packs for `message`.
    ///
    /// A registered `pack_hint` selects exactly that pack. Otherwise packs
    /// with a keyword hit are returned, or every pack when none hit.
    pub fn route(&self, message: &str, pack_hint: Option<&str>) -> Vec<&Pack> {
        if let Some(pack) = pack_hint.and_then(|hint| self.get(hint)) {
            return vec![pack];
        }
        let lower = message.to_lowercase();
        let matched: Vec<&Pack> = self.packs.iter().filter(|p| p.matches(&lower)).collect();
        if matched.is_empty() {
            self.packs.iter().collect()
        } else {
            matched
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Connector;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn registry() -> PackRegistry {
        let mut registry = PackRegistry::new();
        registry.register(Pack::new("billing", "Billing").with_keywords(["invoice", "Refund"]));
        registry.register(
            Pack::new("search", "Search")
                .with_keywords(["index", "query"])
                .with_tool(ToolDef::new("search.stats.qps", Connector::mock(|_| Ok(Value::Null)))),
        );
        registry
    }

    fn ids(packs: Vec<&Pack>) -> Vec<&str> {
        packs.into_iter().map(|p| p.pack_id.as_str()).collect()
    }

    #[test]
    fn test_hint_routes_exactly() {
        let r = registry();
        assert_eq!(ids(r.route("invoice for my index", Some("search"))), vec!["search"]);
    }

    #[test]
    fn test_unknown_hint_falls_back_to_keywords() {
        let r = registry();
        assert_eq!(ids(r.route("where is my REFUND", Some("missing"))), vec!["billing"]);
    }

    #[test]
    fn test_multiple_keyword_hits_keep_registration_order() {
        let r = registry();
        assert_eq!(ids(r.route("query the invoice", None)), vec!["billing", "search"]);
    }

    #[test]
    fn test_no_hit_returns_all() {
        let r = registry();
        assert_eq!(ids(r.route("hello", None)), vec!["billing", "search"]);
        assert!(PackRegistry::new().route("hello", None).is_empty());
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut r = registry();
        r.register(Pack::new("billing", "Billing v2"));
        assert_eq!(r.ids(), vec!["billing", "search"]);
        assert_eq!(r.get("billing").unwrap().display_name, "Billing v2");
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_catalog_lists_tool_names() {
        let catalog = registry().catalog();
        assert_eq!(catalog[1].tool_names, vec!["search.stats.qps"]);
        assert_eq!(catalog[0].keywords, vec!["invoice", "Refund"]);
        assert!(catalog[0].tool_names.is_empty());
    }

    #[test]
    fn test_catalog_serializes_tool_names() {
        let json = serde_json::to_value(registry().catalog()).unwrap();
        assert_eq!(json[1]["tool_names"], serde_json::json!(["search.stats.qps"]));
        assert!(json[1].get("tools").is_none());
    }

    #[test]
    fn test_builtin_has_sample_service() {
        let r = PackRegistry::with_builtin();
        assert!(r.get(sample_service::PACK_ID).is_some());
    }
}
