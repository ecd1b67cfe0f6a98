//! In-memory hybrid document index.
//!
//! Chunks are embedded on ingest and stored alongside their token set. A
//! query is scored against every chunk that passes the filters:
//!
//! ```text
//! score = alpha * vector_score + (1 - alpha) * lexical_score
//! ```
//!
//! where `vector_score` is the cosine similarity of the unit embeddings and
//! `lexical_score` is the fraction of query tokens present in the chunk.
//! Results are sorted by score with ties kept in ingestion order, so the
//! same corpus and query always produce the same ranking.
//!
//! All mutation goes through a single `RwLock` around the chunk list:
//! `ingest`/`clear` take the write half, `search`/`count` the read half, so
//! readers never observe a partially applied batch.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedder::{Embedder, dot};

/// Default vector weight for hybrid scoring.
pub const DEFAULT_ALPHA: f32 = 0.75;

/// A chunk of a source document, as produced by a document source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub org_id: String,
    pub pack_id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    #[serde(default)]
    pub section_heading: Option<String>,
    /// RFC 3339 timestamp of the underlying document.
    #[serde(default)]
    pub updated_at: Option<String>,
    pub text: String,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default = "default_chunk_total")]
    pub chunk_total: usize,
}

fn default_chunk_total() -> usize {
    1
}

impl Chunk {
    /// A single-chunk document with the required fields set.
    pub fn new(
        org_id: impl Into<String>,
        pack_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            pack_id: pack_id.into(),
            title: title.into(),
            url: url.into(),
            source: source.into(),
            section_heading: None,
            updated_at: None,
            text: text.into(),
            chunk_index: 0,
            chunk_total: 1,
        }
    }

    pub fn with_section_heading(mut self, heading: impl Into<String>) -> Self {
        self.section_heading = Some(heading.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: impl Into<String>) -> Self {
        self.updated_at = Some(updated_at.into());
        self
    }

    /// Look up a field by name for filtering. Unknown fields yield `None`.
    pub fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "org_id" => Some(Cow::Borrowed(&self.org_id)),
            "pack_id" => Some(Cow::Borrowed(&self.pack_id)),
            "title" => Some(Cow::Borrowed(&self.title)),
            "url" => Some(Cow::Borrowed(&self.url)),
            "source" => Some(Cow::Borrowed(&self.source)),
            "section_heading" => self.section_heading.as_deref().map(Cow::Borrowed),
            "updated_at" => self.updated_at.as_deref().map(Cow::Borrowed),
            "text" => Some(Cow::Borrowed(&self.text)),
            "chunk_index" => Some(Cow::Owned(self.chunk_index.to_string())),
            "chunk_total" => Some(Cow::Owned(self.chunk_total.to_string())),
            _ => None,
        }
    }
}

/// Exact-match conjunction over chunk fields. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    terms: Vec<(String, String)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `field == value` term.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.push((field.into(), value.into()));
        self
    }

    /// Restrict to one organisation.
    pub fn org(org_id: &str) -> Self {
        Self::new().with("org_id", org_id)
    }

    /// Restrict to one `(org, pack)` partition.
    pub fn scope(org_id: &str, pack_id: &str) -> Self {
        Self::org(org_id).with("pack_id", pack_id)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.terms
            .iter()
            .all(|(field, value)| chunk.field(field).is_some_and(|v| v == value.as_str()))
    }
}

/// Scoring mode of the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetrievalMode {
    /// Blend of vector and lexical scores.
    Hybrid { alpha: f32 },
    /// Vector similarity only; token sets are not kept.
    Vector,
}

impl RetrievalMode {
    /// Hybrid mode with `alpha` clamped into `[0, 1]`.
    pub fn hybrid(alpha: f32) -> Self {
        let alpha = if alpha.is_nan() { DEFAULT_ALPHA } else { alpha.clamp(0.0, 1.0) };
        Self::Hybrid { alpha }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Self::Hybrid { .. } => "hybrid",
            Self::Vector => "vector",
        }
    }

    /// Weight of the vector score; 1.0 in vector mode.
    pub fn alpha(&self) -> f32 {
        match self {
            Self::Hybrid { alpha } => *alpha,
            Self::Vector => 1.0,
        }
    }
}

impl Default for RetrievalMode {
    fn default() -> Self {
        Self::Hybrid {
            alpha: DEFAULT_ALPHA,
        }
    }
}

/// A scored search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub score: f32,
    pub vector_score: f32,
    pub lexical_score: f32,
    pub title: String,
    pub url: String,
    pub source: String,
    pub section_heading: Option<String>,
    pub updated_at: Option<String>,
    pub text: String,
}

struct IndexedChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
    tokens: HashSet<String>,
}

/// Thread-safe in-memory document index.
pub struct DocIndex {
    embedder: Arc<dyn Embedder>,
    mode: RetrievalMode,
    items: RwLock<Vec<IndexedChunk>>,
}

impl DocIndex {
    pub fn new(embedder: Arc<dyn Embedder>, mode: RetrievalMode) -> Self {
        let mode = match mode {
            RetrievalMode::Hybrid { alpha } => RetrievalMode::hybrid(alpha),
            RetrievalMode::Vector => RetrievalMode::Vector,
        };
        Self {
            embedder,
            mode,
            items: RwLock::new(Vec::new()),
        }
    }

    /// Hybrid index; `alpha` is clamped into `[0, 1]`.
    pub fn hybrid(embedder: Arc<dyn Embedder>, alpha: f32) -> Self {
        Self::new(embedder, RetrievalMode::hybrid(alpha))
    }

    /// Pure vector index.
    pub fn vector_only(embedder: Arc<dyn Embedder>) -> Self {
        Self::new(embedder, RetrievalMode::Vector)
    }

    pub fn mode(&self) -> RetrievalMode {
        self.mode
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// Embed and store chunks. Returns the number stored.
    pub fn ingest(&self, chunks: Vec<Chunk>) -> usize {
        if chunks.is_empty() {
            return 0;
        }
        // Embed before taking the lock so readers are not blocked on it.
        let prepared: Vec<IndexedChunk> = chunks
            .into_iter()
            .map(|chunk| {
                let embedding = self.embedder.embed(&chunk.text);
                let tokens = match self.mode {
                    RetrievalMode::Hybrid { .. } => tokenize(&chunk.text),
                    RetrievalMode::Vector => HashSet::new(),
                };
                IndexedChunk {
                    chunk,
                    embedding,
                    tokens,
                }
            })
            .collect();

        let added = prepared.len();
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.extend(prepared);
        debug!(added, total = items.len(), "chunks ingested");
        added
    }

    /// Score chunks passing `filters` and return the best `top_k`.
    pub fn search(&self, query: &str, filters: &Filters, top_k: usize) -> Vec<Hit> {
        if top_k == 0 {
            return Vec::new();
        }
        let query_embedding = self.embedder.embed(query);
        let query_tokens = match self.mode {
            RetrievalMode::Hybrid { .. } => tokenize(query),
            RetrievalMode::Vector => HashSet::new(),
        };
        let alpha = self.mode.alpha();

        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<Hit> = items
            .iter()
            .filter(|item| filters.matches(&item.chunk))
            .map(|item| {
                let vector_score = dot(&query_embedding, &item.embedding);
                let lexical_score = lexical_overlap(&query_tokens, &item.tokens);
                let score = match self.mode {
                    RetrievalMode::Hybrid { .. } => {
                        alpha * vector_score + (1.0 - alpha) * lexical_score
                    }
                    RetrievalMode::Vector => vector_score,
                };
                Hit {
                    score,
                    vector_score,
                    lexical_score,
                    title: item.chunk.title.clone(),
                    url: item.chunk.url.clone(),
                    source: item.chunk.source.clone(),
                    section_heading: item.chunk.section_heading.clone(),
                    updated_at: item.chunk.updated_at.clone(),
                    text: item.chunk.text.clone(),
                }
            })
            .collect();
        drop(items);

        // `sort_by` is stable: equal scores keep ingestion order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        hits
    }

    /// Number of chunks passing `filters`.
    pub fn count(&self, filters: &Filters) -> usize {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.iter().filter(|item| filters.matches(&item.chunk)).count()
    }

    /// Remove chunks passing `filters` (all chunks for empty filters).
    /// Returns the number removed.
    pub fn clear(&self, filters: &Filters) -> usize {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let before = items.len();
        if filters.is_empty() {
            items.clear();
        } else {
            items.retain(|item| !filters.matches(&item.chunk));
        }
        let removed = before - items.len();
        debug!(removed, remaining = items.len(), "chunks cleared");
        removed
    }

    pub fn len(&self) -> usize {
        self.count(&Filters::new())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lower-cased alphanumeric/underscore runs of at least two characters.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|run| run.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

/// `|query ∩ chunk| / |query|`, zero for an empty query.
fn lexical_overlap(query: &HashSet<String>, chunk: &HashSet<String>) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let shared = query.iter().filter(|t| chunk.contains(*t)).count();
    shared as f32 / query.len() as f32
}
