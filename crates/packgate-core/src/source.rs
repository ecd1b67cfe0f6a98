//! Document sources feeding the index.
//!
//! A source turns `(org, pack, globs)` into chunk records. The filesystem
//! source reads `data_dir/<org>/<pack>/` and chunks matching files; the
//! static source serves pre-built chunks from memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, chunk_markdown};
use crate::index::Chunk;

/// Errors raised while loading documents.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid document glob {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Produces chunk records for one `(org, pack)` partition.
pub trait DocumentSource: Send + Sync {
    fn load(&self, org_id: &str, pack_id: &str, globs: &[String]) -> Result<Vec<Chunk>, IngestError>;
}

/// Reads documents from `data_dir/<org>/<pack>/`.
#[derive(Debug, Clone)]
pub struct FilesystemSource {
    data_dir: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FilesystemSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn file_chunks(
        &self,
        org_id: &str,
        pack_id: &str,
        path: &Path,
        rel: &str,
    ) -> Result<Vec<Chunk>, IngestError> {
        let io_err = |source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        };
        let bytes = std::fs::read(path).map_err(io_err)?;
        let text = String::from_utf8_lossy(&bytes);
        let pieces = chunk_markdown(&text, self.chunk_size, self.chunk_overlap);
        if pieces.is_empty() {
            return Ok(Vec::new());
        }

        let modified = std::fs::metadata(path).and_then(|m| m.modified()).map_err(io_err)?;
        let updated_at = DateTime::<Utc>::from(modified).to_rfc3339();
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| rel.to_string());
        let url = format!("data/{org_id}/{pack_id}/{rel}");
        let source = format!("{pack_id} docs");

        Ok(pieces
            .into_iter()
            .map(|piece| Chunk {
                org_id: org_id.to_string(),
                pack_id: pack_id.to_string(),
                title: title.clone(),
                url: url.clone(),
                source: source.clone(),
                section_heading: piece.section_heading,
                updated_at: Some(updated_at.clone()),
                text: piece.text,
                chunk_index: piece.chunk_index,
                chunk_total: piece.chunk_total,
            })
            .collect())
    }
}

impl DocumentSource for FilesystemSource {
    fn load(&self, org_id: &str, pack_id: &str, globs: &[String]) -> Result<Vec<Chunk>, IngestError> {
        let set = compile_globs(globs)?;
        let root = self.data_dir.join(org_id).join(pack_id);

        // Files are ordered by the first glob they match, then by path.
        let mut matched: Vec<(usize, String, PathBuf)> = walk_files(&root)?
            .into_iter()
            .filter_map(|(rel, path)| {
                let first = set.matches(&rel).into_iter().min()?;
                Some((first, rel, path))
            })
            .collect();
        matched.sort();

        let mut chunks = Vec::new();
        for (_, rel, path) in &matched {
            chunks.extend(self.file_chunks(org_id, pack_id, path, rel)?);
        }
        debug!(org_id, pack_id, files = matched.len(), chunks = chunks.len(), "documents loaded");
        Ok(chunks)
    }
}

/// Compile document globs into one set. `*` and `?` stay within a path
/// segment; `**` spans segments.
pub fn compile_globs(patterns: &[String]) -> Result<GlobSet, IngestError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| IngestError::Glob {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| IngestError::Glob {
        pattern: patterns.join(", "),
        source,
    })
}

/// `(relative path, absolute path)` for every file under `root`, skipping
/// hidden entries. A missing directory yields nothing.
fn walk_files(root: &Path) -> Result<Vec<(String, PathBuf)>, IngestError> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry.map_err(|err| IngestError::Io {
            path: err.path().unwrap_or(root).to_path_buf(),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((rel, entry.into_path()));
        }
    }
    Ok(files)
}

/// Serves pre-built chunks from memory, ignoring globs.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    chunks: HashMap<(String, String), Vec<Chunk>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunks(mut self, org_id: &str, pack_id: &str, chunks: Vec<Chunk>) -> Self {
        self.chunks
            .entry((org_id.to_string(), pack_id.to_string()))
            .or_default()
            .extend(chunks);
        self
    }
}

impl DocumentSource for StaticSource {
    fn load(&self, org_id: &str, pack_id: &str, _globs: &[String]) -> Result<Vec<Chunk>, IngestError> {
        Ok(self
            .chunks
            .get(&(org_id.to_string(), pack_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn globs(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_doc_globs_respect_segments() {
        let set = compile_globs(&globs(&["howto/**/*.md", "*.txt"])).unwrap();
        assert!(set.is_match("howto/guide.md"));
        assert!(set.is_match("howto/a/b/guide.md"));
        assert!(!set.is_match("howto/guide.rst"));
        assert!(!set.is_match("other/guide.md"));
        assert!(set.is_match("notes.txt"));
        assert!(!set.is_match("docs/notes.txt"));
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let err = compile_globs(&globs(&["howto/[*.md"])).unwrap_err();
        assert!(matches!(err, IngestError::Glob { ref pattern, .. } if pattern == "howto/[*.md"));
    }

    #[test]
    fn test_filesystem_source_populates_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("demo/sample_service/howto");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("guide.md"), "# Rotate Key\nStep 1\nStep 2\n").unwrap();

        let source = FilesystemSource::new(tmp.path());
        let chunks = source
            .load("demo", "sample_service", &globs(&["howto/**/*.md"]))
            .unwrap();

        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.org_id, "demo");
        assert_eq!(c.pack_id, "sample_service");
        assert_eq!(c.title, "guide.md");
        assert_eq!(c.url, "data/demo/sample_service/howto/guide.md");
        assert_eq!(c.source, "sample_service docs");
        assert_eq!(c.section_heading.as_deref(), Some("Rotate Key"));
        assert_eq!(c.text, "Step 1\nStep 2");
        let updated = c.updated_at.as_deref().unwrap();
        assert!(DateTime::parse_from_rfc3339(updated).is_ok());
    }

    #[test]
    fn test_filesystem_source_sorted_and_deduplicated() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("demo/p/howto");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::create_dir_all(dir.join(".hidden")).unwrap();
        std::fs::write(dir.join("b.md"), "bee").unwrap();
        std::fs::write(dir.join("a.md"), "ay").unwrap();
        std::fs::write(dir.join("nested/c.txt"), "sea").unwrap();
        std::fs::write(dir.join(".hidden/secret.md"), "no").unwrap();
        std::fs::write(dir.join("empty.md"), "   ").unwrap();

        let source = FilesystemSource::new(tmp.path());
        let chunks = source
            .load("demo", "p", &globs(&["howto/**/*.md", "howto/**/*.txt", "howto/*.md"]))
            .unwrap();
        let titles: Vec<_> = chunks.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["a.md", "b.md", "c.txt"]);
    }

    #[test]
    fn test_files_follow_glob_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("demo/p");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.md"), "ay").unwrap();
        std::fs::write(dir.join("z.txt"), "zed").unwrap();

        let source = FilesystemSource::new(tmp.path());
        let chunks = source.load("demo", "p", &globs(&["*.txt", "*.md"])).unwrap();
        let titles: Vec<_> = chunks.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["z.txt", "a.md"]);
    }

    #[test]
    fn test_missing_pack_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FilesystemSource::new(tmp.path());
        assert!(source.load("nobody", "nothing", &globs(&["**"])).unwrap().is_empty());
    }

    #[test]
    fn test_custom_chunking_splits_large_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("demo/p");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("big.md"), "x".repeat(250)).unwrap();

        let source = FilesystemSource::new(tmp.path()).with_chunking(100, 0);
        let chunks = source.load("demo", "p", &globs(&["*.md"])).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chunk_total == 3));
    }

    #[test]
    fn test_static_source_serves_by_partition() {
        let chunk = Chunk::new("demo", "p", "t", "u", "s", "text");
        let source = StaticSource::new().with_chunks("demo", "p", vec![chunk.clone()]);
        assert_eq!(source.load("demo", "p", &[]).unwrap(), vec![chunk]);
        assert!(source.load("other", "p", &[]).unwrap().is_empty());
    }
}
