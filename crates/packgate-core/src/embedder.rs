//! Embedding capability consumed by the document index.
//!
//! The index only needs `embed(text) -> fixed-length unit vector`. Two
//! model-free implementations are provided:
//!
//! - [`HashEmbedder`]: a deterministic digest-seeded vector per text. Carries
//!   no semantics; the lexical half of the hybrid score does the work.
//! - [`TermHashEmbedder`]: hashes terms into buckets weighted by frequency,
//!   so texts sharing vocabulary land close together.

use std::collections::HashMap;

/// Produces fixed-length, L2-normalised vectors.
///
/// Implementations must return the zero vector for empty input and a vector
/// of exactly [`dimensions`](Embedder::dimensions) components otherwise.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;

    fn dimensions(&self) -> usize;

    /// Short identifier reported in diagnostics.
    fn name(&self) -> &str;
}

/// Digest-seeded pseudo-random embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// A zero `dimensions` is raised to one.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return vec![0.0; self.dimensions];
        }

        let mut reader = blake3::Hasher::new()
            .update(text.as_bytes())
            .finalize_xof();
        let mut bytes = vec![0u8; self.dimensions * 4];
        reader.fill(&mut bytes);

        let mut vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|word| {
                let raw = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                ((raw as f64 / u32::MAX as f64) * 2.0 - 1.0) as f32
            })
            .collect();
        normalize(&mut vector);
        vector
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Term-frequency embedder over FNV-1a hashed buckets.
#[derive(Debug, Clone)]
pub struct TermHashEmbedder {
    dimensions: usize,
}

impl TermHashEmbedder {
    /// A zero `dimensions` is raised to one so bucketing never divides by zero.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }
}

impl Default for TermHashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for TermHashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let terms: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| s.len() >= 2)
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return vector;
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for term in &terms {
            *tf.entry(term.as_str()).or_default() += 1.0;
        }
        let total = terms.len() as f32;
        for (term, count) in tf {
            // Longer terms are rarer; weight them up a little.
            let idf = 1.0 + (term.len() as f32).ln();
            vector[Self::bucket(term, self.dimensions)] += (count / total) * idf;
        }

        normalize(&mut vector);
        vector
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "term_hash"
    }
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Dot product; equals cosine similarity for unit vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
