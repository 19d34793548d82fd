//! Embedding Backends
//!
//! Text → fixed-length vector. Two backends:
//!
//! - [`FastEmbedder`]: local all-MiniLM-L6-v2 inference via `fastembed`
//!   (384 dimensions), behind the `embeddings` cargo feature. The model is
//!   loaded lazily on first use.
//! - [`HashingEmbedder`]: feature hashing of word and character-trigram
//!   tokens. No model download; useful offline and in tests.
//!
//! Every vector is L2-normalized so an inner product equals cosine similarity.

use std::sync::Arc;
use tracing::warn;

use crate::MemoryResult;
use crate::config::{EmbeddingBackend, SemanticConfig};

/// Embedding dimensions for all-MiniLM-L6-v2
pub const MINILM_DIMENSIONS: usize = 384;

/// A text embedding backend
pub trait Embedder: Send + Sync {
    /// Backend name, recorded alongside persisted vectors
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// Embed one text into a normalized vector of `dimensions()` length
    fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;
}

/// Pick the embedder for a configuration; `None` means the vector layer is inert
pub fn select_embedder(config: &SemanticConfig) -> Option<Arc<dyn Embedder>> {
    match config.backend {
        EmbeddingBackend::Disabled => None,
        EmbeddingBackend::Hashing => Some(Arc::new(HashingEmbedder::new(config.dimensions))),
        EmbeddingBackend::Auto => fastembed_backend(),
        EmbeddingBackend::FastEmbed => {
            let backend = fastembed_backend();
            if backend.is_none() {
                warn!("fastembed backend requested but the `embeddings` feature is not compiled in");
            }
            backend
        }
    }
}

#[cfg(feature = "embeddings")]
fn fastembed_backend() -> Option<Arc<dyn Embedder>> {
    Some(Arc::new(FastEmbedder::new()))
}

#[cfg(not(feature = "embeddings"))]
fn fastembed_backend() -> Option<Arc<dyn Embedder>> {
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// fastembed
// ─────────────────────────────────────────────────────────────────────────────

/// Local sentence embeddings (all-MiniLM-L6-v2)
#[cfg(feature = "embeddings")]
pub struct FastEmbedder {
    model: std::sync::Mutex<Option<fastembed::TextEmbedding>>,
}

#[cfg(feature = "embeddings")]
impl Default for FastEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "embeddings")]
impl FastEmbedder {
    pub fn new() -> Self {
        Self {
            model: std::sync::Mutex::new(None),
        }
    }

    fn load_model() -> MemoryResult<fastembed::TextEmbedding> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        tracing::info!("Loading embedding model: all-MiniLM-L6-v2");
        let start = std::time::Instant::now();

        let mut init_options = InitOptions::default();
        init_options.model_name = EmbeddingModel::AllMiniLML6V2;
        init_options.show_download_progress = false;

        let model = TextEmbedding::try_new(init_options).map_err(|e| {
            crate::MemoryError::embedding(format!("Failed to load embedding model: {}", e))
        })?;

        tracing::info!("Embedding model loaded in {:?}", start.elapsed());
        Ok(model)
    }
}

#[cfg(feature = "embeddings")]
impl Embedder for FastEmbedder {
    fn name(&self) -> &str {
        "fastembed/all-MiniLM-L6-v2"
    }

    fn dimensions(&self) -> usize {
        MINILM_DIMENSIONS
    }

    fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        use crate::MemoryError;

        let mut guard = self
            .model
            .lock()
            .map_err(|_| MemoryError::embedding("embedding model lock poisoned"))?;
        if guard.is_none() {
            *guard = Some(Self::load_model()?);
        }
        let model = guard
            .as_mut()
            .ok_or_else(|| MemoryError::embedding("Embedding model not initialized"))?;

        let mut vector = model
            .embed(vec![text], None)
            .map_err(|e| MemoryError::embedding(format!("Failed to generate embedding: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::embedding("No embedding generated"))?;

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feature hashing
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic bag-of-tokens embedder.
///
/// Words hash with weight 1.0, character trigrams with weight 0.5, each into
/// a signed bucket chosen by md5 of the token.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn add_token(&self, vector: &mut [f32], token: &str, weight: f32) {
        let digest = md5::compute(token.as_bytes());
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % self.dimensions;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            self.add_token(&mut vector, word, 1.0);

            let chars: Vec<char> = word.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    self.add_token(&mut vector, &format!("#{}", trigram), 0.5);
                }
            }
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vector math
// ─────────────────────────────────────────────────────────────────────────────

/// Scale to unit length in place; zero vectors are left as-is
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Compute cosine similarity between two vectors
///
/// Returns a value between -1.0 and 1.0; mismatched lengths and zero vectors
/// score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
