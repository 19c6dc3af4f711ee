//! Vector embedding abstraction layer.
//!
//! The retrieval index only needs *some* text-to-vector mapping. The
//! bundled [`HashingEmbeddingProvider`] is deterministic and model-free:
//! lower-cased word tokens and character trigrams are hashed into a fixed
//! number of buckets and the result is L2-normalised, so texts sharing words
//! score high under cosine similarity. Bucketing uses 64-bit FNV-1a over
//! the feature's UTF-8 bytes, so stored vectors stay comparable across
//! builds and toolchains.
//!
//! With the `onnx` feature, `FastEmbedProvider` runs a local
//! `all-MiniLM-L6-v2` model through `fastembed`.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::{GmError, Result};
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
///
/// Implementations must be `Send + Sync` for use from async contexts.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    ///
    /// Returns a vector of `dimensions()` floats.
    ///
    /// # Errors
    ///
    /// Returns [`GmError::Embedding`] if no embedding can be produced.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed a batch of texts.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding in the batch fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Cosine similarity
// ---------------------------------------------------------------------------

/// Compute the cosine similarity between two embedding vectors.
///
/// Returns a value in \[-1.0, 1.0\]. Returns `0.0` if either vector has zero
/// magnitude or the dimensions differ.
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.0.len() != b.0.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut mag_a = 0.0_f32;
    let mut mag_b = 0.0_f32;

    for (x, y) in a.0.iter().zip(b.0.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

// ---------------------------------------------------------------------------
// Hashing provider
// ---------------------------------------------------------------------------

/// Feature-hashing embedder: words weigh 1.0, character trigrams 0.5.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dims: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider producing `dimensions`-wide vectors.
    ///
    /// # Errors
    ///
    /// Returns [`GmError::Config`] when `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(GmError::Config(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dims: dimensions })
    }

    fn bucket(&self, feature: &str) -> usize {
        // Modulo keeps the value below `dims`, which is a usize.
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (fnv1a(feature) % self.dims as u64) as usize;
        bucket
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the UTF-8 bytes of `s`.
fn fnv1a(s: &str) -> u64 {
    s.bytes()
        .fold(FNV_OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut raw = vec![0.0_f32; self.dims];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            raw[self.bucket(word)] += 1.0;

            let chars: Vec<char> = word.chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                raw[self.bucket(&format!("#{gram}"))] += 0.5;
            }
        }

        let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag < f32::EPSILON {
            return Ok(Embedding(raw));
        }
        Ok(Embedding(raw.into_iter().map(|x| x / mag).collect()))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }
}

// ---------------------------------------------------------------------------
// Stub provider
// ---------------------------------------------------------------------------

/// A stub embedding provider that returns zero-vectors.
///
/// Every similarity against it is `0.0`, which makes result ordering depend
/// only on insertion order. Selected with `retrieval.provider = "stub"`.
#[derive(Debug, Clone)]
pub struct StubEmbeddingProvider {
    dims: usize,
}

impl StubEmbeddingProvider {
    /// Create a new stub provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Default for StubEmbeddingProvider {
    fn default() -> Self {
        Self::new(16)
    }
}

impl EmbeddingProvider for StubEmbeddingProvider {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        Ok(Embedding(vec![0.0; self.dims]))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "stub-zero-vector"
    }
}

// ---------------------------------------------------------------------------
// ONNX provider
// ---------------------------------------------------------------------------

/// Local `all-MiniLM-L6-v2` embeddings (384 dimensions) via `fastembed`.
#[cfg(feature = "onnx")]
pub struct FastEmbedProvider {
    model: parking_lot::Mutex<fastembed::TextEmbedding>,
}

#[cfg(feature = "onnx")]
impl FastEmbedProvider {
    /// Output width of `all-MiniLM-L6-v2`.
    pub const DIMENSIONS: usize = 384;

    /// Load the model, downloading it into the fastembed cache on first use.
    ///
    /// # Errors
    ///
    /// Returns [`GmError::Embedding`] if the model cannot be loaded.
    pub fn new() -> Result<Self> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
            .map_err(|e| GmError::Embedding(format!("failed to load embedding model: {e}")))?;
        Ok(Self {
            model: parking_lot::Mutex::new(model),
        })
    }
}

#[cfg(feature = "onnx")]
impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| GmError::Embedding("model returned no embedding".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let vectors = self
            .model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| GmError::Embedding(e.to_string()))?;
        Ok(vectors.into_iter().map(Embedding).collect())
    }

    fn dimensions(&self) -> usize {
        Self::DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Build the provider named by `retrieval.provider`.
///
/// `"hashing"` and `"stub"` use `embedding_dimensions`; `"onnx"` needs the
/// `onnx` feature and always produces 384-wide vectors.
///
/// # Errors
///
/// Returns [`GmError::Config`] for an unknown name, a zero width, or
/// `"onnx"` in a build without the feature.
pub fn provider_from_config(config: &RetrievalConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbeddingProvider::new(config.embedding_dimensions)?)),
        "stub" => {
            if config.embedding_dimensions == 0 {
                return Err(GmError::Config(
                    "embedding_dimensions must be greater than zero".to_string(),
                ));
            }
            Ok(Arc::new(StubEmbeddingProvider::new(config.embedding_dimensions)))
        }
        #[cfg(feature = "onnx")]
        "onnx" => Ok(Arc::new(FastEmbedProvider::new()?)),
        #[cfg(not(feature = "onnx"))]
        "onnx" => Err(GmError::Config(
            "retrieval.provider = \"onnx\" requires the `onnx` feature".to_string(),
        )),
        other => Err(GmError::Config(format!("unknown embedding provider: {other}"))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let a = Embedding(vec![1.0, 0.0, 0.0]);
        let sim = cosine_similarity(&a, &a.clone());
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = Embedding(vec![1.0, 0.0]);
        let b = Embedding(vec![0.0, 1.0]);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_dimensions() {
        let a = Embedding(vec![1.0, 0.0]);
        let b = Embedding(vec![1.0, 0.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn hashing_is_deterministic_and_unit_length() {
        let provider = HashingEmbeddingProvider::new(64).expect("provider");
        let a = provider.embed("Un convoglio a sud di Napoli").expect("embed");
        let b = provider.embed("Un convoglio a sud di Napoli").expect("embed");
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 64);
        let mag: f32 = a.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((mag - 1.0).abs() < 1e-4, "magnitude {mag}");
    }

    #[test]
    fn shared_words_score_higher() {
        let provider = HashingEmbeddingProvider::new(256).expect("provider");
        let query = provider.embed("convoglio").expect("embed");
        let related = provider.embed("Voci di un convoglio a sud").expect("embed");
        let unrelated = provider.embed("Pericolo aggiornato a Caserta").expect("embed");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let provider = HashingEmbeddingProvider::new(8).expect("provider");
        let emb = provider.embed("  ...  ").expect("embed");
        assert!(emb.0.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(HashingEmbeddingProvider::new(0).is_err());
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a("a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a("foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn buckets_are_pinned() {
        let provider = HashingEmbeddingProvider::new(1024).expect("provider");
        assert_eq!(provider.bucket("a"), (0xaf63_dc4c_8601_ec8c_u64 % 1024) as usize);
        assert_eq!(provider.bucket("foobar"), (0x8594_4171_f739_67e8_u64 % 1024) as usize);
    }

    #[test]
    fn separate_instances_agree() {
        let a = HashingEmbeddingProvider::new(32).expect("provider");
        let b = HashingEmbeddingProvider::new(32).expect("provider");
        assert_eq!(
            a.embed("La guardia chiede il lasciapassare").expect("embed"),
            b.embed("La guardia chiede il lasciapassare").expect("embed")
        );
    }

    #[test]
    fn config_selects_provider() {
        let mut config = RetrievalConfig::default();
        assert_eq!(provider_from_config(&config).expect("hashing").model_name(), "feature-hashing");

        config.provider = "stub".to_string();
        config.embedding_dimensions = 12;
        let stub = provider_from_config(&config).expect("stub");
        assert_eq!(stub.model_name(), "stub-zero-vector");
        assert_eq!(stub.embed("qualcosa").expect("embed").0, vec![0.0; 12]);

        config.provider = "word2vec".to_string();
        assert!(matches!(provider_from_config(&config), Err(GmError::Config(_))));

        config.provider = "stub".to_string();
        config.embedding_dimensions = 0;
        assert!(provider_from_config(&config).is_err());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn onnx_without_feature_is_config_error() {
        let config = RetrievalConfig {
            provider: "onnx".to_string(),
            ..RetrievalConfig::default()
        };
        assert!(matches!(provider_from_config(&config), Err(GmError::Config(_))));
    }

    #[test]
    fn batch_embed_works() {
        let provider = StubEmbeddingProvider::new(8);
        let results = provider.embed_batch(&["hello", "world", "test"]).expect("batch");
        assert_eq!(results.len(), 3);
    }
}
