//! Offline embedder built from hashed features of a skill name.
//!
//! Each name contributes a heavily weighted "core" feature (lowercase
//! alphanumerics with a trailing `js` removed) plus its character trigrams.
//! "React", "ReactJS" and "React.js" share the core and most trigrams, so they
//! sit well inside the default clustering radius; names with different cores
//! are near-orthogonal. The core is spread over several buckets so a single
//! hash collision cannot merge two unrelated names.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{Embedder, EmbeddingError};

const MODEL_NAME: &str = "hashing-core-trigram-v2";
/// Buckets the core feature is spread over.
const CORE_HASHES: usize = 4;
/// Per-bucket weight of the core feature; trigrams weigh 1.
const CORE_WEIGHT: f32 = 4.0;
/// Suffixes that name the same technology ("Vue.js" is "Vue").
const STRIPPED_SUFFIXES: &[&str] = &["js"];

pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    /// Lowercase text with punctuation dropped, except the `+` and `#` that
    /// tell C, C++ and C# apart.
    fn compact(text: &str) -> String {
        text.to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '+' || *c == '#' || c.is_whitespace())
            .collect()
    }

    fn core(compact: &str) -> String {
        let joined: String = compact.split_whitespace().collect();
        STRIPPED_SUFFIXES
            .iter()
            .filter_map(|suffix| joined.strip_suffix(suffix))
            .find(|stem| stem.chars().count() >= 2)
            .map(str::to_string)
            .unwrap_or(joined)
    }

    fn trigrams(compact: &str) -> Vec<String> {
        let mut features = Vec::new();
        for word in compact.split_whitespace() {
            let padded: Vec<char> = format!("^{word}$").chars().collect();
            if padded.len() < 3 {
                features.push(padded.iter().collect());
                continue;
            }
            for window in padded.windows(3) {
                features.push(window.iter().collect());
            }
        }
        features
    }

    /// `(feature, weight)` pairs for `text`.
    fn features(text: &str) -> Vec<(String, f32)> {
        let compact = Self::compact(text);
        let core = Self::core(&compact);
        let mut features: Vec<(String, f32)> = Vec::new();
        if !core.is_empty() {
            features.extend((0..CORE_HASHES).map(|i| (format!("core{i}:{core}"), CORE_WEIGHT)));
        }
        features.extend(Self::trigrams(&compact).into_iter().map(|t| (t, 1.0)));
        features
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let raw = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        ((raw % self.dim as u64) as usize, sign)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0_f32; self.dim];
        for (feature, weight) in Self::features(text) {
            let (i, sign) = self.bucket(&feature);
            v[i] += sign * weight;
        }
        Ok(v)
    }
}
