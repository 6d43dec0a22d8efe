//! Offline embedder based on signed feature hashing.
//!
//! Each text is reduced to lower-cased word stems plus character trigrams of
//! those stems. Every feature is hashed with SHA-256 into one of `dimension`
//! buckets with a ±1 sign, and the resulting vector is L2-normalised, so the
//! squared Euclidean distance between two embeddings is `2 - 2·cos`.
//!
//! The output depends only on the input text, which keeps stores reproducible
//! across processes and platforms.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::provider::Embedder;
use crate::core::errors::PipelineError;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("word pattern is valid"))
}

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model_id: format!("hashing-v1-{}", dimension.max(1)),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in word_pattern().find_iter(&lowered) {
            let stem = stem(word.as_str());
            self.accumulate(&mut vector, &format!("w:{}", stem), WORD_WEIGHT);

            let padded: Vec<char> = format!("#{}#", stem).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.accumulate(&mut vector, &format!("c:{}", trigram), TRIGRAM_WEIGHT);
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for value in vector.iter_mut() {
                *value /= norm;
            }
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % self.dimension;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(crate::core::config::DEFAULT_EMBEDDING_DIMENSION)
    }
}

/// Plural folding: "mammals" -> "mammal", "stories" -> "story".
fn stem(word: &str) -> String {
    let len = word.chars().count();
    if len > 4 {
        if let Some(base) = word.strip_suffix("ies") {
            return format!("{}y", base);
        }
    }
    if len > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    #[test]
    fn stem_folds_simple_plurals() {
        assert_eq!(stem("mammals"), "mammal");
        assert_eq!(stem("stories"), "story");
        assert_eq!(stem("glass"), "glass");
        assert_eq!(stem("corpus"), "corpus");
        assert_eq!(stem("is"), "is");
    }

    #[test]
    fn embeddings_are_normalised_and_sized() {
        let embedder = HashingEmbedder::default();
        let vector = embedder.embed_text("Rockets use liquid fuel.");

        assert_eq!(vector.len(), 384);
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn embeddings_are_deterministic() {
        let a = HashingEmbedder::new(384).embed_text("cats are mammals");
        let b = HashingEmbedder::new(384).embed_text("cats are mammals");
        assert_eq!(a, b);
    }

    #[test]
    fn blank_text_embeds_to_zero_vector() {
        let vector = HashingEmbedder::default().embed_text("  ...  ");
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn related_text_is_closer_than_unrelated_text() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_text("mammal pets");
        let cats = embedder.embed_text("cats are mammals");
        let rockets = embedder.embed_text("rockets use fuel");

        assert!(squared_distance(&query, &cats) < squared_distance(&query, &rockets));
    }

    #[tokio::test]
    async fn embed_preserves_input_order() {
        let embedder = HashingEmbedder::default();
        let inputs = vec!["alpha".to_string(), "beta".to_string()];
        let vectors = embedder.embed(&inputs).await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], embedder.embed_text("alpha"));
        assert_eq!(vectors[1], embedder.embed_text("beta"));
    }
}
