use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use lexdb_core::traits::EmbeddingModel;

/// Skipped when hashing.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "any", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on", "or",
    "shall", "that", "the", "this", "to", "was", "what", "which", "with",
];

/// Hashed bag-of-words vectors. Deterministic, L2-normalised, no model files.
/// Texts sharing words land close together, which is enough for tests.
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), id: format!("fake:{dim}") }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .filter(|t| !STOP_WORDS.contains(&t.as_str()));
        for token in tokens {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            #[allow(clippy::cast_possible_truncation)]
            let idx = (h as usize) % self.dim;
            #[allow(clippy::cast_precision_loss)]
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += 0.5 + val;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingModel for FakeEmbedder {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.vector(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn normalised_and_deterministic() {
        let e = FakeEmbedder::new(64);
        let a = e.vector("Punishment for theft");
        let b = e.vector("Punishment for theft");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm={norm}");
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = FakeEmbedder::new(16);
        assert!(e.vector("").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn shared_words_score_higher() {
        let e = FakeEmbedder::new(4096);
        let q = e.vector("What is the punishment for theft?");
        let near = e.vector("Whoever commits theft shall be punished");
        let far = e.vector("Registration of marriages under special provisions");
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }
}
