//! Embedding provider capability (spec §4.2). Default implementation is a
//! deterministic hash-based pseudo-embedding: token hashing projected into
//! a fixed-dim vector, then L2-normalized. No network calls, no clock.

use crate::error::CapabilityError;
use sha2::{Digest, Sha256};

pub trait EmbeddingProvider: Send + Sync {
    /// Dimension every vector this provider returns must have.
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError>;
}

pub struct HashEmbeddingProvider {
    dim: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn token_bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        let digest = hasher.finalize();
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % self.dim;
        // sign bit from a different byte so +/- contributions don't correlate
        // with the bucket index.
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        let mut vec = vec![0.0f32; self.dim];
        let normalized = text.to_ascii_lowercase();
        for token in normalized.split_whitespace() {
            let (bucket, sign) = self.token_bucket(token);
            vec[bucket] += sign;
        }
        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        Ok(vec)
    }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)) as f64
    }
}
