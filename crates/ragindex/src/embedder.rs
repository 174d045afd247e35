//! The embedding model as an external contract: `encode(texts, normalize) ->
//! unit-length vectors`. The service does not interpret the model identifier
//! string. A hash-based deterministic fake satisfies the contract for tests
//! without a native model dependency, grounded on the caching discipline of
//! the teacher's embedding model wrapper.

use std::num::NonZeroUsize;

use anyhow::Result;
use lru::LruCache;
use parking_lot::Mutex;

pub trait Embedder: Send + Sync {
    fn encode(&self, texts: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// Deterministic fake embedder: hashes each token into one of `dimension`
/// buckets. Two calls with the same text always produce the same vector,
/// which is all the test suite needs from an embedder.
pub struct HashEmbedder {
    dimension: usize,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl HashEmbedder {
    pub fn new(dimension: usize, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size.max(1)).unwrap();
        Self {
            dimension,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn embed_one(&self, text: &str, normalize: bool) -> Vec<f32> {
        if let Some(cached) = self.cache.lock().get(text) {
            return cached.clone();
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (i, token) in text.split_whitespace().enumerate() {
            let bucket = fnv1a(token) as usize % self.dimension;
            vector[bucket] += 1.0 + (i % 7) as f32 * 0.01;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[fnv1a(text) as usize % self.dimension] = 1.0;
        }

        if normalize {
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut vector {
                    *v /= norm;
                }
            }
        }

        self.cache.lock().put(text.to_string(), vector.clone());
        vector
    }
}

impl Embedder for HashEmbedder {
    fn encode(&self, texts: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t, normalize)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(s: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for b in s.bytes() {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}
