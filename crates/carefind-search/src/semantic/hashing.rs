//! Built-in feature-hashing encoder.
//!
//! Word unigrams and character trigrams are hashed with BLAKE3 into signed
//! buckets, then the vector is L2-normalized. Texts sharing words or word
//! fragments land close together. Output is fully deterministic, which makes
//! it the encoder of choice for tests and offline use.

use super::{Encoder, l2_normalize};
use carefind_core::Result;
use carefind_core::model::EMBEDDING_DIM;

/// Model id selecting [`HashingEncoder`].
pub const HASHING_MODEL_ID: &str = "hashing-384";

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct HashingEncoder;

impl HashingEncoder {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; EMBEDDING_DIM];
        let lowered = text.to_lowercase();
        let mut saw_feature = false;

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            saw_feature = true;
            add_feature(&mut vector, b"w", word, WORD_WEIGHT);

            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                add_feature(&mut vector, b"t", &trigram, TRIGRAM_WEIGHT);
            }
        }

        if !saw_feature {
            add_feature(&mut vector, b"e", "", WORD_WEIGHT);
        }

        l2_normalize(&mut vector);
        vector
    }
}

fn add_feature(vector: &mut [f32], kind: &[u8], feature: &str, weight: f32) {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind);
    hasher.update(b":");
    hasher.update(feature.as_bytes());
    let digest = hasher.finalize();
    let bytes = digest.as_bytes();

    let raw = u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]);
    // EMBEDDING_DIM fits in u64, and the remainder fits back in usize.
    let bucket = usize::try_from(raw % EMBEDDING_DIM as u64).unwrap_or_default();
    let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign * weight;
}

impl Encoder for HashingEncoder {
    fn model_id(&self) -> &str {
        HASHING_MODEL_ID
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| Self::embed(text)).collect())
    }
}
