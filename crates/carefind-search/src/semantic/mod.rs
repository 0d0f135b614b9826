//! Embedding model provider.
//!
//! Turns text into fixed-length, L2-normalized vectors. Two encoders exist:
//! - [`HashingEncoder`]: feature hashing, built in, no model files
//! - [`OnnxEncoder`]: a sentence-transformer run through ONNX Runtime
//!   (needs the `semantic-ort` feature)
//!
//! The loaded encoder is passed around explicitly as `Arc<dyn Encoder>`; the
//! same instance must embed providers at ingestion and queries at search.

mod hashing;
mod model;

pub use hashing::{HASHING_MODEL_ID, HashingEncoder};
pub use model::{OnnxEncoder, model_cache_dir};

use carefind_core::config::EmbeddingConfig;
use carefind_core::model::EMBEDDING_DIM;
use carefind_core::{CarefindError, Result};
use std::sync::Arc;
use tracing::info;

/// Whether this build can run ONNX sentence-transformer models.
pub const ONNX_RUNTIME_AVAILABLE: bool = cfg!(feature = "semantic-ort");

/// A text embedding model.
pub trait Encoder: Send + Sync {
    /// Identifier recorded in store metadata.
    fn model_id(&self) -> &str;

    /// Length of every vector this encoder returns.
    fn dimension(&self) -> usize;

    /// Embed `texts`, returning one vector per input in input order.
    ///
    /// # Errors
    ///
    /// Returns [`CarefindError::ModelUnavailable`] if inference fails.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns [`CarefindError::ModelUnavailable`] if inference fails.
    fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[text])?
            .pop()
            .ok_or_else(|| CarefindError::model(self.model_id(), "encoder returned no vector"))
    }
}

/// Load the encoder named by `config.model`.
///
/// `hashing-384` selects the built-in [`HashingEncoder`]; any other value is
/// treated as a Hugging Face model id and loaded through [`OnnxEncoder`].
///
/// # Errors
///
/// Returns [`CarefindError::ModelUnavailable`] when the model cannot be
/// fetched or initialized, or when its output dimension is not
/// [`EMBEDDING_DIM`].
pub fn load_encoder(config: &EmbeddingConfig) -> Result<Arc<dyn Encoder>> {
    let model = config.model.trim();
    let encoder: Arc<dyn Encoder> = if model == HASHING_MODEL_ID {
        Arc::new(HashingEncoder::new())
    } else {
        Arc::new(OnnxEncoder::load(model, config.cache_dir.as_deref())?)
    };

    if encoder.dimension() != EMBEDDING_DIM {
        return Err(CarefindError::model(
            model,
            format!(
                "model produces {}-dimensional vectors, store requires {EMBEDDING_DIM}",
                encoder.dimension()
            ),
        ));
    }

    info!(model = encoder.model_id(), "embedding model loaded");
    Ok(encoder)
}

/// Encode `texts` and check the output shape: one finite vector of
/// [`EMBEDDING_DIM`] per input.
///
/// # Errors
///
/// Returns [`CarefindError::ModelUnavailable`] if the encoder fails or its
/// output does not have the expected shape.
pub fn encode_checked(encoder: &dyn Encoder, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
    let vectors = encoder.encode(texts)?;
    if vectors.len() != texts.len() {
        return Err(CarefindError::model(
            encoder.model_id(),
            format!(
                "encoder returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            ),
        ));
    }
    if let Some(bad) = vectors
        .iter()
        .find(|v| v.len() != EMBEDDING_DIM || v.iter().any(|x| !x.is_finite()))
    {
        return Err(CarefindError::model(
            encoder.model_id(),
            format!(
                "encoder returned a malformed vector (len {}, expected {EMBEDDING_DIM})",
                bad.len()
            ),
        ));
    }
    Ok(vectors)
}

/// Scale `vector` to unit Euclidean length in place. Zero vectors are left
/// untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Euclidean distance between two vectors of equal length.
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
