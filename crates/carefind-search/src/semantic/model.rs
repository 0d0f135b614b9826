use anyhow::anyhow;
use carefind_core::{CarefindError, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "semantic-ort")]
use {
    anyhow::Context,
    ort::session::Session,
    ort::value::Tensor,
    std::sync::Mutex,
    tokenizers::{PaddingParams, Tokenizer, TruncationParams},
    tracing::{debug, info},
};

#[cfg(feature = "semantic-ort")]
const MODEL_FILE: &str = "onnx/model.onnx";
#[cfg(feature = "semantic-ort")]
const TOKENIZER_FILE: &str = "tokenizer.json";
#[cfg(feature = "semantic-ort")]
const MAX_SEQUENCE_TOKENS: usize = 256;

/// Sentence-transformer encoder backed by an ONNX Runtime session.
///
/// Token embeddings are mean-pooled over the attention mask, then
/// L2-normalized, matching how sentence-transformers produces sentence
/// vectors.
pub struct OnnxEncoder {
    model_id: String,
    #[cfg(feature = "semantic-ort")]
    session: Mutex<Session>,
    #[cfg(feature = "semantic-ort")]
    tokenizer: Tokenizer,
    #[cfg(feature = "semantic-ort")]
    needs_token_types: bool,
    #[cfg(feature = "semantic-ort")]
    dimension: usize,
}

impl OnnxEncoder {
    /// Load `model_id`, downloading its files into the cache on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CarefindError::ModelUnavailable`] if the files cannot be
    /// fetched, the runtime cannot start, or the crate was built without the
    /// `semantic-ort` feature.
    pub fn load(model_id: &str, cache_dir: Option<&Path>) -> Result<Self> {
        let dir = model_cache_dir(cache_dir, model_id)?;
        Self::load_from_dir(model_id, &dir)
            .map_err(|err| CarefindError::model(model_id, format!("{err:#}")))
    }

    #[cfg(feature = "semantic-ort")]
    fn load_from_dir(model_id: &str, dir: &Path) -> anyhow::Result<Self> {
        let model_path = ensure_file(model_id, dir, MODEL_FILE)?;
        let tokenizer_path = ensure_file(model_id, dir, TOKENIZER_FILE)?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| anyhow!("failed to load tokenizer: {err}"))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..TruncationParams::default()
            }))
            .map_err(|err| anyhow!("failed to configure truncation: {err}"))?;

        let session = Session::builder()
            .context("failed to create ONNX Runtime session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("failed to load model from {}", model_path.display()))?;
        let needs_token_types = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut encoder = Self {
            model_id: model_id.to_owned(),
            session: Mutex::new(session),
            tokenizer,
            needs_token_types,
            dimension: 0,
        };
        let sample = encoder.infer(&["dimension check"])?;
        encoder.dimension = sample.first().map_or(0, Vec::len);
        info!(
            model = model_id,
            dimension = encoder.dimension,
            "onnx encoder ready"
        );
        Ok(encoder)
    }

    #[cfg(not(feature = "semantic-ort"))]
    fn load_from_dir(_model_id: &str, _dir: &Path) -> anyhow::Result<Self> {
        Err(anyhow!(
            "ONNX runtime not compiled in; rebuild with `--features semantic`"
        ))
    }

    #[cfg(feature = "semantic-ort")]
    fn infer(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|err| anyhow!("tokenization failed: {err}"))?;
        let batch = encodings.len();
        let seq = encodings.first().map_or(0, |e| e.get_ids().len());

        let mut ids = Vec::with_capacity(batch * seq);
        let mut mask = Vec::with_capacity(batch * seq);
        let mut types = Vec::with_capacity(batch * seq);
        for encoding in &encodings {
            ids.extend(encoding.get_ids().iter().map(|&v| i64::from(v)));
            mask.extend(encoding.get_attention_mask().iter().map(|&v| i64::from(v)));
            types.extend(encoding.get_type_ids().iter().map(|&v| i64::from(v)));
        }
        let mask_for_pooling = mask.clone();

        let ids = Tensor::from_array(([batch, seq], ids))?;
        let mask = Tensor::from_array(([batch, seq], mask))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("onnx session lock poisoned"))?;
        let outputs = if self.needs_token_types {
            let types = Tensor::from_array(([batch, seq], types))?;
            session.run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask,
                "token_type_ids" => types,
            ])?
        } else {
            session.run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask,
            ])?
        };

        let (shape, hidden_states) = outputs[0].try_extract_tensor::<f32>()?;
        let hidden = shape
            .last()
            .copied()
            .and_then(|h| usize::try_from(h).ok())
            .context("model output has no hidden dimension")?;
        debug!(batch, seq, hidden, "onnx inference complete");

        Ok(mean_pool(hidden_states, &mask_for_pooling, batch, seq, hidden))
    }
}

#[cfg(feature = "semantic-ort")]
fn mean_pool(
    hidden_states: &[f32],
    mask: &[i64],
    batch: usize,
    seq: usize,
    hidden: usize,
) -> Vec<Vec<f32>> {
    (0..batch)
        .map(|b| {
            let mut pooled = vec![0.0_f32; hidden];
            let mut count = 0.0_f32;
            for t in 0..seq {
                if mask[b * seq + t] == 0 {
                    continue;
                }
                count += 1.0;
                let offset = (b * seq + t) * hidden;
                for (acc, value) in pooled.iter_mut().zip(&hidden_states[offset..offset + hidden]) {
                    *acc += value;
                }
            }
            if count > 0.0 {
                for value in &mut pooled {
                    *value /= count;
                }
            }
            super::l2_normalize(&mut pooled);
            pooled
        })
        .collect()
}

#[cfg(feature = "semantic-ort")]
impl super::Encoder for OnnxEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.infer(texts)
            .map_err(|err| CarefindError::model(&self.model_id, format!("{err:#}")))
    }
}

#[cfg(not(feature = "semantic-ort"))]
impl super::Encoder for OnnxEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        0
    }

    fn encode(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Err(CarefindError::model(
            &self.model_id,
            "ONNX runtime not compiled in",
        ))
    }
}

/// Directory holding the files of `model_id`.
///
/// `<base>/models/<model id with '/' replaced by '--'>`, where `<base>` is
/// `cache_dir` or `<OS cache dir>/carefind`.
///
/// # Errors
///
/// Returns [`CarefindError::ModelUnavailable`] when no cache directory is
/// configured and the OS does not provide one.
pub fn model_cache_dir(cache_dir: Option<&Path>, model_id: &str) -> Result<PathBuf> {
    let base = match cache_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::cache_dir()
            .map(|dir| dir.join("carefind"))
            .ok_or_else(|| CarefindError::model(model_id, "unable to determine OS cache directory"))?,
    };
    Ok(base.join("models").join(model_id.replace('/', "--")))
}

/// Return the cached path of `file`, downloading it first if missing.
#[cfg(feature = "semantic-ort")]
fn ensure_file(model_id: &str, dir: &Path, file: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(file);
    if path.is_file() {
        return Ok(path);
    }

    let parent = path
        .parent()
        .with_context(|| format!("model path '{}' has no parent directory", path.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("failed to create model cache directory {}", parent.display()))?;

    let url = format!("https://huggingface.co/{model_id}/resolve/main/{file}");
    info!(%url, "downloading model file");
    let response = ureq::get(&url)
        .call()
        .with_context(|| format!("failed to download {url}"))?;

    let temp_path = path.with_extension("part");
    let mut out = std::fs::File::create(&temp_path)
        .with_context(|| format!("failed to create {}", temp_path.display()))?;
    std::io::copy(&mut response.into_reader(), &mut out)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    std::fs::rename(&temp_path, &path).with_context(|| {
        format!(
            "failed to move downloaded model from {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(path)
}
