//! ViT image embedding via candle.
//!
//! Loads a vit-base-patch16-224 checkpoint from safetensors and pools the
//! CLS token as the image embedding. A deterministic stub backend
//! (`EMBEDDING_STUB=1`) serves tests and deployments without model weights.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{layer_norm, LayerNorm, VarBuilder};
use candle_transformers::models::vit::{Config, Embeddings, Encoder};
use thiserror::Error;

use crate::core::config::Settings;

pub(crate) const EMBEDDING_DIM: usize = 768;
const IMAGE_SIZE: u32 = 224;

#[derive(Debug, Error)]
pub(crate) enum EmbeddingError {
    #[error("embedding model not found at {path}")]
    ModelNotFound { path: PathBuf },
    #[error("EMBEDDING_MODEL_PATH is required (stub mode is disabled)")]
    ModelPathMissing,
    #[error("failed to load embedding model: {reason}")]
    ModelLoadFailed { reason: String },
    #[error("failed to load image {path}: {reason}")]
    ImageLoadFailed { path: PathBuf, reason: String },
    #[error("inference failed: {reason}")]
    InferenceFailed { reason: String },
}

impl From<candle_core::Error> for EmbeddingError {
    fn from(err: candle_core::Error) -> Self {
        Self::InferenceFailed { reason: err.to_string() }
    }
}

struct VitForEmbeddingImpl {
    embeddings: Embeddings,
    encoder: Encoder,
    layernorm: LayerNorm,
}

impl VitForEmbeddingImpl {
    fn load(vb: VarBuilder, config: &Config) -> candle_core::Result<Self> {
        // Classification checkpoints nest the backbone under a "vit" prefix;
        // bare ViTModel exports do not.
        let vb = if vb.contains_tensor("vit.embeddings.cls_token") { vb.pp("vit") } else { vb };

        let embeddings = Embeddings::new(config, false, vb.pp("embeddings"))?;
        let encoder = Encoder::new(config, vb.pp("encoder"))?;
        let layernorm = layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("layernorm"))?;

        Ok(Self { embeddings, encoder, layernorm })
    }

    fn forward(&self, pixel_values: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.embeddings.forward(pixel_values, None, false)?;
        let hidden = self.encoder.forward(&hidden)?;
        let hidden = self.layernorm.forward(&hidden)?;
        // CLS token as the image embedding
        hidden.i((.., 0, ..))
    }
}

enum EmbedderBackend {
    Model { model: Arc<VitForEmbeddingImpl>, device: Device },
    Stub,
}

/// Image embedding generator (supports stub mode).
#[derive(Clone)]
pub(crate) struct ImageEmbedder {
    backend: Arc<EmbedderBackend>,
}

impl std::fmt::Debug for ImageEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend.as_ref() {
            EmbedderBackend::Model { device, .. } => format!("Model({device:?})"),
            EmbedderBackend::Stub => "Stub".to_string(),
        };
        f.debug_struct("ImageEmbedder").field("backend", &backend).finish()
    }
}

impl ImageEmbedder {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self, EmbeddingError> {
        if settings.embedding().testing_stub {
            tracing::warn!("Image embedder running in STUB mode (testing only)");
            return Ok(Self { backend: Arc::new(EmbedderBackend::Stub) });
        }

        let model_path =
            settings.embedding().model_path.as_deref().ok_or(EmbeddingError::ModelPathMissing)?;
        Self::load(model_path)
    }

    pub(crate) fn load(model_path: &Path) -> Result<Self, EmbeddingError> {
        if !model_path.exists() {
            return Err(EmbeddingError::ModelNotFound { path: model_path.to_path_buf() });
        }

        let device = select_device();
        let config = Config::vit_base_patch16_224();

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_path], DType::F32, &device).map_err(
                |e| EmbeddingError::ModelLoadFailed { reason: e.to_string() },
            )?
        };

        let model = VitForEmbeddingImpl::load(vb, &config)
            .map_err(|e| EmbeddingError::ModelLoadFailed { reason: e.to_string() })?;

        tracing::info!(
            model_path = %model_path.display(),
            hidden_size = config.hidden_size,
            num_layers = config.num_hidden_layers,
            "ViT embedding model loaded"
        );

        Ok(Self { backend: Arc::new(EmbedderBackend::Model { model: Arc::new(model), device }) })
    }

    /// Embeds an image file into an L2-normalized vector.
    pub(crate) fn embed_file(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError> {
        match self.backend.as_ref() {
            EmbedderBackend::Model { model, device } => {
                let pixel_values = preprocess(path, device)?;
                let embedding = model.forward(&pixel_values)?.squeeze(0)?.to_vec1::<f32>()?;
                Ok(normalize(embedding))
            }
            EmbedderBackend::Stub => embed_stub(path),
        }
    }

    pub(crate) fn is_stub(&self) -> bool {
        matches!(self.backend.as_ref(), EmbedderBackend::Stub)
    }
}

/// Resizes to 224x224 RGB and applies the ViT feature-extractor
/// normalization: `(x / 255 - 0.5) / 0.5`.
fn preprocess(path: &Path, device: &Device) -> Result<Tensor, EmbeddingError> {
    let img = image::open(path)
        .map_err(|e| EmbeddingError::ImageLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .resize_exact(IMAGE_SIZE, IMAGE_SIZE, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let data = img.into_raw();
    let pixel_values = Tensor::from_vec(data, (IMAGE_SIZE as usize, IMAGE_SIZE as usize, 3), device)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(2.0 / 255.0, -1.0)?;

    Ok(pixel_values.unsqueeze(0)?)
}

fn embed_stub(path: &Path) -> Result<Vec<f32>, EmbeddingError> {
    use std::hash::{DefaultHasher, Hash, Hasher};

    let bytes = std::fs::read(path).map_err(|e| EmbeddingError::ImageLoadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    let seed = hasher.finish();

    let mut embedding = Vec::with_capacity(EMBEDDING_DIM);
    let mut state = seed;
    for _ in 0..EMBEDDING_DIM {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let value = ((state >> 32) as f32 / u32::MAX as f32) * 2.0 - 1.0;
        embedding.push(value);
    }

    Ok(normalize(embedding))
}

fn normalize(mut embedding: Vec<f32>) -> Vec<f32> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 {
        for x in &mut embedding {
            *x /= norm;
        }
    }

    embedding
}

fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                tracing::info!("Using Metal GPU acceleration");
                return device;
            }
            Err(e) => tracing::warn!(error = %e, "Metal device unavailable"),
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                tracing::info!("Using CUDA GPU acceleration");
                return device;
            }
            Err(e) => tracing::warn!(error = %e, "CUDA device unavailable"),
        }
    }

    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write");
        file
    }

    #[test]
    fn stub_embedding_is_deterministic_and_normalized() {
        let file = write_temp(b"same bytes");
        let a = embed_stub(file.path()).expect("embed");
        let b = embed_stub(file.path()).expect("embed");

        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[test]
    fn stub_embeddings_differ_across_contents() {
        let a = embed_stub(write_temp(b"first").path()).expect("embed");
        let b = embed_stub(write_temp(b"second").path()).expect("embed");
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_handles_zero_vector() {
        let zero = normalize(vec![0.0; 4]);
        assert_eq!(zero, vec![0.0; 4]);
    }
}
