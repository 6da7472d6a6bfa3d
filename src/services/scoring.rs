//! Visual-similarity scoring between a rendered submission page and a
//! template reference image.

use std::path::Path;

use crate::core::config::Settings;
use crate::services::embedding::{EmbeddingError, ImageEmbedder};

#[derive(Debug, Clone)]
pub(crate) struct SimilarityScorer {
    embedder: ImageEmbedder,
}

impl SimilarityScorer {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self, EmbeddingError> {
        Ok(Self { embedder: ImageEmbedder::from_settings(settings)? })
    }

    /// Scores two image files in [0, 1]: cosine similarity of their
    /// embeddings rescaled from [-1, 1].
    pub(crate) fn score_files(
        &self,
        submission_image: &Path,
        reference_image: &Path,
    ) -> Result<f64, EmbeddingError> {
        let submission = self.embedder.embed_file(submission_image)?;
        let reference = self.embedder.embed_file(reference_image)?;
        Ok(rescale(cosine_similarity(&submission, &reference)))
    }

    pub(crate) fn is_stub(&self) -> bool {
        self.embedder.is_stub()
    }
}

/// Cosine similarity of two vectors. Embeddings are L2-normalized by the
/// embedder, but the norms are divided out anyway so arbitrary inputs stay
/// in [-1, 1].
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Rescales cosine in [-1, 1] to [0, 1], clamping float drift from the
/// f32 dot product.
fn rescale(cosine: f32) -> f64 {
    ((f64::from(cosine) + 1.0) / 2.0).clamp(0.0, 1.0)
}
