use std::path::{Path, PathBuf};

use crate::core::config::Settings;

const REFERENCE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png"];

/// Local-disk storage for uploaded PDFs, rendered pages, and per-template
/// reference images.
#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    upload_dir: PathBuf,
    reference_dir: PathBuf,
}

impl StorageService {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let upload_dir = settings.storage().upload_dir.clone();
        std::fs::create_dir_all(&upload_dir)?;

        Ok(Self { upload_dir, reference_dir: settings.storage().reference_image_dir.clone() })
    }

    /// Writes an uploaded PDF under the upload directory. The stored name is
    /// prefixed with the submission id so concurrent uploads of the same
    /// filename never collide.
    pub(crate) async fn save_pdf(
        &self,
        submission_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> anyhow::Result<PathBuf> {
        let path = self.upload_dir.join(format!("{submission_id}_{}", sanitized_filename(filename)));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Target path for the rasterized first page of a submission.
    pub(crate) fn rendered_page_path(&self, submission_id: &str) -> PathBuf {
        self.upload_dir.join(format!("{submission_id}_page1.jpg"))
    }

    /// Resolves the reference image for a template id, trying each supported
    /// extension under the configured reference directory.
    pub(crate) fn resolve_reference(&self, template_id: &str) -> Option<PathBuf> {
        let stem = sanitized_filename(template_id);
        REFERENCE_EXTENSIONS
            .iter()
            .map(|ext| self.reference_dir.join(format!("{stem}.{ext}")))
            .find(|path| path.is_file())
    }

    pub(crate) fn reference_dir(&self) -> &Path {
        &self.reference_dir
    }
}

pub(crate) fn sanitized_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect();

    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::sanitized_filename;

    #[test]
    fn sanitized_filename_strips_path_separators() {
        assert_eq!(sanitized_filename("../../etc/passwd"), "....etcpasswd");
        assert_eq!(sanitized_filename("answer sheet.pdf"), "answersheet.pdf");
    }

    #[test]
    fn sanitized_filename_falls_back_on_empty() {
        assert_eq!(sanitized_filename("///"), "upload");
    }
}
