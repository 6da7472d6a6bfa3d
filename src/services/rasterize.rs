//! PDF rasterization: render the first page of a submission to a JPEG.
//!
//! pdfium wraps a C++ library with thread-local state that must not run on
//! async worker threads, so rendering happens inside `spawn_blocking`. The
//! output size is capped by longest edge rather than DPI so page geometry
//! cannot blow up memory.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use pdfium_render::prelude::*;

/// Renders page one of `pdf_path` to `output_path` as a JPEG and returns the
/// output path.
pub(crate) async fn render_first_page(
    pdf_path: &Path,
    output_path: &Path,
    max_pixels: u32,
) -> anyhow::Result<PathBuf> {
    let pdf_path = pdf_path.to_path_buf();
    let output_path = output_path.to_path_buf();

    tokio::task::spawn_blocking(move || render_first_page_blocking(&pdf_path, &output_path, max_pixels))
        .await
        .context("Render task panicked")?
}

fn render_first_page_blocking(
    pdf_path: &Path,
    output_path: &Path,
    max_pixels: u32,
) -> anyhow::Result<PathBuf> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| anyhow!("Failed to open PDF {}: {e:?}", pdf_path.display()))?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(anyhow!("PDF {} has no pages", pdf_path.display()));
    }

    let page = pages.get(0).map_err(|e| anyhow!("Failed to load page 1: {e:?}"))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| anyhow!("Failed to rasterize page 1: {e:?}"))?;

    let image = bitmap.as_image();
    tracing::debug!(
        pdf = %pdf_path.display(),
        width = image.width(),
        height = image.height(),
        "Rendered first page"
    );

    image
        .into_rgb8()
        .save(output_path)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    Ok(output_path.to_path_buf())
}
