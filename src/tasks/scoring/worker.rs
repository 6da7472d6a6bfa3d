use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;
use crate::repositories;
use crate::services::rasterize;

pub(crate) async fn claim_next_submission(pool: &PgPool) -> Result<Option<String>> {
    let now = primitive_now_utc();
    repositories::submissions::claim_next_for_scoring(pool, now)
        .await
        .context("Failed to claim submission")
}

pub(crate) async fn process_submission(state: &AppState, submission_id: &str) -> Result<()> {
    let submission = fetch_submission(state.db(), submission_id)
        .await?
        .context("Submission not found")?;

    if submission.status != SubmissionStatus::Processing {
        tracing::info!(submission_id, status = ?submission.status, "Skipping scoring");
        return Ok(());
    }

    let Some(reference_path) = state.storage().resolve_reference(&submission.template_id) else {
        // Validated at submit time, but the file can disappear before a
        // worker picks the row up.
        metrics::counter!("scoring_jobs_total", "status" => "failed").increment(1);
        return fail_submission(
            state.db(),
            &submission.id,
            &format!(
                "Reference image for template '{}' not found under {}",
                submission.template_id,
                state.storage().reference_dir().display()
            ),
        )
        .await;
    };

    let rendered_path = match resolve_rendered_page(state, &submission).await {
        Ok(path) => path,
        Err(err) => {
            tracing::error!(submission_id, error = %err, "PDF rasterization failed");
            metrics::counter!("scoring_jobs_total", "status" => "failed").increment(1);
            return fail_submission(state.db(), &submission.id, &err.to_string()).await;
        }
    };

    let score = match score_blocking(state, rendered_path.clone(), reference_path).await? {
        Ok(score) => score,
        Err(err) => {
            tracing::error!(submission_id, error = %err, "Similarity scoring failed");
            metrics::counter!("scoring_jobs_total", "status" => "failed").increment(1);
            return fail_submission(state.db(), &submission.id, &err.to_string()).await;
        }
    };

    let scored_at = primitive_now_utc();
    let started_at = submission.scoring_started_at.unwrap_or(scored_at);
    let duration = (scored_at.assume_utc() - started_at.assume_utc()).as_seconds_f64();
    let queue_latency =
        (started_at.assume_utc() - submission.created_at.assume_utc()).as_seconds_f64();

    repositories::submissions::mark_scored(
        state.db(),
        &submission.id,
        repositories::submissions::ScoredUpdate {
            score,
            rendered_path: &rendered_path.to_string_lossy(),
            scored_at,
        },
    )
    .await
    .context("Failed to update submission")?;

    metrics::counter!("scoring_jobs_total", "status" => "success").increment(1);
    metrics::histogram!("scoring_duration_seconds").record(duration);
    metrics::histogram!("scoring_queue_latency_seconds").record(queue_latency);

    tracing::info!(submission_id, score, "Similarity scoring succeeded");

    Ok(())
}

/// Marks a submission failed after an unexpected worker error (the error has
/// already been logged by the caller).
pub(crate) async fn fail_submission_on_unexpected_error(
    state: &AppState,
    submission_id: &str,
    reason: &str,
) -> Result<()> {
    fail_submission(state.db(), submission_id, reason).await
}

/// A retried row may already carry a rendered page from an earlier attempt;
/// reuse it instead of rasterizing the PDF again. The path is persisted
/// right after rendering so it survives a later scoring failure.
async fn resolve_rendered_page(state: &AppState, submission: &Submission) -> Result<PathBuf> {
    if let Some(existing) = submission.rendered_path.as_deref().map(PathBuf::from) {
        if existing.is_file() {
            return Ok(existing);
        }
    }

    let rendered_path = state.storage().rendered_page_path(&submission.id);
    rasterize::render_first_page(
        Path::new(&submission.file_path),
        &rendered_path,
        state.settings().scoring().max_render_pixels,
    )
    .await?;

    repositories::submissions::set_rendered_path(
        state.db(),
        &submission.id,
        &rendered_path.to_string_lossy(),
        primitive_now_utc(),
    )
    .await
    .context("Failed to record rendered page")?;

    Ok(rendered_path)
}

/// The candle forward pass is CPU-bound, so it runs off the async runtime.
async fn score_blocking(
    state: &AppState,
    rendered_path: PathBuf,
    reference_path: PathBuf,
) -> Result<Result<f64, crate::services::embedding::EmbeddingError>> {
    let scorer = state.scorer().clone();
    tokio::task::spawn_blocking(move || scorer.score_files(&rendered_path, &reference_path))
        .await
        .context("Scoring task panicked")
}

async fn fetch_submission(pool: &PgPool, submission_id: &str) -> Result<Option<Submission>> {
    repositories::submissions::find_by_id(pool, submission_id)
        .await
        .context("Failed to fetch submission")
}

async fn fail_submission(pool: &PgPool, submission_id: &str, reason: &str) -> Result<()> {
    let now = primitive_now_utc();
    repositories::submissions::mark_failed(pool, submission_id, reason, now)
        .await
        .context("Failed to mark submission failed")?;

    Ok(())
}
