use anyhow::{Context, Result};
use time::Duration;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;

/// Requeues rows stuck in `processing` past the staleness window. Covers
/// workers that died between claiming and finishing a row. Rows with no
/// retry budget left are failed instead of requeued.
pub(crate) async fn recover_stale_submissions(state: &AppState) -> Result<()> {
    let now = primitive_now_utc();
    let stale_before =
        now - Duration::seconds(state.settings().scoring().stale_after_seconds as i64);
    let max_retries = state.settings().scoring().max_retries as i32;

    let recovered = repositories::submissions::recover_stale_processing(
        state.db(),
        stale_before,
        max_retries,
        now,
    )
    .await
    .context("Failed to recover stale submissions")?;

    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "Requeued stale processing submissions");
        metrics::counter!("scoring_stale_recovered_total").increment(recovered.len() as u64);
    }

    let exhausted = repositories::submissions::fail_stale_processing(
        state.db(),
        stale_before,
        max_retries,
        now,
    )
    .await
    .context("Failed to fail stale submissions past the retry limit")?;

    if !exhausted.is_empty() {
        tracing::warn!(count = exhausted.len(), "Failed stale submissions out of retries");
        metrics::counter!("scoring_stale_failed_total").increment(exhausted.len() as u64);
    }

    Ok(())
}

/// Requeues failed rows that still have retry budget left.
pub(crate) async fn retry_failed_submissions(state: &AppState) -> Result<()> {
    let now = primitive_now_utc();
    let max_retries = state.settings().scoring().max_retries as i32;

    let requeued = repositories::submissions::requeue_failed(state.db(), max_retries, now)
        .await
        .context("Failed to requeue failed submissions")?;

    if !requeued.is_empty() {
        tracing::info!(count = requeued.len(), "Requeued failed submissions for retry");
        metrics::counter!("scoring_retries_total").increment(requeued.len() as u64);
    }

    Ok(())
}
