use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;

use super::types::{CreateSubmission, ScoredUpdate, COLUMNS};

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateSubmission<'_>,
) -> Result<Submission, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO submissions \
            (id, template_id, student_name, student_roll_number, file_path, score, status, \
             retry_count, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, 0.0, $6, 0, $7, $7) \
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.template_id)
    .bind(params.student_name)
    .bind(params.student_roll_number)
    .bind(params.file_path)
    .bind(SubmissionStatus::Pending)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

/// Claims the oldest pending submission for scoring, atomically moving it to
/// `processing`. `FOR UPDATE SKIP LOCKED` keeps concurrent workers from
/// claiming the same row.
pub(crate) async fn claim_next_for_scoring(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "WITH candidate AS (
            SELECT id
            FROM submissions
            WHERE status = $1
            ORDER BY retry_count, created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE submissions
        SET status = $2,
            scoring_started_at = $3,
            score_error = NULL,
            updated_at = $3
        FROM candidate
        WHERE submissions.id = candidate.id
        RETURNING submissions.id",
    )
    .bind(SubmissionStatus::Pending)
    .bind(SubmissionStatus::Processing)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Records where the rasterized first page landed, so a retry after a
/// scoring failure can reuse it instead of rendering again.
pub(crate) async fn set_rendered_path(
    pool: &PgPool,
    submission_id: &str,
    rendered_path: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE submissions
         SET rendered_path = $1,
             updated_at = $2
         WHERE id = $3",
    )
    .bind(rendered_path)
    .bind(now)
    .bind(submission_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn mark_scored(
    pool: &PgPool,
    submission_id: &str,
    params: ScoredUpdate<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE submissions
         SET status = $1,
             score = $2,
             rendered_path = $3,
             scored_at = $4,
             score_error = NULL,
             updated_at = $4
         WHERE id = $5",
    )
    .bind(SubmissionStatus::Scored)
    .bind(params.score)
    .bind(params.rendered_path)
    .bind(params.scored_at)
    .bind(submission_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn mark_failed(
    pool: &PgPool,
    submission_id: &str,
    reason: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE submissions
         SET status = $1,
             score_error = $2,
             updated_at = $3
         WHERE id = $4",
    )
    .bind(SubmissionStatus::Failed)
    .bind(reason)
    .bind(now)
    .bind(submission_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn requeue_failed(
    pool: &PgPool,
    max_retries: i32,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE submissions
         SET status = $1,
             retry_count = retry_count + 1,
             scoring_started_at = NULL,
             updated_at = $2
         WHERE status = $3
           AND retry_count < $4
         RETURNING id",
    )
    .bind(SubmissionStatus::Pending)
    .bind(now)
    .bind(SubmissionStatus::Failed)
    .bind(max_retries)
    .fetch_all(pool)
    .await
}

/// Returns rows stuck in `processing` (a worker crashed mid-scoring) back to
/// the pending queue, as long as they still have retry budget.
pub(crate) async fn recover_stale_processing(
    pool: &PgPool,
    stale_before: PrimitiveDateTime,
    max_retries: i32,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE submissions
         SET status = $1,
             retry_count = retry_count + 1,
             scoring_started_at = NULL,
             updated_at = $2
         WHERE status = $3
           AND scoring_started_at IS NOT NULL
           AND scoring_started_at < $4
           AND retry_count < $5
         RETURNING id",
    )
    .bind(SubmissionStatus::Pending)
    .bind(now)
    .bind(SubmissionStatus::Processing)
    .bind(stale_before)
    .bind(max_retries)
    .fetch_all(pool)
    .await
}

/// Stale `processing` rows past the retry budget are failed outright so a
/// submission that keeps hanging workers cannot cycle through the queue
/// forever.
pub(crate) async fn fail_stale_processing(
    pool: &PgPool,
    stale_before: PrimitiveDateTime,
    max_retries: i32,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE submissions
         SET status = $1,
             score_error = 'Scoring timed out',
             scoring_started_at = NULL,
             updated_at = $2
         WHERE status = $3
           AND scoring_started_at IS NOT NULL
           AND scoring_started_at < $4
           AND retry_count >= $5
         RETURNING id",
    )
    .bind(SubmissionStatus::Failed)
    .bind(now)
    .bind(SubmissionStatus::Processing)
    .bind(stale_before)
    .bind(max_retries)
    .fetch_all(pool)
    .await
}
