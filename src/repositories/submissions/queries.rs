use sqlx::PgPool;

use crate::db::models::Submission;

use super::types::COLUMNS;

pub(crate) async fn find_by_id(
    pool: &PgPool,
    submission_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE id = $1"
    ))
    .bind(submission_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_template(
    pool: &PgPool,
    template_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE template_id = $1 ORDER BY created_at"
    ))
    .bind(template_id)
    .fetch_all(pool)
    .await
}
