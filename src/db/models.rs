use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::SubmissionStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) template_id: String,
    pub(crate) student_name: String,
    pub(crate) student_roll_number: String,
    pub(crate) file_path: String,
    pub(crate) rendered_path: Option<String>,
    pub(crate) score: f64,
    pub(crate) status: SubmissionStatus,
    pub(crate) score_error: Option<String>,
    pub(crate) retry_count: i32,
    pub(crate) scoring_started_at: Option<PrimitiveDateTime>,
    pub(crate) scored_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
