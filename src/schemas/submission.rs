use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) template_id: String,
    pub(crate) student_name: String,
    pub(crate) student_roll_number: String,
    pub(crate) file_path: String,
    pub(crate) score: f64,
    pub(crate) status: SubmissionStatus,
    pub(crate) score_error: Option<String>,
    pub(crate) created_at: String,
    pub(crate) scored_at: Option<String>,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            template_id: submission.template_id,
            student_name: submission.student_name,
            student_roll_number: submission.student_roll_number,
            file_path: submission.file_path,
            score: submission.score,
            status: submission.status,
            score_error: submission.score_error,
            created_at: format_primitive(submission.created_at),
            scored_at: submission.scored_at.map(format_primitive),
        }
    }
}
