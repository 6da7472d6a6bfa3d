use time::PrimitiveDateTime;

pub(crate) const COLUMNS: &str = "\
    id, template_id, student_name, student_roll_number, file_path, rendered_path, score, \
    status, score_error, retry_count, scoring_started_at, scored_at, created_at, updated_at";

pub(crate) struct CreateSubmission<'a> {
    pub(crate) id: &'a str,
    pub(crate) template_id: &'a str,
    pub(crate) student_name: &'a str,
    pub(crate) student_roll_number: &'a str,
    pub(crate) file_path: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) struct ScoredUpdate<'a> {
    pub(crate) score: f64,
    pub(crate) rendered_path: &'a str,
    pub(crate) scored_at: PrimitiveDateTime,
}
