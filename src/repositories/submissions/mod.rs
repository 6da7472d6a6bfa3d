mod commands;
mod queries;
mod types;

pub(crate) use commands::{
    claim_next_for_scoring, create, fail_stale_processing, mark_failed, mark_scored,
    recover_stale_processing, requeue_failed, set_rendered_path,
};
pub(crate) use queries::{find_by_id, list_by_template};
pub(crate) use types::{CreateSubmission, ScoredUpdate};
