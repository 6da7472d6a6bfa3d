mod maintenance;
mod worker;

pub(crate) use maintenance::{recover_stale_submissions, retry_failed_submissions};
pub(crate) use worker::{claim_next_submission, fail_submission_on_unexpected_error, process_submission};
