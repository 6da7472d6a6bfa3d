use axum::{
    extract::{Multipart, Query, State},
    routing::get,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::submission::SubmissionResponse;

#[cfg(test)]
mod tests;

#[derive(Debug, Deserialize)]
pub(crate) struct GetDataQuery {
    template_id: String,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/submit", post(submit)).route("/getdata", get(get_data))
}

struct SubmitForm {
    template_id: String,
    student_name: String,
    student_roll_number: String,
    filename: String,
    file_bytes: Vec<u8>,
}

async fn submit(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let form = read_submit_form(&state, multipart).await?;

    if !form.filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ApiError::BadRequest("Only PDF files are allowed".to_string()));
    }

    // Reference resolution is an explicit, validated input: refuse uploads
    // for templates with no reference image instead of failing silently
    // later in the worker.
    if state.storage().resolve_reference(&form.template_id).is_none() {
        return Err(ApiError::BadRequest(format!(
            "No reference image found for template '{}'",
            form.template_id
        )));
    }

    let submission_id = Uuid::new_v4().to_string();
    let file_path = state
        .storage()
        .save_pdf(&submission_id, &form.filename, &form.file_bytes)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to store uploaded PDF"))?;

    let submission = repositories::submissions::create(
        state.db(),
        repositories::submissions::CreateSubmission {
            id: &submission_id,
            template_id: &form.template_id,
            student_name: &form.student_name,
            student_roll_number: &form.student_roll_number,
            file_path: &file_path.to_string_lossy(),
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create submission"))?;

    metrics::counter!("submissions_uploaded_total").increment(1);
    tracing::info!(
        submission_id = %submission.id,
        template_id = %submission.template_id,
        "Submission accepted for scoring"
    );

    Ok(Json(SubmissionResponse::from(submission)))
}

async fn get_data(
    Query(query): Query<GetDataQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubmissionResponse>>, ApiError> {
    let submissions = repositories::submissions::list_by_template(state.db(), &query.template_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch submissions"))?;

    Ok(Json(submissions.into_iter().map(SubmissionResponse::from).collect()))
}

async fn read_submit_form(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<SubmitForm, ApiError> {
    let mut template_id: Option<String> = None;
    let mut student_name: Option<String> = None;
    let mut student_roll_number: Option<String> = None;
    let mut filename: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let max_bytes = state.settings().storage().max_upload_size_mb * 1024 * 1024;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "pdf_file" => {
                filename = field.file_name().map(|s| s.to_string());
                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
                {
                    let next_size = bytes.len() as u64 + chunk.len() as u64;
                    if next_size > max_bytes {
                        return Err(ApiError::BadRequest(format!(
                            "File size exceeds {}MB limit",
                            state.settings().storage().max_upload_size_mb
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                file_bytes = Some(bytes);
            }
            "template_id" => template_id = Some(read_text_field(field, "template_id").await?),
            "student_name" => student_name = Some(read_text_field(field, "student_name").await?),
            "student_roll_number" => {
                student_roll_number = Some(read_text_field(field, "student_roll_number").await?)
            }
            _ => {}
        }
    }

    let template_id = require_field(template_id, "template_id")?;
    let student_name = require_field(student_name, "student_name")?;
    let student_roll_number = require_field(student_roll_number, "student_roll_number")?;
    let file_bytes =
        file_bytes.ok_or_else(|| ApiError::BadRequest("pdf_file is required".to_string()))?;
    let filename =
        filename.ok_or_else(|| ApiError::BadRequest("pdf_file must have a filename".to_string()))?;

    if file_bytes.is_empty() {
        return Err(ApiError::BadRequest("pdf_file is empty".to_string()));
    }

    Ok(SubmitForm { template_id, student_name, student_roll_number, filename, file_bytes })
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &'static str,
) -> Result<String, ApiError> {
    let text = field
        .text()
        .await
        .map_err(|_| ApiError::BadRequest(format!("Invalid value for {name}")))?;
    Ok(text.trim().to_string())
}

fn require_field(value: Option<String>, name: &'static str) -> Result<String, ApiError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ApiError::BadRequest(format!("{name} is required"))),
    }
}
