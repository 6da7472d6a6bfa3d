use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::tasks::scoring;
use crate::test_support;

const PDF_BYTES: &[u8] = b"%PDF-1.4 minimal";

#[tokio::test]
async fn submit_creates_pending_submission() {
    let ctx = test_support::setup_test_context().await;
    ctx.write_reference_image("tmpl-1");

    let request =
        test_support::submit_request("tmpl-1", "Ada", "R-001", Some(("sheet.pdf", PDF_BYTES)));
    let response = ctx.app.clone().oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = test_support::read_json(response).await;
    assert_eq!(json["template_id"], "tmpl-1");
    assert_eq!(json["student_name"], "Ada");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["score"], 0.0);
    assert!(json["score_error"].is_null());

    let id = json["id"].as_str().expect("id").to_string();
    let stored = repositories::submissions::find_by_id(ctx.state.db(), &id)
        .await
        .expect("find")
        .expect("submission row");
    assert!(std::path::Path::new(&stored.file_path).is_file());

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder().uri("/getdata?template_id=tmpl-1").body(Body::empty()).unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let listed = test_support::read_json(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["id"], id.as_str());
}

#[tokio::test]
async fn submit_rejects_non_pdf() {
    let ctx = test_support::setup_test_context().await;
    ctx.write_reference_image("tmpl-1");

    let request =
        test_support::submit_request("tmpl-1", "Ada", "R-001", Some(("sheet.png", PDF_BYTES)));
    let response = ctx.app.clone().oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = test_support::read_json(response).await;
    assert_eq!(json["detail"], "Only PDF files are allowed");

    let rows = repositories::submissions::list_by_template(ctx.state.db(), "tmpl-1")
        .await
        .expect("list");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn submit_rejects_template_without_reference_image() {
    let ctx = test_support::setup_test_context().await;

    let request =
        test_support::submit_request("unknown", "Ada", "R-001", Some(("sheet.pdf", PDF_BYTES)));
    let response = ctx.app.clone().oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = test_support::read_json(response).await;
    assert!(json["detail"].as_str().expect("detail").contains("No reference image"));
}

#[tokio::test]
async fn submit_requires_all_fields() {
    let ctx = test_support::setup_test_context().await;
    ctx.write_reference_image("tmpl-1");

    let request =
        test_support::submit_request("tmpl-1", "", "R-001", Some(("sheet.pdf", PDF_BYTES)));
    let response = ctx.app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = test_support::read_json(response).await;
    assert_eq!(json["detail"], "student_name is required");

    let request = test_support::submit_request("tmpl-1", "Ada", "R-001", None);
    let response = ctx.app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = test_support::read_json(response).await;
    assert_eq!(json["detail"], "pdf_file is required");
}

#[tokio::test]
async fn getdata_filters_by_template() {
    let ctx = test_support::setup_test_context().await;
    ctx.write_reference_image("tmpl-a");
    ctx.write_reference_image("tmpl-b");

    for (template, roll) in [("tmpl-a", "R-001"), ("tmpl-b", "R-002")] {
        let request =
            test_support::submit_request(template, "Ada", roll, Some(("sheet.pdf", PDF_BYTES)));
        let response = ctx.app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder().uri("/getdata?template_id=tmpl-a").body(Body::empty()).unwrap(),
        )
        .await
        .expect("response");
    let listed = test_support::read_json(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["template_id"], "tmpl-a");
    assert_eq!(listed[0]["student_roll_number"], "R-001");
}

#[tokio::test]
async fn worker_fails_submission_when_reference_disappears() {
    let ctx = test_support::setup_test_context().await;
    ctx.write_reference_image("tmpl-1");

    let request =
        test_support::submit_request("tmpl-1", "Ada", "R-001", Some(("sheet.pdf", PDF_BYTES)));
    let response = ctx.app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let json = test_support::read_json(response).await;
    let id = json["id"].as_str().expect("id").to_string();

    ctx.remove_reference_image("tmpl-1");

    let claimed = scoring::claim_next_submission(ctx.state.db())
        .await
        .expect("claim")
        .expect("claimed id");
    assert_eq!(claimed, id);

    scoring::process_submission(&ctx.state, &claimed).await.expect("process");

    let stored = repositories::submissions::find_by_id(ctx.state.db(), &id)
        .await
        .expect("find")
        .expect("submission row");
    assert_eq!(stored.status, crate::db::types::SubmissionStatus::Failed);
    assert!(stored.score_error.as_deref().expect("error").contains("Reference image"));

    // Nothing else pending, the queue is drained.
    let next = scoring::claim_next_submission(ctx.state.db()).await.expect("claim");
    assert!(next.is_none());
}

#[tokio::test]
async fn worker_scores_submission_through_to_scored() {
    let ctx = test_support::setup_test_context().await;
    let reference_path = ctx.write_reference_image("tmpl-1");

    let request =
        test_support::submit_request("tmpl-1", "Ada", "R-001", Some(("sheet.pdf", PDF_BYTES)));
    let response = ctx.app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let json = test_support::read_json(response).await;
    let id = json["id"].as_str().expect("id").to_string();

    // Seed a rendered page so the worker skips rasterization. Same bytes as
    // the reference, so the stub embedder yields identical embeddings.
    let rendered_path = ctx.state.storage().rendered_page_path(&id);
    std::fs::copy(&reference_path, &rendered_path).expect("copy rendered page");
    repositories::submissions::set_rendered_path(
        ctx.state.db(),
        &id,
        &rendered_path.to_string_lossy(),
        primitive_now_utc(),
    )
    .await
    .expect("set rendered path");

    let claimed = scoring::claim_next_submission(ctx.state.db())
        .await
        .expect("claim")
        .expect("claimed id");
    assert_eq!(claimed, id);

    scoring::process_submission(&ctx.state, &claimed).await.expect("process");

    let stored = repositories::submissions::find_by_id(ctx.state.db(), &id)
        .await
        .expect("find")
        .expect("submission row");
    assert_eq!(stored.status, crate::db::types::SubmissionStatus::Scored);
    assert!((0.0..=1.0).contains(&stored.score), "score {} out of range", stored.score);
    assert!((stored.score - 1.0).abs() < 1e-6, "identical pages should score 1.0");
    assert!(stored.scored_at.is_some());
    assert!(stored.score_error.is_none());
    assert_eq!(stored.rendered_path.as_deref(), Some(&*rendered_path.to_string_lossy()));
}

#[tokio::test]
async fn stale_processing_requeues_then_fails_at_retry_limit() {
    let ctx = test_support::setup_test_context().await;
    ctx.write_reference_image("tmpl-1");

    let request =
        test_support::submit_request("tmpl-1", "Ada", "R-001", Some(("sheet.pdf", PDF_BYTES)));
    let response = ctx.app.clone().oneshot(request).await.expect("response");
    let json = test_support::read_json(response).await;
    let id = json["id"].as_str().expect("id").to_string();

    scoring::claim_next_submission(ctx.state.db()).await.expect("claim").expect("claimed id");

    // Cutoff after the claim, so the row counts as stale.
    let cutoff = primitive_now_utc() + time::Duration::seconds(5);
    let recovered = repositories::submissions::recover_stale_processing(
        ctx.state.db(),
        cutoff,
        1,
        primitive_now_utc(),
    )
    .await
    .expect("recover");
    assert_eq!(recovered, vec![id.clone()]);

    let stored = repositories::submissions::find_by_id(ctx.state.db(), &id)
        .await
        .expect("find")
        .expect("submission row");
    assert_eq!(stored.status, crate::db::types::SubmissionStatus::Pending);
    assert_eq!(stored.retry_count, 1);

    // Second hang: the retry budget is spent, so the sweep fails the row
    // instead of requeueing it.
    scoring::claim_next_submission(ctx.state.db()).await.expect("claim").expect("claimed id");
    let cutoff = primitive_now_utc() + time::Duration::seconds(5);
    let recovered = repositories::submissions::recover_stale_processing(
        ctx.state.db(),
        cutoff,
        1,
        primitive_now_utc(),
    )
    .await
    .expect("recover");
    assert!(recovered.is_empty());

    let failed = repositories::submissions::fail_stale_processing(
        ctx.state.db(),
        cutoff,
        1,
        primitive_now_utc(),
    )
    .await
    .expect("fail stale");
    assert_eq!(failed, vec![id.clone()]);

    let stored = repositories::submissions::find_by_id(ctx.state.db(), &id)
        .await
        .expect("find")
        .expect("submission row");
    assert_eq!(stored.status, crate::db::types::SubmissionStatus::Failed);
    assert_eq!(stored.score_error.as_deref(), Some("Scoring timed out"));
}

#[tokio::test]
async fn scored_submissions_are_visible_via_getdata() {
    let ctx = test_support::setup_test_context().await;
    ctx.write_reference_image("tmpl-1");

    let request =
        test_support::submit_request("tmpl-1", "Ada", "R-001", Some(("sheet.pdf", PDF_BYTES)));
    let response = ctx.app.clone().oneshot(request).await.expect("response");
    let json = test_support::read_json(response).await;
    let id = json["id"].as_str().expect("id").to_string();

    let claimed = scoring::claim_next_submission(ctx.state.db())
        .await
        .expect("claim")
        .expect("claimed id");
    assert_eq!(claimed, id);

    repositories::submissions::mark_scored(
        ctx.state.db(),
        &id,
        repositories::submissions::ScoredUpdate {
            score: 0.87,
            rendered_path: "uploads/rendered.jpg",
            scored_at: primitive_now_utc(),
        },
    )
    .await
    .expect("mark scored");

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder().uri("/getdata?template_id=tmpl-1").body(Body::empty()).unwrap(),
        )
        .await
        .expect("response");
    let listed = test_support::read_json(response).await;
    assert_eq!(listed[0]["status"], "scored");
    let score = listed[0]["score"].as_f64().expect("score");
    assert!((0.0..=1.0).contains(&score));
    assert!(listed[0]["scored_at"].is_string());
}

#[tokio::test]
async fn failed_submissions_requeue_until_retry_limit() {
    let ctx = test_support::setup_test_context().await;
    ctx.write_reference_image("tmpl-1");

    let request =
        test_support::submit_request("tmpl-1", "Ada", "R-001", Some(("sheet.pdf", PDF_BYTES)));
    let response = ctx.app.clone().oneshot(request).await.expect("response");
    let json = test_support::read_json(response).await;
    let id = json["id"].as_str().expect("id").to_string();

    repositories::submissions::mark_failed(ctx.state.db(), &id, "boom", primitive_now_utc())
        .await
        .expect("mark failed");

    let requeued =
        repositories::submissions::requeue_failed(ctx.state.db(), 1, primitive_now_utc())
            .await
            .expect("requeue");
    assert_eq!(requeued, vec![id.clone()]);

    let stored = repositories::submissions::find_by_id(ctx.state.db(), &id)
        .await
        .expect("find")
        .expect("submission row");
    assert_eq!(stored.status, crate::db::types::SubmissionStatus::Pending);
    assert_eq!(stored.retry_count, 1);

    // retry_count hit the limit, the row stays failed from now on.
    repositories::submissions::mark_failed(ctx.state.db(), &id, "boom", primitive_now_utc())
        .await
        .expect("mark failed");
    let requeued =
        repositories::submissions::requeue_failed(ctx.state.db(), 1, primitive_now_utc())
            .await
            .expect("requeue");
    assert!(requeued.is_empty());
}
