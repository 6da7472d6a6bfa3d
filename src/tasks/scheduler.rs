use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::tasks::scoring;

const MAINTENANCE_INTERVAL_SECONDS: u64 = 300;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let worker_count = state.settings().scoring().worker_concurrency as usize;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(worker_count + 1);

    for _ in 0..worker_count {
        handles.push(tokio::spawn(scoring_worker(state.clone(), shutdown_rx.clone())));
    }
    handles.push(tokio::spawn(maintenance_loop(state.clone(), shutdown_rx.clone())));

    tracing::info!(workers = worker_count, "Scoring worker pool started");

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn scoring_worker(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let poll_interval = Duration::from_secs(state.settings().scoring().poll_interval_seconds);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match scoring::claim_next_submission(state.db()).await {
            Ok(Some(submission_id)) => {
                if let Err(err) = scoring::process_submission(&state, &submission_id).await {
                    if let Err(recovery_err) = scoring::fail_submission_on_unexpected_error(
                        &state,
                        &submission_id,
                        &err.to_string(),
                    )
                    .await
                    {
                        tracing::error!(
                            submission_id,
                            error = %recovery_err,
                            "Failed to mark submission failed after worker error"
                        );
                    }
                    tracing::error!(
                        submission_id,
                        error = %err,
                        "Failed to process submission"
                    );
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(error = %err, "Failed to claim submission"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(poll_interval) => {}
        }
    }
}

async fn maintenance_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECONDS));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = scoring::recover_stale_submissions(&state).await {
                    tracing::error!(error = %err, "recover_stale_submissions failed");
                }
                if let Err(err) = scoring::retry_failed_submissions(&state).await {
                    tracing::error!(error = %err, "retry_failed_submissions failed");
                }
            }
        }
    }
}
