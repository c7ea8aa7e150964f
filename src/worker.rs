use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use tokio::{fs, sync::mpsc};
use tracing::{error, info, warn};

use crate::{
    storage::{output_dir, remove_dir_if_exists, remove_file_if_exists},
    AppState,
};

pub fn spawn_separation_worker(state: AppState, mut queue_rx: mpsc::Receiver<String>) {
    tokio::spawn(async move {
        while let Some(job_id) = queue_rx.recv().await {
            handle_job(&state, &job_id).await;
        }
    });
}

/// Failures here stay local to the job: they land in its `error` field
/// and never propagate back to the request path.
async fn handle_job(state: &AppState, job_id: &str) {
    info!(job_id = %job_id, "Worker picked separation job");
    if let Err(err) = process_job(state, job_id).await {
        error!("Separation job {job_id} failed: {err:#}");
        if !state.jobs.fail(job_id, err.to_string()).await {
            // Swept or deleted mid-flight; nothing will reclaim the
            // partial output for this id anymore, so do it here.
            let out_dir = output_dir(&state.config.storage_root, job_id);
            if let Err(err) = remove_dir_if_exists(&out_dir).await {
                warn!("Failed removing orphaned output {}: {err:#}", out_dir.display());
            }
        }
    }
}

async fn process_job(state: &AppState, job_id: &str) -> Result<()> {
    let Some(input_path) = state.jobs.begin_processing(job_id).await else {
        info!(job_id = %job_id, "Skipping job no longer queued");
        return Ok(());
    };

    let outcome = run_separation(state, job_id, &input_path).await;

    // The uploaded input never outlives the attempt, success or not.
    if let Err(err) = remove_file_if_exists(&input_path).await {
        warn!("Failed removing input {}: {err:#}", input_path.display());
    }

    outcome
}

async fn run_separation(state: &AppState, job_id: &str, input_path: &Path) -> Result<()> {
    let out_dir = output_dir(&state.config.storage_root, job_id);
    fs::create_dir_all(&out_dir)
        .await
        .with_context(|| format!("Failed to create output dir {}", out_dir.display()))?;

    let (progress_tx, mut progress_rx) = mpsc::channel::<u8>(16);
    let engine = Arc::clone(&state.engine);
    let input = input_path.to_path_buf();
    let engine_out_dir = out_dir.clone();
    let handle = tokio::task::spawn_blocking(move || {
        engine.separate(&input, &engine_out_dir, &mut |pct| {
            let _ = progress_tx.blocking_send(pct);
        })
    });

    // The engine's callback runs on the blocking thread; percentages
    // cross back over the channel. The sender drops when the engine
    // returns, so this loop drains every report before the join handle
    // resolves and the terminal transition below is reached.
    while let Some(pct) = progress_rx.recv().await {
        state.jobs.set_progress(job_id, pct).await;
        info!(job_id = %job_id, progress = pct, "Separation progress");
    }

    handle.await.context("Separation task panicked")??;

    let completed = state
        .jobs
        .complete(
            job_id,
            format!("/download/{job_id}/vocals"),
            format!("/download/{job_id}/instrumental"),
        )
        .await;

    if !completed {
        // Deleted or expired while separating; don't strand the output.
        info!(job_id = %job_id, "Record gone before completion, discarding output");
        if let Err(err) = remove_dir_if_exists(&out_dir).await {
            warn!("Failed removing orphaned output {}: {err:#}", out_dir.display());
        }
        return Ok(());
    }

    info!(job_id = %job_id, "Separation job completed");
    Ok(())
}
