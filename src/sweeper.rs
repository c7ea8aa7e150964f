use chrono::Utc;
use tokio::time;
use tracing::{info, warn};

use crate::{
    storage::{output_dir, remove_dir_if_exists, remove_file_if_exists},
    AppState,
};

/// Hourly by default. Expiry is fixed at submission and never renewed,
/// so every record eventually falls to this task.
pub fn spawn_retention_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut interval = time::interval(state.config.sweep_interval);
        loop {
            interval.tick().await;
            let removed = sweep_expired(&state).await;
            if removed > 0 {
                info!(removed, "Retention sweep removed expired jobs");
            }
        }
    });
}

/// One sweep pass over a snapshot of the store. Expiry ignores status:
/// a job still processing past its 24h window is reclaimed anyway.
/// Filesystem cleanup is best-effort throughout.
async fn sweep_expired(state: &AppState) -> usize {
    let now = Utc::now();
    let mut removed = 0;

    for job in state.jobs.snapshot().await {
        if job.expires_at > now {
            continue;
        }

        info!(job_id = %job.id, status = ?job.status, "Expiring job");
        let out_dir = output_dir(&state.config.storage_root, &job.id);
        if let Err(err) = remove_dir_if_exists(&out_dir).await {
            warn!("Failed removing expired output {}: {err:#}", out_dir.display());
        }

        if let Some(record) = state.jobs.remove(&job.id).await {
            // A job swept before pickup still holds its uploaded input.
            if let Err(err) = remove_file_if_exists(&record.input_path).await {
                warn!(
                    "Failed removing expired input {}: {err:#}",
                    record.input_path.display()
                );
            }
            removed += 1;
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::sweep_expired;
    use crate::{config::Config, engine::CommandEngine, store::JobStore, AppState};

    fn test_state() -> AppState {
        let root = std::env::temp_dir().join(format!("splitai-sweeper-{}", Uuid::new_v4()));
        std::fs::create_dir_all(root.join("uploads")).unwrap();
        std::fs::create_dir_all(root.join("outputs")).unwrap();

        let (queue_tx, _queue_rx) = mpsc::channel(8);
        AppState {
            config: Config {
                bind_addr: ([127, 0, 0, 1], 0).into(),
                storage_root: root,
                retention: Duration::from_secs(24 * 60 * 60),
                sweep_interval: Duration::from_secs(60 * 60),
                queue_capacity: 8,
                max_upload_bytes: 50 * 1024 * 1024,
                separator_cmd: "unused".to_string(),
            },
            jobs: JobStore::new(),
            queue_tx,
            engine: Arc::new(CommandEngine::new("unused".to_string())),
        }
    }

    #[tokio::test]
    async fn expired_jobs_are_pruned_with_their_artifacts() {
        let state = test_state();
        let root = state.config.storage_root.clone();

        let input = root.join("uploads").join("expired.mp3");
        std::fs::write(&input, b"audio").unwrap();
        let input_for_create = input.clone();
        let expired = state
            .jobs
            .create("old.mp3".to_string(), Duration::ZERO, |_| input_for_create)
            .await;
        let out = root.join("outputs").join(&expired.id);
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("vocals.wav"), b"v").unwrap();

        let fresh = state
            .jobs
            .create("new.mp3".to_string(), Duration::from_secs(24 * 60 * 60), |_| {
                root.join("uploads").join("fresh.mp3")
            })
            .await;

        let removed = sweep_expired(&state).await;
        assert_eq!(removed, 1);
        assert!(state.jobs.get(&expired.id).await.is_none());
        assert!(!out.exists());
        assert!(!input.exists());
        assert!(state.jobs.get(&fresh.id).await.is_some());

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn expiry_ignores_status() {
        let state = test_state();
        let root = state.config.storage_root.clone();

        let input = root.join("uploads").join("inflight.mp3");
        std::fs::write(&input, b"audio").unwrap();
        let input_for_create = input.clone();
        let job = state
            .jobs
            .create("inflight.mp3".to_string(), Duration::ZERO, |_| {
                input_for_create
            })
            .await;
        state.jobs.begin_processing(&job.id).await;

        assert_eq!(sweep_expired(&state).await, 1);
        assert!(state.jobs.get(&job.id).await.is_none());

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn sweep_tolerates_missing_directories() {
        let state = test_state();
        let root = state.config.storage_root.clone();

        // No input file, no output dir: cleanup swallows both.
        state
            .jobs
            .create("ghost.mp3".to_string(), Duration::ZERO, |_| {
                root.join("uploads").join("never-written.mp3")
            })
            .await;

        assert_eq!(sweep_expired(&state).await, 1);
        assert!(state.jobs.snapshot().await.is_empty());

        std::fs::remove_dir_all(&root).ok();
    }
}
