use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::{
    models::{JobRecord, JobState, Stem, UploadResponse},
    storage::{
        allowed_extension, download_file_name, output_dir, remove_dir_if_exists,
        remove_file_if_exists, stem_path, upload_path,
    },
    AppState,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unsupported file type '{0}'.")]
    UnsupportedType(String),
    #[error("File too large. Max {0} MiB.")]
    FileTooLarge(u64),
    #[error("Upload must include a file part with a filename.")]
    MissingFile,
    #[error("Invalid stem '{0}'. Expected 'vocals' or 'instrumental'.")]
    InvalidStem(String),
    #[error("Job not found.")]
    JobNotFound,
    #[error("File not found.")]
    FileNotFound,
    #[error("Not ready yet.")]
    NotReady,
    #[error("Separation queue is unavailable.")]
    QueueUnavailable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnsupportedType(_) | ApiError::MissingFile | ApiError::InvalidStem(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::JobNotFound | ApiError::FileNotFound => StatusCode::NOT_FOUND,
            ApiError::NotReady => StatusCode::ACCEPTED,
            ApiError::QueueUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            ApiError::FileTooLarge(_) => "FILE_TOO_LARGE",
            ApiError::MissingFile => "MISSING_FILE",
            ApiError::InvalidStem(_) => "INVALID_STEM",
            ApiError::JobNotFound => "JOB_NOT_FOUND",
            ApiError::FileNotFound => "FILE_NOT_FOUND",
            ApiError::NotReady => "NOT_READY",
            ApiError::QueueUnavailable => "QUEUE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));
        (self.status(), body).into_response()
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

/// Validates and persists the upload, creates the `queued` record and
/// hands the job id to the worker. Returns immediately; clients learn
/// the outcome by polling `/status/{job_id}`.
pub async fn upload_audio(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| anyhow::anyhow!("Failed reading multipart body: {err}"))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|err| anyhow::anyhow!("Failed reading upload: {err}"))?;
        upload = Some((file_name, bytes));
        break;
    }
    let Some((file_name, bytes)) = upload else {
        return Err(ApiError::MissingFile);
    };

    // Extension first, size second: distinct client errors, no state
    // mutated by either rejection.
    let ext = allowed_extension(&file_name)
        .ok_or_else(|| ApiError::UnsupportedType(file_name.clone()))?;
    if bytes.len() as u64 > state.config.max_upload_bytes {
        return Err(ApiError::FileTooLarge(
            state.config.max_upload_bytes / (1024 * 1024),
        ));
    }

    let storage_root = state.config.storage_root.clone();
    let record = state
        .jobs
        .create(file_name, state.config.retention, |id| {
            upload_path(&storage_root, id, &ext)
        })
        .await;

    if let Err(err) = fs::write(&record.input_path, &bytes).await {
        state.jobs.remove(&record.id).await;
        // A failed write can still leave a partial file behind.
        if let Err(err) = remove_file_if_exists(&record.input_path).await {
            warn!("Failed rolling back upload {}: {err:#}", record.input_path.display());
        }
        return Err(anyhow::Error::from(err)
            .context("Failed to persist upload")
            .into());
    }

    if state.queue_tx.send(record.id.clone()).await.is_err() {
        // Roll back so no stranded `queued` record survives.
        state.jobs.remove(&record.id).await;
        if let Err(err) = remove_file_if_exists(&record.input_path).await {
            warn!("Failed rolling back upload {}: {err:#}", record.input_path.display());
        }
        return Err(ApiError::QueueUnavailable);
    }

    info!(job_id = %record.id, filename = %record.filename, size = bytes.len(), "Upload accepted");
    Ok(Json(UploadResponse {
        job_id: record.id,
        status: JobState::Queued,
        message: "Processing started.".to_string(),
    }))
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobRecord>, ApiError> {
    let job = state.jobs.get(&job_id).await.ok_or(ApiError::JobNotFound)?;
    Ok(Json(job))
}

pub async fn download_stem(
    State(state): State<AppState>,
    Path((job_id, stem)): Path<(String, String)>,
) -> Result<Response<Body>, ApiError> {
    let stem = Stem::parse(&stem).ok_or_else(|| ApiError::InvalidStem(stem.clone()))?;
    let job = state.jobs.get(&job_id).await.ok_or(ApiError::JobNotFound)?;
    if job.status != JobState::Done {
        return Err(ApiError::NotReady);
    }

    let path = stem_path(&state.config.storage_root, &job_id, stem);
    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        // Should not happen while the record says done; treat as gone.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(job_id = %job_id, "Artifact missing for done job: {}", path.display());
            return Err(ApiError::FileNotFound);
        }
        Err(err) => {
            return Err(anyhow::Error::from(err)
                .context("Failed to read artifact")
                .into())
        }
    };

    let attachment = format!(
        "attachment; filename=\"{}\"",
        download_file_name(&job.filename, stem)
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/wav")
        .header(header::CONTENT_DISPOSITION, attachment)
        .body(Body::from(bytes))
        .map_err(|err| anyhow::Error::from(err).context("Failed to build download").into())
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state
        .jobs
        .remove(&job_id)
        .await
        .ok_or(ApiError::JobNotFound)?;

    let out_dir = output_dir(&state.config.storage_root, &job_id);
    if let Err(err) = remove_dir_if_exists(&out_dir).await {
        warn!("Failed removing outputs {}: {err:#}", out_dir.display());
    }
    // An undeleted input only exists when the job never got picked up.
    if let Err(err) = remove_file_if_exists(&record.input_path).await {
        warn!("Failed removing input {}: {err:#}", record.input_path.display());
    }

    info!(job_id = %job_id, "Job deleted");
    Ok(Json(json!({ "message": "Deleted." })))
}
