use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::header::CONTENT_TYPE,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, info};
use validator::Validate;

use crate::documents::DocumentUpload;
use crate::gateway::JobStatus;
use crate::models::{AppState, SubmitJobRequest, SubmitJobResponse};
use crate::types::{AppError, AppResult};

/// Uploaded documents may be far larger than axum's 2 MB default
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const FILE_FIELD: &str = "file";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/submit_job", post(submit_job))
        .route("/get_result/{job_id}", get(get_result))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Accepts either a JSON `{ "prompt": ... }` body or a multipart upload with
/// a `file` field.
async fn submit_job(
    State(state): State<AppState>,
    request: Request,
) -> AppResult<Json<SubmitJobResponse>> {
    if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::InvalidRequest(e.body_text()))?;
        return submit_document(&state, multipart).await;
    }

    let Json(payload) = Json::<SubmitJobRequest>::from_request(request, &state)
        .await
        .map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    payload
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    let job_id = state.gateway.submit(payload.prompt).await?;
    Ok(Json(SubmitJobResponse {
        job_id,
        processing_time: None,
    }))
}

async fn submit_document(state: &AppState, mut multipart: Multipart) -> AppResult<Json<SubmitJobResponse>> {
    let upload = read_file_field(&mut multipart)
        .await?
        .ok_or_else(|| AppError::InvalidRequest(format!("missing multipart field '{}'", FILE_FIELD)))?;

    info!(
        filename = upload.filename.as_deref().unwrap_or(""),
        bytes = upload.data.len(),
        "Document upload received"
    );

    let submitted = state.gateway.submit_document(&upload).await?;
    Ok(Json(SubmitJobResponse {
        job_id: submitted.job_id,
        processing_time: Some(submitted.processing_time.as_secs_f64()),
    }))
}

async fn read_file_field(multipart: &mut Multipart) -> AppResult<Option<DocumentUpload>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = field.name().unwrap_or(""), "Ignoring multipart field");
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidRequest(e.body_text()))?;
        return Ok(Some(DocumentUpload::new(filename, content_type, data)));
    }
    Ok(None)
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .is_some_and(|mime| mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA)
}

async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<JobStatus>> {
    Ok(Json(state.gateway.lookup(&job_id).await?))
}
