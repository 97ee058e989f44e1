//! Multipart upload: the job is created as soon as the file part starts and
//! queued once its last byte is on disk.

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use vid2audio_core::{sanitize_file_name, Error, JobId, TrimWindow};

use crate::jobs::JobScheduler;
use crate::server::{AppContext, AppError};

/// Names accepted for the file part.
const FILE_FIELDS: &[&str] = &["video", "file"];

/// Trim bounds may also be given on the query string.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Form layout, for the API docs.
#[allow(dead_code)]
#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadForm {
    /// Trim start in seconds. Must precede the file part.
    start_time: Option<String>,
    /// Trim end in seconds. Must precede the file part.
    end_time: Option<String>,
    #[schema(value_type = String, format = Binary)]
    video: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[schema(value_type = String)]
    pub job_id: JobId,
}

/// Longest accepted text field, in bytes.
const MAX_TEXT_FIELD_BYTES: usize = 64;

/// Discards an upload that never reached the queue, including when the
/// handler future is dropped because the client went away.
struct PendingUpload {
    scheduler: Arc<JobScheduler>,
    id: JobId,
    armed: bool,
}

impl PendingUpload {
    fn abort(mut self, reason: &str) {
        self.armed = false;
        if let Err(e) = self.scheduler.abort_upload(self.id, reason) {
            tracing::warn!(job_id = %self.id, "{e}");
        }
    }

    /// Attach the final trim window and queue the job. On error the guard
    /// stays armed and the upload is discarded.
    fn finish(mut self, trim: Option<TrimWindow>) -> Result<JobId, Error> {
        self.scheduler.set_upload_trim(self.id, trim)?;
        self.scheduler.finish_upload(self.id)?;
        self.armed = false;
        Ok(self.id)
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.scheduler.abort_upload(self.id, "connection closed") {
                tracing::warn!(job_id = %self.id, "{e}");
            }
        }
    }
}

/// POST /upload and /api/upload
///
/// Trim fields may come before or after the file part. The job is queued
/// only once the whole form has been read and the window validated.
#[utoipa::path(
    post,
    path = "/api/upload",
    params(UploadQuery),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Upload queued for conversion", body = UploadResponse),
        (status = 400, description = "Invalid trim window or malformed form", body = crate::server::error::ErrorBody),
        (status = 413, description = "Upload exceeds the size limit", body = crate::server::error::ErrorBody)
    )
)]
pub async fn upload(
    State(ctx): State<AppContext>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let limit = ctx.config.server.max_upload_bytes;
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    if let Some(len) = content_length.filter(|len| *len > limit) {
        return Err(Error::TooLarge(format!("{len} bytes exceeds the {limit} byte limit")).into());
    }

    let mut pending = None;
    let read = read_form(&ctx, query, content_length, &mut multipart, &mut pending).await;

    match (read, pending) {
        (Ok(trim), Some(upload)) => {
            let id = upload.finish(trim)?;
            Ok((StatusCode::ACCEPTED, Json(UploadResponse { job_id: id })))
        }
        (Ok(_), None) => Err(Error::Validation(
            "no file part in upload (expected field \"video\" or \"file\")".into(),
        )
        .into()),
        (Err(e), Some(upload)) => {
            upload.abort(&e.0.to_string());
            Err(e)
        }
        (Err(e), None) => Err(e),
    }
}

/// Read every form field, storing the file part as it streams in. Returns
/// the validated trim window from all fields and the query string.
async fn read_form(
    ctx: &AppContext,
    query: UploadQuery,
    content_length: Option<u64>,
    multipart: &mut Multipart,
    pending: &mut Option<PendingUpload>,
) -> Result<Option<TrimWindow>, AppError> {
    let mut start = query.start;
    let mut end = query.end;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "startTime" | "start" => start = Some(read_text(field).await?),
            "endTime" | "end" => end = Some(read_text(field).await?),
            n if FILE_FIELDS.contains(&n) => {
                if pending.is_some() {
                    return Err(Error::Validation("more than one file part in upload".into()).into());
                }
                // Bounds already received are checked before any bytes are stored.
                let trim = TrimWindow::parse(start.as_deref(), end.as_deref())?;
                receive_file(ctx, field, trim, content_length, pending).await?;
            }
            other => tracing::debug!("Ignoring form field {:?}", other),
        }
    }

    Ok(TrimWindow::parse(start.as_deref(), end.as_deref())?)
}

async fn read_text(mut field: Field<'_>) -> Result<String, AppError> {
    let name = field.name().unwrap_or_default().to_string();
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if buf.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(Error::Validation(format!(
                "form field {name:?} is longer than {MAX_TEXT_FIELD_BYTES} bytes"
            ))
            .into());
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf)
        .map_err(|_| AppError::from(Error::Validation(format!("form field {name:?} is not UTF-8"))))
}

async fn receive_file(
    ctx: &AppContext,
    mut field: Field<'_>,
    trim: Option<TrimWindow>,
    content_length: Option<u64>,
    pending: &mut Option<PendingUpload>,
) -> Result<(), AppError> {
    let display_name = field
        .file_name()
        .map(str::to_string)
        .unwrap_or_else(|| "upload".to_string());
    let id = JobId::new();
    let path = upload_path(&ctx.config.storage.upload_dir, id, &display_name);

    let mut file = tokio::fs::File::create(&path).await.map_err(Error::from)?;
    ctx.scheduler.begin_upload(id, display_name, path.clone(), trim);
    *pending = Some(PendingUpload {
        scheduler: Arc::clone(&ctx.scheduler),
        id,
        armed: true,
    });

    let limit = ctx.config.server.max_upload_bytes;
    let mut received: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        received += chunk.len() as u64;
        if received > limit {
            return Err(Error::TooLarge(format!("upload exceeds the {limit} byte limit")).into());
        }
        file.write_all(&chunk).await.map_err(Error::from)?;

        if let Some(total) = content_length.filter(|t| *t > 0) {
            let pct = (received as f64 / total as f64 * 100.0) as f32;
            // Reported percent stays below 100 until the file is complete.
            let _ = ctx.scheduler.update_upload_progress(id, pct.min(99.0));
        }
    }

    file.flush().await.map_err(Error::from)?;
    tracing::debug!(job_id = %id, "Received {} bytes into {:?}", received, path);
    Ok(())
}

fn upload_path(dir: &Path, id: JobId, display_name: &str) -> PathBuf {
    dir.join(format!("{id}-{}", sanitize_file_name(display_name)))
}
