//! One-shot retrieval of a finished job's audio.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use vid2audio_core::Error;

use super::parse_job_id;
use crate::server::{AppContext, AppError};

/// GET /api/download/{id}
///
/// The job is removed as soon as the download starts, and its output file is
/// deleted once the response body has been dropped.
#[utoipa::path(
    get,
    path = "/api/download/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "The converted audio file"),
        (status = 400, description = "Job has no output to retrieve", body = crate::server::error::ErrorBody),
        (status = 404, description = "Unknown job", body = crate::server::error::ErrorBody),
        (status = 500, description = "Output file missing from server", body = crate::server::error::ErrorBody)
    )
)]
pub async fn download(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_job_id(&id)?;
    let output = ctx.scheduler.retrieve(id)?;

    let file = tokio::fs::File::open(&output.path).await.map_err(Error::from)?;
    let len = file.metadata().await.map_err(Error::from)?.len();

    let content_type = content_type_for(&output.filename);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        output.filename.replace(['"', '\\'], "_")
    );

    let cleanup = output.cleanup;
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _owner = &cleanup;
        chunk
    });

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("m4a") | Some("aac") => "audio/aac",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}
