//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use super::context::AppContext;
use super::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::upload::upload,
        routes::download::download,
        routes::status::queue_status,
        routes::jobs::get_job,
        routes::tools::list_tools,
    ),
    components(schemas(
        crate::jobs::Job,
        crate::jobs::JobSummary,
        crate::jobs::JobStatus,
        vid2audio_core::TrimWindow,
        vid2audio_av::ToolInfo,
        routes::upload::UploadForm,
        routes::upload::UploadResponse,
        routes::status::QueueStatusResponse,
        super::error::ErrorBody,
    ))
)]
pub struct ApiDoc;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = transfer_routes()
        .route("/jobs/{id}", get(routes::jobs::get_job))
        .route("/events", get(routes::events::events_handler))
        .route("/tools", get(routes::tools::list_tools));

    let static_dir = ctx.config.server.static_dir.clone();
    let push_path = ctx.config.server.push_path.clone();

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route(&push_path, get(routes::ws::ws_handler))
        .merge(transfer_routes())
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // Static file serving for a bundled UI.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            let index_path = dir.join("index.html");
            app = app.fallback_service(
                tower_http::services::ServeDir::new(&dir)
                    .append_index_html_on_directories(true)
                    .not_found_service(tower_http::services::ServeFile::new(index_path)),
            );
        } else {
            tracing::warn!("Static directory {:?} does not exist, not serving UI", dir);
        }
    }

    app
}

/// Upload, download and status routes. These are served both at the root,
/// where the bundled UI calls them, and under `/api`.
fn transfer_routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/upload",
            // The handler enforces max_upload_bytes while streaming.
            post(routes::upload::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/download/{id}", get(routes::download::download))
        .route("/queue-status", get(routes::status::queue_status))
}
