//! External tool availability.

use axum::extract::State;
use axum::Json;
use vid2audio_av::ToolInfo;

use crate::server::AppContext;

/// GET /api/tools
#[utoipa::path(
    get,
    path = "/api/tools",
    responses(
        (status = 200, description = "Availability of external tools", body = Vec<ToolInfo>)
    )
)]
pub async fn list_tools(State(ctx): State<AppContext>) -> Json<Vec<ToolInfo>> {
    Json(ctx.tools.as_ref().clone())
}
