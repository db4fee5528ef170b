use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::health::HealthReport;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "health",
    summary = "Check dependencies",
    description = "Probes the database, the broker and the migration directory. Does not require an API key.",
    responses(
        (status = 200, description = "All dependencies reachable", body = HealthReport),
        (status = 503, description = "At least one dependency failed", body = HealthReport),
    ),
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health.run().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
