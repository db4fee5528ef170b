use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers;
use crate::state::AppState;

pub fn api_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::health::health))
        .routes(routes!(
            handlers::request::list_requests,
            handlers::request::create_request
        ))
        .routes(routes!(
            handlers::request::get_request,
            handlers::request::update_request,
            handlers::request::delete_request
        ))
}
