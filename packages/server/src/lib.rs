pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;

use axum::{Json, routing::get};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable as ScalarServable};

use crate::extractors::auth::API_KEY_HEADER;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Herald Request API",
        version = "1.0.0",
        description = "Named request resources whose lifecycle changes are published to RabbitMQ"
    ),
    tags(
        (name = "Requests", description = "Request CRUD; every mutation publishes an event"),
        (name = "Health", description = "Dependency health"),
    ),
    modifiers(&SecurityAddon),
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER))),
        );
    }
}

/// Build the application router.
///
/// Unmatched paths and methods answer with the error envelope. Every request
/// is logged at `INFO` once its response is ready.
pub fn build_router(state: AppState) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(routes::api_routes())
        .split_for_parts();

    let document = api.clone();
    router
        .route("/api-docs/openapi.json", get(move || async move { Json(document) }))
        .with_state(state.clone())
        .merge(Scalar::with_url("/scalar", api))
        .fallback(handlers::fallback::route_not_found)
        .method_not_allowed_fallback(handlers::fallback::method_not_allowed)
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::request_timeout,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
