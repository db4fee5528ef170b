use std::future::Future;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::RequestEvent;
use tracing::{Instrument, error, info, instrument};

use crate::error::AppError;
use crate::extractors::auth::ApiKey;
use crate::extractors::json::AppJson;
use crate::models::request::*;
use crate::models::response::ApiResponse;
use crate::state::AppState;
use crate::store::RequestStore;

type Envelope<T> = Json<ApiResponse<T>>;

/// Publish the event for a mutation that is already committed.
///
/// On failure the store keeps the change; the caller gets a 503 whose `data`
/// holds the saved record so it can tell what was persisted.
async fn publish_event(
    state: &AppState,
    event: &RequestEvent,
    record: Option<&RequestResponse>,
) -> Result<(), AppError> {
    if let Err(e) = state.publisher.publish(event).await {
        error!(
            name = %event.name,
            kind = %event.kind,
            event_id = %event.event_id,
            error = %e,
            "Store updated but event was not published"
        );
        return Err(AppError::EventNotPublished {
            message: format!(
                "Request '{}' was {} but its event could not be published",
                event.name, event.kind
            ),
            record: record.and_then(|r| serde_json::to_value(r).ok()),
        });
    }
    Ok(())
}

/// Run a mutation and its publish on a task of its own. Dropping the handler
/// (request timeout, client disconnect) does not cancel the task, so a
/// committed change always gets its publish attempt and its log line.
async fn detached<T, F>(mutation: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(mutation.in_current_span())
        .await
        .map_err(|e| AppError::Internal(format!("mutation task failed: {e}")))?
}

#[utoipa::path(
    get,
    path = "/requests",
    tag = "Requests",
    operation_id = "listRequests",
    summary = "List requests",
    description = "Returns every request in creation order.",
    responses(
        (status = 200, description = "All requests", body = ApiResponse<Vec<RequestResponse>>),
        (status = 401, description = "Missing or invalid API key", body = ApiResponse<RequestResponse>),
    ),
    security(("api_key" = [])),
)]
#[instrument(skip_all)]
pub async fn list_requests(
    _key: ApiKey,
    State(state): State<AppState>,
) -> Result<Envelope<Vec<RequestResponse>>, AppError> {
    let records = RequestStore::new(&state.db).list().await?;
    let data: Vec<RequestResponse> = records.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::ok(
        format!("{} request(s) found", data.len()),
        data,
    )))
}

#[utoipa::path(
    post,
    path = "/requests",
    tag = "Requests",
    operation_id = "createRequest",
    summary = "Create a request",
    description = "Stores a new request and publishes a `created` event to the primary exchange.",
    request_body = CreateRequestBody,
    responses(
        (status = 201, description = "Request created", body = ApiResponse<RequestResponse>),
        (status = 400, description = "Invalid body or name", body = ApiResponse<RequestResponse>),
        (status = 401, description = "Missing or invalid API key", body = ApiResponse<RequestResponse>),
        (status = 409, description = "Name already taken", body = ApiResponse<RequestResponse>),
        (status = 503, description = "Stored, but the event was not published; `data` holds the record", body = ApiResponse<RequestResponse>),
    ),
    security(("api_key" = [])),
)]
#[instrument(skip_all, fields(name = %body.name))]
pub async fn create_request(
    _key: ApiKey,
    State(state): State<AppState>,
    AppJson(body): AppJson<CreateRequestBody>,
) -> Result<(StatusCode, Envelope<RequestResponse>), AppError> {
    let new = body.validate()?;
    let response = detached(async move {
        let record = RequestStore::new(&state.db).create(new).await?;

        let event = RequestEvent::created(
            record.name.clone(),
            record.payload.clone(),
            record.status.clone(),
        );
        let response = RequestResponse::from(record);
        publish_event(&state, &event, Some(&response)).await?;

        info!(event_id = %event.event_id, "Request created");
        Ok(response)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            format!("Request '{}' created", response.name),
            response,
        )),
    ))
}

#[utoipa::path(
    get,
    path = "/requests/{name}",
    tag = "Requests",
    operation_id = "getRequest",
    summary = "Get a request",
    params(("name" = String, Path, description = "Request name")),
    responses(
        (status = 200, description = "The request", body = ApiResponse<RequestResponse>),
        (status = 401, description = "Missing or invalid API key", body = ApiResponse<RequestResponse>),
        (status = 404, description = "No request with this name", body = ApiResponse<RequestResponse>),
    ),
    security(("api_key" = [])),
)]
#[instrument(skip(_key, state))]
pub async fn get_request(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Envelope<RequestResponse>, AppError> {
    let record = RequestStore::new(&state.db).get(&name).await?;

    Ok(Json(ApiResponse::ok(
        format!("Request '{name}' found"),
        record.into(),
    )))
}

#[utoipa::path(
    put,
    path = "/requests/{name}",
    tag = "Requests",
    operation_id = "updateRequest",
    summary = "Replace a request's payload",
    description = "Replaces the payload (and status, when given) and publishes an `updated` event.",
    params(("name" = String, Path, description = "Request name")),
    request_body = UpdateRequestBody,
    responses(
        (status = 200, description = "Request updated", body = ApiResponse<RequestResponse>),
        (status = 400, description = "Invalid body", body = ApiResponse<RequestResponse>),
        (status = 401, description = "Missing or invalid API key", body = ApiResponse<RequestResponse>),
        (status = 404, description = "No request with this name", body = ApiResponse<RequestResponse>),
        (status = 503, description = "Updated, but the event was not published; `data` holds the record", body = ApiResponse<RequestResponse>),
    ),
    security(("api_key" = [])),
)]
#[instrument(skip(_key, state, body))]
pub async fn update_request(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(name): Path<String>,
    AppJson(body): AppJson<UpdateRequestBody>,
) -> Result<Envelope<RequestResponse>, AppError> {
    let changes = body.validate()?;
    let lookup = name.clone();
    let response = detached(async move {
        let record = RequestStore::new(&state.db).update(&lookup, changes).await?;

        let event = RequestEvent::updated(
            record.name.clone(),
            record.payload.clone(),
            record.status.clone(),
        );
        let response = RequestResponse::from(record);
        publish_event(&state, &event, Some(&response)).await?;

        info!(event_id = %event.event_id, "Request updated");
        Ok(response)
    })
    .await?;

    Ok(Json(ApiResponse::ok(
        format!("Request '{name}' updated"),
        response,
    )))
}

#[utoipa::path(
    delete,
    path = "/requests/{name}",
    tag = "Requests",
    operation_id = "deleteRequest",
    summary = "Delete a request",
    description = "Removes the request and publishes a `deleted` event with a null payload.",
    params(("name" = String, Path, description = "Request name")),
    responses(
        (status = 200, description = "Request deleted; `data` is null", body = ApiResponse<RequestResponse>),
        (status = 401, description = "Missing or invalid API key", body = ApiResponse<RequestResponse>),
        (status = 404, description = "No request with this name", body = ApiResponse<RequestResponse>),
        (status = 503, description = "Deleted, but the event was not published", body = ApiResponse<RequestResponse>),
    ),
    security(("api_key" = [])),
)]
#[instrument(skip(_key, state))]
pub async fn delete_request(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Envelope<()>, AppError> {
    let lookup = name.clone();
    detached(async move {
        let removed = RequestStore::new(&state.db).delete(&lookup).await?;

        let event = RequestEvent::deleted(removed.name.clone());
        publish_event(&state, &event, None).await?;

        info!(id = removed.id, event_id = %event.event_id, "Request deleted");
        Ok(())
    })
    .await?;

    Ok(Json(ApiResponse::empty(format!("Request '{name}' deleted"))))
}
