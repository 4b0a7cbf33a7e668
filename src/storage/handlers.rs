use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    routing::post,
};
use std::sync::Arc;

use super::memory::{StoreError, StoreHost};
use super::protocol::{
    ENDPOINT_PROCEDURE, ENDPOINT_STORE_OP, HEADER_PASSWORD, HEADER_USER, ProcedureCall,
    StoreCall, StoreResponse,
};

/// Router serving both bindings for one store host.
pub fn store_router(host: Arc<StoreHost>) -> Router {
    Router::new()
        .route(ENDPOINT_STORE_OP, post(handle_store_op))
        .route(ENDPOINT_PROCEDURE, post(handle_procedure))
        .layer(Extension(host))
}

pub async fn handle_store_op(
    Extension(host): Extension<Arc<StoreHost>>,
    Path((store, op)): Path<(String, String)>,
    headers: HeaderMap,
    Json(args): Json<serde_json::Value>,
) -> (StatusCode, Json<StoreResponse>) {
    if let Err(e) = authorize(&host, &headers) {
        return failure(e);
    }

    let call = match StoreCall::from_op(&op, args) {
        Ok(call) => call,
        Err(e) => {
            tracing::error!("Failed to decode {} on store {}: {}", op, store, e);
            return failure(e);
        }
    };

    respond(&host, &store, call)
}

pub async fn handle_procedure(
    Extension(host): Extension<Arc<StoreHost>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ProcedureCall>,
) -> (StatusCode, Json<StoreResponse>) {
    if let Err(e) = authorize(&host, &headers) {
        return failure(e);
    }

    let call = match StoreCall::from_procedure(&name, req.args) {
        Ok(call) => call,
        Err(e) => {
            tracing::error!("Failed to decode procedure {}: {}", name, e);
            return failure(e);
        }
    };

    respond(&host, &req.store, call)
}

fn authorize(host: &StoreHost, headers: &HeaderMap) -> Result<(), StoreError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let user = header(HEADER_USER);
    let result = host.authorize(&user, &header(HEADER_PASSWORD));
    if result.is_err() {
        tracing::warn!("Rejected request from user '{}'", user);
    }
    result
}

fn respond(host: &StoreHost, store: &str, call: StoreCall) -> (StatusCode, Json<StoreResponse>) {
    match host.execute(store, call) {
        Ok(reply) => (
            StatusCode::OK,
            Json(StoreResponse {
                reply: Some(reply),
                error: None,
            }),
        ),
        Err(e) => {
            if !matches!(e, StoreError::DuplicateKey(_)) {
                tracing::error!("Store {} request failed: {}", store, e);
            }
            failure(e)
        }
    }
}

fn failure(error: StoreError) -> (StatusCode, Json<StoreResponse>) {
    (
        status_for(&error),
        Json(StoreResponse {
            reply: None,
            error: Some(error.to_string()),
        }),
    )
}

pub fn status_for(error: &StoreError) -> StatusCode {
    match error {
        StoreError::DuplicateKey(_) => StatusCode::CONFLICT,
        StoreError::UnknownStore(_) => StatusCode::NOT_FOUND,
        StoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        StoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
    }
}
