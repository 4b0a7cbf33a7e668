use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, put},
};
use std::sync::Arc;

use super::types::{
    AddRecordRequest, FailureItem, FragmentItem, FragmentsResponse, LookupResponse,
    RecordsResponse, SearchParams, UpdateRecordRequest, WriteResponse,
};
use crate::access::predicate::FilterSet;
use crate::access::service::{RecordService, RecordSet};
use crate::algorithms::sort::sort_by_id;
use crate::error::{AccessError, Result};

pub const ENDPOINT_RECORDS: &str = "/records";
pub const ENDPOINT_RECORD: &str = "/records/:partition/:id";
pub const ENDPOINT_SEARCH: &str = "/records/search";
pub const ENDPOINT_FILTER: &str = "/records/filter";
pub const ENDPOINT_SORTED: &str = "/records/sorted";
pub const ENDPOINT_RANKED: &str = "/records/ranked";
pub const ENDPOINT_LOOKUP: &str = "/records/lookup/:id";
pub const ENDPOINT_FRAGMENTS: &str = "/fragments";

/// Gateway router over one `RecordService`.
pub fn api_router(service: Arc<RecordService>) -> Router {
    Router::new()
        .route(
            ENDPOINT_RECORDS,
            get(handle_fetch_all).post(handle_add_record),
        )
        .route(
            ENDPOINT_RECORD,
            put(handle_update_record).delete(handle_delete_record),
        )
        .route(ENDPOINT_SEARCH, get(handle_search))
        .route(ENDPOINT_FILTER, get(handle_filter))
        .route(ENDPOINT_SORTED, get(handle_sorted))
        .route(ENDPOINT_RANKED, get(handle_ranked))
        .route(ENDPOINT_LOOKUP, get(handle_lookup))
        .route(ENDPOINT_FRAGMENTS, get(handle_fragments))
        .layer(Extension(service))
}

// ============================================================
// WRITES
// ============================================================

pub async fn handle_add_record(
    Extension(service): Extension<Arc<RecordService>>,
    Json(req): Json<AddRecordRequest>,
) -> (StatusCode, Json<WriteResponse>) {
    let result = service
        .add_record(req.id, &req.name, &req.partition, req.score, req.presence)
        .await;

    write_response(req.id, req.partition, result, StatusCode::CREATED, StatusCode::CONFLICT)
}

pub async fn handle_update_record(
    Extension(service): Extension<Arc<RecordService>>,
    Path((partition, id)): Path<(String, i64)>,
    Json(req): Json<UpdateRecordRequest>,
) -> (StatusCode, Json<WriteResponse>) {
    let result = service
        .update_record(id, &partition, req.score, req.presence)
        .await;

    write_response(id, partition, result, StatusCode::OK, StatusCode::NOT_FOUND)
}

pub async fn handle_delete_record(
    Extension(service): Extension<Arc<RecordService>>,
    Path((partition, id)): Path<(String, i64)>,
) -> (StatusCode, Json<WriteResponse>) {
    let result = service.delete_record(id, &partition).await;

    write_response(id, partition, result, StatusCode::OK, StatusCode::NOT_FOUND)
}

fn write_response(
    id: i64,
    partition: String,
    result: Result<bool>,
    applied: StatusCode,
    not_applied: StatusCode,
) -> (StatusCode, Json<WriteResponse>) {
    let (status, label, error) = match result {
        Ok(true) => (applied, "applied", None),
        Ok(false) => (not_applied, "not_applied", None),
        Err(e) => {
            tracing::debug!("Rejected write of record {}: {}", id, e);
            (status_for(&e), "rejected", Some(e.to_string()))
        }
    };

    (
        status,
        Json(WriteResponse {
            id,
            partition,
            status: label.to_string(),
            error,
        }),
    )
}

// ============================================================
// READS
// ============================================================

pub async fn handle_fetch_all(
    Extension(service): Extension<Arc<RecordService>>,
) -> (StatusCode, Json<RecordsResponse>) {
    (StatusCode::OK, Json(service.fetch_all().await.into()))
}

pub async fn handle_search(
    Extension(service): Extension<Arc<RecordService>>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<RecordsResponse>) {
    let result = service
        .search(
            params.q.as_deref(),
            params.min_score,
            params.max_score,
            params.partition.as_deref(),
        )
        .await;

    records_response(result)
}

pub async fn handle_filter(
    Extension(service): Extension<Arc<RecordService>>,
    Query(filters): Query<FilterSet>,
) -> (StatusCode, Json<RecordsResponse>) {
    records_response(service.filter(&filters).await)
}

pub async fn handle_sorted(
    Extension(service): Extension<Arc<RecordService>>,
) -> (StatusCode, Json<RecordsResponse>) {
    let mut set = service.fetch_all().await;
    set.records = service.sort_by_score(&set.records);
    (StatusCode::OK, Json(set.into()))
}

pub async fn handle_ranked(
    Extension(service): Extension<Arc<RecordService>>,
) -> (StatusCode, Json<RecordsResponse>) {
    let mut set = service.fetch_all().await;
    set.records = service.rank_by_total(&set.records);
    (StatusCode::OK, Json(set.into()))
}

pub async fn handle_lookup(
    Extension(service): Extension<Arc<RecordService>>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<LookupResponse>) {
    let set = service.fetch_all().await;
    let sorted = sort_by_id(&set.records);
    let record = service.find_by_id(&sorted, id);
    let complete = set.is_complete();

    let status = if record.is_some() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };

    (
        status,
        Json(LookupResponse {
            id,
            found: record.is_some(),
            record,
            complete,
            failures: set.failures.into_iter().map(FailureItem::from).collect(),
        }),
    )
}

pub async fn handle_fragments(
    Extension(service): Extension<Arc<RecordService>>,
) -> Json<FragmentsResponse> {
    let fragments = service
        .fetch_fragments()
        .await
        .into_iter()
        .map(FragmentItem::from)
        .collect();

    Json(FragmentsResponse { fragments })
}

fn records_response(result: Result<RecordSet>) -> (StatusCode, Json<RecordsResponse>) {
    match result {
        Ok(set) => (StatusCode::OK, Json(set.into())),
        Err(e) => {
            tracing::debug!("Rejected read: {}", e);
            (status_for(&e), Json(RecordsResponse::rejected(e.to_string())))
        }
    }
}

/// HTTP status for an error that reached the gateway.
pub fn status_for(error: &AccessError) -> StatusCode {
    match error {
        AccessError::UnknownPartition(_) => StatusCode::BAD_REQUEST,
        AccessError::InvalidRecord(_) | AccessError::InvalidFilter(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AccessError::DuplicateKey { .. } => StatusCode::CONFLICT,
        AccessError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AccessError::NodeUnreachable { .. } | AccessError::QueryExecution { .. } => {
            StatusCode::BAD_GATEWAY
        }
    }
}
