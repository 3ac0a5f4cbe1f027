use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{
        header::{CONTENT_LANGUAGE, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::codec::{error_document, marshal_scope, MEDIA_TYPE};
use crate::logic::{JsonApiHandler, OperationResult, ResponseStatus};
use crate::model::RequestContext;

pub type AppState = Arc<JsonApiHandler>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn list_resources(
    State(engine): State<AppState>,
    Path(collection): Path<String>,
    RawQuery(query): RawQuery,
    ctx: RequestContext,
) -> Response {
    let query = query.unwrap_or_default();
    into_http(engine.list(&collection, &query, &ctx).await)
}

pub async fn get_resource(
    State(engine): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    ctx: RequestContext,
) -> Response {
    let query = query.unwrap_or_default();
    into_http(engine.get(&collection, &id, &query, &ctx).await)
}

pub async fn get_related(
    State(engine): State<AppState>,
    Path((collection, id, relation)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    ctx: RequestContext,
) -> Response {
    let query = query.unwrap_or_default();
    into_http(
        engine
            .get_related(&collection, &id, &relation, &query, &ctx)
            .await,
    )
}

pub async fn get_relationship(
    State(engine): State<AppState>,
    Path((collection, id, relation)): Path<(String, String, String)>,
    ctx: RequestContext,
) -> Response {
    into_http(
        engine
            .get_relationship(&collection, &id, &relation, &ctx)
            .await,
    )
}

pub async fn create_resource(
    State(engine): State<AppState>,
    Path(collection): Path<String>,
    ctx: RequestContext,
    body: Bytes,
) -> Response {
    into_http(engine.create(&collection, &body, &ctx).await)
}

pub async fn patch_resource(
    State(engine): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    ctx: RequestContext,
    body: Bytes,
) -> Response {
    into_http(engine.patch(&collection, &id, &body, &ctx).await)
}

pub async fn delete_resource(
    State(engine): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    ctx: RequestContext,
) -> Response {
    into_http(engine.delete(&collection, &id, &ctx).await)
}

fn document_response(status: StatusCode, body: String) -> Response {
    (status, [(CONTENT_TYPE, MEDIA_TYPE)], body).into_response()
}

fn into_http(result: OperationResult) -> Response {
    match result {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status.code()).unwrap_or(StatusCode::OK);
            if response.status == ResponseStatus::NoContent {
                return status.into_response();
            }
            let document = response
                .scope
                .as_ref()
                .map(|scope| marshal_scope(scope, response.identifiers_only))
                .unwrap_or_else(|| json!({ "data": null }));

            let mut http = document_response(status, document.to_string());
            if let Some(value) = response
                .content_language
                .as_deref()
                .and_then(|tag| HeaderValue::from_str(tag).ok())
            {
                http.headers_mut().insert(CONTENT_LANGUAGE, value);
            }
            http
        }
        Err(err) => {
            let status =
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            document_response(status, error_document(&err).to_string())
        }
    }
}
