//! HTTP API for a storage node
//!
//! The gateway-facing facade: human verbs (register, login, upload,
//! download...) turned into calls against the node. File routes require a
//! bearer session token; auth routes and health do not.

use crate::node::server::DataNode;
use crate::node::sessions::SessionRecord;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn create_router(node: DataNode) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cluster", get(cluster_info))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/validate", get(validate))
        .route("/files", get(list_files))
        .route("/files/search", get(search_files))
        .route(
            "/files/:name",
            put(upload_file)
                .get(download_file)
                .delete(delete_file)
                .patch(edit_file),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES)),
        )
        .with_state(node)
}

fn error_response(e: crate::Error) -> Response {
    (e.to_http_status(), Json(json!({ "error": e.to_string() }))).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the session for a request or produce the 401 response.
fn authorize(node: &DataNode, headers: &HeaderMap) -> Result<SessionRecord, Response> {
    let token = bearer_token(headers).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing bearer token" })),
        )
            .into_response()
    })?;

    node.validate_session(token).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid or expired token" })),
        )
            .into_response()
    })
}

// === Health & cluster ===

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

async fn cluster_info(State(node): State<DataNode>) -> impl IntoResponse {
    let view = node.current_view();
    let coordinator_endpoint = node.registry_endpoint();
    Json(json!({
        "node": node.node_id(),
        "status": node.status().to_string(),
        "is_coordinator": node.is_coordinator(),
        "cluster_size": view.size(),
        "coordinator": view.coordinator(),
        "coordinator_endpoint": coordinator_endpoint,
    }))
}

// === Auth ===

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

async fn register(
    State(node): State<DataNode>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let user_id = Uuid::new_v4().to_string();
    match node
        .register_user(&user_id, &req.name, &req.password, &req.email)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": "email already in use" })),
            )
                .into_response();
        }
        Err(e) => return error_response(e),
    }

    // Log the fresh user straight in
    match node.login(&req.email, &req.password) {
        Ok(Some(user)) => match node.create_session(&user) {
            Ok(session) => (
                StatusCode::CREATED,
                Json(json!({ "user_id": user_id, "token": session.token })),
            )
                .into_response(),
            Err(e) => error_response(e),
        },
        Ok(None) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "registered user not found" })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(State(node): State<DataNode>, Json(req): Json<LoginRequest>) -> Response {
    match node.login(&req.email, &req.password) {
        Ok(Some(user)) => match node.create_session(&user) {
            Ok(session) => Json(json!({
                "token": session.token,
                "user_id": user.id,
                "expires_at": session.expires_at,
            }))
            .into_response(),
            Err(e) => error_response(e),
        },
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid credentials" })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn logout(State(node): State<DataNode>, headers: HeaderMap) -> Response {
    match bearer_token(&headers) {
        Some(token) if node.logout(token) => {
            Json(json!({ "logged_out": true })).into_response()
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unknown session" })),
        )
            .into_response(),
    }
}

async fn validate(State(node): State<DataNode>, headers: HeaderMap) -> Response {
    match bearer_token(&headers).and_then(|t| node.validate_session(t)) {
        Some(session) => Json(json!({
            "valid": true,
            "user_id": session.user_id,
            "email": session.email,
        }))
        .into_response(),
        None => Json(json!({ "valid": false })).into_response(),
    }
}

// === Files ===

async fn upload_file(
    State(node): State<DataNode>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = match authorize(&node, &headers) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match node.save_file(&session.user_id, &name, &body).await {
        Ok(_) => (
            StatusCode::CREATED,
            Json(json!({ "saved": name, "size": body.len() })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn download_file(
    State(node): State<DataNode>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let session = match authorize(&node, &headers) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match node.download_file(&session.user_id, &name).await {
        Ok(content) => (StatusCode::OK, content).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_file(
    State(node): State<DataNode>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let session = match authorize(&node, &headers) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match node.delete_file(&session.user_id, &name).await {
        Ok(_) => Json(json!({ "deleted": name })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn edit_file(
    State(node): State<DataNode>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = match authorize(&node, &headers) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match node.edit_file(&session.user_id, &name, &body).await {
        Ok(_) => Json(json!({ "edited": name, "size": body.len() })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_files(State(node): State<DataNode>, headers: HeaderMap) -> Response {
    let session = match authorize(&node, &headers) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match node.list_files(&session.user_id) {
        Ok(files) => Json(json!({ "files": files })).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    name: String,
}

async fn search_files(
    State(node): State<DataNode>,
    Query(query): Query<SearchQuery>,
    headers: HeaderMap,
) -> Response {
    if authorize(&node, &headers).is_err() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid token" })),
        )
            .into_response();
    }

    match node.find_files_by_name(&query.name) {
        Ok(records) => {
            let results: Vec<serde_json::Value> = records
                .iter()
                .map(|r| {
                    json!({
                        "user_id": r.user_id,
                        "user_name": r.user_name,
                        "file_name": r.file_name,
                        "size": r.size,
                        "created_at": r.created_at,
                        "updated_at": r.updated_at,
                    })
                })
                .collect();
            Json(json!({ "results": results, "total": results.len() })).into_response()
        }
        Err(e) => error_response(e),
    }
}
