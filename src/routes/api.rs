//! HTTP routes for the discussion API
//!
//! Provides REST endpoints over the thread service:
//! - POST /api/thread                - Start a thread in a group
//! - POST /api/post                  - Submit a post or reply
//! - POST /api/group                 - Ensure a group actor exists
//! - GET  /api/threads?group=...     - List threads in a group
//! - GET  /api/thread/stats?threadIri=... - Counters for one thread
//! - GET  /api/thread/{iri}          - Counters plus flat note list
//!                                     (?format=tree for the nested forest)
//! - GET  /api/note/stats?noteIri=...     - Counters for one note
//! - POST /api/note/{iri}/upvote     - Vote endpoints
//! - POST /api/note/{iri}/downvote
//!
//! Moderation endpoints require `Authorization: Bearer <admin secret>`:
//! - POST /api/thread/{iri}/lock|unlock|pin|unpin|delete|reconcile
//!
//! Object IRIs appearing in paths are percent-encoded by the caller.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::server::AppState;
use crate::threads::CreatePost;
use crate::types::AgoraError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateThreadRequest {
    title: String,
    group_context: String,
    /// Local actor name submitting the thread
    #[serde(default = "default_actor")]
    actor: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePostRequest {
    content: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    in_reply_to: Option<String>,
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    cc: Vec<String>,
    #[serde(default = "default_actor")]
    actor: String,
}

fn default_actor() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Deserialize)]
struct CreateGroupRequest {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreadCreatedResponse {
    ok: bool,
    thread_root_id: String,
    activity_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostCreatedResponse {
    ok: bool,
    message_id: String,
    activity_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupResponse {
    ok: bool,
    group_iri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconcileResponse {
    ok: bool,
    reply_count: u64,
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// =============================================================================
// Dispatch
// =============================================================================

/// Route /api/* requests. Returns None for paths outside /api.
pub async fn handle_api_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/api") {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    // Remove query string for matching
    let path = path.split('?').next().unwrap_or(path).to_string();

    let response = match (method, path.as_str()) {
        (&Method::POST, "/api/thread") => handle_create_thread(req, state).await,
        (&Method::POST, "/api/post") => handle_create_post(req, state).await,
        (&Method::POST, "/api/group") => handle_create_group(req, state).await,

        (&Method::GET, "/api/threads") => handle_list_threads(req, state).await,
        (&Method::GET, "/api/thread/stats") => handle_thread_stats(req, state).await,
        (&Method::GET, "/api/note/stats") => handle_note_stats(req, state).await,

        (&Method::POST, p) if p.starts_with("/api/note/") => {
            handle_note_action(state, p).await
        }

        (&Method::POST, p) if p.starts_with("/api/thread/") => {
            handle_thread_action(&req, state, p).await
        }

        (&Method::GET, p) if p.starts_with("/api/thread/") => {
            let iri = decode_path_segment(p.strip_prefix("/api/thread/").unwrap_or(""));
            let as_tree = query_param(req.uri().query(), "format").as_deref() == Some("tree");
            handle_get_thread(state, &iri, as_tree).await
        }

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: format!("No route for {}", path),
            },
        ),
    };

    Some(response)
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /api/thread
async fn handle_create_thread(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let request: CreateThreadRequest = match parse_json_body(req).await {
        Ok(r) => r,
        Err(e) => return bad_request(&e.to_string()),
    };

    let actor_iri = state.engine.actor_iri(&request.actor);

    match state
        .threads
        .create_thread(&actor_iri, &request.title, &request.group_context)
        .await
    {
        Ok(submission) => json_response(
            StatusCode::CREATED,
            &ThreadCreatedResponse {
                ok: true,
                thread_root_id: submission.message_id,
                activity_id: submission.activity_id,
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /api/post
async fn handle_create_post(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let request: CreatePostRequest = match parse_json_body(req).await {
        Ok(r) => r,
        Err(e) => return bad_request(&e.to_string()),
    };

    let actor_iri = state.engine.actor_iri(&request.actor);

    match state
        .threads
        .create_post(
            &actor_iri,
            CreatePost {
                content: request.content,
                context: request.context,
                in_reply_to: request.in_reply_to,
                to: request.to,
                cc: request.cc,
            },
        )
        .await
    {
        Ok(submission) => json_response(
            StatusCode::CREATED,
            &PostCreatedResponse {
                ok: true,
                message_id: submission.message_id,
                activity_id: submission.activity_id,
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /api/group
async fn handle_create_group(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let request: CreateGroupRequest = match parse_json_body(req).await {
        Ok(r) => r,
        Err(e) => return bad_request(&e.to_string()),
    };

    if request.name.trim().is_empty() {
        return bad_request("name must not be empty");
    }

    match state.engine.ensure_group(request.name.trim()).await {
        Ok(group_iri) => json_response(
            StatusCode::CREATED,
            &GroupResponse {
                ok: true,
                group_iri,
            },
        ),
        Err(e) => error_response(e),
    }
}

/// GET /api/threads?group=...&limit=...&offset=...
async fn handle_list_threads(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let query = req.uri().query();

    let Some(group) = query_param(query, "group") else {
        return bad_request("Missing required query parameter: group");
    };

    let limit = query_param(query, "limit")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(state.args.threads_page_size)
        .clamp(1, 200);
    let offset = query_param(query, "offset")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0)
        .max(0);

    match state.threads.list_threads(&group, limit, offset).await {
        Ok(threads) => json_response(StatusCode::OK, &threads),
        Err(e) => error_response(e),
    }
}

/// GET /api/thread/stats?threadIri=...
async fn handle_thread_stats(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let Some(iri) = query_param(req.uri().query(), "threadIri") else {
        return bad_request("Missing required query parameter: threadIri");
    };

    match state.threads.get_thread_stats(&iri).await {
        Ok(Some(stats)) => json_response(StatusCode::OK, &stats),
        Ok(None) => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: format!("No thread registered for {}", iri),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// GET /api/note/stats?noteIri=...
async fn handle_note_stats(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let Some(iri) = query_param(req.uri().query(), "noteIri") else {
        return bad_request("Missing required query parameter: noteIri");
    };

    match state.threads.get_note_stats(&iri).await {
        Ok(Some(stats)) => json_response(StatusCode::OK, &stats),
        Ok(None) => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: format!("No stats recorded for {}", iri),
            },
        ),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreadTreeResponse {
    thread_stats: Option<crate::stats::ThreadStats>,
    tree: Vec<crate::threads::TreeNode>,
}

/// GET /api/thread/{iri}
async fn handle_get_thread(state: Arc<AppState>, iri: &str, as_tree: bool) -> Response<BoxBody> {
    if iri.is_empty() {
        return bad_request("Missing thread IRI in path");
    }

    match state.threads.get_thread(iri).await {
        Ok(view) if as_tree => json_response(
            StatusCode::OK,
            &ThreadTreeResponse {
                thread_stats: view.thread_stats,
                tree: crate::threads::build_tree(view.notes),
            },
        ),
        Ok(view) => json_response(StatusCode::OK, &view),
        Err(e) => error_response(e),
    }
}

/// POST /api/note/{iri}/upvote, /api/note/{iri}/downvote
async fn handle_note_action(state: Arc<AppState>, path: &str) -> Response<BoxBody> {
    let remainder = path.strip_prefix("/api/note/").unwrap_or("");
    let Some((iri_encoded, action)) = remainder.rsplit_once('/') else {
        return bad_request("Expected /api/note/{iri}/{action}");
    };
    let iri = decode_path_segment(iri_encoded);

    let result = match action {
        "upvote" => state.threads.upvote_note(&iri).await,
        "downvote" => state.threads.downvote_note(&iri).await,
        other => {
            return bad_request(&format!("Unknown note action: {}", other));
        }
    };

    match result {
        Ok(()) => json_response(StatusCode::OK, &OkResponse { ok: true }),
        Err(e) => error_response(e),
    }
}

/// POST /api/thread/{iri}/lock etc. -- moderation, admin secret required
async fn handle_thread_action(
    req: &Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<BoxBody> {
    let remainder = path.strip_prefix("/api/thread/").unwrap_or("");
    let Some((iri_encoded, action)) = remainder.rsplit_once('/') else {
        return bad_request("Expected /api/thread/{iri}/{action}");
    };
    let iri = decode_path_segment(iri_encoded);

    if !is_admin(req, &state) {
        warn!("Rejected unauthorized {} on {}", action, iri);
        return json_response(
            StatusCode::FORBIDDEN,
            &ErrorResponse {
                error: "Admin authorization required".to_string(),
            },
        );
    }

    if action == "reconcile" {
        return match state.threads.reconcile_thread(&iri).await {
            Ok(reply_count) => json_response(
                StatusCode::OK,
                &ReconcileResponse {
                    ok: true,
                    reply_count,
                },
            ),
            Err(e) => error_response(e),
        };
    }

    let result = match action {
        "lock" => state.threads.lock_thread(&iri).await,
        "unlock" => state.threads.unlock_thread(&iri).await,
        "pin" => state.threads.pin_thread(&iri).await,
        "unpin" => state.threads.unpin_thread(&iri).await,
        "delete" => state.threads.delete_thread(&iri).await,
        other => {
            return bad_request(&format!("Unknown thread action: {}", other));
        }
    };

    match result {
        Ok(()) => json_response(StatusCode::OK, &OkResponse { ok: true }),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Bearer-token check against the configured admin secret. A server with no
/// secret configured rejects all moderation requests.
fn is_admin(req: &Request<hyper::body::Incoming>, state: &AppState) -> bool {
    let Some(expected) = state.args.admin_secret.as_deref() else {
        return false;
    };

    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k != key {
            return None;
        }
        Some(
            urlencoding::decode(v)
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| v.to_string()),
        )
    })
}

fn decode_path_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

fn error_response(err: AgoraError) -> Response<BoxBody> {
    let status = match &err {
        AgoraError::Validation(_) => StatusCode::BAD_REQUEST,
        AgoraError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("Request failed: {}", err);
    }

    json_response(
        status,
        &ErrorResponse {
            error: err.to_string(),
        },
    )
}

fn bad_request(message: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::BAD_REQUEST,
        &ErrorResponse {
            error: message.to_string(),
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<hyper::body::Incoming>,
) -> Result<T, AgoraError> {
    let body = req
        .collect()
        .await
        .map_err(|e| AgoraError::Http(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > 10240 {
        return Err(AgoraError::Http("Request body too large".into()));
    }

    serde_json::from_slice(&bytes).map_err(|e| AgoraError::Http(format!("Invalid JSON: {}", e)))
}
