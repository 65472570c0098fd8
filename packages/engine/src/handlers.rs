//! HTTP handlers for simulated peer actors.
//!
//! - `GET  /ap/u/{session_id}/{actor_id}` — the actor's profile.
//! - `POST /ap/u/{session_id}/{actor_id}/inbox` — inbox delivery, 202.

use std::sync::Arc;

use apconform::ACTIVITY_JSON;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::directory::ActorDirectory;
use crate::error::PeerError;
use crate::peer::PeerActor;

fn lookup(
    directory: &ActorDirectory,
    session_id: &str,
    actor_id: &str,
) -> Result<Arc<PeerActor>, PeerError> {
    directory
        .get(session_id, actor_id)
        .ok_or_else(|| PeerError::NotFound(format!("actor {session_id}/{actor_id} not found")))
}

/// `GET /ap/u/{session_id}/{actor_id}`
pub async fn profile(
    State(directory): State<Arc<ActorDirectory>>,
    Path((session_id, actor_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, PeerError> {
    let actor = lookup(&directory, &session_id, &actor_id)?;
    Ok((
        [(header::CONTENT_TYPE, ACTIVITY_JSON)],
        Json(actor.profile().clone()),
    ))
}

/// `POST /ap/u/{session_id}/{actor_id}/inbox`
///
/// Any JSON body is accepted regardless of content type; only bytes that
/// are not JSON at all get a 400. An object typed `Follow` triggers the
/// actor's auto-accept after the response is sent.
pub async fn inbox(
    State(directory): State<Arc<ActorDirectory>>,
    Path((session_id, actor_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, PeerError> {
    let actor = lookup(&directory, &session_id, &actor_id)?;
    let delivery: Value = serde_json::from_slice(&body)
        .map_err(|e| PeerError::BadRequest(format!("inbox body is not JSON: {e}")))?;
    info!(
        "peer: {} received {} in session {session_id}",
        actor.uri(),
        delivery
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("untyped body")
    );
    actor.receive(delivery);
    Ok((StatusCode::ACCEPTED, "Accepted"))
}

/// Everything else.
pub async fn not_found(uri: Uri) -> PeerError {
    PeerError::NotFound(format!("no route for {uri}"))
}
