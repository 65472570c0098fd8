use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{directory::ActorDirectory, handlers};

/// Build the router that exposes every registered simulated actor.
pub fn build_router(directory: Arc<ActorDirectory>) -> Router {
    Router::new()
        .route("/ap/u/{session_id}/{actor_id}", get(handlers::profile))
        .route("/ap/u/{session_id}/{actor_id}/inbox", post(handlers::inbox))
        .fallback(handlers::not_found)
        .with_state(directory)
        .layer(TraceLayer::new_for_http())
}
