//! Shared helpers for the apconform end-to-end suite.
//!
//! [`spawn_engine`] serves simulated peer actors on an ephemeral loopback
//! port; [`spawn_reference`] does the same for a [`ReferenceServer`] the
//! battery can be pointed at. Both run in background `tokio` tasks.

pub mod reference;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use apconform::SigningKeypair;
use apconform_engine::{EngineConfig, EngineContext, RetryPolicy, ScriptedOperator};
use serde_json::json;

pub use reference::{Behavior, ReferenceServer};

/// A 1024-bit keypair generated once per test binary.
///
/// # Panics
///
/// Panics if key generation fails.
pub fn test_keypair() -> Arc<SigningKeypair> {
    static KEY: OnceLock<Arc<SigningKeypair>> = OnceLock::new();
    KEY.get_or_init(|| Arc::new(SigningKeypair::generate(1024).expect("generate test keypair")))
        .clone()
}

/// Start the engine's actor routes on `127.0.0.1` and return a context
/// whose `public_base` points at them.
///
/// Polling is shortened so eventual-consistency checks that are meant to
/// fail give up quickly.
///
/// # Panics
///
/// Panics if the listener cannot be bound.
pub async fn spawn_engine() -> EngineContext {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");

    let mut config = EngineConfig::for_listener(addr);
    config.retry = RetryPolicy::new(20, Duration::from_millis(50));
    config.key_bits = 1024;
    let ctx = EngineContext::new(config, test_keypair()).expect("build engine context");

    let router = ctx.router();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("engine listener error");
    });
    ctx
}

/// Start a [`ReferenceServer`] with `behavior` and return it.
///
/// # Panics
///
/// Panics if the listener cannot be bound.
pub async fn spawn_reference(behavior: Behavior) -> Arc<ReferenceServer> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");

    let server = Arc::new(ReferenceServer::new(
        format!("http://{addr}"),
        "conformance-token",
        behavior,
        test_keypair(),
    ));
    let router = reference::router(Arc::clone(&server));
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("reference listener error");
    });
    server
}

/// An operator that selects the client-to-server battery against
/// `server`, then fills in project details and finishes.
pub fn c2s_operator(server: &ReferenceServer) -> ScriptedOperator {
    ScriptedOperator::new()
        .then(json!({ "testing-c2s-server": true }))
        .then(json!({ "actor-id": server.actor_uri() }))
        .then(json!({ "auth-token": server.token() }))
        .then(json!({
            "project-name": "reference",
            "website": "https://reference.test",
            "repo": "https://git.reference.test",
        }))
        .then(json!({}))
}
