//! Process-wide engine state shared by every session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use apconform::SigningKeypair;
use axum::Router;
use reqwest::Client;

use crate::{config::EngineConfig, directory::ActorDirectory, error::EngineError, router};

/// Configuration, the HTTP client, the shared actor keypair and the actor
/// directory. Cheap to clone; every field is shared.
///
/// The keypair is generated (or loaded) once by the caller and injected
/// here; simulated actors borrow it by reference and never mutate it.
#[derive(Debug, Clone)]
pub struct EngineContext {
    config: Arc<EngineConfig>,
    http: Client,
    keypair: Arc<SigningKeypair>,
    directory: Arc<ActorDirectory>,
    actor_seq: Arc<AtomicU64>,
}

impl EngineContext {
    pub fn new(config: EngineConfig, keypair: Arc<SigningKeypair>) -> Result<Self, EngineError> {
        let http = Client::builder()
            .user_agent(concat!("apconform/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(config, keypair, http))
    }

    pub fn with_client(config: EngineConfig, keypair: Arc<SigningKeypair>, http: Client) -> Self {
        Self {
            config: Arc::new(config),
            http,
            keypair,
            directory: Arc::new(ActorDirectory::new()),
            actor_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn keypair(&self) -> &Arc<SigningKeypair> {
        &self.keypair
    }

    pub fn directory(&self) -> &Arc<ActorDirectory> {
        &self.directory
    }

    /// The router serving every actor in [`directory`](Self::directory).
    pub fn router(&self) -> Router {
        router::build_router(Arc::clone(&self.directory))
    }

    /// Display number for the next simulated actor, starting at 1.
    pub fn next_actor_seq(&self) -> u64 {
        self.actor_seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_numbers_are_shared_across_clones() {
        let key = Arc::new(SigningKeypair::generate(1024).unwrap());
        let ctx = EngineContext::new(
            EngineConfig::for_listener("127.0.0.1:0".parse().unwrap()),
            key,
        )
        .unwrap();
        let other = ctx.clone();
        assert_eq!(ctx.next_actor_seq(), 1);
        assert_eq!(other.next_actor_seq(), 2);
        assert_eq!(ctx.next_actor_seq(), 3);
    }
}
