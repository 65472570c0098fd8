//! Simulated peer actors.
//!
//! A [`PeerActor`] is an actor the engine controls. It serves a profile,
//! records what arrives in its inbox, and answers `Follow` with `Accept`.
//! Every request it sends is signed with its own key id and the shared
//! keypair held by the engine context.

use std::sync::{Arc, Mutex};

use apconform::{Document, Prop, SignedIdentity, SigningKeypair, AS_CONTEXT};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::{AuthenticatedClient, Fetcher, PostOutcome};
use crate::error::EngineError;

pub struct PeerActor {
    uri: String,
    seq: u64,
    profile: Document,
    client: AuthenticatedClient,
    inbox: Mutex<Vec<Value>>,
}

impl PeerActor {
    /// Build an actor living at `uri`. `seq` is only used for its display name.
    pub fn new(uri: impl Into<String>, seq: u64, keypair: Arc<SigningKeypair>, http: Client) -> Self {
        let uri = uri.into();
        let key_id = format!("{uri}#main-key");
        let profile: Document = Document::new()
            .with(Prop::Context, AS_CONTEXT)
            .with(Prop::Id, uri.as_str())
            .with(Prop::Type, "Person")
            .with(Prop::PreferredUsername, format!("actor-{seq}"))
            .with(Prop::Inbox, format!("{uri}/inbox"))
            .with(Prop::Outbox, format!("{uri}/outbox"))
            .with(
                Prop::PublicKey,
                json!({
                    "id": key_id,
                    "owner": uri,
                    "publicKeyPem": keypair.public_key_pem(),
                }),
            );
        let client =
            AuthenticatedClient::anonymous(http).with_identity(SignedIdentity::new(key_id, keypair));
        Self {
            uri,
            seq,
            profile,
            client,
            inbox: Mutex::new(Vec::new()),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn profile(&self) -> &Document {
        &self.profile
    }

    pub fn inbox_uri(&self) -> String {
        format!("{}/inbox", self.uri)
    }

    /// Snapshot of every body delivered so far, in arrival order. Bodies
    /// are kept as received, objects or not.
    pub fn inbox(&self) -> Vec<Value> {
        self.inbox.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Signed GET.
    pub async fn get_json(&self, url: &str) -> Result<Document, EngineError> {
        self.client.get_json(url).await
    }

    /// Signed POST. Fills in `id` and `actor` when the document lacks them.
    pub async fn post(&self, url: &str, mut doc: Document) -> Result<PostOutcome, EngineError> {
        if !doc.has(Prop::Id) {
            doc.set(Prop::Id, format!("{}/accept-{}", self.uri, Uuid::now_v7()));
        }
        if !doc.has(Prop::Actor) {
            doc.set(Prop::Actor, self.uri.as_str());
        }
        self.client.post_json(url, &doc).await
    }

    /// Record an inbox delivery. An object typed `Follow` is answered in
    /// the background; the caller responds 202 without waiting for it.
    pub fn receive(self: &Arc<Self>, delivery: Value) {
        let follow = match &delivery {
            Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("Follow") => {
                Some(Document::from(map.clone()))
            }
            _ => None,
        };
        self.inbox
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(delivery);

        if let Some(activity) = follow {
            let actor = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = actor.accept_follow(&activity).await {
                    error!("peer: auto-accept from {} failed: {e}", actor.uri);
                }
            });
        }
    }

    async fn accept_follow(&self, follow: &Document) -> Result<(), EngineError> {
        let follower_uri = follow
            .uri(Prop::Actor)
            .ok_or_else(|| EngineError::missing(Prop::Actor))?;
        let follower = self.get_json(follower_uri).await?;
        let follower_inbox = follower
            .uri(Prop::Inbox)
            .ok_or_else(|| EngineError::missing(Prop::Inbox))?;

        let object = match follow.id() {
            Some(id) => json!(id),
            None => follow.clone().into_value(),
        };
        let accept = Document::new()
            .with(Prop::Context, AS_CONTEXT)
            .with(Prop::Type, "Accept")
            .with(Prop::Actor, self.uri.as_str())
            .with(Prop::Object, object);

        let outcome = self.post(follower_inbox, accept).await?;
        if outcome.is_success() {
            info!("peer: {} accepted follow from {follower_uri}", self.uri);
        } else {
            warn!(
                "peer: delivering Accept to {follower_inbox} returned status {}",
                outcome.status
            );
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Fetcher for PeerActor {
    async fn get_json(&self, url: &str) -> Result<Document, EngineError> {
        self.client.get_json(url).await
    }
}

impl std::fmt::Debug for PeerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerActor")
            .field("uri", &self.uri)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use std::time::Duration;

    use axum::{
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };

    fn test_keypair() -> Arc<SigningKeypair> {
        static KEY: OnceLock<Arc<SigningKeypair>> = OnceLock::new();
        KEY.get_or_init(|| Arc::new(SigningKeypair::generate(1024).unwrap()))
            .clone()
    }

    #[test]
    fn profile_shape() {
        let actor = PeerActor::new("http://h/ap/u/s/a", 3, test_keypair(), Client::new());
        let p = actor.profile();
        assert_eq!(p.id(), Some("http://h/ap/u/s/a"));
        assert_eq!(p.kind(), Some("Person"));
        assert_eq!(p.str(Prop::PreferredUsername), Some("actor-3"));
        assert_eq!(p.str(Prop::Inbox), Some("http://h/ap/u/s/a/inbox"));
        assert_eq!(p.str(Prop::Outbox), Some("http://h/ap/u/s/a/outbox"));
        let key = p.embedded(Prop::PublicKey).unwrap();
        assert_eq!(key.id(), Some("http://h/ap/u/s/a#main-key"));
        assert_eq!(key.get_key("owner"), Some(&json!("http://h/ap/u/s/a")));
        assert!(key
            .get_key("publicKeyPem")
            .and_then(Value::as_str)
            .unwrap()
            .starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[tokio::test]
    async fn inbox_is_append_only_in_arrival_order() {
        let actor = Arc::new(PeerActor::new("http://h/a", 1, test_keypair(), Client::new()));
        actor.receive(json!({ "type": "Create" }));
        actor.receive(json!([1, 2, 3]));
        actor.receive(json!({ "type": "Like" }));
        assert_eq!(
            actor.inbox(),
            [json!({ "type": "Create" }), json!([1, 2, 3]), json!({ "type": "Like" })]
        );
    }

    #[tokio::test]
    async fn non_object_follow_lookalikes_are_only_recorded() {
        let actor = Arc::new(PeerActor::new("http://h/a", 1, test_keypair(), Client::new()));
        actor.receive(json!("Follow"));
        actor.receive(json!([{ "type": "Follow" }]));
        assert_eq!(actor.inbox().len(), 2);
    }

    /// A follower that serves its profile and captures its inbox.
    async fn spawn_follower() -> (String, Arc<Mutex<Vec<(HeaderMap, Value)>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let profile = json!({ "id": format!("{base}/alice"), "inbox": format!("{base}/alice/inbox") });

        let app = Router::new()
            .route("/alice", get(move || async move { Json(profile) }))
            .route(
                "/alice/inbox",
                post(
                    |State(r): State<Arc<Mutex<Vec<(HeaderMap, Value)>>>>,
                     h: HeaderMap,
                     body: Bytes| async move {
                        r.lock().unwrap().push((h, serde_json::from_slice(&body).unwrap()));
                        StatusCode::ACCEPTED
                    },
                ),
            )
            .with_state(received.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (base, received)
    }

    #[tokio::test]
    async fn follow_is_answered_with_signed_accept() {
        let (base, received) = spawn_follower().await;
        let actor = Arc::new(PeerActor::new("http://peer/a", 1, test_keypair(), Client::new()));
        actor.receive(json!({
            "id": format!("{base}/follows/1"),
            "type": "Follow",
            "actor": format!("{base}/alice"),
            "object": "http://peer/a",
        }));

        let mut accept = None;
        for _ in 0..50 {
            if let Some(first) = received.lock().unwrap().first().cloned() {
                accept = Some(first);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let (headers, body) = accept.expect("accept delivered");
        assert_eq!(body["type"], "Accept");
        assert_eq!(body["actor"], "http://peer/a");
        assert_eq!(body["object"], format!("{base}/follows/1"));
        assert!(body["id"].as_str().unwrap().starts_with("http://peer/a/accept-"));
        let sig = headers["signature"].to_str().unwrap();
        assert!(sig.starts_with(r#"keyId="http://peer/a#main-key""#));
    }

    #[tokio::test]
    async fn post_keeps_explicit_id_and_actor() {
        let (base, received) = spawn_follower().await;
        let actor = PeerActor::new("http://peer/b", 2, test_keypair(), Client::new());
        let outcome = actor
            .post(
                &format!("{base}/alice/inbox"),
                Document::new().with(Prop::Id, "urn:x").with(Prop::Actor, "urn:y"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, 202);
        let (_, body) = received.lock().unwrap()[0].clone();
        assert_eq!(body["id"], "urn:x");
        assert_eq!(body["actor"], "urn:y");
    }
}
