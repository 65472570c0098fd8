//! An in-process ActivityPub server for the battery to test against.
//!
//! It hosts one actor, `alice`, at `{base}/users/alice`, and does what a
//! conforming client-to-server implementation is expected to do with
//! outbox submissions. [`Behavior`] switches individual duties off so the
//! failing side of each assertion can be exercised too.
//!
//! | Route | Method | Purpose |
//! |-------|--------|---------|
//! | `/users/alice` | GET | Actor profile |
//! | `/users/alice/outbox` | POST | Bearer-authenticated submissions |
//! | `/users/alice/inbox` | POST | Signed deliveries from other servers |
//! | `/users/alice/following` | GET | Paged `orderedItems` collection |
//! | `/users/alice/liked` | GET | Paged `items` collection |
//! | `/objects/{id}` | GET | Stored activities, objects and collections |

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use apconform::document::{value_list, value_uri};
use apconform::http_signature::public_key_from_pem;
use apconform::{
    is_activity_type, parse_signature_header, verify_request, Document, Prop, SignableRequest,
    SignedIdentity, SigningKeypair, ACTIVITY_JSON, AS_CONTEXT,
};
use apconform_engine::AuthenticatedClient;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

/// Members per collection page. Small, so traversal crosses pages.
pub const PAGE_SIZE: usize = 2;

const ACTOR_PATH: &str = "/users/alice";

const AUDIENCE_KEYS: [&str; 5] = ["to", "cc", "bto", "bcc", "audience"];

/// Duties the server can be told to neglect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    /// Answer outbox posts without a `Location` header.
    pub omit_location: bool,
    /// Keep `bto` and `bcc` on stored activities and objects.
    pub leak_private_addressing: bool,
    /// Advertise no `liked` collection.
    pub no_liked: bool,
    /// Accept deliveries from blocked actors.
    pub ignore_blocks: bool,
    /// Accept `Undo` without reversing anything.
    pub ignore_undo: bool,
    /// Record `Accept` deliveries without ever completing the follow.
    pub never_complete_follows: bool,
    /// Skip `null` members of an `Update` instead of deleting the field.
    pub ignore_null_deletes: bool,
    /// Replace the whole object on `Update`, dropping fields it omits.
    pub clobber_omitted_fields: bool,
    /// Accept `Remove` without touching the target collection.
    pub ignore_remove: bool,
    /// Advertise no `following` collection.
    pub omit_following: bool,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Store {
    next_id: u64,
    objects: HashMap<String, Map<String, Value>>,
    collections: HashMap<String, Vec<String>>,
    following: Vec<String>,
    /// Follow activity id to the actor it targets, until accepted.
    pending_follows: HashMap<String, String>,
    liked: Vec<String>,
    blocked: HashSet<String>,
    inbox: Vec<Value>,
}

/// What an outbox submission turned into.
struct Posted {
    id: String,
    activity: Map<String, Value>,
    deliver_to: Option<String>,
}

pub struct ReferenceServer {
    base: String,
    token: String,
    behavior: Behavior,
    keypair: Arc<SigningKeypair>,
    http: reqwest::Client,
    store: Mutex<Store>,
}

impl ReferenceServer {
    pub fn new(
        base: impl Into<String>,
        token: impl Into<String>,
        behavior: Behavior,
        keypair: Arc<SigningKeypair>,
    ) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            behavior,
            keypair,
            http: reqwest::Client::new(),
            store: Mutex::new(Store::default()),
        }
    }

    pub fn actor_uri(&self) -> String {
        format!("{}{ACTOR_PATH}", self.base)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    fn collection_uri(&self, name: &str) -> String {
        format!("{}/{name}", self.actor_uri())
    }

    pub fn profile(&self) -> Value {
        let actor = self.actor_uri();
        let mut profile = json!({
            "@context": [AS_CONTEXT, "https://w3id.org/security/v1"],
            "id": actor,
            "type": "Person",
            "preferredUsername": "alice",
            "inbox": self.collection_uri("inbox"),
            "outbox": self.collection_uri("outbox"),
            "followers": self.collection_uri("followers"),
            "endpoints": { "getAuthToken": format!("{}/token", self.base) },
            "publicKey": {
                "id": format!("{actor}#main-key"),
                "owner": actor,
                "publicKeyPem": self.keypair.public_key_pem(),
            },
        });
        if !self.behavior.omit_following {
            profile["following"] = Value::String(self.collection_uri("following"));
        }
        if !self.behavior.no_liked {
            profile["liked"] = Value::String(self.collection_uri("liked"));
        }
        profile
    }

    /// Actors alice currently follows.
    pub fn following(&self) -> Vec<String> {
        self.store().following.clone()
    }

    /// Every delivery accepted at alice's inbox.
    pub fn inbox(&self) -> Vec<Value> {
        self.store().inbox.clone()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn mint(&self, store: &mut Store) -> String {
        store.next_id += 1;
        format!("{}/objects/{}", self.base, store.next_id)
    }

    /// Apply a client submission and store the resulting activity.
    fn accept_outbox(&self, submitted: Map<String, Value>) -> Result<Posted, String> {
        let actor = self.actor_uri();
        let mut activity = match submitted.get("type").and_then(Value::as_str) {
            Some(kind) if is_activity_type(kind) => submitted,
            _ => wrap_in_create(submitted),
        };
        let kind = activity
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut store = self.store();
        let id = self.mint(&mut store);
        activity.insert("id".into(), Value::String(id.clone()));
        activity.insert("actor".into(), Value::String(actor.clone()));
        activity
            .entry("@context")
            .or_insert_with(|| Value::String(AS_CONTEXT.into()));

        let mut deliver_to = None;
        match kind.as_str() {
            "Create" => {
                let Some(Value::Object(mut object)) = activity.remove("object") else {
                    return Err("Create requires an embedded object".into());
                };
                let object_id = self.mint(&mut store);
                object.insert("id".into(), Value::String(object_id.clone()));
                object.insert("attributedTo".into(), Value::String(actor.clone()));
                merge_audience(&mut activity, &mut object);
                if !self.behavior.leak_private_addressing {
                    strip_private(&mut object);
                }
                if matches!(
                    object.get("type").and_then(Value::as_str),
                    Some("Collection" | "OrderedCollection")
                ) {
                    store.collections.insert(object_id.clone(), Vec::new());
                }
                store.objects.insert(object_id, object.clone());
                activity.insert("object".into(), Value::Object(object));
            }
            "Update" => {
                let Some(Value::Object(patch)) = activity.get("object") else {
                    return Err("Update requires an embedded object".into());
                };
                let target = patch
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or("Update object has no id")?;
                let stored = store
                    .objects
                    .get_mut(target)
                    .ok_or_else(|| format!("unknown object {target}"))?;
                if self.behavior.clobber_omitted_fields {
                    stored.retain(|key, _| key == "id" || key == "@context");
                }
                for (key, value) in patch {
                    if key == "id" {
                        continue;
                    }
                    if value.is_null() {
                        if !self.behavior.ignore_null_deletes {
                            stored.remove(key);
                        }
                    } else {
                        stored.insert(key.clone(), value.clone());
                    }
                }
            }
            "Follow" => {
                let target = activity_target(&activity, "object")?;
                store.pending_follows.insert(id.clone(), target.clone());
                deliver_to = Some(target);
            }
            "Undo" if !self.behavior.ignore_undo => {
                let undone = activity_target(&activity, "object")?;
                let followed = store
                    .objects
                    .get(&undone)
                    .filter(|prior| prior.get("type").and_then(Value::as_str) == Some("Follow"))
                    .and_then(|prior| prior.get("object").and_then(value_uri).map(str::to_string));
                store.pending_follows.remove(&undone);
                if let Some(followed) = followed {
                    store.following.retain(|f| *f != followed);
                }
            }
            "Like" if !self.behavior.no_liked => {
                let object = activity_target(&activity, "object")?;
                if !store.liked.contains(&object) {
                    store.liked.push(object);
                }
            }
            "Block" => {
                let object = activity_target(&activity, "object")?;
                store.blocked.insert(object);
            }
            "Add" | "Remove" => {
                let object = activity_target(&activity, "object")?;
                let target = activity_target(&activity, "target")?;
                let members = store
                    .collections
                    .get_mut(&target)
                    .ok_or_else(|| format!("unknown target collection {target}"))?;
                if kind == "Add" {
                    if !members.contains(&object) {
                        members.push(object);
                    }
                } else if !self.behavior.ignore_remove {
                    members.retain(|m| *m != object);
                }
            }
            _ => {}
        }

        if !self.behavior.leak_private_addressing {
            strip_private(&mut activity);
        }
        store.objects.insert(id.clone(), activity.clone());
        Ok(Posted {
            id,
            activity,
            deliver_to,
        })
    }

    /// Check the `Signature` of an inbox delivery and return the signer's
    /// actor id.
    async fn authenticate(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<String, String> {
        let signature = headers
            .get("signature")
            .and_then(|v| v.to_str().ok())
            .ok_or("missing Signature header")?;
        let parsed = parse_signature_header(signature).map_err(|e| e.to_string())?;
        let owner = parsed
            .key_id
            .split_once('#')
            .map_or(parsed.key_id.as_str(), |(owner, _)| owner);

        let profile = AuthenticatedClient::anonymous(self.http.clone())
            .get_json(owner)
            .await
            .map_err(|e| format!("cannot fetch signer {owner}: {e}"))?;
        let pem = profile
            .embedded(Prop::PublicKey)
            .and_then(|key| key.get_key("publicKeyPem").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| format!("{owner} publishes no publicKeyPem"))?;
        let key = public_key_from_pem(&pem).map_err(|e| e.to_string())?;

        let path = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
        let mut request = SignableRequest::new(method.as_str(), path, "").with_body(body.to_vec());
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                request.set_header(name.as_str(), value);
            }
        }
        verify_request(&request, &key).map_err(|e| e.to_string())?;
        Ok(profile.id().unwrap_or(owner).to_string())
    }

    /// Record a verified delivery. An `Accept` of a pending follow from
    /// the followed actor completes it.
    fn receive(&self, signer: &str, activity: Value) {
        let mut store = self.store();
        let completes_follows = !self.behavior.never_complete_follows;
        if completes_follows && activity.get("type").and_then(Value::as_str) == Some("Accept") {
            let accepted = activity.get("object").and_then(value_uri).map(str::to_string);
            if let Some(follow_id) = accepted {
                if store.pending_follows.get(&follow_id).map(String::as_str) == Some(signer) {
                    store.pending_follows.remove(&follow_id);
                    if !store.following.iter().any(|f| f == signer) {
                        store.following.push(signer.to_string());
                    }
                    info!("reference: now following {signer}");
                }
            }
        }
        store.inbox.push(activity);
    }

    /// One page of `members`, or the collection head when `page` is `None`.
    fn render_collection(
        id: &str,
        members: &[String],
        page: Option<usize>,
        ordered: bool,
    ) -> Value {
        let (kind, page_kind, items_key) = if ordered {
            ("OrderedCollection", "OrderedCollectionPage", "orderedItems")
        } else {
            ("Collection", "CollectionPage", "items")
        };
        let Some(page) = page else {
            return json!({
                "@context": AS_CONTEXT,
                "id": id,
                "type": kind,
                "totalItems": members.len(),
                "first": format!("{id}?page=0"),
            });
        };
        let start = (page * PAGE_SIZE).min(members.len());
        let end = (start + PAGE_SIZE).min(members.len());
        let mut rendered = json!({
            "@context": AS_CONTEXT,
            "id": format!("{id}?page={page}"),
            "type": page_kind,
            "partOf": id,
        });
        rendered[items_key] = json!(members[start..end]);
        if end < members.len() {
            rendered["next"] = Value::String(format!("{id}?page={}", page + 1));
        }
        rendered
    }
}

// ---------------------------------------------------------------------------
// Activity helpers
// ---------------------------------------------------------------------------

/// Wrap a bare object in a `Create`, copying its addressing.
fn wrap_in_create(object: Map<String, Value>) -> Map<String, Value> {
    let mut create = Map::new();
    create.insert("type".into(), Value::String("Create".into()));
    for key in AUDIENCE_KEYS {
        if let Some(value) = object.get(key) {
            create.insert(key.into(), value.clone());
        }
    }
    create.insert("object".into(), Value::Object(object));
    create
}

/// Union each addressing property across activity and object and write the
/// result to both.
fn merge_audience(activity: &mut Map<String, Value>, object: &mut Map<String, Value>) {
    for key in AUDIENCE_KEYS {
        let merged: BTreeSet<String> = [activity.get(key), object.get(key)]
            .into_iter()
            .flatten()
            .flat_map(value_list)
            .filter_map(value_uri)
            .map(str::to_string)
            .collect();
        if merged.is_empty() {
            continue;
        }
        let merged: Vec<Value> = merged.into_iter().map(Value::String).collect();
        activity.insert(key.into(), Value::Array(merged.clone()));
        object.insert(key.into(), Value::Array(merged));
    }
}

fn strip_private(doc: &mut Map<String, Value>) {
    doc.remove("bto");
    doc.remove("bcc");
}

fn activity_target(activity: &Map<String, Value>, key: &str) -> Result<String, String> {
    activity
        .get(key)
        .and_then(value_uri)
        .map(str::to_string)
        .ok_or_else(|| format!("activity has no {key}"))
}

/// Sign and deliver an activity to `target`'s inbox.
async fn deliver(server: Arc<ReferenceServer>, activity: Map<String, Value>, target: String) {
    let identity = SignedIdentity::new(
        format!("{}#main-key", server.actor_uri()),
        Arc::clone(&server.keypair),
    );
    let client = AuthenticatedClient::anonymous(server.http.clone()).with_identity(identity);
    let profile = match client.get_json(&target).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!("reference: cannot resolve {target} for delivery: {e}");
            return;
        }
    };
    let Some(inbox) = profile.uri(Prop::Inbox) else {
        warn!("reference: {target} has no inbox");
        return;
    };
    match client.post_json(inbox, &Document::from(activity)).await {
        Ok(outcome) => debug!("reference: delivered to {inbox}: {}", outcome.status),
        Err(e) => warn!("reference: delivery to {inbox} failed: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<usize>,
}

fn activity_json(body: Value) -> Response {
    ([(header::CONTENT_TYPE, ACTIVITY_JSON)], Json(body)).into_response()
}

async fn profile(State(server): State<Arc<ReferenceServer>>) -> Response {
    activity_json(server.profile())
}

async fn outbox(
    State(server): State<Arc<ReferenceServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let expected = format!("Bearer {}", server.token);
    let presented = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if presented != Some(expected.as_str()) {
        return (StatusCode::UNAUTHORIZED, "bearer token required").into_response();
    }
    let Ok(Value::Object(submitted)) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, "expected a JSON object").into_response();
    };

    let posted = match server.accept_outbox(submitted) {
        Ok(posted) => posted,
        Err(reason) => {
            warn!("reference: rejected outbox post: {reason}");
            return (StatusCode::BAD_REQUEST, reason).into_response();
        }
    };
    info!("reference: stored {}", posted.id);
    if let Some(target) = posted.deliver_to {
        tokio::spawn(deliver(Arc::clone(&server), posted.activity, target));
    }

    if server.behavior.omit_location {
        StatusCode::CREATED.into_response()
    } else {
        (StatusCode::CREATED, [(header::LOCATION, posted.id)]).into_response()
    }
}

async fn inbox(
    State(server): State<Arc<ReferenceServer>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signer = match server.authenticate(&method, &uri, &headers, &body).await {
        Ok(signer) => signer,
        Err(reason) => {
            warn!("reference: unauthenticated delivery: {reason}");
            return (StatusCode::UNAUTHORIZED, reason).into_response();
        }
    };
    let blocked = server.store().blocked.contains(&signer);
    if blocked && !server.behavior.ignore_blocks {
        info!("reference: refused delivery from blocked {signer}");
        return (StatusCode::FORBIDDEN, "blocked").into_response();
    }
    let Ok(activity) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, "expected JSON").into_response();
    };
    server.receive(&signer, activity);
    (StatusCode::ACCEPTED, "Accepted").into_response()
}

async fn following(
    State(server): State<Arc<ReferenceServer>>,
    Query(query): Query<PageQuery>,
) -> Response {
    let members = server.following();
    let id = server.collection_uri("following");
    activity_json(ReferenceServer::render_collection(&id, &members, query.page, true))
}

async fn liked(
    State(server): State<Arc<ReferenceServer>>,
    Query(query): Query<PageQuery>,
) -> Response {
    if server.behavior.no_liked {
        return StatusCode::NOT_FOUND.into_response();
    }
    let members = server.store().liked.clone();
    let id = server.collection_uri("liked");
    activity_json(ReferenceServer::render_collection(&id, &members, query.page, false))
}

async fn object(
    State(server): State<Arc<ReferenceServer>>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let uri = format!("{}/objects/{id}", server.base);
    let store = server.store();
    let Some(stored) = store.objects.get(&uri) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let body = match store.collections.get(&uri) {
        Some(members) => {
            let rendered = ReferenceServer::render_collection(&uri, members, query.page, false);
            match (query.page, rendered) {
                (None, Value::Object(mut head)) => {
                    for (key, value) in stored {
                        head.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                    Value::Object(head)
                }
                (_, page) => page,
            }
        }
        None => Value::Object(stored.clone()),
    };
    drop(store);
    activity_json(body)
}

/// The reference server's routes.
pub fn router(server: Arc<ReferenceServer>) -> Router {
    Router::new()
        .route(ACTOR_PATH, get(profile))
        .route("/users/alice/outbox", post(outbox))
        .route("/users/alice/inbox", post(inbox))
        .route("/users/alice/following", get(following))
        .route("/users/alice/liked", get(liked))
        .route("/objects/{id}", get(object))
        .with_state(server)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn server(behavior: Behavior) -> ReferenceServer {
        ReferenceServer::new("http://ref.test/", "tok", behavior, crate::test_keypair())
    }

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn bare_objects_are_wrapped_with_their_addressing() {
        let s = server(Behavior::default());
        let posted = s
            .accept_outbox(obj(json!({ "type": "Note", "to": "https://x/a", "content": "hi" })))
            .unwrap();
        assert_eq!(posted.activity["type"], "Create");
        assert_eq!(posted.activity["actor"], "http://ref.test/users/alice");
        assert_eq!(posted.activity["to"], json!(["https://x/a"]));
        assert_eq!(posted.activity["object"]["to"], json!(["https://x/a"]));
        assert_eq!(posted.activity["object"]["attributedTo"], "http://ref.test/users/alice");
    }

    #[test]
    fn private_addressing_is_stripped_unless_leaking() {
        let submitted = json!({
            "type": "Create",
            "id": "http://client/suggested",
            "bcc": "https://x/b",
            "object": { "type": "Note", "bto": "https://x/c" },
        });
        let posted = server(Behavior::default()).accept_outbox(obj(submitted.clone())).unwrap();
        assert_ne!(posted.id, "http://client/suggested");
        assert!(!posted.activity.contains_key("bcc"));
        assert!(posted.activity["object"].get("bto").is_none());

        let leaky = Behavior {
            leak_private_addressing: true,
            ..Behavior::default()
        };
        let posted = server(leaky).accept_outbox(obj(submitted)).unwrap();
        assert_eq!(posted.activity["bcc"], json!(["https://x/b"]));
        assert_eq!(posted.activity["object"]["bto"], json!(["https://x/c"]));
    }

    #[test]
    fn update_replaces_and_deletes_fields() {
        let s = server(Behavior::default());
        let created = s
            .accept_outbox(obj(json!({
                "type": "Create",
                "object": { "type": "Note", "name": "n", "content": "c" },
            })))
            .unwrap();
        let object_id = created.activity["object"]["id"].as_str().unwrap().to_string();

        s.accept_outbox(obj(json!({
            "type": "Update",
            "object": { "id": object_id, "name": null, "content": "changed" },
        })))
        .unwrap();
        let store = s.store();
        let stored = &store.objects[&object_id];
        assert_eq!(stored["content"], "changed");
        assert!(!stored.contains_key("name"));
    }

    #[test]
    fn update_misbehaviours_keep_nulls_or_drop_omitted_fields() {
        let create = json!({
            "type": "Create",
            "object": { "type": "Note", "name": "n", "content": "c" },
        });

        let keeps_nulls = server(Behavior {
            ignore_null_deletes: true,
            ..Behavior::default()
        });
        let object_id = keeps_nulls.accept_outbox(obj(create.clone())).unwrap().activity["object"]["id"]
            .as_str()
            .unwrap()
            .to_string();
        keeps_nulls
            .accept_outbox(obj(json!({
                "type": "Update",
                "object": { "id": object_id, "name": null, "content": "changed" },
            })))
            .unwrap();
        assert_eq!(keeps_nulls.store().objects[&object_id]["name"], "n");

        let clobbers = server(Behavior {
            clobber_omitted_fields: true,
            ..Behavior::default()
        });
        let object_id = clobbers.accept_outbox(obj(create)).unwrap().activity["object"]["id"]
            .as_str()
            .unwrap()
            .to_string();
        clobbers
            .accept_outbox(obj(json!({
                "type": "Update",
                "object": { "id": object_id, "name": "renamed" },
            })))
            .unwrap();
        let store = clobbers.store();
        let stored = &store.objects[&object_id];
        assert_eq!(stored["name"], "renamed");
        assert!(!stored.contains_key("content"));
        assert_eq!(stored["id"], object_id.as_str());
    }

    #[test]
    fn remove_can_be_ignored() {
        let s = server(Behavior {
            ignore_remove: true,
            ..Behavior::default()
        });
        let created = s
            .accept_outbox(obj(json!({ "type": "Create", "object": { "type": "Collection" } })))
            .unwrap();
        let collection = created.activity["object"]["id"].as_str().unwrap().to_string();
        for kind in ["Add", "Remove"] {
            s.accept_outbox(obj(json!({
                "type": kind,
                "object": "https://x/note",
                "target": collection,
            })))
            .unwrap();
        }
        assert_eq!(s.store().collections[&collection], ["https://x/note"]);
    }

    #[test]
    fn profile_can_omit_following_and_liked() {
        let s = server(Behavior {
            omit_following: true,
            no_liked: true,
            ..Behavior::default()
        });
        let profile = s.profile();
        assert!(profile.get("following").is_none());
        assert!(profile.get("liked").is_none());
        assert_eq!(
            server(Behavior::default()).profile()["following"],
            "http://ref.test/users/alice/following"
        );
    }

    #[test]
    fn accept_is_recorded_but_ignored_when_follows_never_complete() {
        let s = server(Behavior {
            never_complete_follows: true,
            ..Behavior::default()
        });
        let follow = s
            .accept_outbox(obj(json!({ "type": "Follow", "object": "https://peer/bob" })))
            .unwrap();
        s.receive("https://peer/bob", json!({ "type": "Accept", "object": follow.id }));
        assert!(s.following().is_empty());
        assert_eq!(s.inbox().len(), 1);
    }

    #[test]
    fn add_requires_a_known_collection() {
        let s = server(Behavior::default());
        let err = s
            .accept_outbox(obj(json!({
                "type": "Add",
                "object": "http://ref.test/objects/9",
                "target": "http://ref.test/objects/404",
            })))
            .err()
            .unwrap();
        assert!(err.contains("unknown target collection"));
    }

    #[test]
    fn collections_page_through_next_links() {
        let members: Vec<String> = (0..5).map(|i| format!("https://x/{i}")).collect();
        let head = ReferenceServer::render_collection("https://c", &members, None, true);
        assert_eq!(head["first"], "https://c?page=0");
        assert_eq!(head["totalItems"], 5);

        let page = ReferenceServer::render_collection("https://c", &members, Some(1), true);
        assert_eq!(page["orderedItems"], json!(["https://x/2", "https://x/3"]));
        assert_eq!(page["next"], "https://c?page=2");

        let last = ReferenceServer::render_collection("https://c", &members, Some(2), false);
        assert_eq!(last["items"], json!(["https://x/4"]));
        assert!(last.get("next").is_none());
    }

    #[test]
    fn accept_from_followed_actor_completes_the_follow() {
        let s = server(Behavior::default());
        let follow = s
            .accept_outbox(obj(json!({ "type": "Follow", "object": "https://peer/bob" })))
            .unwrap();
        assert_eq!(follow.deliver_to.as_deref(), Some("https://peer/bob"));

        // Someone else accepting does not count.
        s.receive("https://peer/mallory", json!({ "type": "Accept", "object": follow.id }));
        assert!(s.following().is_empty());

        s.receive("https://peer/bob", json!({ "type": "Accept", "object": follow.id }));
        assert_eq!(s.following(), ["https://peer/bob"]);

        s.accept_outbox(obj(json!({ "type": "Undo", "object": follow.id })))
            .unwrap();
        assert!(s.following().is_empty());
        assert_eq!(s.inbox().len(), 2);
    }
}
