//! Client-to-server outbox cases.
//!
//! Every case posts to the remote actor's outbox and judges what the server
//! did with it. A missing `Location` header fails the assertion that asked
//! for it and leaves everything that needed the created resource
//! inconclusive.

use apconform::{Document, Prop, ResultSet, Verdict};
use serde_json::{json, Value};
use tracing::debug;

use super::BatteryContext;
use crate::client::ApClient;
use crate::error::EngineError;
use crate::paginator::collection_contains;

/// Public addressing collection.
pub const PUBLIC: &str = "https://www.w3.org/ns/activitystreams#Public";

/// A client-suggested activity id the server is expected to replace.
const SUGGESTED_ID: &str = "http://activitypub.test/act/foo-id-here/";

const NO_LOCATION: &str = "No Location header in response";

/// Assertion identifiers recorded by the outbox cases.
pub mod assertion {
    pub const RESPONDS_201_CREATED: &str = "outbox:responds-201-created";
    pub const LOCATION_HEADER: &str = "outbox:location-header";
    pub const IGNORES_ID: &str = "outbox:ignores-id";
    pub const ACCEPTS_ACTIVITIES: &str = "outbox:accepts-activities";
    pub const REMOVES_BTO_AND_BCC: &str = "outbox:removes-bto-and-bcc";
    pub const ACCEPTS_NON_ACTIVITY_OBJECTS: &str = "outbox:accepts-non-activity-objects";
    pub const UPDATE: &str = "outbox:update";
    pub const FOLLOW: &str = "outbox:follow";
    pub const FOLLOW_ADDS_FOLLOWED_OBJECT: &str = "outbox:follow:adds-followed-object";
    pub const UNDO: &str = "outbox:undo";
    pub const CREATE: &str = "outbox:create";
    pub const CREATE_MERGES_AUDIENCE: &str = "outbox:create:merges-audience-properties";
    pub const CREATE_ACTOR_TO_ATTRIBUTED_TO: &str = "outbox:create:actor-to-attributed-to";
    pub const ADD: &str = "outbox:add";
    pub const ADD_ADDS_OBJECT_TO_TARGET: &str = "outbox:add:adds-object-to-target";
    pub const REMOVE: &str = "outbox:remove";
    pub const REMOVE_REMOVES_FROM_TARGET: &str = "outbox:remove:removes-from-target";
    pub const LIKE: &str = "outbox:like";
    pub const LIKE_ADDS_OBJECT_TO_LIKED: &str = "outbox:like:adds-object-to-liked";
    pub const BLOCK: &str = "outbox:block";
    pub const BLOCK_PREVENTS_INTERACTION: &str = "outbox:block:prevent-interaction-with-actor";
}

use assertion as a;

// ---------------------------------------------------------------------------
// OutboxCase
// ---------------------------------------------------------------------------

/// The outbox cases, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxCase {
    ActivityPosted,
    RemovesBtoAndBcc,
    NonActivity,
    Update,
    FollowUndo,
    CreateAudience,
    AddRemove,
    Like,
    Block,
}

impl OutboxCase {
    pub const ALL: [OutboxCase; 9] = [
        OutboxCase::ActivityPosted,
        OutboxCase::RemovesBtoAndBcc,
        OutboxCase::NonActivity,
        OutboxCase::Update,
        OutboxCase::FollowUndo,
        OutboxCase::CreateAudience,
        OutboxCase::AddRemove,
        OutboxCase::Like,
        OutboxCase::Block,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutboxCase::ActivityPosted => "outbox-activity-posted",
            OutboxCase::RemovesBtoAndBcc => "outbox-removes-bto-and-bcc",
            OutboxCase::NonActivity => "outbox-non-activity",
            OutboxCase::Update => "outbox-update",
            OutboxCase::FollowUndo => "outbox-activity-follow-undo",
            OutboxCase::CreateAudience => "outbox-activity-create",
            OutboxCase::AddRemove => "outbox-activity-add-remove",
            OutboxCase::Like => "outbox-activity-like",
            OutboxCase::Block => "outbox-activity-block",
        }
    }

    /// Assertions this case is responsible for. Anything left unset when
    /// the case aborts is recorded inconclusive.
    pub fn assertions(self) -> &'static [&'static str] {
        match self {
            OutboxCase::ActivityPosted => &[
                a::RESPONDS_201_CREATED,
                a::LOCATION_HEADER,
                a::IGNORES_ID,
                a::ACCEPTS_ACTIVITIES,
            ],
            OutboxCase::RemovesBtoAndBcc => &[a::REMOVES_BTO_AND_BCC],
            OutboxCase::NonActivity => &[a::ACCEPTS_NON_ACTIVITY_OBJECTS],
            OutboxCase::Update => &[a::UPDATE],
            OutboxCase::FollowUndo => &[a::FOLLOW, a::FOLLOW_ADDS_FOLLOWED_OBJECT, a::UNDO],
            OutboxCase::CreateAudience => &[
                a::CREATE,
                a::CREATE_MERGES_AUDIENCE,
                a::CREATE_ACTOR_TO_ATTRIBUTED_TO,
            ],
            OutboxCase::AddRemove => &[
                a::ADD,
                a::ADD_ADDS_OBJECT_TO_TARGET,
                a::REMOVE,
                a::REMOVE_REMOVES_FROM_TARGET,
            ],
            OutboxCase::Like => &[a::LIKE, a::LIKE_ADDS_OBJECT_TO_LIKED],
            OutboxCase::Block => &[a::BLOCK, a::BLOCK_PREVENTS_INTERACTION],
        }
    }

    pub async fn run(
        self,
        ctx: &BatteryContext<'_>,
        results: &mut ResultSet,
    ) -> Result<(), EngineError> {
        match self {
            OutboxCase::ActivityPosted => activity_posted(ctx, results).await,
            OutboxCase::RemovesBtoAndBcc => removes_bto_and_bcc(ctx, results).await,
            OutboxCase::NonActivity => non_activity(ctx, results).await,
            OutboxCase::Update => update(ctx, results).await,
            OutboxCase::FollowUndo => follow_undo(ctx, results).await,
            OutboxCase::CreateAudience => create_audience(ctx, results).await,
            OutboxCase::AddRemove => add_remove(ctx, results).await,
            OutboxCase::Like => like(ctx, results).await,
            OutboxCase::Block => block(ctx, results).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An activity of `kind` performed by the actor under test.
fn activity(client: &ApClient, kind: &str) -> Document {
    Document::new()
        .with(Prop::Type, kind)
        .with(Prop::Actor, client.uri())
}

/// The identifier of the activity's `object`.
fn object_uri(activity: &Document) -> Result<String, EngineError> {
    activity
        .uri(Prop::Object)
        .map(str::to_string)
        .ok_or_else(|| EngineError::missing(Prop::Object))
}

/// The activity's `object`, fetched when it is only referenced.
async fn resolve_object(client: &ApClient, activity: &Document) -> Result<Document, EngineError> {
    match activity.get(Prop::Object) {
        Some(Value::Object(map)) => Ok(Document::from(map.clone())),
        Some(Value::String(uri)) => client.get_json(uri).await,
        _ => Err(EngineError::missing(Prop::Object)),
    }
}

fn sorted(mut uris: Vec<String>) -> Vec<String> {
    uris.sort();
    uris
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

async fn activity_posted(
    ctx: &BatteryContext<'_>,
    results: &mut ResultSet,
) -> Result<(), EngineError> {
    let client = ctx.client;
    let doc = activity(client, "Create").with(Prop::Id, SUGGESTED_ID).with(
        Prop::Object,
        json!({
            "type": "Note",
            "attributedTo": client.uri(),
            "content": "Up for some root beer floats?",
        }),
    );
    let outcome = client.post_to_outbox(&doc).await?;

    results.insert(
        a::RESPONDS_201_CREATED,
        Verdict::check(
            outcome.is_created(),
            format!("Responded with status code {}", outcome.status),
        ),
    );

    match &outcome.location {
        Some(location) => {
            results.insert(a::LOCATION_HEADER, Verdict::Pass);
            let posted = client.get_json(location).await?;
            results.insert(
                a::IGNORES_ID,
                Verdict::check(
                    posted.id() != Some(SUGGESTED_ID),
                    "Stored activity kept the client-supplied id",
                ),
            );
        }
        None => {
            results.insert(a::LOCATION_HEADER, Verdict::fail(NO_LOCATION));
            results.insert(a::IGNORES_ID, Verdict::inconclusive("No Location in headers"));
        }
    }

    let submitted = outcome.is_created() || outcome.location.is_some();
    results.insert(
        a::ACCEPTS_ACTIVITIES,
        if submitted {
            Verdict::Pass
        } else {
            Verdict::inconclusive("Response code not 201 and no Location header present")
        },
    );
    Ok(())
}

async fn removes_bto_and_bcc(
    ctx: &BatteryContext<'_>,
    results: &mut ResultSet,
) -> Result<(), EngineError> {
    let client = ctx.client;
    let blind_to = ctx.actors.create_actor();
    let blind_cc = ctx.actors.create_actor();
    let doc = activity(client, "Create")
        .with(Prop::Bto, blind_to.uri())
        .with(Prop::Bcc, blind_cc.uri())
        .with(Prop::Audience, PUBLIC)
        .with(
            Prop::Object,
            json!({
                "type": "Note",
                "attributedTo": client.uri(),
                "content": "Up for some root beer floats?",
            }),
        );
    let outcome = client.post_to_outbox(&doc).await?;

    let Some(location) = outcome.location else {
        results.insert(a::REMOVES_BTO_AND_BCC, Verdict::inconclusive(NO_LOCATION));
        return Ok(());
    };

    // Read back as an unrelated party, not the submitter.
    let third_party = ctx.actors.create_actor();
    let stored = third_party.get_json(&location).await?;
    let mut leaked: Vec<&str> = Vec::new();
    for prop in [Prop::Bto, Prop::Bcc] {
        if stored.has(prop) {
            leaked.push(prop.key());
        }
    }
    if let Some(object) = stored.embedded(Prop::Object) {
        for prop in [Prop::Bto, Prop::Bcc] {
            if object.has(prop) {
                leaked.push(prop.key());
            }
        }
    }
    results.insert(
        a::REMOVES_BTO_AND_BCC,
        Verdict::check(
            leaked.is_empty(),
            format!("Activity exposes private addressing to a third party: {}", leaked.join(", ")),
        ),
    );
    Ok(())
}

async fn non_activity(ctx: &BatteryContext<'_>, results: &mut ResultSet) -> Result<(), EngineError> {
    let client = ctx.client;
    let note = Document::new()
        .with(Prop::Type, "Note")
        .with(Prop::Content, "Up for some root beer floats?");
    let outcome = client.post_to_outbox(&note).await?;

    let verdict = match outcome.location {
        Some(location) => {
            let stored = client.get_json(&location).await?;
            Verdict::check(
                stored.kind() == Some("Create"),
                "ActivityStreams object pointed to by response Location is not of type Create",
            )
        }
        None => Verdict::inconclusive(NO_LOCATION),
    };
    results.insert(a::ACCEPTS_NON_ACTIVITY_OBJECTS, verdict);
    Ok(())
}

async fn update(ctx: &BatteryContext<'_>, results: &mut ResultSet) -> Result<(), EngineError> {
    const CHANGED: &str = "I've changed my mind!";
    const RENAMED: &str = "new name, same flavor";

    let client = ctx.client;
    let create = activity(client, "Create").with(
        Prop::Object,
        json!({
            "type": "Note",
            "attributedTo": client.uri(),
            "name": "An indecisive note",
            "content": "I'm feeling indecisive!",
        }),
    );
    let outcome = client.post_to_outbox(&create).await?;
    let Some(location) = outcome.location else {
        results.insert(a::UPDATE, Verdict::inconclusive(NO_LOCATION));
        return Ok(());
    };
    let object_id = object_uri(&client.get_json(&location).await?)?;

    // Null deletes `name`; `content` is replaced.
    let first = activity(client, "Update").with(
        Prop::Object,
        json!({
            "id": object_id,
            "type": "Note",
            "attributedTo": client.uri(),
            "name": null,
            "content": CHANGED,
        }),
    );
    client.post_to_outbox(&first).await?;
    let updated = client.get_json(&object_id).await?;
    if updated.str(Prop::Content) != Some(CHANGED) {
        results.insert(a::UPDATE, Verdict::fail("Failed to update field with replacement data"));
        return Ok(());
    }
    if updated.has(Prop::Name) {
        results.insert(
            a::UPDATE,
            Verdict::fail("Unable to delete field by passing an Update with null value"),
        );
        return Ok(());
    }

    // Omitted `content` must survive; `name` comes back.
    let second = activity(client, "Update").with(
        Prop::Object,
        json!({
            "id": object_id,
            "type": "Note",
            "attributedTo": client.uri(),
            "name": RENAMED,
        }),
    );
    client.post_to_outbox(&second).await?;
    let updated = client.get_json(&object_id).await?;
    let verdict = if updated.str(Prop::Content) != Some(CHANGED) {
        Verdict::fail("Field changed, despite not being included in update")
    } else if updated.str(Prop::Name) != Some(RENAMED) {
        Verdict::fail("Failed to update field with replacement data")
    } else {
        Verdict::Pass
    };
    results.insert(a::UPDATE, verdict);
    Ok(())
}

async fn follow_undo(ctx: &BatteryContext<'_>, results: &mut ResultSet) -> Result<(), EngineError> {
    let client = ctx.client;
    let followed = ctx.actors.create_actor();
    let follow = activity(client, "Follow")
        .with(Prop::To, followed.uri())
        .with(Prop::Object, followed.uri());
    let outcome = client.post_to_outbox(&follow).await?;

    let Some(follow_uri) = outcome.location else {
        results.insert(a::FOLLOW, Verdict::fail(NO_LOCATION));
        results.insert(
            a::FOLLOW_ADDS_FOLLOWED_OBJECT,
            Verdict::inconclusive("Follow activity posting failed"),
        );
        results.insert(a::UNDO, Verdict::inconclusive("Follow activity posting failed"));
        return Ok(());
    };
    results.insert(a::FOLLOW, Verdict::Pass);

    let following = client.require_endpoint(Prop::Following)?;
    let target = followed.uri();
    let max = ctx.max_items;

    let is_following = ctx
        .retry
        .poll_until(move |attempt| async move {
            debug!("battery: checking following collection, attempt {attempt}");
            collection_contains(client, following, target, max).await
        })
        .await?;
    results.insert(
        a::FOLLOW_ADDS_FOLLOWED_OBJECT,
        Verdict::check(
            is_following,
            format!(
                "{target} not in following collection after {} attempts",
                ctx.retry.attempts.max(1)
            ),
        ),
    );
    if !is_following {
        results.insert(a::UNDO, Verdict::inconclusive("Actor not followed"));
        return Ok(());
    }

    let undo = activity(client, "Undo").with(Prop::Object, follow_uri.as_str());
    client.post_to_outbox(&undo).await?;
    let unfollowed = ctx
        .retry
        .poll_until(move |_| async move {
            Ok(!collection_contains(client, following, target, max).await?)
        })
        .await?;
    results.insert(
        a::UNDO,
        Verdict::check(
            unfollowed,
            format!("{target} still in following collection after Undo"),
        ),
    );
    Ok(())
}

async fn create_audience(
    ctx: &BatteryContext<'_>,
    results: &mut ResultSet,
) -> Result<(), EngineError> {
    let client = ctx.client;
    let peers: Vec<_> = (0..5).map(|_| ctx.actors.create_actor()).collect();
    let uri = |i: usize| peers[i].uri().to_string();

    let doc = activity(client, "Create")
        .with(Prop::To, json!([uri(0), uri(1)]))
        .with(Prop::Cc, uri(2))
        .with(
            Prop::Object,
            json!({
                "type": "Note",
                "cc": [uri(3), uri(4)],
                "content": "Hi there!",
            }),
        );
    let outcome = client.post_to_outbox(&doc).await?;

    let Some(location) = outcome.location else {
        results.insert(a::CREATE, Verdict::fail(NO_LOCATION));
        results.insert(a::CREATE_MERGES_AUDIENCE, Verdict::inconclusive("Create failed"));
        results.insert(a::CREATE_ACTOR_TO_ATTRIBUTED_TO, Verdict::inconclusive("Create failed"));
        return Ok(());
    };
    results.insert(a::CREATE, Verdict::Pass);

    let stored = client.get_json(&location).await?;
    let object = resolve_object(client, &stored).await?;

    let expected_to = sorted(vec![uri(0), uri(1)]);
    let expected_cc = sorted(vec![uri(2), uri(3), uri(4)]);
    let mut mismatches = Vec::new();
    for (label, doc) in [("activity", &stored), ("object", &object)] {
        if doc.uris(Prop::To) != expected_to {
            mismatches.push(format!("{label} to={:?}", doc.uris(Prop::To)));
        }
        if doc.uris(Prop::Cc) != expected_cc {
            mismatches.push(format!("{label} cc={:?}", doc.uris(Prop::Cc)));
        }
    }
    results.insert(
        a::CREATE_MERGES_AUDIENCE,
        Verdict::check(
            mismatches.is_empty(),
            format!("Audience not merged: {}", mismatches.join("; ")),
        ),
    );

    let attributed = object.uri(Prop::AttributedTo);
    results.insert(
        a::CREATE_ACTOR_TO_ATTRIBUTED_TO,
        Verdict::check(
            attributed.is_some() && attributed == stored.uri(Prop::Actor),
            format!(
                "object attributedTo {:?} does not match activity actor {:?}",
                attributed,
                stored.uri(Prop::Actor)
            ),
        ),
    );
    Ok(())
}

async fn add_remove(ctx: &BatteryContext<'_>, results: &mut ResultSet) -> Result<(), EngineError> {
    let client = ctx.client;
    let max = ctx.max_items;

    let inconclusive_all = |results: &mut ResultSet, reason: &str| {
        for id in OutboxCase::AddRemove.assertions() {
            results.insert(*id, Verdict::inconclusive(reason));
        }
    };

    let create_collection = activity(client, "Create").with(
        Prop::Object,
        json!({ "type": "Collection", "name": "test collection" }),
    );
    let Some(collection_location) = client.post_to_outbox(&create_collection).await?.location else {
        inconclusive_all(results, "Collection Create returned no Location header");
        return Ok(());
    };

    let create_note = activity(client, "Create")
        .with(Prop::Object, json!({ "type": "Note", "name": "I'm a note" }));
    let Some(note_location) = client.post_to_outbox(&create_note).await?.location else {
        inconclusive_all(results, "Note Create returned no Location header");
        return Ok(());
    };

    let note_uri = object_uri(&client.get_json(&note_location).await?)?;
    let collection_uri = object_uri(&client.get_json(&collection_location).await?)?;

    let add = activity(client, "Add")
        .with(Prop::Object, note_uri.as_str())
        .with(Prop::Target, collection_uri.as_str());
    if client.post_to_outbox(&add).await?.location.is_none() {
        results.insert(a::ADD, Verdict::fail(NO_LOCATION));
        results.insert(a::ADD_ADDS_OBJECT_TO_TARGET, Verdict::inconclusive("Add failed"));
        results.insert(a::REMOVE, Verdict::inconclusive("Add failed"));
        results.insert(a::REMOVE_REMOVES_FROM_TARGET, Verdict::inconclusive("Add failed"));
        return Ok(());
    }
    results.insert(a::ADD, Verdict::Pass);

    let added = collection_contains(client, &collection_uri, &note_uri, max).await?;
    results.insert(
        a::ADD_ADDS_OBJECT_TO_TARGET,
        Verdict::check(added, format!("{note_uri} not found in {collection_uri} after Add")),
    );
    if !added {
        results.insert(a::REMOVE, Verdict::inconclusive("Object was not added"));
        results.insert(a::REMOVE_REMOVES_FROM_TARGET, Verdict::inconclusive("Object was not added"));
        return Ok(());
    }

    let remove = activity(client, "Remove")
        .with(Prop::Object, note_uri.as_str())
        .with(Prop::Target, collection_uri.as_str());
    if client.post_to_outbox(&remove).await?.location.is_none() {
        results.insert(a::REMOVE, Verdict::fail(NO_LOCATION));
        results.insert(a::REMOVE_REMOVES_FROM_TARGET, Verdict::inconclusive("Remove failed"));
        return Ok(());
    }
    results.insert(a::REMOVE, Verdict::Pass);

    // Fresh, full traversal; nothing from the Add check is reused.
    let still_present = collection_contains(client, &collection_uri, &note_uri, max).await?;
    results.insert(
        a::REMOVE_REMOVES_FROM_TARGET,
        Verdict::check(
            !still_present,
            format!("{note_uri} still in {collection_uri} after Remove"),
        ),
    );
    Ok(())
}

async fn like(ctx: &BatteryContext<'_>, results: &mut ResultSet) -> Result<(), EngineError> {
    let client = ctx.client;
    let Some(liked) = client.endpoint(Prop::Liked) else {
        let reason = "Actor profile advertises no liked collection";
        results.insert(a::LIKE, Verdict::not_applicable(reason));
        results.insert(a::LIKE_ADDS_OBJECT_TO_LIKED, Verdict::not_applicable(reason));
        return Ok(());
    };

    let create = activity(client, "Create").with(
        Prop::Object,
        json!({ "type": "Note", "content": "A very likable post!" }),
    );
    let Some(location) = client.post_to_outbox(&create).await?.location else {
        results.insert(a::LIKE, Verdict::inconclusive("Create of a note to like failed"));
        results.insert(
            a::LIKE_ADDS_OBJECT_TO_LIKED,
            Verdict::inconclusive("Create of a note to like failed"),
        );
        return Ok(());
    };
    results.insert(a::CREATE, Verdict::Pass);
    let note_uri = object_uri(&client.get_json(&location).await?)?;

    let like = activity(client, "Like").with(Prop::Object, note_uri.as_str());
    let outcome = client.post_to_outbox(&like).await?;
    results.insert(a::LIKE, Verdict::check(outcome.location.is_some(), NO_LOCATION));

    let is_liked = collection_contains(client, liked, &note_uri, ctx.max_items).await?;
    results.insert(
        a::LIKE_ADDS_OBJECT_TO_LIKED,
        Verdict::check(is_liked, format!("{note_uri} not found in liked collection")),
    );
    Ok(())
}

async fn block(ctx: &BatteryContext<'_>, results: &mut ResultSet) -> Result<(), EngineError> {
    let client = ctx.client;
    let obnoxious = ctx.actors.create_actor();
    let block = activity(client, "Block").with(Prop::Object, obnoxious.uri());
    let outcome = client.post_to_outbox(&block).await?;

    if outcome.location.is_none() {
        results.insert(a::BLOCK, Verdict::fail(NO_LOCATION));
        results.insert(
            a::BLOCK_PREVENTS_INTERACTION,
            Verdict::inconclusive("Block post didn't succeed"),
        );
        return Ok(());
    }
    results.insert(a::BLOCK, Verdict::Pass);

    let inbox = client.require_endpoint(Prop::Inbox)?;
    let delivery = Document::new().with(Prop::Type, "Create").with(
        Prop::Object,
        json!({ "type": "Note", "content": "Well, actually..." }),
    );
    let response = obnoxious.post(inbox, delivery).await?;
    results.insert(
        a::BLOCK_PREVENTS_INTERACTION,
        Verdict::check(
            matches!(response.status, 403 | 405),
            format!(
                "Delivery from blocked actor was answered with status {}",
                response.status
            ),
        ),
    );
    Ok(())
}
