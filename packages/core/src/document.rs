//! Untyped ActivityStreams documents.
//!
//! Activities, objects, actor profiles and collections travel as open JSON-LD
//! dictionaries. [`Document`] wraps a JSON object without imposing a schema:
//! unknown properties pass through untouched, while [`Prop`] gives typed
//! access to the small set of properties the test suite actually inspects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The ActivityStreams context IRI placed on documents the suite originates.
pub const AS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// Media type used for every ActivityPub request and response.
pub const ACTIVITY_JSON: &str = "application/activity+json";

/// Activity types defined by the ActivityStreams vocabulary.
///
/// A document whose `type` is not in this list is a bare object as far as an
/// outbox is concerned.
pub const ACTIVITY_TYPES: &[&str] = &[
    "Accept", "Add", "Announce", "Arrive", "Block", "Create", "Delete", "Dislike", "Flag",
    "Follow", "Ignore", "Invite", "Join", "Leave", "Like", "Listen", "Move", "Offer",
    "Question", "Reject", "Read", "Remove", "TentativeReject", "TentativeAccept", "Travel",
    "Undo", "Update", "View",
];

/// Returns `true` if `kind` names an ActivityStreams activity type.
pub fn is_activity_type(kind: &str) -> bool {
    ACTIVITY_TYPES.contains(&kind)
}

/// Errors raised when a JSON value cannot be treated as a document.
#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

// ---------------------------------------------------------------------------
// Prop
// ---------------------------------------------------------------------------

/// A recognised document property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prop {
    Context,
    Id,
    Type,
    Actor,
    Object,
    Target,
    To,
    Cc,
    Bto,
    Bcc,
    Audience,
    AttributedTo,
    Name,
    Content,
    Items,
    OrderedItems,
    First,
    Next,
    Inbox,
    Outbox,
    Following,
    Followers,
    Liked,
    Endpoints,
    PublicKey,
    PreferredUsername,
}

impl Prop {
    /// The JSON key this property is stored under.
    pub const fn key(self) -> &'static str {
        match self {
            Prop::Context => "@context",
            Prop::Id => "id",
            Prop::Type => "type",
            Prop::Actor => "actor",
            Prop::Object => "object",
            Prop::Target => "target",
            Prop::To => "to",
            Prop::Cc => "cc",
            Prop::Bto => "bto",
            Prop::Bcc => "bcc",
            Prop::Audience => "audience",
            Prop::AttributedTo => "attributedTo",
            Prop::Name => "name",
            Prop::Content => "content",
            Prop::Items => "items",
            Prop::OrderedItems => "orderedItems",
            Prop::First => "first",
            Prop::Next => "next",
            Prop::Inbox => "inbox",
            Prop::Outbox => "outbox",
            Prop::Following => "following",
            Prop::Followers => "followers",
            Prop::Liked => "liked",
            Prop::Endpoints => "endpoints",
            Prop::PublicKey => "publicKey",
            Prop::PreferredUsername => "preferredUsername",
        }
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// The identifier a value refers to: a bare string, or the `id` of an
/// embedded object. Anything else has no identifier.
pub fn value_uri(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("id").and_then(Value::as_str),
        _ => None,
    }
}

/// Normalise a property value to a list: arrays are returned element-wise,
/// `null` is empty, and any other single value is a one-element list.
pub fn value_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// An open JSON-LD document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Interpret a JSON value as a document. Only objects qualify.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DocumentError::NotAnObject(type_name(&other))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, prop: Prop) -> Option<&Value> {
        self.0.get(prop.key())
    }

    /// Look up a property the suite has no [`Prop`] for.
    pub fn get_key(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// `true` if the property is present, even when its value is `null`.
    pub fn has(&self, prop: Prop) -> bool {
        self.0.contains_key(prop.key())
    }

    pub fn str(&self, prop: Prop) -> Option<&str> {
        self.get(prop).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.str(Prop::Id)
    }

    /// The `type` property. When `type` is an array, the first entry.
    pub fn kind(&self) -> Option<&str> {
        match self.get(Prop::Type)? {
            Value::String(s) => Some(s.as_str()),
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// The identifier referenced by a property (string or embedded object).
    pub fn uri(&self, prop: Prop) -> Option<&str> {
        self.get(prop).and_then(value_uri)
    }

    /// Every identifier referenced by a property, sorted.
    ///
    /// Missing properties yield an empty list; entries without an identifier
    /// are skipped.
    pub fn uris(&self, prop: Prop) -> Vec<String> {
        let mut uris: Vec<String> = self
            .get(prop)
            .map(value_list)
            .unwrap_or_default()
            .into_iter()
            .filter_map(value_uri)
            .map(str::to_string)
            .collect();
        uris.sort();
        uris
    }

    /// The property's value as an embedded document, if it is an object.
    pub fn embedded(&self, prop: Prop) -> Option<Document> {
        match self.get(prop)? {
            Value::Object(map) => Some(Document(map.clone())),
            _ => None,
        }
    }

    pub fn set(&mut self, prop: Prop, value: impl Into<Value>) {
        self.0.insert(prop.key().to_string(), value.into());
    }

    pub fn remove(&mut self, prop: Prop) -> Option<Value> {
        self.0.remove(prop.key())
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, prop: Prop, value: impl Into<Value>) -> Self {
        self.set(prop, value);
        self
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn non_objects_are_rejected() {
        assert_eq!(
            Document::from_value(json!(["a"])),
            Err(DocumentError::NotAnObject("an array"))
        );
        assert!(Document::from_value(json!("x")).is_err());
    }

    #[test]
    fn unknown_properties_survive_round_trip() {
        let d = doc(json!({ "type": "Note", "x-vendor:mood": { "level": 3 } }));
        let back = d.clone().into_value();
        assert_eq!(back["x-vendor:mood"]["level"], 3);
        assert_eq!(d.kind(), Some("Note"));
    }

    #[test]
    fn uri_accepts_string_or_embedded_object() {
        let d = doc(json!({
            "actor": "https://a.example/u/1",
            "object": { "id": "https://a.example/o/1", "type": "Note" },
            "target": { "type": "Collection" },
        }));
        assert_eq!(d.uri(Prop::Actor), Some("https://a.example/u/1"));
        assert_eq!(d.uri(Prop::Object), Some("https://a.example/o/1"));
        assert_eq!(d.uri(Prop::Target), None);
    }

    #[test]
    fn uris_normalises_singletons_and_sorts() {
        let d = doc(json!({
            "to": ["https://b.example", { "id": "https://a.example" }],
            "cc": "https://c.example",
        }));
        assert_eq!(d.uris(Prop::To), vec!["https://a.example", "https://b.example"]);
        assert_eq!(d.uris(Prop::Cc), vec!["https://c.example"]);
        assert!(d.uris(Prop::Bcc).is_empty());
    }

    #[test]
    fn kind_uses_first_entry_of_type_array() {
        let d = doc(json!({ "type": ["Create", "ex:Extra"] }));
        assert_eq!(d.kind(), Some("Create"));
    }

    #[test]
    fn has_sees_explicit_null() {
        let d = doc(json!({ "name": null }));
        assert!(d.has(Prop::Name));
        assert_eq!(d.str(Prop::Name), None);
    }

    #[test]
    fn activity_type_classification() {
        assert!(is_activity_type("Create"));
        assert!(is_activity_type("Undo"));
        assert!(!is_activity_type("Note"));
        assert!(!is_activity_type("Collection"));
    }
}
