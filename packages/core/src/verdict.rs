//! Test verdicts and ordered result sets.
//!
//! A [`Verdict`] is the outcome of one named assertion. Its wire encoding
//! keeps reports compact: a pass is the bare boolean `true`, every other
//! outcome is a `{ "code": ..., "comment": ... }` object naming why.
//!
//! ```json
//! {
//!   "outbox:location-header": true,
//!   "outbox:ignores-id": { "code": "TestInconclusive", "comment": "No Location header" }
//! }
//! ```

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Outcome of a single assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// The server demonstrably violated the assertion.
    Fail(String),
    /// The suite could not tell, usually because an earlier step was ambiguous.
    Inconclusive(String),
    /// The server does not offer the capability under test.
    NotApplicable(String),
}

impl Verdict {
    pub fn fail(reason: impl Into<String>) -> Self {
        Verdict::Fail(reason.into())
    }

    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Verdict::Inconclusive(reason.into())
    }

    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Verdict::NotApplicable(reason.into())
    }

    /// `Pass` when `ok`, otherwise `Fail(reason)`.
    pub fn check(ok: bool, reason: impl Into<String>) -> Self {
        if ok {
            Verdict::Pass
        } else {
            Verdict::Fail(reason.into())
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// The report code for non-pass verdicts.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail(_) => Some("TestFailure"),
            Verdict::Inconclusive(_) => Some("TestInconclusive"),
            Verdict::NotApplicable(_) => Some("TestNotApplicable"),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail(r) | Verdict::Inconclusive(r) | Verdict::NotApplicable(r) => Some(r),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("pass"),
            Verdict::Fail(r) => write!(f, "fail: {r}"),
            Verdict::Inconclusive(r) => write!(f, "inconclusive: {r}"),
            Verdict::NotApplicable(r) => write!(f, "not applicable: {r}"),
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match (self.code(), self.reason()) {
            (Some(code), Some(comment)) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("code", code)?;
                map.serialize_entry("comment", comment)?;
                map.end()
            }
            _ => serializer.serialize_bool(true),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VerdictRepr {
    Flag(bool),
    Coded { code: String, comment: String },
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match VerdictRepr::deserialize(deserializer)? {
            VerdictRepr::Flag(true) => Ok(Verdict::Pass),
            VerdictRepr::Flag(false) => Ok(Verdict::Fail("no reason recorded".into())),
            VerdictRepr::Coded { code, comment } => match code.as_str() {
                "TestFailure" => Ok(Verdict::Fail(comment)),
                "TestInconclusive" => Ok(Verdict::Inconclusive(comment)),
                "TestNotApplicable" => Ok(Verdict::NotApplicable(comment)),
                other => Err(de::Error::custom(format!("unknown verdict code {other:?}"))),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// ResultSet
// ---------------------------------------------------------------------------

/// Assertion identifier → verdict, in first-insertion order.
///
/// Re-inserting an existing identifier replaces its verdict in place: the
/// most recent write wins but the report keeps the original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    entries: Vec<(String, Verdict)>,
}

/// Counts of each verdict kind in a [`ResultSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub inconclusive: usize,
    pub not_applicable: usize,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a verdict, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, verdict: Verdict) -> Option<Verdict> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, verdict)),
            None => {
                self.entries.push((key, verdict));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Verdict> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Verdict)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert every entry of `other`, later entries overwriting earlier ones.
    pub fn merge(&mut self, other: ResultSet) {
        for (key, verdict) in other.entries {
            self.insert(key, verdict);
        }
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for (_, verdict) in &self.entries {
            match verdict {
                Verdict::Pass => tally.passed += 1,
                Verdict::Fail(_) => tally.failed += 1,
                Verdict::Inconclusive(_) => tally.inconclusive += 1,
                Verdict::NotApplicable(_) => tally.not_applicable += 1,
            }
        }
        tally
    }
}

impl<K: Into<String>> FromIterator<(K, Verdict)> for ResultSet {
    fn from_iter<I: IntoIterator<Item = (K, Verdict)>>(iter: I) -> Self {
        let mut set = ResultSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

impl IntoIterator for ResultSet {
    type Item = (String, Verdict);
    type IntoIter = std::vec::IntoIter<(String, Verdict)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, verdict) in &self.entries {
            map.serialize_entry(key, verdict)?;
        }
        map.end()
    }
}

struct ResultSetVisitor;

impl<'de> Visitor<'de> for ResultSetVisitor {
    type Value = ResultSet;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of assertion identifiers to verdicts")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ResultSet, A::Error> {
        let mut set = ResultSet::new();
        while let Some((key, verdict)) = access.next_entry::<String, Verdict>()? {
            set.insert(key, verdict);
        }
        Ok(set)
    }
}

impl<'de> Deserialize<'de> for ResultSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ResultSetVisitor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
