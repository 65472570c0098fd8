//! The report written once a session completes.

use std::collections::BTreeMap;

use apconform::{ResultSet, Tally};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::Answers;

/// Result sets keyed by test group, e.g. `c2s-server-test-items`.
pub type ResultGroups = BTreeMap<String, ResultSet>;

/// Everything a session learned, ready to be persisted.
///
/// # Example
///
/// ```json
/// {
///   "date": "2026-10-19T12:00:00Z",
///   "project": { "project-name": "Example", "website": "https://x", "repo": "https://y" },
///   "config": { "testing-c2s-server": true },
///   "results": { "c2s-server-test-items": { "outbox:update": true } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub date: DateTime<Utc>,
    pub project: Answers,
    pub config: Answers,
    pub results: ResultGroups,
}

impl Report {
    /// Build a report stamped with the current time.
    pub fn new(project: Answers, config: Answers, results: ResultGroups) -> Self {
        Self {
            date: Utc::now(),
            project,
            config,
            results,
        }
    }

    /// Verdict counts across every group.
    pub fn tally(&self) -> Tally {
        self.results.values().map(ResultSet::tally).fold(Tally::default(), |acc, t| Tally {
            passed: acc.passed + t.passed,
            failed: acc.failed + t.failed,
            inconclusive: acc.inconclusive + t.inconclusive,
            not_applicable: acc.not_applicable + t.not_applicable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apconform::Verdict;
    use serde_json::json;

    #[test]
    fn results_use_verdict_wire_encoding() {
        let mut results = ResultGroups::new();
        results.insert(
            "c2s-server-test-items".into(),
            [
                ("outbox:update", Verdict::Pass),
                ("outbox:like", Verdict::not_applicable("no liked collection")),
            ]
            .into_iter()
            .collect(),
        );
        let report = Report::new(Answers::new(), Answers::new(), results);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"]["c2s-server-test-items"]["outbox:update"], json!(true));
        assert_eq!(
            json["results"]["c2s-server-test-items"]["outbox:like"]["code"],
            "TestNotApplicable"
        );
        assert!(json["date"].is_string());

        let back: Report = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn tally_spans_groups() {
        let mut results = ResultGroups::new();
        results.insert("a".into(), [("x", Verdict::Pass)].into_iter().collect());
        results.insert("b".into(), [("y", Verdict::fail("no"))].into_iter().collect());
        let t = Report::new(Answers::new(), Answers::new(), results).tally();
        assert_eq!((t.passed, t.failed), (1, 1));
    }
}
