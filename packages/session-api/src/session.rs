//! Prompts, notices and answers exchanged with the supervising operator.

use apconform::ResultSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Answers to a prompt, keyed by field name.
pub type Answers = Map<String, Value>;

/// Well-known answer field names.
pub mod keys {
    pub const ACTOR_ID: &str = "actor-id";
    pub const AUTH_TOKEN: &str = "auth-token";
    pub const TESTING_CLIENT: &str = "testing-client";
    pub const TESTING_C2S_SERVER: &str = "testing-c2s-server";
    pub const TESTING_S2S_SERVER: &str = "testing-s2s-server";
    pub const PROJECT_NAME: &str = "project-name";
    pub const WEBSITE: &str = "website";
    pub const REPO: &str = "repo";
}

/// A question the engine needs the operator to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "prompt", rename_all = "kebab-case")]
pub enum Prompt {
    /// Which implementation types to test. Answered with the `testing-*` flags.
    Setup,

    /// The URI of the actor under test. `previous` echoes the last attempt
    /// after a failed fetch.
    ActorUri {
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<String>,
    },

    /// A bearer token for the actor. `endpoint` is the profile's advertised
    /// `endpoints.getAuthToken`, when it has one.
    AuthToken {
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// Project metadata for the report. `message` explains a rejected answer.
    ProjectInfo {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Final acknowledgement once the report is ready.
    Finish,
}

/// Progress narration sent to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "kebab-case")]
pub enum Notice {
    Greeting,
    Heading { text: String },
    Message { text: String },
    /// A recoverable problem, e.g. an actor profile that failed to load.
    Failure { text: String },
    RunningTest { name: String },
    Results { items: ResultSet },
    ReportReady { session_id: String },
}

impl Notice {
    pub fn message(text: impl Into<String>) -> Self {
        Notice::Message { text: text.into() }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Notice::Failure { text: text.into() }
    }

    pub fn heading(text: impl Into<String>) -> Self {
        Notice::Heading { text: text.into() }
    }
}

/// Envelope for engine → operator traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionMessage {
    Notice {
        content: Notice,
    },
    InputPrompt {
        content: Prompt,
        #[serde(rename = "can-go-back")]
        can_go_back: bool,
    },
}

impl SessionMessage {
    pub fn prompt(prompt: Prompt) -> Self {
        SessionMessage::InputPrompt {
            content: prompt,
            can_go_back: false,
        }
    }
}

/// Envelope for operator → engine answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerMessage {
    pub data: Answers,
}

/// A string answer, ignoring blanks.
pub fn answer_str<'a>(answers: &'a Answers, key: &str) -> Option<&'a str> {
    answers
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A checkbox-style answer: `true`, or one of `"on"`, `"true"`, `"yes"`.
pub fn answer_flag(answers: &Answers, key: &str) -> bool {
    match answers.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "on" | "true" | "yes"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_envelope_shape() {
        let msg = SessionMessage::prompt(Prompt::ActorUri {
            previous: Some("https://server.example/u/alice".into()),
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "input-prompt",
                "content": { "prompt": "actor-uri", "previous": "https://server.example/u/alice" },
                "can-go-back": false,
            })
        );
    }

    #[test]
    fn notice_envelope_shape() {
        let msg = SessionMessage::Notice {
            content: Notice::RunningTest { name: "outbox-update".into() },
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "type": "notice", "content": { "notice": "running-test", "name": "outbox-update" } })
        );
    }

    #[test]
    fn answers_parse_from_data_envelope() {
        let msg: AnswerMessage =
            serde_json::from_value(json!({ "data": { "actor-id": " https://s.example/a ", "testing-c2s-server": "on" } }))
                .unwrap();
        assert_eq!(answer_str(&msg.data, keys::ACTOR_ID), Some("https://s.example/a"));
        assert!(answer_flag(&msg.data, keys::TESTING_C2S_SERVER));
        assert!(!answer_flag(&msg.data, keys::TESTING_CLIENT));
    }

    #[test]
    fn blank_answers_count_as_missing() {
        let answers: Answers = serde_json::from_value(json!({ "repo": "   " })).unwrap();
        assert_eq!(answer_str(&answers, keys::REPO), None);
    }
}
