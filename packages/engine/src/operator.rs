//! The supervising operator, seen from the engine.
//!
//! The engine never renders anything. It sends [`Notice`]s and asks
//! [`Prompt`]s; a transport behind [`Operator`] turns them into whatever
//! the human sees. A transport that loses its peer returns
//! [`EngineError::SessionClosed`].

use std::collections::VecDeque;
use std::sync::Mutex;

use apconform_session_api::{Answers, Notice, Prompt, SessionMessage};
use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineError;

#[async_trait]
pub trait Operator: Send + Sync {
    async fn notice(&self, notice: Notice) -> Result<(), EngineError>;

    async fn ask(&self, prompt: Prompt) -> Result<Answers, EngineError>;
}

// ---------------------------------------------------------------------------
// ScriptedOperator
// ---------------------------------------------------------------------------

/// Answers prompts from a queue and records everything it is sent.
///
/// When the queue runs dry the operator behaves as if it disconnected.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<Answers>>,
    transcript: Mutex<Vec<SessionMessage>>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answers to the next prompt. Non-object values queue an
    /// empty answer.
    pub fn then(self, answers: Value) -> Self {
        let answers = match answers {
            Value::Object(map) => map,
            _ => Answers::new(),
        };
        self.answers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(answers);
        self
    }

    /// Every message sent to the operator, in order.
    pub fn transcript(&self) -> Vec<SessionMessage> {
        self.transcript.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.transcript()
            .into_iter()
            .filter_map(|m| match m {
                SessionMessage::Notice { content } => Some(content),
                SessionMessage::InputPrompt { .. } => None,
            })
            .collect()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.transcript()
            .into_iter()
            .filter_map(|m| match m {
                SessionMessage::InputPrompt { content, .. } => Some(content),
                SessionMessage::Notice { .. } => None,
            })
            .collect()
    }

    fn record(&self, message: SessionMessage) {
        self.transcript
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(message);
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn notice(&self, notice: Notice) -> Result<(), EngineError> {
        self.record(SessionMessage::Notice { content: notice });
        Ok(())
    }

    async fn ask(&self, prompt: Prompt) -> Result<Answers, EngineError> {
        self.record(SessionMessage::prompt(prompt));
        self.answers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .ok_or(EngineError::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn answers_in_order_then_disconnects() {
        let op = ScriptedOperator::new()
            .then(json!({ "a": 1 }))
            .then(json!({ "b": 2 }));
        assert_eq!(op.ask(Prompt::Setup).await.unwrap()["a"], 1);
        op.notice(Notice::Greeting).await.unwrap();
        assert_eq!(op.ask(Prompt::Finish).await.unwrap()["b"], 2);
        assert!(op.ask(Prompt::Finish).await.unwrap_err().is_session_closed());

        assert_eq!(op.prompts(), [Prompt::Setup, Prompt::Finish, Prompt::Finish]);
        assert_eq!(op.notices(), [Notice::Greeting]);
        assert_eq!(op.transcript().len(), 4);
    }
}
