//! Operator transport over JSON lines on stdin/stdout.
//!
//! Each engine message is one line of JSON on stdout:
//!
//! ```json
//! {"type":"input-prompt","content":{"prompt":"setup"},"can-go-back":false}
//! ```
//!
//! and each answer is one line on stdin:
//!
//! ```json
//! {"data":{"testing-c2s-server":true}}
//! ```
//!
//! End of input means the operator has left.

use apconform_engine::{EngineError, Operator};
use apconform_session_api::{AnswerMessage, Answers, Notice, Prompt, SessionMessage};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::warn;

pub struct StdioOperator {
    input: Mutex<Lines<BufReader<Stdin>>>,
    output: Mutex<Stdout>,
}

impl StdioOperator {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            output: Mutex::new(tokio::io::stdout()),
        }
    }

    async fn send(&self, message: &SessionMessage) -> Result<(), EngineError> {
        let mut line = serde_json::to_string(message).map_err(|e| EngineError::Malformed {
            url: "stdout".into(),
            reason: e.to_string(),
        })?;
        line.push('\n');
        let mut out = self.output.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(|_| EngineError::SessionClosed)?;
        out.flush().await.map_err(|_| EngineError::SessionClosed)
    }
}

#[async_trait]
impl Operator for StdioOperator {
    async fn notice(&self, notice: Notice) -> Result<(), EngineError> {
        self.send(&SessionMessage::Notice { content: notice }).await
    }

    async fn ask(&self, prompt: Prompt) -> Result<Answers, EngineError> {
        self.send(&SessionMessage::prompt(prompt)).await?;
        let mut input = self.input.lock().await;
        loop {
            let line = match input.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => return Err(EngineError::SessionClosed),
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AnswerMessage>(&line) {
                Ok(answer) => return Ok(answer.data),
                Err(e) => {
                    warn!("operator: ignoring unparseable answer: {e}");
                    self.send(&SessionMessage::Notice {
                        content: Notice::failure(format!(
                            "Answers must be a JSON object with a \"data\" member: {e}"
                        )),
                    })
                    .await?;
                }
            }
        }
    }
}
