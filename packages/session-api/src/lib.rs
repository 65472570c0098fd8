//! Message types for the operator session and the final report.
//!
//! The engine talks to a supervising human through an operator transport it
//! does not own. This crate fixes the vocabulary of that conversation so any
//! transport (a browser socket, JSON lines on stdio, a test script) can carry
//! it, and defines the [`Report`] document produced when a session ends.
//!
//! # Message flow
//!
//! | Direction | Envelope | Payload |
//! |-----------|----------|---------|
//! | engine → operator | `{"type":"notice", ...}` | [`Notice`] |
//! | engine → operator | `{"type":"input-prompt", ...}` | [`Prompt`] |
//! | operator → engine | `{"data": {...}}` | [`Answers`] |

pub mod error;
pub mod report;
pub mod session;

pub use error::ErrorResponse;
pub use report::{Report, ResultGroups};
pub use session::{answer_flag, answer_str, keys, AnswerMessage, Answers, Notice, Prompt, SessionMessage};
