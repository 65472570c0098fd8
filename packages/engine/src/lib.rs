//! Protocol conformance test engine.
//!
//! Drives a battery of client-to-server checks against a remote actor,
//! using simulated peer actors served from this process as counterparts.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | [`EngineConfig`] from `APCONFORM_*` environment variables |
//! | [`context`] | Process-wide state: HTTP client, shared keypair, actor directory |
//! | [`client`] | Bearer / signature authenticated requests to the server under test |
//! | [`paginator`] | Lazy traversal of paged collections |
//! | [`poll`] | Bounded retry for eventually consistent checks |
//! | [`peer`] | Simulated peer actors |
//! | [`directory`], [`handlers`], [`router`] | HTTP surface of the simulated actors |
//! | [`operator`] | The supervising operator and a scripted implementation |
//! | [`session`] | One test session from greeting to report |
//! | [`battery`] | The ordered outbox test cases |

pub mod battery;
pub mod client;
pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod operator;
pub mod paginator;
pub mod peer;
pub mod poll;
pub mod router;
pub mod session;

pub use client::{ApClient, AuthenticatedClient, Fetcher, PostOutcome};
pub use config::{ConfigError, EngineConfig};
pub use context::EngineContext;
pub use error::{EngineError, PeerError};
pub use operator::{Operator, ScriptedOperator};
pub use paginator::{collection_contains, collection_ids, CollectionWalker};
pub use peer::PeerActor;
pub use poll::RetryPolicy;
pub use session::{SessionActors, TestSession};
