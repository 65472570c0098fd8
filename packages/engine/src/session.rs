//! One supervised test session, from greeting to report.
//!
//! | Step | Prompt / notice | Repeats until |
//! |------|-----------------|---------------|
//! | greet | `Greeting` | |
//! | setup | `Setup` | at least one `testing-*` flag is set |
//! | c2s battery | `ActorUri`, `AuthToken`, then per-case notices | profile fetched and a token given |
//! | project info | `ProjectInfo` | `project-name`, `website` and `repo` are non-empty |
//! | finish | `ReportReady`, `Finish` | |
//!
//! Any [`EngineError::SessionClosed`] from the operator ends the session
//! without a report.

use std::sync::Arc;

use apconform::document::value_uri;
use apconform::{Prop, ResultSet};
use apconform_session_api::{answer_flag, answer_str, keys, Answers, Notice, Prompt, Report, ResultGroups};
use tracing::{error, info};
use uuid::Uuid;

use crate::battery::{self, BatteryContext, C2S_SERVER_GROUP};
use crate::client::{fetch_profile, ApClient, AuthenticatedClient};
use crate::context::EngineContext;
use crate::directory::SessionRegistration;
use crate::error::EngineError;
use crate::operator::Operator;
use crate::peer::PeerActor;

// ---------------------------------------------------------------------------
// SessionActors
// ---------------------------------------------------------------------------

/// Mints the simulated actors for one session and keeps them routable for
/// as long as it lives.
#[derive(Debug)]
pub struct SessionActors {
    ctx: EngineContext,
    registration: SessionRegistration,
}

impl SessionActors {
    pub fn new(ctx: EngineContext, session_id: &str) -> Self {
        let registration = ctx.directory().register_session(session_id);
        Self { ctx, registration }
    }

    pub fn session_id(&self) -> &str {
        self.registration.session_id()
    }

    /// A new actor at `{public_base}/ap/u/{session_id}/{actor_id}`.
    pub fn create_actor(&self) -> Arc<PeerActor> {
        let actor_id = Uuid::now_v7().simple().to_string();
        let uri = format!(
            "{}/ap/u/{}/{actor_id}",
            self.ctx.config().public_base.trim_end_matches('/'),
            self.session_id()
        );
        let actor = Arc::new(PeerActor::new(
            uri,
            self.ctx.next_actor_seq(),
            Arc::clone(self.ctx.keypair()),
            self.ctx.http().clone(),
        ));
        self.registration.add_actor(actor_id, Arc::clone(&actor));
        info!(
            "session: created actor-{} at {} for session {}",
            actor.seq(),
            actor.uri(),
            self.session_id()
        );
        actor
    }
}

// ---------------------------------------------------------------------------
// TestSession
// ---------------------------------------------------------------------------

pub struct TestSession {
    id: String,
    ctx: EngineContext,
    operator: Arc<dyn Operator>,
    actors: SessionActors,
    config: Answers,
    results: ResultGroups,
}

impl TestSession {
    pub fn new(ctx: EngineContext, operator: Arc<dyn Operator>) -> Self {
        let id = Uuid::now_v7().simple().to_string();
        let actors = SessionActors::new(ctx.clone(), &id);
        info!("session: created {id}");
        Self {
            id,
            ctx,
            operator,
            actors,
            config: Answers::new(),
            results: ResultGroups::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn actors(&self) -> &SessionActors {
        &self.actors
    }

    /// Drive the whole session and return its report.
    pub async fn run(mut self) -> Result<Report, EngineError> {
        self.operator.notice(Notice::Greeting).await?;
        self.setup().await?;

        if answer_flag(&self.config, keys::TESTING_CLIENT) {
            self.manual_only("Client").await?;
        }
        if answer_flag(&self.config, keys::TESTING_C2S_SERVER) {
            self.run_c2s_server_tests().await?;
        }
        if answer_flag(&self.config, keys::TESTING_S2S_SERVER) {
            self.manual_only("Server-to-server").await?;
        }

        info!("session: tests complete for {}; querying project information", self.id);
        let project = self.project_info().await?;
        let report = Report::new(project, self.config.clone(), std::mem::take(&mut self.results));
        let tally = report.tally();
        info!(
            "session: {} finished: {} passed, {} failed, {} inconclusive, {} not applicable",
            self.id, tally.passed, tally.failed, tally.inconclusive, tally.not_applicable
        );

        self.operator
            .notice(Notice::ReportReady {
                session_id: self.id.clone(),
            })
            .await?;
        match self.operator.ask(Prompt::Finish).await {
            Ok(_) | Err(EngineError::SessionClosed) => Ok(report),
            Err(e) => Err(e),
        }
    }

    async fn setup(&mut self) -> Result<(), EngineError> {
        loop {
            let answers = self.operator.ask(Prompt::Setup).await?;
            self.config.extend(answers);
            let selected = [keys::TESTING_CLIENT, keys::TESTING_C2S_SERVER, keys::TESTING_S2S_SERVER]
                .iter()
                .any(|key| answer_flag(&self.config, key));
            if selected {
                return Ok(());
            }
            self.operator
                .notice(Notice::message(
                    "It looks like you didn't select anything. \
                     Please select at least one implementation type to test.",
                ))
                .await?;
        }
    }

    /// Questionnaire answers for this group are not collected; the operator
    /// is only told the checks are manual.
    async fn manual_only(&self, label: &str) -> Result<(), EngineError> {
        self.operator
            .notice(Notice::message(format!(
                "{label} checks are not automated; record them in your report by hand."
            )))
            .await
    }

    async fn run_c2s_server_tests(&mut self) -> Result<(), EngineError> {
        self.operator
            .notice(Notice::heading("Client-to-server outbox tests"))
            .await?;
        let client = self.setup_client().await?;
        info!("session: client ready for {} in session {}", client.uri(), self.id);

        let ctx = BatteryContext {
            client: &client,
            actors: &self.actors,
            retry: self.ctx.config().retry,
            max_items: self.ctx.config().max_collection_items,
        };
        let mut results = ResultSet::new();
        battery::run_outbox_battery(&ctx, self.operator.as_ref(), &mut results).await?;
        self.results
            .entry(C2S_SERVER_GROUP.to_string())
            .or_default()
            .merge(results);
        Ok(())
    }

    /// Resolve the actor under test and collect its credential.
    async fn setup_client(&self) -> Result<ApClient, EngineError> {
        let http = self.ctx.http();
        let mut previous: Option<String> = None;
        let profile = loop {
            let answers = self
                .operator
                .ask(Prompt::ActorUri {
                    previous: previous.clone(),
                })
                .await?;
            let Some(uri) = answer_str(&answers, keys::ACTOR_ID) else {
                self.operator
                    .notice(Notice::failure("Please enter the URI of the actor to test"))
                    .await?;
                continue;
            };
            previous = Some(uri.to_string());

            match fetch_profile(http, uri).await {
                Ok(profile) => break profile,
                Err(e) if e.is_malformed() => {
                    error!("session: failed to parse actor JSON-LD for {uri}: {e}");
                    self.operator
                        .notice(Notice::failure("Failed to parse actor profile JSON-LD"))
                        .await?;
                }
                Err(e) => {
                    error!("session: failed to retrieve actor {uri}: {e}");
                    self.operator
                        .notice(Notice::failure("Failed to retrieve actor profile"))
                        .await?;
                }
            }
        };

        let endpoint = profile.embedded(Prop::Endpoints).and_then(|endpoints| {
            endpoints
                .get_key("getAuthToken")
                .and_then(value_uri)
                .map(str::to_string)
        });
        let token = loop {
            let answers = self
                .operator
                .ask(Prompt::AuthToken {
                    endpoint: endpoint.clone(),
                })
                .await?;
            if let Some(token) = answer_str(&answers, keys::AUTH_TOKEN) {
                break token.to_string();
            }
            self.operator
                .notice(Notice::failure("An auth token is required to post to the outbox"))
                .await?;
        };

        let client = AuthenticatedClient::anonymous(http.clone()).with_bearer(token);
        ApClient::new(client, profile)
    }

    async fn project_info(&self) -> Result<Answers, EngineError> {
        let mut message = None;
        loop {
            let answers = self.operator.ask(Prompt::ProjectInfo { message }).await?;
            let complete = [keys::PROJECT_NAME, keys::WEBSITE, keys::REPO]
                .iter()
                .all(|key| answer_str(&answers, key).is_some());
            if complete {
                return Ok(answers);
            }
            message = Some("Please include at least project, website and repo information.".to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    use apconform::SigningKeypair;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    use crate::config::EngineConfig;
    use crate::operator::ScriptedOperator;

    fn test_ctx() -> EngineContext {
        static KEY: OnceLock<Arc<SigningKeypair>> = OnceLock::new();
        let key = KEY
            .get_or_init(|| Arc::new(SigningKeypair::generate(1024).unwrap()))
            .clone();
        let mut config = EngineConfig::for_listener("127.0.0.1:0".parse().unwrap());
        config.public_base = "http://peers.test/".into();
        EngineContext::new(config, key).unwrap()
    }

    fn project() -> serde_json::Value {
        json!({ "project-name": "Example", "website": "https://example.test", "repo": "https://git.example.test" })
    }

    #[test]
    fn actors_are_routable_until_session_drops() {
        let ctx = test_ctx();
        let actors = SessionActors::new(ctx.clone(), "s1");
        let a = actors.create_actor();
        let b = actors.create_actor();
        assert!(a.uri().starts_with("http://peers.test/ap/u/s1/"));
        assert!(b.seq() > a.seq());
        let actor_id = a.uri().rsplit('/').next().unwrap();
        assert!(ctx.directory().get("s1", actor_id).is_some());

        drop(actors);
        assert!(ctx.directory().get("s1", actor_id).is_none());
    }

    #[tokio::test]
    async fn setup_repeats_until_something_is_selected() {
        let op = Arc::new(
            ScriptedOperator::new()
                .then(json!({}))
                .then(json!({ "testing-s2s-server": "on" }))
                .then(json!({ "project-name": "Example" }))
                .then(project())
                .then(json!({})),
        );
        let report = TestSession::new(test_ctx(), op.clone()).run().await.unwrap();

        assert_eq!(report.project["project-name"], "Example");
        assert_eq!(report.config["testing-s2s-server"], "on");
        assert!(report.results.is_empty());

        let prompts = op.prompts();
        assert_eq!(prompts[0], Prompt::Setup);
        assert_eq!(prompts[1], Prompt::Setup);
        assert_eq!(prompts[2], Prompt::ProjectInfo { message: None });
        assert!(matches!(prompts[3], Prompt::ProjectInfo { message: Some(_) }));
        assert_eq!(prompts[4], Prompt::Finish);
        assert!(matches!(op.notices().last(), Some(Notice::ReportReady { .. })));
    }

    #[tokio::test]
    async fn disconnect_produces_no_report() {
        let op = Arc::new(ScriptedOperator::new().then(json!({ "testing-client": true })));
        let err = TestSession::new(test_ctx(), op).run().await.unwrap_err();
        assert!(err.is_session_closed());
    }

    #[tokio::test]
    async fn actor_uri_is_asked_again_after_failures() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let profile_base = base.clone();
        let app = Router::new()
            .route("/broken", get(|| async { "not json" }))
            .route(
                "/alice",
                get(move || async move {
                    Json(json!({
                        "id": format!("{profile_base}/alice"),
                        "outbox": format!("{profile_base}/alice/outbox"),
                        "endpoints": { "getAuthToken": format!("{profile_base}/token") },
                    }))
                }),
            );
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let op = Arc::new(
            ScriptedOperator::new()
                .then(json!({ "actor-id": format!("{base}/broken") }))
                .then(json!({ "actor-id": format!("{base}/missing") }))
                .then(json!({ "actor-id": format!("{base}/alice") }))
                .then(json!({}))
                .then(json!({ "auth-token": "secret" })),
        );
        let session = TestSession::new(test_ctx(), op.clone());
        let client = session.setup_client().await.unwrap();
        assert_eq!(client.uri(), format!("{base}/alice"));

        let failures: Vec<_> = op
            .notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Failure { text } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(
            failures,
            [
                "Failed to parse actor profile JSON-LD",
                "Failed to retrieve actor profile",
                "An auth token is required to post to the outbox",
            ]
        );

        let prompts = op.prompts();
        assert_eq!(
            prompts[1],
            Prompt::ActorUri {
                previous: Some(format!("{base}/broken"))
            }
        );
        assert_eq!(
            prompts[3],
            Prompt::AuthToken {
                endpoint: Some(format!("{base}/token"))
            }
        );
    }
}
